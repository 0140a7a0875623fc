//! Interactive question-and-answer chat on the terminal.

use dialoguer::Input;
use sleuth_core::config::SleuthConfig;
use sleuth_core::search::WebSearch;
use sleuth_core::{ChatAssistant, is_exit_command};
use tracing::warn;

/// What the loop should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReplAction {
    Quit,
    Skip,
    Ask(String),
}

pub(crate) fn classify_input(line: &str) -> ReplAction {
    let trimmed = line.trim();
    if is_exit_command(trimmed) {
        ReplAction::Quit
    } else if trimmed.is_empty() {
        ReplAction::Skip
    } else {
        ReplAction::Ask(trimmed.to_string())
    }
}

/// Run the chat loop until the user types `exit` or closes stdin.
pub async fn run_chat(config: SleuthConfig) -> anyhow::Result<()> {
    let llm = sleuth_core::create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider error: {}", e))?;

    let search = match WebSearch::from_config(&config.search) {
        Ok(search) => Some(search),
        Err(e) => {
            warn!(error = %e, "Web search unavailable; answering without search results");
            None
        }
    };
    let assistant = ChatAssistant::new(llm, search);

    let search_note = assistant
        .search_backend()
        .map(|name| format!(", web search via {}", name))
        .unwrap_or_default();
    println!(
        "\x1b[1mSleuth chat\x1b[0m ({}{}). Type 'exit' to quit.\n",
        assistant.model_name(),
        search_note
    );

    loop {
        // dialoguer blocks on stdin.
        let line = tokio::task::spawn_blocking(|| {
            Input::<String>::new()
                .with_prompt("You")
                .allow_empty(true)
                .interact_text()
        })
        .await?;

        let line = match line {
            Ok(line) => line,
            // EOF or a closed terminal ends the session.
            Err(_) => break,
        };

        match classify_input(&line) {
            ReplAction::Quit => break,
            ReplAction::Skip => continue,
            ReplAction::Ask(question) => match assistant.answer(&question).await {
                Ok(reply) => println!("\n\x1b[32mAssistant:\x1b[0m {}\n", reply.trim()),
                Err(e) => println!("\n\x1b[31mError:\x1b[0m {}\n", e),
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}
