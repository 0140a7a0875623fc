//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use sleuth_core::config::SleuthConfig;
use sleuth_core::gateway::{GatewayServer, run_gateway};
use sleuth_core::pipeline::{ResearchEvent, ResearchPipeline, report_tool_unavailable};
use sleuth_core::search::WebSearch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: SleuthConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => handle_serve(config, host, port, static_dir).await,
        Commands::Research { query, json } => handle_research(config, &query, json).await,
        Commands::Chat => crate::repl::run_chat(config).await,
        Commands::Config { action } => handle_config(action, config, workspace),
    }
}

/// Build the research pipeline, or `None` when web search is not configured.
fn build_pipeline(config: &SleuthConfig) -> anyhow::Result<Option<Arc<ResearchPipeline>>> {
    let llm = sleuth_core::create_provider(&config.llm)
        .map_err(|e| anyhow::anyhow!("LLM provider error: {}", e))?;

    let search = match WebSearch::from_config(&config.search) {
        Ok(search) => search,
        Err(e) => {
            warn!(error = %e, "Web search unavailable; research queries will be refused");
            return Ok(None);
        }
    };

    info!(backend = search.backend_name(), "Web search enabled");
    let pipeline = ResearchPipeline::builder(llm)
        .search(search)
        .config(config.pipeline.clone())
        .build()?;
    Ok(Some(Arc::new(pipeline)))
}

/// Locate the bundled browser front end.
fn resolve_frontend_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SLEUTH_FRONTEND_DIR") {
        let p = PathBuf::from(dir);
        if p.join("index.html").exists() {
            return Some(p);
        }
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let p = exe_dir.join("frontend");
        if p.join("index.html").exists() {
            return Some(p);
        }
    }

    let p = PathBuf::from("sleuth-cli/frontend");
    p.join("index.html").exists().then_some(p)
}

async fn handle_serve(
    mut config: SleuthConfig,
    host: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.gateway.static_dir = static_dir
        .or(config.gateway.static_dir)
        .or_else(resolve_frontend_dir);

    let pipeline = build_pipeline(&config)?;
    let addr = config.gateway.bind_addr();
    let shared = GatewayServer::new(config.gateway, pipeline).shared();

    println!("Sleuth listening on ws://{}/ws", addr);
    tokio::select! {
        result = run_gateway(shared) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

async fn handle_research(config: SleuthConfig, query: &str, json: bool) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&config)?;
    let (tx, mut rx) = mpsc::channel::<ResearchEvent>(config.gateway.event_buffer.max(1));

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if json {
                match event.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                }
            } else {
                print!("{}", render_event(&event));
            }
        }
    });

    let outcome = match pipeline {
        Some(pipeline) => {
            let cancel = CancellationToken::new();
            let run = pipeline.run(query, &tx, &cancel);
            tokio::pin!(run);
            tokio::select! {
                result = &mut run => result.map(|_| ()),
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    run.await.map(|_| ())
                }
            }
        }
        None => {
            report_tool_unavailable(&tx).await?;
            Err(sleuth_core::PipelineError::ToolUnavailable)
        }
    };

    drop(tx);
    printer.await?;
    outcome.map_err(|e| anyhow::anyhow!(e))
}

/// Human-readable rendering of one event for the terminal.
pub(crate) fn render_event(event: &ResearchEvent) -> String {
    match event {
        ResearchEvent::Status(text) => format!("== {}\n", text),
        ResearchEvent::Step(text) => format!("\n-> {}\n", text),
        ResearchEvent::IntentAnalysis(text) => section("Intent analysis", text),
        ResearchEvent::SearchResults(text) => section("Search results", text),
        ResearchEvent::Classification(text) => section("Classification", text),
        ResearchEvent::FinalResult(report) => {
            format!(
                "{}{}",
                section("Analysis", &report.analysis),
                section("Insights", &report.insights)
            )
        }
        ResearchEvent::Error(text) => format!("\nError: {}\n", text),
    }
}

fn section(title: &str, body: &str) -> String {
    format!("\n[{}]\n{}\n", title, body.trim())
}

fn handle_config(
    action: ConfigAction,
    config: SleuthConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".sleuth");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = SleuthConfig::default().to_toml_string()?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", config.to_toml_string()?);
            for warning in config.validate() {
                eprintln!("warning: {}", warning);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sleuth_core::pipeline::FinalReport;

    #[test]
    fn test_render_step_and_error() {
        assert_eq!(
            render_event(&ResearchEvent::Step("Running web search...".into())),
            "\n-> Running web search...\n"
        );
        assert_eq!(
            render_event(&ResearchEvent::Error("boom".into())),
            "\nError: boom\n"
        );
    }

    #[test]
    fn test_render_final_result_shows_analysis_and_insights() {
        let rendered = render_event(&ResearchEvent::FinalResult(FinalReport {
            intent_analysis: "intent".into(),
            classification: "classes".into(),
            analysis: "deep\n".into(),
            insights: "findings".into(),
        }));
        assert_eq!(rendered, "\n[Analysis]\ndeep\n\n[Insights]\nfindings\n");
    }

    #[test]
    fn test_config_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        handle_config(ConfigAction::Init, SleuthConfig::default(), dir.path()).unwrap();
        let path = dir.path().join(".sleuth").join("config.toml");
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[llm]"));
        assert!(written.contains("[gateway]"));

        // A second init leaves an edited file alone.
        std::fs::write(&path, "# edited\n").unwrap();
        handle_config(ConfigAction::Init, SleuthConfig::default(), dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited\n");
    }
}
