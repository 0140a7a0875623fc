//! Single-turn console assistant.
//!
//! Each question is answered on its own. When a search capability is present
//! the rendered web results for the question are placed in the prompt.

use std::sync::Arc;

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::search::WebSearch;

/// Answers free-form questions with the model, optionally grounded in web results.
pub struct ChatAssistant {
    llm: Arc<dyn LlmProvider>,
    search: Option<WebSearch>,
}

impl ChatAssistant {
    pub fn new(llm: Arc<dyn LlmProvider>, search: Option<WebSearch>) -> Self {
        Self { llm, search }
    }

    /// Name of the search backend in use, if any.
    pub fn search_backend(&self) -> Option<&str> {
        self.search.as_ref().map(WebSearch::backend_name)
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Answer one question.
    pub async fn answer(&self, question: &str) -> Result<String, LlmError> {
        let prompt = match &self.search {
            Some(search) => {
                let results = search.search(question).await;
                grounded_prompt(question, &results)
            }
            None => question.to_string(),
        };
        self.llm.run(&prompt).await
    }
}

fn grounded_prompt(question: &str, search_results: &str) -> String {
    format!(
        "Answer the question below. Use the web search results where they help.\n\n\
         Web search results:\n{search_results}\n\n\
         Question: {question}"
    )
}

/// Whether the input ends the chat loop (`exit`, any case).
pub fn is_exit_command(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("exit")
}
