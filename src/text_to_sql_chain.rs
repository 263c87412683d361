use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::chain::Chain;
use crate::error::{AppError, Result};
use crate::llm::LanguageModel;
use crate::prompt::PromptTemplate;

/// Marker the model must emit before the final SQL.
pub const FINAL_ANSWER_MARKER: &str = "Final answer: ";

pub struct TextToSqlChain {
    model: Arc<dyn LanguageModel>,
    prompt: PromptTemplate,
}

#[async_trait]
impl Chain for TextToSqlChain {
    async fn run(&self, input: &str) -> Result<String> {
        let messages = self.prompt.render(input);

        let output = self.model.complete(&messages).await?;
        debug!(dialect = self.prompt.dialect(), "Model output: {:?}", output);

        let sql_query = parse_final_answer(&output)?;
        info!("Sql Generated: {:?}", sql_query);

        Ok(sql_query)
    }
}

impl TextToSqlChain {
    pub fn new(model: Arc<dyn LanguageModel>, prompt: PromptTemplate) -> Self {
        Self { model, prompt }
    }
}

/// Returns the query written after the first `"Final answer: "` marker.
///
/// A missing marker, or one followed only by whitespace, is a
/// [`AppError::GenerationFormat`]; there is no fallback to the raw output.
pub fn parse_final_answer(output: &str) -> Result<String> {
    let (_, answer) = output
        .split_once(FINAL_ANSWER_MARKER)
        .ok_or(AppError::GenerationFormat)?;

    let answer = answer.trim();
    if answer.is_empty() {
        return Err(AppError::GenerationFormat);
    }

    Ok(answer.to_string())
}
