use ollama_rs::error::OllamaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The model ignored the "First draft / Final answer" output format.
    #[error("model output did not contain a query after \"Final answer: \"")]
    GenerationFormat,

    #[error("language model call failed: {0}")]
    ModelCall(#[from] OllamaError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
