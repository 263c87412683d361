use async_trait::async_trait;

use crate::error::Result;

/// Prompt rendering, model call and post-processing as one opaque step.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn run(&self, input: &str) -> Result<String>;
}
