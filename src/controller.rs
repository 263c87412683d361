use std::sync::Arc;

use tracing::{info, warn};

use crate::chain::Chain;
use crate::database::QueryExecutor;
use crate::error::Result;
use crate::session::SessionState;

/// The two page actions as transitions over a [`SessionState`].
pub struct Controller {
    chain: Arc<dyn Chain>,
    executor: Arc<dyn QueryExecutor>,
}

impl Controller {
    pub fn new(chain: Arc<dyn Chain>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { chain, executor }
    }

    /// Generates a query for `question`. On failure the state is untouched
    /// and the error goes back to the caller.
    pub async fn submit(&self, state: &mut SessionState, question: &str) -> Result<()> {
        info!(question_len = question.len(), "Generating query");

        match self.chain.run(question).await {
            Ok(query) => {
                state.set_query(query);
                Ok(())
            }
            Err(e) => {
                warn!("Query generation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Executes the stored query. Returns `false` without doing anything when
    /// there is no query yet.
    pub async fn run(&self, state: &mut SessionState) -> bool {
        if !state.can_run() {
            return false;
        }

        info!(query = state.query(), "Running query");
        let result = self.executor.execute(state.query()).await;
        state.set_result(result);
        true
    }
}
