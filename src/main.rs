use std::sync::Arc;
use std::time::Duration;

use actix_web::web;
use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use config::Config;
use controller::Controller;
use database::SqlDatabase;
use llm::OllamaModel;
use prompt::PromptTemplate;
use server::AppState;
use text_to_sql_chain::TextToSqlChain;

mod chain;
mod config;
mod controller;
mod database;
mod error;
mod llm;
mod logging;
mod prompt;
mod server;
mod session;
mod text_to_sql_chain;
mod view;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::parse();
    logging::init()?;

    let db = SqlDatabase::connect(&config.database_url, config.max_connections, config.sample_rows)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database_url))?;
    let table_info = db
        .table_info()
        .await
        .context("Failed to read database schema")?;
    info!(
        dialect = db.dialect().name(),
        table_info_len = table_info.len(),
        "Loaded schema"
    );

    let model = OllamaModel::new(config.ollama_host.clone(), config.ollama_port, config.model.clone());
    info!(model = model.model(), host = %config.ollama_host, port = config.ollama_port, "Using Ollama");

    let prompt = PromptTemplate::new(db.dialect().name(), table_info).with_top_k(config.top_k);
    info!(top_k = prompt.top_k(), "Prompt ready");
    let chain = TextToSqlChain::new(Arc::new(model), prompt);
    let controller = Controller::new(Arc::new(chain), Arc::new(db));

    let state = AppState::new(controller, Duration::from_secs(config.session_ttl_secs));
    server::serve(web::Data::new(state), &config.bind)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
