use clap::Parser;
use url::Url;

use crate::prompt::DEFAULT_TOP_K;
use crate::session::DEFAULT_SESSION_TTL;

/// Ask questions about a SQL database in plain language.
#[derive(Debug, Clone, Parser)]
#[command(name = "sql_query_converter", version)]
pub struct Config {
    /// Database to generate queries for and run them against
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://Chinook.db")]
    pub database_url: String,

    /// Connections kept in the database pool
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Ollama server address, without the port
    #[arg(
        long,
        env = "OLLAMA_HOST",
        default_value = "http://localhost",
        value_parser = parse_ollama_host
    )]
    pub ollama_host: Url,

    #[arg(long, env = "OLLAMA_PORT", default_value_t = 11434)]
    pub ollama_port: u16,

    /// Model used to write the SQL
    #[arg(long, env = "OLLAMA_MODEL", default_value = "gemma2")]
    pub model: String,

    /// Row limit the model is asked to respect when the question names none
    #[arg(long, env = "TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Example rows per table included in the prompt's schema description
    #[arg(long, env = "SAMPLE_ROWS_IN_TABLE_INFO", default_value_t = 3)]
    pub sample_rows: usize,

    /// Address the page is served on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8501")]
    pub bind: String,

    /// Seconds a session may stay idle before it is dropped
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = DEFAULT_SESSION_TTL.as_secs())]
    pub session_ttl_secs: u64,
}

/// Accepts only `http`/`https` urls that name a host, so the Ollama client
/// never sees an address it cannot connect to.
pub fn parse_ollama_host(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|e| format!("invalid url {value:?}: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("expected an http or https url, got {:?}", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("url {value:?} has no host"));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_no_flags() {
        let config = Config::try_parse_from(["sql_query_converter"]).unwrap();
        assert_eq!(config.model, "gemma2");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.sample_rows, 3);
        assert_eq!(config.ollama_port, 11434);
        assert_eq!(config.ollama_host.as_str(), "http://localhost/");
        assert_eq!(config.session_ttl_secs, 3600);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "sql_query_converter",
            "--database-url",
            "postgres://localhost/shop",
            "--model",
            "llama3.2:latest",
            "--top-k",
            "10",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/shop");
        assert_eq!(config.model, "llama3.2:latest");
        assert_eq!(config.top_k, 10);
        assert_eq!(config.bind, "0.0.0.0:9000");
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(Config::try_parse_from(["sql_query_converter", "--top-k", "many"]).is_err());
    }

    #[test]
    fn ollama_host_must_be_http_url() {
        let config = Config::try_parse_from([
            "sql_query_converter",
            "--ollama-host",
            "https://ollama.internal",
        ])
        .unwrap();
        assert_eq!(config.ollama_host.host_str(), Some("ollama.internal"));

        for bad in ["not a url", "localhost", "ftp://ollama.internal", "http://"] {
            assert!(
                Config::try_parse_from(["sql_query_converter", "--ollama-host", bad]).is_err(),
                "{bad} should be rejected"
            );
        }
    }
}
