use anyhow::Context;
use axum::http::HeaderName;
use clap::Parser;
use ipnet::IpNet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tp_core::{Storage, UserStorage};
use tp_extract::{ContentExtractor, ExtractorConfig, UrlValidator, ValidationOutcome, DEFAULT_USER_AGENT};
use tp_storage::backends::sqlite::DEFAULT_DB_PATH;
use tp_storage::{SqliteStorage, StorageKind};
use tp_web::AppState;
use tracing::{info, warn};

const STORAGE_CHECK_RETRIES: u32 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "Save web pages to read later", long_about = None)]
pub struct Cli {
    /// Per-request fetch timeout
    #[arg(long, global = true, env = "TIMSTAPAPER_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,
    #[arg(long, global = true, env = "TIMSTAPAPER_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
    /// Extra CIDR range to refuse, e.g. 100.64.0.0/10 (repeatable)
    #[arg(long = "block-cidr", global = true, env = "TIMSTAPAPER_BLOCK_CIDR", value_delimiter = ',')]
    block_cidrs: Vec<IpNet>,
    /// Extra hostname to refuse (repeatable)
    #[arg(long = "block-host", global = true, env = "TIMSTAPAPER_BLOCK_HOST", value_delimiter = ',')]
    block_hosts: Vec<String>,
    /// Tracing filter directive, e.g. `debug` or `tp_extract=trace`
    #[arg(long, global = true, env = "TIMSTAPAPER_LOG")]
    log: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the JSON API server
    Serve {
        #[arg(long, env = "TIMSTAPAPER_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        #[arg(long, env = "TIMSTAPAPER_STORAGE", value_enum, default_value_t = StorageKind::Memory)]
        storage: StorageKind,
        #[arg(long, env = "TIMSTAPAPER_DATABASE", default_value = DEFAULT_DB_PATH)]
        database: PathBuf,
        /// Header holding the email asserted by the identity proxy
        #[arg(long, env = "TIMSTAPAPER_IDENTITY_HEADER", default_value = tp_web::state::DEFAULT_IDENTITY_HEADER)]
        identity_header: String,
    },
    /// Extract a single URL and print the result as JSON
    Extract { url: String },
    /// Report whether a URL would be fetched
    CheckUrl { url: String },
    /// Create the SQLite database and run migrations
    InitDb {
        #[arg(long, env = "TIMSTAPAPER_DATABASE", default_value = DEFAULT_DB_PATH)]
        database: PathBuf,
    },
}

impl Cli {
    fn validator(&self) -> UrlValidator {
        let validator = self
            .block_cidrs
            .iter()
            .fold(UrlValidator::new(), |v, cidr| v.block_cidr(*cidr));
        self.block_hosts
            .iter()
            .fold(validator, |v, host| v.block_host(host.as_str()))
    }

    fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            ..ExtractorConfig::default()
        }
    }

    fn extractor(&self) -> anyhow::Result<ContentExtractor> {
        ContentExtractor::with_validator(&self.extractor_config(), self.validator())
            .context("Failed to build HTTP client")
    }
}

/// Round-trips a read through the backend so a broken database fails at startup.
async fn check_storage(storage: &Arc<dyn Storage>, kind: StorageKind) -> anyhow::Result<()> {
    let mut last_error = None;
    for attempt in 1..=STORAGE_CHECK_RETRIES {
        match tokio::time::timeout(Duration::from_secs(10), storage.get_user_by_email("")).await {
            Ok(Ok(_)) => {
                info!("🏦 Storage backend initialized successfully (using {})", kind);
                return Ok(());
            }
            Ok(Err(e)) => last_error = Some(anyhow::Error::new(e)),
            Err(e) => last_error = Some(anyhow::anyhow!("Storage health check timed out: {}", e)),
        }
        if attempt < STORAGE_CHECK_RETRIES {
            warn!("Storage health check failed, retrying {}/{}...", attempt, STORAGE_CHECK_RETRIES);
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Storage health check failed")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tp_core::logging::init_logging(cli.log.as_deref());

    match &cli.command {
        Commands::Serve { bind, storage, database, identity_header } => {
            let identity_header = HeaderName::try_from(identity_header.as_str())
                .with_context(|| format!("Invalid identity header: {}", identity_header))?;
            let backend = tp_storage::create_storage(*storage, database).await?;
            check_storage(&backend, *storage).await?;

            let state = AppState::new(backend, Arc::new(cli.extractor()?))
                .with_identity_header(identity_header);
            tp_web::serve(state, bind).await?;
        }
        Commands::Extract { url } => {
            let article = cli.extractor()?.extract(url).await;
            println!("{}", serde_json::to_string_pretty(&article)?);
        }
        Commands::CheckUrl { url } => match cli.validator().validate(url) {
            ValidationOutcome::Accepted(_) => println!("accepted"),
            outcome => {
                println!("rejected: {}", outcome.rejection_reason());
                std::process::exit(1);
            }
        },
        Commands::InitDb { database } => {
            let storage = SqliteStorage::new_with_path(database).await?;
            // A read proves the schema is usable.
            storage.get_user_by_email("").await?;
            info!(path = %storage.get_db_path().display(), "Database ready");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["timstapaper", "check-url", "https://example.com"]).unwrap();
        assert_eq!(cli.timeout_secs, 10);
        assert_eq!(cli.user_agent, DEFAULT_USER_AGENT);
        assert!(matches!(cli.command, Commands::CheckUrl { ref url } if url == "https://example.com"));
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "timstapaper",
            "serve",
            "--storage",
            "sqlite",
            "--database",
            "/tmp/tp.db",
            "--timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.timeout_secs, 3);
        match cli.command {
            Commands::Serve { storage, database, identity_header, .. } => {
                assert_eq!(storage, StorageKind::Sqlite);
                assert_eq!(database, PathBuf::from("/tmp/tp.db"));
                assert_eq!(identity_header, "x-forwarded-email");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_custom_block_list() {
        let cli = Cli::try_parse_from([
            "timstapaper",
            "--block-cidr",
            "100.64.0.0/10",
            "--block-host",
            "intranet.example.com",
            "check-url",
            "http://100.64.1.1/",
        ])
        .unwrap();
        let validator = cli.validator();
        assert!(!validator.validate("http://100.64.1.1/").is_accepted());
        assert!(!validator.validate("http://intranet.example.com/").is_accepted());
        assert!(validator.validate("https://example.com/").is_accepted());
    }

    #[test]
    fn test_rejects_bad_cidr() {
        assert!(Cli::try_parse_from(["timstapaper", "--block-cidr", "nope", "check-url", "x"]).is_err());
    }
}
