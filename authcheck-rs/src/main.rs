//! authcheck: email authentication and relay exposure auditor
//!
//! # Usage
//!
//! ```bash
//! # Audit a domain and print the JSON report
//! authcheck check example.com
//!
//! # Skip SMTP probing (DNS checks only)
//! authcheck check example.com --no-relay
//!
//! # Serve the HTTP API
//! authcheck --config authcheck.toml serve
//! ```

use authcheck_rs::api::ApiServer;
use authcheck_rs::audit::DomainAuditor;
use authcheck_rs::config::{Config, LoggingConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "authcheck")]
#[command(about = "Audit SPF, DKIM, DMARC and SMTP relay exposure of a domain", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit one domain and print the report as JSON
    Check {
        /// Domain to audit
        domain: String,
        /// Do not open SMTP connections
        #[arg(long)]
        no_relay: bool,
        /// Single-line JSON output
        #[arg(long)]
        compact: bool,
        /// Exit with status 2 unless SPF, DKIM and DMARC all pass
        #[arg(long)]
        strict: bool,
    },
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides the configuration
        #[arg(short, long)]
        listen: Option<String>,
    },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.level)));

    // Reports go to stdout, so logs always go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    init_logging(&config.logging);

    match cli.command {
        Commands::Check {
            domain,
            no_relay,
            compact,
            strict,
        } => {
            if no_relay {
                config.relay.enabled = false;
            }

            let auditor = DomainAuditor::from_config(&config)?;
            let report = auditor.audit(&domain).await?;

            let output = if compact {
                serde_json::to_string(&report)?
            } else {
                serde_json::to_string_pretty(&report)?
            };
            println!("{}", output);

            if strict && !report.summary.all_pass {
                std::process::exit(2);
            }
        }
        Commands::Serve { listen } => {
            if let Some(addr) = listen {
                config.server.listen_addr = addr;
            }

            info!("Starting authcheck v{}", env!("CARGO_PKG_VERSION"));

            let auditor = DomainAuditor::from_config(&config)?;
            let server = ApiServer::new(auditor, config.server.listen_addr.clone());
            server.run().await?;
        }
    }

    Ok(())
}
