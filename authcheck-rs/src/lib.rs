//! authcheck-rs: email authentication and relay exposure auditor
//!
//! Audits the anti-spoofing posture and SMTP exposure of a domain.
//!
//! # Features
//!
//! - **SPF**: mechanism parsing and `include`/`redirect` expansion with cycle
//!   protection, yielding every authorized address
//! - **DKIM**: selector discovery over a configurable catalog
//! - **DMARC**: policy classification (`none` / `quarantine` / `reject`)
//! - **Relay probing**: greeting, EHLO, STARTTLS and an envelope-only relay
//!   test against each mail exchanger
//!
//! Every DNS query and SMTP step carries a timeout, and a failing lookup only
//! degrades the check that issued it.
//!
//! # Example
//!
//! ```no_run
//! use authcheck_rs::audit::DomainAuditor;
//! use authcheck_rs::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auditor = DomainAuditor::from_config(&Config::default())?;
//!     let report = auditor.audit("example.com").await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audit;
pub mod authentication;
pub mod config;
pub mod dns;
pub mod error;
pub mod smtp;

pub use audit::{AuthenticationReport, DomainAuditor};
pub use config::Config;
pub use error::{AuthCheckError, Result};
