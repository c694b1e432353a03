//! SMTP probing
//!
//! A minimal client side of RFC 5321 used to inspect mail exchangers:
//! greeting, EHLO capabilities, STARTTLS and envelope acceptance. It never
//! sends `DATA`.

pub mod commands;
pub mod probe;
pub mod reply;
pub mod session;
pub mod tls;

pub use commands::ProbeCommand;
pub use probe::{RelayProbeResult, RelayProber};
pub use reply::SmtpReply;
pub use session::ProbeSession;
