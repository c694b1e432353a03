//! REST API for running audits over HTTP

pub mod handlers;
pub mod server;

pub use server::ApiServer;
