use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthCheckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SMTP protocol error: {0}")]
    SmtpProtocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("Domain could not be resolved: {0}")]
    Unresolvable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

pub type Result<T> = std::result::Result<T, AuthCheckError>;
