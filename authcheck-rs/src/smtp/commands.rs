use crate::error::{AuthCheckError, Result};

/// Commands the relay prober may send.
///
/// There is deliberately no `DATA` variant: a probe opens an envelope and
/// abandons it, it never transfers a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    MailFrom(String),
    RcptTo(String),
    Rset,
    Quit,
}

impl ProbeCommand {
    /// Wire form without the trailing CRLF
    pub fn to_line(&self) -> String {
        match self {
            ProbeCommand::Ehlo(name) => format!("EHLO {}", name),
            ProbeCommand::Helo(name) => format!("HELO {}", name),
            ProbeCommand::StartTls => "STARTTLS".to_string(),
            ProbeCommand::MailFrom(address) => format!("MAIL FROM:<{}>", address),
            ProbeCommand::RcptTo(address) => format!("RCPT TO:<{}>", address),
            ProbeCommand::Rset => "RSET".to_string(),
            ProbeCommand::Quit => "QUIT".to_string(),
        }
    }

    /// Parse a command line as a server would see it.
    ///
    /// Anything outside the probe vocabulary (including `DATA`) is rejected.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(AuthCheckError::SmtpProtocol("Empty command".to_string()));
        }

        let (verb, args) = match line.split_once(' ') {
            Some((verb, args)) => (verb.to_uppercase(), args.trim()),
            None => (line.to_uppercase(), ""),
        };

        match verb.as_str() {
            "EHLO" | "HELO" if args.is_empty() => Err(AuthCheckError::SmtpProtocol(format!(
                "{} requires domain",
                verb
            ))),
            "EHLO" => Ok(ProbeCommand::Ehlo(args.to_string())),
            "HELO" => Ok(ProbeCommand::Helo(args.to_string())),
            "STARTTLS" => Ok(ProbeCommand::StartTls),
            "MAIL" => Ok(ProbeCommand::MailFrom(Self::parse_path(args, "FROM:")?)),
            "RCPT" => Ok(ProbeCommand::RcptTo(Self::parse_path(args, "TO:")?)),
            "RSET" => Ok(ProbeCommand::Rset),
            "QUIT" => Ok(ProbeCommand::Quit),
            _ => Err(AuthCheckError::SmtpProtocol(format!(
                "Not a probe command: {}",
                verb
            ))),
        }
    }

    fn parse_path(args: &str, keyword: &str) -> Result<String> {
        let rest = match args.get(..keyword.len()) {
            Some(head) if head.eq_ignore_ascii_case(keyword) => args[keyword.len()..].trim(),
            _ => {
                return Err(AuthCheckError::SmtpProtocol(format!(
                    "Invalid {} syntax",
                    keyword.trim_end_matches(':')
                )))
            }
        };

        let address = rest
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(rest);
        Ok(address.to_string())
    }
}
