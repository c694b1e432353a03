use crate::error::{AuthCheckError, Result};

/// A complete, possibly multi-line, SMTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    /// Text of each line with the code and separator removed
    pub lines: Vec<String>,
}

impl SmtpReply {
    /// Build a reply from raw lines as read off the wire.
    ///
    /// All lines must carry the same code; only the last one may use the
    /// space separator.
    pub fn from_lines(raw: &[String]) -> Result<Self> {
        let mut code = None;
        let mut lines = Vec::with_capacity(raw.len());

        for line in raw {
            let (line_code, _, text) = Self::split_line(line)?;
            match code {
                None => code = Some(line_code),
                Some(c) if c != line_code => {
                    return Err(AuthCheckError::SmtpProtocol(format!(
                        "Reply code changed mid-reply: {} then {}",
                        c, line_code
                    )))
                }
                Some(_) => {}
            }
            lines.push(text.to_string());
        }

        let code = code.ok_or_else(|| AuthCheckError::SmtpProtocol("Empty reply".to_string()))?;
        Ok(Self { code, lines })
    }

    /// Split `250-SIZE 1000` into (250, true, "SIZE 1000").
    ///
    /// The boolean is true when more lines follow.
    pub fn split_line(line: &str) -> Result<(u16, bool, &str)> {
        let line = line.trim_end_matches(['\r', '\n']);
        let code = line
            .get(..3)
            .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| {
                AuthCheckError::SmtpProtocol(format!("Malformed reply line: {:?}", line))
            })?;

        match line.as_bytes().get(3) {
            None => Ok((code, false, "")),
            Some(b' ') => Ok((code, false, &line[4..])),
            Some(b'-') => Ok((code, true, &line[4..])),
            Some(_) => Err(AuthCheckError::SmtpProtocol(format!(
                "Malformed reply line: {:?}",
                line
            ))),
        }
    }

    /// 2xx
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// EHLO keyword advertised on any line after the first, case-insensitive
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .map(|k| k.eq_ignore_ascii_case(keyword))
                .unwrap_or(false)
        })
    }

    /// Single-line rendering, e.g. `550 5.7.1 Relaying denied`
    pub fn message(&self) -> String {
        format!("{} {}", self.code, self.lines.join(" ").trim())
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_multiline_ehlo_reply() {
        let reply = SmtpReply::from_lines(&lines(&[
            "250-mx.example.com Hello\r\n",
            "250-SIZE 35882577\r\n",
            "250-starttls\r\n",
            "250 ENHANCEDSTATUSCODES\r\n",
        ]))
        .unwrap();

        assert_eq!(reply.code, 250);
        assert!(reply.is_positive());
        assert!(reply.has_capability("STARTTLS"));
        assert!(reply.has_capability("SIZE"));
        assert!(!reply.has_capability("AUTH"));
    }

    #[test]
    fn test_greeting_text_is_not_a_capability() {
        let reply =
            SmtpReply::from_lines(&lines(&["250 STARTTLS.example.com greets you"])).unwrap();
        assert!(!reply.has_capability("STARTTLS"));
    }

    #[test]
    fn test_split_line() {
        assert_eq!(SmtpReply::split_line("220 ready\r\n").unwrap(), (220, false, "ready"));
        assert_eq!(SmtpReply::split_line("250-PIPELINING").unwrap(), (250, true, "PIPELINING"));
        assert_eq!(SmtpReply::split_line("354").unwrap(), (354, false, ""));
        assert!(SmtpReply::split_line("hello").is_err());
        assert!(SmtpReply::split_line("25").is_err());
        assert!(SmtpReply::split_line("250+x").is_err());
    }

    #[test]
    fn test_mixed_codes_rejected() {
        assert!(SmtpReply::from_lines(&lines(&["250-a", "251 b"])).is_err());
        assert!(SmtpReply::from_lines(&[]).is_err());
    }

    #[test]
    fn test_message_rendering() {
        let reply = SmtpReply::from_lines(&lines(&["550 5.7.1 Relaying denied\r\n"])).unwrap();
        assert_eq!(reply.message(), "550 5.7.1 Relaying denied");
        assert!(!reply.is_positive());
    }
}
