use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuthCheckError, Result};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validated, lowercase domain name.
///
/// The trailing root dot is stripped on construction; [`DomainName::fqdn`]
/// puts it back for queries so resolver search lists never apply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainName(String);

impl DomainName {
    /// Normalize and validate user or record supplied input
    ///
    /// # Examples
    /// ```
    /// use authcheck_rs::dns::DomainName;
    ///
    /// let name = DomainName::parse("Example.COM.").unwrap();
    /// assert_eq!(name.as_str(), "example.com");
    /// assert_eq!(name.fqdn(), "example.com.");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim().trim_end_matches('.');
        if trimmed.is_empty() {
            return Err(AuthCheckError::InvalidDomain("empty domain name".to_string()));
        }

        let ascii = idna::domain_to_ascii(trimmed)
            .map_err(|e| AuthCheckError::InvalidDomain(format!("{}: {:?}", trimmed, e)))?
            .to_ascii_lowercase();

        if ascii.len() > MAX_NAME_LEN {
            return Err(AuthCheckError::InvalidDomain(format!(
                "{} exceeds {} characters",
                ascii, MAX_NAME_LEN
            )));
        }

        for label in ascii.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(AuthCheckError::InvalidDomain(format!(
                    "{} has an empty or oversized label",
                    ascii
                )));
            }
            if !label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(AuthCheckError::InvalidDomain(format!(
                    "{} contains invalid characters",
                    ascii
                )));
            }
        }

        Ok(Self(ascii))
    }

    /// Name below this one, e.g. `_dmarc.example.com`
    pub fn child(&self, label: &str) -> Result<Self> {
        Self::parse(&format!("{}.{}", label.trim_end_matches('.'), self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fully qualified form with the root dot
    pub fn fqdn(&self) -> String {
        format!("{}.", self.0)
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DomainName {
    type Err = AuthCheckError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for DomainName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
