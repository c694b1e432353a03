use serde::{Deserialize, Serialize};

/// Authentication mechanism a check covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    Spf,
    Dkim,
    Dmarc,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Spf => write!(f, "SPF"),
            Mechanism::Dkim => write!(f, "DKIM"),
            Mechanism::Dmarc => write!(f, "DMARC"),
        }
    }
}

/// Uniform view over the SPF, DKIM and DMARC results.
///
/// Each evaluator has its own algorithm and result shape; the report builder
/// only needs these few facts to compute the verdict and the remediation list.
pub trait CheckOutcome {
    fn mechanism(&self) -> Mechanism;

    /// A record of this kind is published
    fn exists(&self) -> bool;

    /// The published record meets the enforcement bar
    fn valid(&self) -> bool;

    /// Raw record text as published
    fn records(&self) -> Vec<String>;

    /// What to change when [`CheckOutcome::valid`] is false
    fn remediation(&self) -> &'static str;
}

/// Split a `tag=value; tag=value` record (DKIM, DMARC) into pairs.
///
/// Tag names are lowercased; values are trimmed but keep their case.
/// Terms without `=` are dropped.
pub fn parse_tag_list(record: &str) -> Vec<(String, String)> {
    record
        .split(';')
        .filter_map(|term| {
            let (tag, value) = term.split_once('=')?;
            let tag = tag.trim();
            if tag.is_empty() {
                return None;
            }
            Some((tag.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// First value of `tag`, if present
pub fn tag_value<'a>(tags: &'a [(String, String)], tag: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(name, _)| name == tag)
        .map(|(_, value)| value.as_str())
}
