//! DNS record fetching
//!
//! Every check in this crate goes through [`RecordFetcher`], which answers one
//! question: which values does `name` publish for `record_type` right now?
//!
//! - A missing name (NXDOMAIN) or a name without data of that type yields an
//!   empty list. Absence is normal and never an error.
//! - A timeout or transport failure yields a [`LookupError`], so callers can
//!   tell "not published" apart from "could not ask".
//!
//! Nothing is cached: an audit must reflect what the zone publishes at the
//! time of the request.

pub mod domain;
pub mod memory;
pub mod resolver;

pub use domain::DomainName;
pub use memory::StaticFetcher;
pub use resolver::DnsFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record types the auditor queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    /// TXT record (SPF, DKIM, DMARC)
    Txt,
    /// A record (IPv4 address)
    A,
    /// AAAA record (IPv6 address)
    Aaaa,
    /// MX record (mail exchange)
    Mx,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::Txt => write!(f, "TXT"),
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Mx => write!(f, "MX"),
        }
    }
}

/// Failure to obtain an answer, as opposed to an answer saying "nothing here"
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{record_type} lookup for {name} timed out")]
    Timeout { name: String, record_type: RecordType },

    #[error("{record_type} lookup for {name} failed: {reason}")]
    Transport {
        name: String,
        record_type: RecordType,
        reason: String,
    },
}

impl LookupError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LookupError::Timeout { .. })
    }
}

/// Source of DNS answers for one (name, type) pair per call.
///
/// Values come back in answer order, except MX which is ordered by preference
/// and carries exchange host names only. TXT character-strings of one record
/// are concatenated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(
        &self,
        name: &DomainName,
        record_type: RecordType,
    ) -> Result<Vec<String>, LookupError>;
}
