//! In-memory record fetcher
//!
//! Serves a fixed zone from a map. Used to run the checks against canned
//! data (tests, offline reproduction of a reported configuration) and keeps
//! a log of every query it answered.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{DomainName, LookupError, RecordFetcher, RecordType};

type Answer = Result<Vec<String>, LookupError>;

/// Fixed-answer [`RecordFetcher`]; unknown names answer with no records
#[derive(Default)]
pub struct StaticFetcher {
    answers: HashMap<(String, RecordType), Answer>,
    queries: Mutex<Vec<(String, RecordType)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `values` for (`name`, `record_type`)
    pub fn with_records(mut self, name: &str, record_type: RecordType, values: &[&str]) -> Self {
        self.answers.insert(
            (Self::key(name), record_type),
            Ok(values.iter().map(|v| v.to_string()).collect()),
        );
        self
    }

    /// Make (`name`, `record_type`) time out
    pub fn with_timeout(mut self, name: &str, record_type: RecordType) -> Self {
        let key = Self::key(name);
        self.answers.insert(
            (key.clone(), record_type),
            Err(LookupError::Timeout {
                name: key,
                record_type,
            }),
        );
        self
    }

    /// Make (`name`, `record_type`) fail with a transport error
    pub fn with_failure(mut self, name: &str, record_type: RecordType, reason: &str) -> Self {
        let key = Self::key(name);
        self.answers.insert(
            (key.clone(), record_type),
            Err(LookupError::Transport {
                name: key,
                record_type,
                reason: reason.to_string(),
            }),
        );
        self
    }

    /// Every query answered so far, in arrival order
    pub fn queries(&self) -> Vec<(String, RecordType)> {
        self.queries
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of times (`name`, `record_type`) was asked
    pub fn query_count(&self, name: &str, record_type: RecordType) -> usize {
        let key = Self::key(name);
        self.queries()
            .iter()
            .filter(|(n, t)| *n == key && *t == record_type)
            .count()
    }

    fn key(name: &str) -> String {
        name.trim_end_matches('.').to_ascii_lowercase()
    }
}

#[async_trait]
impl RecordFetcher for StaticFetcher {
    async fn fetch(&self, name: &DomainName, record_type: RecordType) -> Answer {
        if let Ok(mut log) = self.queries.lock() {
            log.push((name.to_string(), record_type));
        }

        self.answers
            .get(&(name.to_string(), record_type))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
