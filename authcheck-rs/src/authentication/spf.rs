//! SPF (Sender Policy Framework) evaluation
//!
//! Fetches a domain's SPF policy, follows every `include:` and `redirect=`
//! to other domains, and collects the union of addresses the policy
//! authorizes. This is a posture audit rather than an RFC 7208 `check_host()`
//! implementation: there is no connecting IP to match, so every reachable
//! mechanism is resolved instead of stopping at the first match.
//!
//! # Expansion
//!
//! The include graph is walked breadth-first by [`SpfExpansion`], which owns
//! the visited-domain set for exactly one evaluation. A domain is marked
//! visited before its records are fetched, so cycles (`a.example` includes
//! `b.example`, which includes `a.example`) terminate after one visit each.
//! The domains of one level are fetched concurrently; the sets are only
//! touched between levels.
//!
//! # Example
//! ```no_run
//! use authcheck_rs::authentication::SpfEvaluator;
//! use authcheck_rs::dns::{DnsFetcher, DomainName};
//! use authcheck_rs::config::DnsConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(DnsFetcher::new(&DnsConfig::default())?);
//! let spf = SpfEvaluator::new(fetcher);
//!
//! let check = spf.evaluate(&DomainName::parse("example.com")?).await;
//! println!("valid: {}, authorized: {:?}", check.valid, check.ips);
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{CheckOutcome, Mechanism};
use crate::dns::{DomainName, LookupError, RecordFetcher, RecordType};

/// Receivers stop evaluating after this many DNS-querying mechanisms
pub const SPF_DNS_MECHANISM_LIMIT: usize = 10;

/// Result prefix applied to a mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// `+` (default)
    Pass,
    /// `-`
    Fail,
    /// `~`
    SoftFail,
    /// `?`
    Neutral,
}

/// Mechanism or modifier body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MechanismKind {
    Ip4(String),
    Ip6(String),
    Include(String),
    Redirect(String),
    /// `a` with an optional explicit target (CIDR suffix stripped)
    A(Option<String>),
    /// `mx` with an optional explicit target (CIDR suffix stripped)
    Mx(Option<String>),
    All,
    /// Anything else (`ptr`, `exists:`, `exp=`, unknown modifiers)
    Other(String),
}

/// One whitespace-separated term of an SPF record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpfMechanism {
    pub qualifier: Qualifier,
    pub kind: MechanismKind,
}

impl SpfMechanism {
    /// Parse a single term, e.g. `~all`, `include:_spf.example.com`, `mx/24`
    pub fn parse(token: &str) -> Self {
        let (qualifier, body) = match token.chars().next() {
            Some('+') => (Qualifier::Pass, &token[1..]),
            Some('-') => (Qualifier::Fail, &token[1..]),
            Some('~') => (Qualifier::SoftFail, &token[1..]),
            Some('?') => (Qualifier::Neutral, &token[1..]),
            _ => (Qualifier::Pass, token),
        };

        let kind = if let Some(value) = strip_prefix_ci(body, "ip4:") {
            MechanismKind::Ip4(value.to_string())
        } else if let Some(value) = strip_prefix_ci(body, "ip6:") {
            MechanismKind::Ip6(value.to_string())
        } else if let Some(value) = strip_prefix_ci(body, "include:") {
            MechanismKind::Include(value.to_string())
        } else if let Some(value) = strip_prefix_ci(body, "redirect=") {
            MechanismKind::Redirect(value.to_string())
        } else if let Some(target) = host_mechanism(body, "a") {
            MechanismKind::A(target)
        } else if let Some(target) = host_mechanism(body, "mx") {
            MechanismKind::Mx(target)
        } else if body.eq_ignore_ascii_case("all") {
            MechanismKind::All
        } else {
            MechanismKind::Other(body.to_string())
        };

        Self { qualifier, kind }
    }

    /// Counts against the receiver's DNS lookup budget
    pub fn queries_dns(&self) -> bool {
        match &self.kind {
            MechanismKind::Include(_)
            | MechanismKind::Redirect(_)
            | MechanismKind::A(_)
            | MechanismKind::Mx(_) => true,
            MechanismKind::Other(body) => {
                let body = body.to_ascii_lowercase();
                body == "ptr" || body.starts_with("ptr:") || body.starts_with("exists:")
            }
            _ => false,
        }
    }
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&value[prefix.len()..]),
        _ => None,
    }
}

/// Match `a`, `a/24`, `a:host`, `a:host/24` (same shapes for `mx`).
///
/// Returns `Some(None)` for the bare form and `Some(Some(host))` for an
/// explicit target.
fn host_mechanism(body: &str, name: &str) -> Option<Option<String>> {
    if body.eq_ignore_ascii_case(name) {
        return Some(None);
    }
    let rest = strip_prefix_ci(body, name)?;
    if rest.starts_with('/') {
        return Some(None);
    }
    let target = rest.strip_prefix(':')?;
    let target = target.split('/').next().unwrap_or(target);
    if target.is_empty() {
        Some(None)
    } else {
        Some(Some(target.to_string()))
    }
}

/// True when the first term is the `v=spf1` version tag
pub fn is_spf_record(txt: &str) -> bool {
    txt.split_whitespace()
        .next()
        .map(|tag| tag.eq_ignore_ascii_case("v=spf1"))
        .unwrap_or(false)
}

/// Parse the terms of a record, in order, without the version tag
pub fn parse_record(record: &str) -> Vec<SpfMechanism> {
    record
        .split_whitespace()
        .skip(1)
        .map(SpfMechanism::parse)
        .collect()
}

/// Qualifier of the last `all` term, if any
pub fn terminal_all(mechanisms: &[SpfMechanism]) -> Option<Qualifier> {
    mechanisms
        .iter()
        .rev()
        .find(|m| m.kind == MechanismKind::All)
        .map(|m| m.qualifier)
}

fn is_enforcing(qualifier: Qualifier) -> bool {
    matches!(qualifier, Qualifier::Fail | Qualifier::SoftFail)
}

/// Outcome of one SPF evaluation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpfCheck {
    pub exists: bool,
    /// SPF records published at the audited domain
    pub records: Vec<String>,
    pub valid: bool,
    /// Every address or network the policy authorizes, sorted
    pub ips: Vec<String>,
    /// Domains whose SPF records were fetched, sorted
    pub expanded_domains: Vec<String>,
    /// DNS-querying mechanisms across all expanded records
    pub dns_mechanisms: usize,
    pub lookup_limit_exceeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome for SpfCheck {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Spf
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn records(&self) -> Vec<String> {
        self.records.clone()
    }

    fn remediation(&self) -> &'static str {
        "Add or correct the SPF record so it ends with -all or ~all"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum HostLookup {
    Address(DomainName),
    Exchange(DomainName),
}

/// State of one SPF evaluation: frontier, visited set and everything
/// collected so far. Discarded when the evaluation returns.
pub struct SpfExpansion {
    root: DomainName,
    frontier: Vec<DomainName>,
    visited: HashSet<DomainName>,
    processed: HashSet<String>,
    resolved_hosts: HashSet<HostLookup>,
    records: HashMap<DomainName, Vec<String>>,
    ips: BTreeSet<String>,
    dns_mechanisms: usize,
    root_error: Option<LookupError>,
}

impl SpfExpansion {
    pub fn new(root: DomainName) -> Self {
        Self {
            frontier: vec![root.clone()],
            root,
            visited: HashSet::new(),
            processed: HashSet::new(),
            resolved_hosts: HashSet::new(),
            records: HashMap::new(),
            ips: BTreeSet::new(),
            dns_mechanisms: 0,
            root_error: None,
        }
    }

    /// Walk the include/redirect graph until the frontier is empty.
    ///
    /// Terminates because every domain enters the visited set at most once
    /// and only unvisited domains are fetched.
    pub async fn run(&mut self, fetcher: &dyn RecordFetcher) {
        while !self.frontier.is_empty() {
            let level: Vec<DomainName> = std::mem::take(&mut self.frontier)
                .into_iter()
                .filter(|domain| self.visited.insert(domain.clone()))
                .collect();

            debug!("SPF expansion level: {:?}", level);

            let answers =
                join_all(level.iter().map(|domain| fetch_spf_records(fetcher, domain))).await;

            let mut host_lookups = Vec::new();
            for (domain, answer) in level.into_iter().zip(answers) {
                match answer {
                    Ok(records) => self.absorb(&domain, records, &mut host_lookups),
                    Err(e) if domain == self.root => {
                        warn!("SPF lookup failed for {}: {}", domain, e);
                        self.root_error = Some(e);
                    }
                    Err(e) => {
                        warn!("Skipping SPF branch {}: {}", domain, e);
                    }
                }
            }

            let resolved = join_all(
                host_lookups
                    .iter()
                    .map(|lookup| resolve_host_lookup(fetcher, lookup)),
            )
            .await;
            for addresses in resolved {
                self.ips
                    .extend(addresses.iter().map(|address| normalize_address(address)));
            }
        }
    }

    fn absorb(
        &mut self,
        domain: &DomainName,
        records: Vec<String>,
        host_lookups: &mut Vec<HostLookup>,
    ) {
        for record in records {
            if !self.processed.insert(record.clone()) {
                debug!("SPF record already processed, skipping: {}", record);
                continue;
            }

            for mechanism in parse_record(&record) {
                if mechanism.queries_dns() {
                    self.dns_mechanisms += 1;
                }

                match mechanism.kind {
                    MechanismKind::Ip4(address) | MechanismKind::Ip6(address) => {
                        self.ips.insert(normalize_address(&address));
                    }
                    MechanismKind::Include(target) | MechanismKind::Redirect(target) => {
                        match DomainName::parse(&target) {
                            Ok(next) if self.visited.contains(&next) => {
                                debug!("SPF target {} already expanded", next);
                            }
                            Ok(next) => self.frontier.push(next),
                            Err(e) => debug!("Skipping SPF target {}: {}", target, e),
                        }
                    }
                    MechanismKind::A(target) => {
                        if let Some(host) = target_or(domain, target.as_deref()) {
                            self.queue_lookup(HostLookup::Address(host), host_lookups);
                        }
                    }
                    MechanismKind::Mx(target) => {
                        if let Some(host) = target_or(domain, target.as_deref()) {
                            self.queue_lookup(HostLookup::Exchange(host), host_lookups);
                        }
                    }
                    MechanismKind::All | MechanismKind::Other(_) => {}
                }
            }

            self.records.entry(domain.clone()).or_default().push(record);
        }
    }

    fn queue_lookup(&mut self, lookup: HostLookup, host_lookups: &mut Vec<HostLookup>) {
        if self.resolved_hosts.insert(lookup.clone()) {
            host_lookups.push(lookup);
        }
    }

    /// Whether the policy seen from the root ends in `-all` or `~all`.
    ///
    /// A record without `all` defers to its `redirect=` target.
    fn enforcing(&self) -> bool {
        let mut current = self.root.clone();
        let mut seen = HashSet::new();

        while seen.insert(current.clone()) {
            let records = match self.records.get(&current) {
                Some(records) => records,
                None => return false,
            };

            let mut redirect = None;
            for record in records {
                let mechanisms = parse_record(record);
                match terminal_all(&mechanisms) {
                    Some(qualifier) if is_enforcing(qualifier) => return true,
                    Some(_) => {}
                    None => {
                        redirect = redirect.or_else(|| {
                            mechanisms.iter().find_map(|m| match &m.kind {
                                MechanismKind::Redirect(target) => DomainName::parse(target).ok(),
                                _ => None,
                            })
                        });
                    }
                }
            }

            match redirect {
                Some(next) => current = next,
                None => return false,
            }
        }

        false
    }

    pub fn into_check(self) -> SpfCheck {
        let records = self.records.get(&self.root).cloned().unwrap_or_default();
        let exists = !records.is_empty();
        let valid = exists && self.enforcing();

        let mut expanded_domains: Vec<String> =
            self.visited.iter().map(|d| d.to_string()).collect();
        expanded_domains.sort();

        SpfCheck {
            exists,
            records,
            valid,
            ips: self.ips.into_iter().collect(),
            expanded_domains,
            dns_mechanisms: self.dns_mechanisms,
            lookup_limit_exceeded: self.dns_mechanisms > SPF_DNS_MECHANISM_LIMIT,
            error: self.root_error.map(|e| e.to_string()),
        }
    }
}

/// Canonical text of an address or `address/prefix`; unparsable values are
/// only lowercased
fn normalize_address(value: &str) -> String {
    let (address, prefix) = match value.trim().split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (value.trim(), None),
    };
    let address = address
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| address.to_ascii_lowercase());

    match prefix {
        Some(prefix) => format!("{}/{}", address, prefix),
        None => address,
    }
}

fn target_or(current: &DomainName, target: Option<&str>) -> Option<DomainName> {
    match target {
        None => Some(current.clone()),
        Some(host) => match DomainName::parse(host) {
            Ok(name) => Some(name),
            Err(e) => {
                debug!("Skipping SPF host {}: {}", host, e);
                None
            }
        },
    }
}

async fn fetch_spf_records(
    fetcher: &dyn RecordFetcher,
    domain: &DomainName,
) -> Result<Vec<String>, LookupError> {
    let txt = fetcher.fetch(domain, RecordType::Txt).await?;
    Ok(txt
        .into_iter()
        .map(|record| record.trim().to_string())
        .filter(|record| is_spf_record(record))
        .collect())
}

/// A and AAAA addresses of `host`; failed lookups contribute nothing
async fn resolve_addresses(fetcher: &dyn RecordFetcher, host: &DomainName) -> Vec<String> {
    let (v4, v6) = tokio::join!(
        fetcher.fetch(host, RecordType::A),
        fetcher.fetch(host, RecordType::Aaaa)
    );

    let mut addresses = Vec::new();
    for answer in [v4, v6] {
        match answer {
            Ok(values) => addresses.extend(values),
            Err(e) => warn!("Address lookup skipped during SPF expansion: {}", e),
        }
    }
    addresses
}

async fn resolve_host_lookup(fetcher: &dyn RecordFetcher, lookup: &HostLookup) -> Vec<String> {
    match lookup {
        HostLookup::Address(host) => resolve_addresses(fetcher, host).await,
        HostLookup::Exchange(domain) => {
            let exchanges = match fetcher.fetch(domain, RecordType::Mx).await {
                Ok(exchanges) => exchanges,
                Err(e) => {
                    warn!("MX lookup skipped during SPF expansion: {}", e);
                    return Vec::new();
                }
            };

            let hosts: Vec<DomainName> = exchanges
                .iter()
                .filter_map(|host| DomainName::parse(host).ok())
                .collect();

            join_all(hosts.iter().map(|host| resolve_addresses(fetcher, host)))
                .await
                .into_iter()
                .flatten()
                .collect()
        }
    }
}

/// SPF evaluator
pub struct SpfEvaluator {
    fetcher: Arc<dyn RecordFetcher>,
}

impl SpfEvaluator {
    pub fn new(fetcher: Arc<dyn RecordFetcher>) -> Self {
        Self { fetcher }
    }

    /// Evaluate the SPF posture of `domain`.
    ///
    /// Never fails: a broken branch contributes nothing, and a failed lookup
    /// at the root is reported through [`SpfCheck::error`].
    pub async fn evaluate(&self, domain: &DomainName) -> SpfCheck {
        info!("Evaluating SPF for {}", domain);

        let mut expansion = SpfExpansion::new(domain.clone());
        expansion.run(self.fetcher.as_ref()).await;
        let check = expansion.into_check();

        info!(
            "SPF for {}: exists={}, valid={}, {} address(es), {} domain(s) expanded",
            domain,
            check.exists,
            check.valid,
            check.ips.len(),
            check.expanded_domains.len()
        );
        check
    }
}
