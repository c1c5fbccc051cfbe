//! Rule conditions and their evaluation against one request

use super::subnet::SubnetRule;
use crate::host::HostEnvironment;
use std::cell::OnceCell;
use std::net::Ipv4Addr;
use wildmatch::WildMatch;

/// Which part of the request a glob is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSubject {
    Host,
    Url,
}

/// Shell-style glob (`*` and `?`) with its source text kept for rendering
#[derive(Debug, Clone)]
pub struct HostPattern {
    source: String,
    matcher: WildMatch,
}

impl HostPattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            matcher: WildMatch::new(pattern),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, value: &str) -> bool {
        self.matcher.matches(value)
    }
}

/// A predicate over the requested URL and host
#[derive(Debug, Clone)]
pub enum Condition {
    /// Host contains no dots
    PlainHost,
    /// Host ends with the given domain suffix
    DnsDomainIs(String),
    /// Glob over the host or the full URL
    ShExpMatch {
        subject: MatchSubject,
        pattern: HostPattern,
    },
    /// Host's IPv4 address falls in the subnet
    InNet(SubnetRule),
    /// Host's IPv4 address is the local machine's own address
    MyIp,
    /// Always matches
    Always,
}

/// Result of testing one condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Match,
    NoMatch,
    /// The condition needed the host's address and it could not be resolved
    Unresolved,
}

impl From<bool> for Outcome {
    fn from(matched: bool) -> Self {
        if matched {
            Outcome::Match
        } else {
            Outcome::NoMatch
        }
    }
}

/// Per-request view of the host, resolving lazily and at most once
pub struct HostProbe<'a> {
    url: &'a str,
    host: &'a str,
    env: &'a dyn HostEnvironment,
    address: OnceCell<Option<Ipv4Addr>>,
    my_ip: OnceCell<Option<Ipv4Addr>>,
}

impl<'a> HostProbe<'a> {
    pub fn new(url: &'a str, host: &'a str, env: &'a dyn HostEnvironment) -> Self {
        Self {
            url,
            host,
            env,
            address: OnceCell::new(),
            my_ip: OnceCell::new(),
        }
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        *self.address.get_or_init(|| self.env.resolve(self.host))
    }

    pub fn my_ip(&self) -> Option<Ipv4Addr> {
        *self.my_ip.get_or_init(|| self.env.my_ip_address())
    }
}

impl Condition {
    pub fn evaluate(&self, probe: &HostProbe<'_>) -> Outcome {
        match self {
            Condition::PlainHost => (!probe.host.contains('.')).into(),
            Condition::DnsDomainIs(domain) => dns_domain_is(probe.host, domain).into(),
            Condition::ShExpMatch { subject, pattern } => match subject {
                MatchSubject::Host => pattern.matches(&probe.host.to_ascii_lowercase()).into(),
                MatchSubject::Url => pattern.matches(probe.url).into(),
            },
            Condition::InNet(subnet) => match probe.address() {
                Some(addr) => subnet.contains(addr).into(),
                None => Outcome::Unresolved,
            },
            Condition::MyIp => match probe.address() {
                Some(addr) => probe
                    .my_ip()
                    .map(|me| SubnetRule::host(me).contains(addr))
                    .unwrap_or(false)
                    .into(),
                None => Outcome::Unresolved,
            },
            Condition::Always => Outcome::Match,
        }
    }

    /// Whether evaluating this condition may trigger name resolution
    pub fn needs_address(&self) -> bool {
        matches!(self, Condition::InNet(_) | Condition::MyIp)
    }
}

/// Suffix comparison, ignoring ASCII case
///
/// Rendered scripts call the browser's `dnsDomainIs`, which compares
/// case-sensitively. Browsers hand `FindProxyForURL` an already lowercased
/// host, so both agree for real requests; they differ only when a mixed-case
/// host is passed in directly, as with `dpac decide --host`.
pub fn dns_domain_is(host: &str, domain: &str) -> bool {
    host.len() >= domain.len()
        && host.as_bytes()[host.len() - domain.len()..].eq_ignore_ascii_case(domain.as_bytes())
}
