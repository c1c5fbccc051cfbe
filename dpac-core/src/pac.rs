//! PAC script rendering and delivery

use crate::config::schema::Config;
use crate::error::{PacError, Result};
use crate::networks::{NetworkRouter, PacTarget};
use crate::rules::{Condition, Decision, MatchSubject, ResolveFailure, RuleSet};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// MIME type browsers expect for proxy auto-config scripts
pub const PAC_CONTENT_TYPE: &str = "application/x-ns-proxy-autoconfig";

/// Render a rule set as a `FindProxyForURL` function
pub fn render_script(rules: &RuleSet) -> String {
    let mut branches: Vec<(String, &Decision)> = Vec::new();
    let mut guarded = rules.on_resolve_failure() == ResolveFailure::FallThrough;

    for rule in rules.rules() {
        if !guarded && rule.condition.needs_address() {
            branches.push(("!isResolvable(host)".to_string(), rules.fallback()));
            guarded = true;
        }
        branches.push((js_condition(&rule.condition), &rule.action));
    }

    let mut out = String::from("function FindProxyForURL(url, host)\n{\n");

    if branches.is_empty() {
        let _ = writeln!(out, "    return {};", js_string(&rules.fallback().to_string()));
    } else {
        for (i, (condition, decision)) in branches.iter().enumerate() {
            let keyword = if i == 0 { "    if" } else { "    } else if" };
            let _ = writeln!(out, "{} ({}) {{", keyword, condition);
            let _ = writeln!(out, "        return {};", js_string(&decision.to_string()));
        }
        out.push_str("    } else {\n");
        let _ = writeln!(out, "        return {};", js_string(&rules.fallback().to_string()));
        out.push_str("    }\n");
    }

    out.push_str("}\n");
    out
}

fn js_condition(condition: &Condition) -> String {
    match condition {
        Condition::PlainHost => "isPlainHostName(host)".to_string(),
        Condition::DnsDomainIs(domain) => format!("dnsDomainIs(host, {})", js_string(domain)),
        Condition::ShExpMatch { subject, pattern } => {
            let subject = match subject {
                MatchSubject::Host => "host",
                MatchSubject::Url => "url",
            };
            format!("shExpMatch({}, {})", subject, js_string(pattern.as_str()))
        }
        Condition::InNet(subnet) => format!(
            "isInNet(host, {}, {})",
            js_string(&subnet.network.to_string()),
            js_string(&subnet.mask.to_string())
        ),
        Condition::MyIp => "isInNet(host, myIpAddress(), \"255.255.255.255\")".to_string(),
        Condition::Always => "true".to_string(),
    }
}

fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// IPv4 form of a client address; IPv4-mapped IPv6 peers are unmapped
pub fn client_ipv4(addr: IpAddr) -> Option<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

/// A PAC script ready to send to a client
///
/// The body is kept as raw bytes: PAC files on disk are served as they are,
/// whatever their encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacDocument {
    pub body: Vec<u8>,
}

impl PacDocument {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// CGI response: headers, blank line, script
    pub fn to_cgi(&self) -> Vec<u8> {
        let mut out = format!(
            "Content-Length: {}\nContent-Type: {}\n\n",
            self.content_length(),
            PAC_CONTENT_TYPE
        )
        .into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Resolves clients to PAC documents
#[derive(Debug, Clone)]
pub struct PacService {
    router: NetworkRouter,
    scripts: HashMap<String, String>,
}

impl PacService {
    /// Pre-render every profile the router references
    pub fn new(config: &Config, router: NetworkRouter) -> Result<Self> {
        let mut scripts = HashMap::new();
        for route in router.routes() {
            if let PacTarget::Profile(name) = &route.target {
                if !scripts.contains_key(name) {
                    let rules = RuleSet::from_profile(name, &config.profiles)?;
                    scripts.insert(name.clone(), rules.to_script());
                }
            }
        }
        Ok(Self { router, scripts })
    }

    pub fn router(&self) -> &NetworkRouter {
        &self.router
    }

    /// The PAC a client at `client` should receive
    pub fn document_for(&self, client: Ipv4Addr) -> Result<PacDocument> {
        let target = self.router.route(client).ok_or_else(|| PacError::NoRoute {
            client: client.to_string(),
        })?;
        debug!("Client {} routed to {}", client, target);

        match target {
            PacTarget::Profile(name) => self
                .scripts
                .get(name)
                .map(|script| PacDocument::new(script.clone()))
                .ok_or_else(|| PacError::ProfileNotFound {
                    profile: name.clone(),
                }),
            PacTarget::File(path) => {
                let body = fs::read(path).map_err(|source| PacError::PacFile {
                    path: path.clone(),
                    source,
                })?;
                Ok(PacDocument::new(body))
            }
        }
    }

    /// Same as [`document_for`](Self::document_for) for a textual address such as `REMOTE_ADDR`
    pub fn document_for_addr(&self, addr: &str) -> Result<PacDocument> {
        let client = addr
            .trim()
            .parse::<IpAddr>()
            .ok()
            .and_then(client_ipv4)
            .ok_or_else(|| PacError::InvalidClient {
                addr: addr.to_string(),
            })?;
        self.document_for(client)
    }
}
