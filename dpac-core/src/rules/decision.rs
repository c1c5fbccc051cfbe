//! Proxy decisions and their PAC string form

use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

/// Proxy type named by a PAC directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    Proxy,
    Https,
    Socks,
    Socks4,
    Socks5,
}

impl ProxyKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ProxyKind::Proxy => "PROXY",
            ProxyKind::Https => "HTTPS",
            ProxyKind::Socks => "SOCKS",
            ProxyKind::Socks4 => "SOCKS4",
            ProxyKind::Socks5 => "SOCKS5",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PROXY" => Some(ProxyKind::Proxy),
            "HTTPS" => Some(ProxyKind::Https),
            "SOCKS" => Some(ProxyKind::Socks),
            "SOCKS4" => Some(ProxyKind::Socks4),
            "SOCKS5" => Some(ProxyKind::Socks5),
            _ => None,
        }
    }
}

/// An intermediary the client may route through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(kind: ProxyKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.kind.keyword(), self.host, self.port)
    }
}

impl FromStr for ProxyEndpoint {
    type Err = ValidationError;

    /// Parse a single directive such as `PROXY proxy1.example.com:3128`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidDirective {
            directive: s.to_string(),
        };

        let mut parts = s.split_whitespace();
        let kind = parts
            .next()
            .and_then(ProxyKind::from_keyword)
            .ok_or_else(invalid)?;
        let host_port = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let (host, port) = host_port.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(ProxyEndpoint::new(kind, host, port))
    }
}

/// Outcome of evaluating a rule set for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Connect to the destination without an intermediary
    Direct,
    /// Try each proxy in order
    Proxies(Vec<ProxyEndpoint>),
}

impl Decision {
    pub fn is_direct(&self) -> bool {
        matches!(self, Decision::Direct)
    }

    pub fn proxies(&self) -> &[ProxyEndpoint] {
        match self {
            Decision::Direct => &[],
            Decision::Proxies(list) => list,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Direct => f.write_str("DIRECT"),
            Decision::Proxies(list) => {
                for (i, endpoint) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{endpoint}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("DIRECT") {
            return Ok(Decision::Direct);
        }

        let endpoints = trimmed
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| part.parse::<ProxyEndpoint>())
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(ValidationError::InvalidDirective {
                directive: s.to_string(),
            });
        }

        Ok(Decision::Proxies(endpoints))
    }
}

impl TryFrom<&[String]> for Decision {
    type Error = ValidationError;

    /// Build a decision from config form: `["DIRECT"]` or one directive per entry
    fn try_from(entries: &[String]) -> Result<Self, Self::Error> {
        match entries {
            [single] => single.parse(),
            _ => entries.join("; ").parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_proxy_list() {
        let decision = Decision::Proxies(vec![
            ProxyEndpoint::new(ProxyKind::Proxy, "proxy1.example.com", 3128),
            ProxyEndpoint::new(ProxyKind::Proxy, "proxy1b.example.com", 3128),
        ]);
        assert_eq!(
            decision.to_string(),
            "PROXY proxy1.example.com:3128; PROXY proxy1b.example.com:3128"
        );
        assert_eq!(Decision::Direct.to_string(), "DIRECT");
    }

    #[test]
    fn test_parse_mixed_kinds() {
        let decision: Decision = "SOCKS5 s.example.net:1080;HTTPS h.example.net:443"
            .parse()
            .unwrap();
        assert_eq!(
            decision.proxies(),
            &[
                ProxyEndpoint::new(ProxyKind::Socks5, "s.example.net", 1080),
                ProxyEndpoint::new(ProxyKind::Https, "h.example.net", 443),
            ]
        );
    }

    #[test]
    fn test_parse_direct_case_insensitive() {
        assert_eq!(" direct ".parse::<Decision>().unwrap(), Decision::Direct);
    }

    #[test]
    fn test_reject_bad_directives() {
        assert!("".parse::<Decision>().is_err());
        assert!("PROXY nohostport".parse::<Decision>().is_err());
        assert!("PROXY host:99999".parse::<Decision>().is_err());
        assert!("TUNNEL host:80".parse::<Decision>().is_err());
        assert!("PROXY a:1; DIRECT".parse::<Decision>().is_err());
        assert!("PROXY :80".parse::<Decision>().is_err());
    }

    #[test]
    fn test_try_from_config_entries() {
        let entries = vec![
            "PROXY proxy1.example.com:3128".to_string(),
            "PROXY proxy1b.example.com:3128".to_string(),
        ];
        let decision = Decision::try_from(entries.as_slice()).unwrap();
        assert_eq!(decision.proxies().len(), 2);

        let direct = vec!["DIRECT".to_string()];
        assert!(Decision::try_from(direct.as_slice()).unwrap().is_direct());

        let empty: Vec<String> = vec![];
        assert!(Decision::try_from(empty.as_slice()).is_err());
    }
}
