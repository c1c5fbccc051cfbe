//! Client network routing: which PAC a client is served
//!
//! Routes come from `[[networks]]` in the TOML config or from a plain
//! network table with one `<network>/<bits> <pac file>` entry per line:
//!
//! ```text
//! # branch offices
//! 10.4.5.0/24     proxy1.js
//! 10.4.6.0/24     proxy2.js
//! *               default.js
//! ```
//!
//! Leading whitespace, empty lines and `#` comments are ignored, the
//! delimiter is any run of spaces or tabs, and `*` matches every client.
//! Malformed lines are logged and skipped. The first matching line wins.

use crate::config::schema::Config;
use crate::error::{PacError, Result, ValidationError};
use ipnet::Ipv4Net;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Client addresses a route applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMatch {
    Any,
    Cidr(Ipv4Net),
}

impl NetworkMatch {
    pub fn contains(&self, client: Ipv4Addr) -> bool {
        match self {
            NetworkMatch::Any => true,
            NetworkMatch::Cidr(net) => net.contains(&client),
        }
    }
}

impl FromStr for NetworkMatch {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with('*') {
            return Ok(NetworkMatch::Any);
        }

        let net: Ipv4Net = s.parse().map_err(|_| ValidationError::InvalidSubnet {
            subnet: s.to_string(),
        })?;
        if net.prefix_len() == 0 {
            return Err(ValidationError::InvalidSubnet {
                subnet: s.to_string(),
            });
        }
        Ok(NetworkMatch::Cidr(net))
    }
}

impl fmt::Display for NetworkMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMatch::Any => f.write_str("*"),
            NetworkMatch::Cidr(net) => write!(f, "{net}"),
        }
    }
}

/// What a matching client receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacTarget {
    /// Script rendered from a named profile
    Profile(String),
    /// Script file served verbatim
    File(PathBuf),
}

impl fmt::Display for PacTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacTarget::Profile(name) => write!(f, "profile {name}"),
            PacTarget::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub network: NetworkMatch,
    pub target: PacTarget,
}

/// Ordered client routes, first match wins
#[derive(Debug, Clone, Default)]
pub struct NetworkRouter {
    routes: Vec<Route>,
}

impl NetworkRouter {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Build routes from the `[[networks]]` section
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut routes = Vec::with_capacity(config.networks.len());
        for entry in &config.networks {
            let network = entry.cidr.parse::<NetworkMatch>()?;
            let target = match (&entry.profile, &entry.pac_file) {
                (Some(profile), None) => PacTarget::Profile(profile.clone()),
                (None, Some(path)) => PacTarget::File(path.clone()),
                _ => {
                    return Err(ValidationError::InvalidRoute {
                        route: entry.cidr.clone(),
                    }
                    .into())
                }
            };
            routes.push(Route { network, target });
        }
        Ok(Self::new(routes))
    }

    /// Parse a network table. Relative PAC file names are resolved against `base_dir`.
    pub fn parse_table(contents: &str, base_dir: &Path) -> Self {
        let routes = contents
            .split('\n')
            .enumerate()
            .filter_map(|(index, line)| parse_table_line(index + 1, line, base_dir))
            .collect();
        Self::new(routes)
    }

    /// Read and parse a network table file
    pub fn load_table(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| PacError::NetworkTable {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self::parse_table(&contents, base_dir))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the PAC for a client
    pub fn route(&self, client: Ipv4Addr) -> Option<&PacTarget> {
        self.routes
            .iter()
            .find(|route| route.network.contains(client))
            .map(|route| &route.target)
    }
}

fn parse_table_line(line_number: usize, line: &str, base_dir: &Path) -> Option<Route> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let line = line.trim_start_matches([' ', '\t']);

    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (network, file) = match line.split_once([' ', '\t']) {
        Some((network, rest)) => (network, rest.trim_matches(|c: char| c == ' ' || c == '\t')),
        None => ("", ""),
    };
    if file.is_empty() {
        warn!("syntax error: no delimiter found (line {})", line_number);
        return None;
    }

    let network = match network.parse::<NetworkMatch>() {
        Ok(network) => network,
        Err(e) => {
            warn!("{} (line {})", e, line_number);
            return None;
        }
    };

    Some(Route {
        network,
        target: PacTarget::File(base_dir.join(file)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TABLE: &str = "# client networks\r\n\
                         \r\n\
                         \t10.4.5.0/24 \t proxy1.js\r\n\
                         10.4.0.0/16\tproxy2.js\n\
                         broken-line\n\
                         10.9.0.0/0 zero.js\n\
                         10.9.0.0/33 toolong.js\n\
                         10.9.0.999/24 badaddr.js\n\
                         192.168.1.0/24 /srv/pac/abs.js\n\
                         * default.js\n\
                         10.8.0.0/16 unreachable.js";

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn file(router: &NetworkRouter, client: &str) -> Option<PathBuf> {
        match router.route(ip(client)) {
            Some(PacTarget::File(path)) => Some(path.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_parse_table_skips_bad_lines() {
        let router = NetworkRouter::parse_table(TABLE, Path::new("/etc/dpac"));
        let networks: Vec<String> = router.routes().iter().map(|r| r.network.to_string()).collect();
        assert_eq!(
            networks,
            vec!["10.4.5.0/24", "10.4.0.0/16", "192.168.1.0/24", "*", "10.8.0.0/16"]
        );
    }

    #[test]
    fn test_first_match_wins() {
        let router = NetworkRouter::parse_table(TABLE, Path::new("/etc/dpac"));
        assert_eq!(file(&router, "10.4.5.9"), Some(PathBuf::from("/etc/dpac/proxy1.js")));
        assert_eq!(file(&router, "10.4.77.1"), Some(PathBuf::from("/etc/dpac/proxy2.js")));
        assert_eq!(file(&router, "192.168.1.50"), Some(PathBuf::from("/srv/pac/abs.js")));
        assert_eq!(file(&router, "10.8.1.1"), Some(PathBuf::from("/etc/dpac/default.js")));
    }

    #[test]
    fn test_no_route_without_default() {
        let router = NetworkRouter::parse_table("10.0.0.0/8 ten.js\n", Path::new(""));
        assert!(router.route(ip("172.16.0.1")).is_none());
        assert_eq!(file(&router, "10.1.1.1"), Some(PathBuf::from("ten.js")));
    }

    #[test]
    fn test_load_table_resolves_relative_to_table() {
        let mut table = NamedTempFile::new().unwrap();
        writeln!(table, "* proxy1.js").unwrap();

        let router = NetworkRouter::load_table(table.path()).unwrap();
        let dir = table.path().parent().unwrap();
        assert_eq!(file(&router, "8.8.8.8"), Some(dir.join("proxy1.js")));
    }

    #[test]
    fn test_load_missing_table() {
        let err = NetworkRouter::load_table(Path::new("/nonexistent/dpac.conf")).unwrap_err();
        assert!(matches!(err, PacError::NetworkTable { .. }));
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::ConfigLoader::load_builtin().unwrap();
        let router = NetworkRouter::from_config(&config).unwrap();
        assert_eq!(
            router.route(ip("203.0.113.1")),
            Some(&PacTarget::Profile("proxy1".to_string()))
        );
    }

    #[test]
    fn test_network_match_parse() {
        assert_eq!("*".parse::<NetworkMatch>().unwrap(), NetworkMatch::Any);
        assert!("10.0.0.0/8".parse::<NetworkMatch>().unwrap().contains(ip("10.255.0.1")));
        assert!("10.0.0.0".parse::<NetworkMatch>().is_err());
        assert!("0.0.0.0/0".parse::<NetworkMatch>().is_err());
    }
}
