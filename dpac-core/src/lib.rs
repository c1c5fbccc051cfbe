//! Proxy auto-config rules, client routing and PAC delivery for dpac

pub mod config;
pub mod error;
pub mod host;
pub mod networks;
pub mod pac;
pub mod rules;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ConfigValidator};
pub use error::{PacError, Result, ValidationError};
pub use host::{HostEnvironment, StaticHost, SystemHost};
pub use networks::{NetworkMatch, NetworkRouter, PacTarget, Route};
pub use pac::{client_ipv4, PacDocument, PacService, PAC_CONTENT_TYPE};
pub use rules::{Decision, ProxyEndpoint, ProxyKind, ResolveFailure, Rule, RuleSet, SubnetRule};
pub use server::{PacServer, PacServerConfig};
