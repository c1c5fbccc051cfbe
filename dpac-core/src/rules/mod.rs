//! Proxy selection rules

pub mod decision;
pub mod engine;
pub mod matcher;
pub mod subnet;

pub use decision::{Decision, ProxyEndpoint, ProxyKind};
pub use engine::{host_from_url, ResolveFailure, Rule, RuleSet};
pub use matcher::{Condition, HostPattern, MatchSubject, Outcome};
pub use subnet::SubnetRule;
