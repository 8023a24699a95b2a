//! Function name to address resolution.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ResolverConfig;
use crate::resolver::select::{self, Selector};
use crate::swarm::{EngineError, Service};

/// Cluster query capability: services whose name matches a filter.
#[async_trait]
pub trait ServiceLister: Send + Sync {
    async fn list_services(&self, name_filter: &str) -> Result<Vec<Service>, EngineError>;
}

/// DNS lookup capability.
#[async_trait]
pub trait HostLookup: Send + Sync {
    async fn lookup_host(&self, name: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolution strategy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Address the service by name; the swarm VIP load-balances.
    ByName,
    /// Look up `tasks.<name>` and pick a single replica.
    DnsRoundRobin,
}

/// Where to send one request. Host never carries a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub scheme: String,
    pub host: String,
}

impl ResolvedAddress {
    /// `host:port`, bracketing IPv6 literals.
    pub fn authority(&self, port: u16) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }
}

/// Why a name could not be resolved.
#[derive(Debug, Error)]
pub enum Unresolved {
    #[error("no service named {0}")]
    NoService(String),

    #[error("service lookup failed: {0}")]
    Cluster(#[source] EngineError),

    #[error("could not resolve '{0}' using dnsrr")]
    NoRecords(String),

    #[error("lookup {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not resolve {name}: {cause}")]
    NotResolvable { name: String, cause: Unresolved },
}

impl ResolveError {
    fn new(name: &str, cause: Unresolved) -> Self {
        ResolveError::NotResolvable {
            name: name.to_string(),
            cause,
        }
    }

    pub fn cause(&self) -> &Unresolved {
        match self {
            ResolveError::NotResolvable { cause, .. } => cause,
        }
    }
}

/// Resolves function names. Holds no per-request state and never caches.
pub struct Resolver {
    strategy: Strategy,
    scheme: String,
    services: Arc<dyn ServiceLister>,
    dns: Arc<dyn HostLookup>,
    selector: Box<dyn Selector>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("strategy", &self.strategy)
            .field("scheme", &self.scheme)
            .field("selector", &self.selector)
            .finish()
    }
}

impl Resolver {
    pub fn new(
        strategy: Strategy,
        scheme: impl Into<String>,
        services: Arc<dyn ServiceLister>,
        dns: Arc<dyn HostLookup>,
        selector: Box<dyn Selector>,
    ) -> Self {
        Self {
            strategy,
            scheme: scheme.into(),
            services,
            dns,
            selector,
        }
    }

    /// Build a resolver from configuration.
    pub fn from_config(
        config: &ResolverConfig,
        services: Arc<dyn ServiceLister>,
        dns: Arc<dyn HostLookup>,
    ) -> Self {
        let strategy = if config.dns_round_robin {
            Strategy::DnsRoundRobin
        } else {
            Strategy::ByName
        };
        Self::new(
            strategy,
            config.scheme.clone(),
            services,
            dns,
            select::from_mode(config.selection),
        )
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Resolve `name` to an address.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedAddress, ResolveError> {
        let host = match self.strategy {
            Strategy::ByName => self.by_name(name).await?,
            Strategy::DnsRoundRobin => self.by_dns(name).await?,
        };

        tracing::debug!(function = %name, host = %host, strategy = ?self.strategy, "Resolved function");

        Ok(ResolvedAddress {
            scheme: self.scheme.clone(),
            host,
        })
    }

    async fn by_name(&self, name: &str) -> Result<String, ResolveError> {
        let services = self
            .services
            .list_services(name)
            .await
            .map_err(|e| ResolveError::new(name, Unresolved::Cluster(e)))?;

        // The engine's name filter also matches prefixes.
        if services.iter().any(|s| s.spec.name == name) {
            Ok(name.to_string())
        } else {
            Err(ResolveError::new(name, Unresolved::NoService(name.to_string())))
        }
    }

    async fn by_dns(&self, name: &str) -> Result<String, ResolveError> {
        let host = format!("tasks.{}", name);
        let entries = self
            .dns
            .lookup_host(&host)
            .await
            .map_err(|source| ResolveError::new(name, Unresolved::Lookup { host, source }))?;

        if entries.is_empty() {
            return Err(ResolveError::new(name, Unresolved::NoRecords(name.to_string())));
        }

        let index = self.selector.select(entries.len());
        Ok(entries[index].to_string())
    }
}
