//! System DNS lookup.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

use crate::resolver::HostLookup;

/// Resolves through the operating system resolver (Docker's embedded DNS
/// inside an overlay network).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDns;

#[async_trait]
impl HostLookup for SystemDns {
    async fn lookup_host(&self, name: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((name, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}
