//! Function address resolution.
//!
//! # Data Flow
//! ```text
//! function name
//!     → resolve.rs (Resolver, strategy fixed at construction)
//!         - ByName:        cluster service list, exact name match → host = name
//!         - DnsRoundRobin: dns.rs lookup of tasks.<name> → select.rs picks one IP
//!     → ResolvedAddress { scheme, host }  (caller appends the function port)
//! ```
//!
//! # Design Decisions
//! - Re-resolved on every request; membership and DNS change under us
//! - Selection is a trait object so tests can pin the pick

pub mod dns;
pub mod resolve;
pub mod select;

pub use dns::SystemDns;
pub use resolve::{HostLookup, ResolveError, ResolvedAddress, Resolver, ServiceLister, Strategy, Unresolved};
pub use select::{FixedIndex, Random, RoundRobin, Selector};
