//! Target parsing and CIDR expansion
//!
//! This module turns the configured address specs into the flat work list the
//! coordinator dispatches:
//! - single IPv4 and IPv6 literals
//! - CIDR blocks for both families, with host bits allowed (`10.0.0.7/24`)
//! - standard usable-host enumeration (network and broadcast excluded)
//!
//! A spec that fails to parse is reported and skipped; it never aborts the
//! expansion of the remaining specs.

use crate::ScanError;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

/// How an address spec was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Single(IpAddr),
    Network(IpNetwork),
}

/// A parsed address spec, shared by every target expanded from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRange {
    /// The spec exactly as configured; range identity is string equality on this
    pub spec: String,
    pub kind: RangeKind,
}

/// Usable host bounds of a range, inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSpan {
    pub first: IpAddr,
    pub last: IpAddr,
    pub total: u128,
}

impl TargetRange {
    /// Parse one address spec.
    ///
    /// Anything containing `/` is treated as a CIDR block, everything else as
    /// a single address.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let trimmed = spec.trim();

        let kind = if trimmed.contains('/') {
            let network = IpNetwork::from_str(trimmed).map_err(|e| ScanError::address(spec, e))?;
            RangeKind::Network(network)
        } else {
            let addr = IpAddr::from_str(trimmed)
                .map_err(|_| ScanError::address(spec, "not a valid IP address"))?;
            RangeKind::Single(addr)
        };

        Ok(Self {
            spec: spec.to_string(),
            kind,
        })
    }

    /// First and last usable host plus the usable host count
    pub fn span(&self) -> HostSpan {
        match self.kind {
            RangeKind::Single(addr) => HostSpan {
                first: addr,
                last: addr,
                total: 1,
            },
            RangeKind::Network(network) => {
                let (first, last) = usable_bounds(network);
                HostSpan {
                    first: to_addr(network, first),
                    last: to_addr(network, last),
                    total: last - first + 1,
                }
            }
        }
    }

    /// Usable host addresses in ascending numeric order
    pub fn hosts(&self) -> impl Iterator<Item = IpAddr> {
        let (network, first, last) = match self.kind {
            RangeKind::Single(addr) => (IpNetwork::from(addr), numeric(addr), numeric(addr)),
            RangeKind::Network(network) => {
                let (first, last) = usable_bounds(network);
                (network, first, last)
            }
        };
        (first..=last).map(move |n| to_addr(network, n))
    }
}

/// Usable host bounds as integers.
///
/// IPv4 /31 and /32 and IPv6 /127 and /128 have no addresses to spare, so
/// every address is usable. Larger IPv4 blocks drop the network and broadcast
/// addresses; larger IPv6 blocks drop only the subnet-router anycast address.
fn usable_bounds(network: IpNetwork) -> (u128, u128) {
    match network {
        IpNetwork::V4(net) => {
            let base = u32::from(net.network()) as u128;
            let broadcast = u32::from(net.broadcast()) as u128;
            match net.prefix() {
                31 | 32 => (base, broadcast),
                _ => (base + 1, broadcast - 1),
            }
        }
        IpNetwork::V6(net) => {
            let prefix = net.prefix();
            let host_mask = if prefix == 0 {
                u128::MAX
            } else {
                (1u128 << (128 - prefix as u32)) - 1
            };
            let base = u128::from(net.ip()) & !host_mask;
            let last = base | host_mask;
            match prefix {
                127 | 128 => (base, last),
                _ => (base + 1, last),
            }
        }
    }
}

fn numeric(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn to_addr(network: IpNetwork, n: u128) -> IpAddr {
    match network {
        IpNetwork::V4(_) => IpAddr::V4(Ipv4Addr::from(n as u32)),
        IpNetwork::V6(_) => IpAddr::V6(Ipv6Addr::from(n)),
    }
}

/// One host to scan, tagged with the range it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub address: IpAddr,
    pub range: Arc<TargetRange>,
}

impl ScanTarget {
    /// The spec this target was expanded from
    pub fn source_range(&self) -> &str {
        &self.range.spec
    }
}

/// Output of [`AddressExpander::expand`]
#[derive(Debug, Default)]
pub struct Expansion {
    /// Targets in spec order, ascending within each spec
    pub targets: Vec<ScanTarget>,
    /// One [`ScanError::AddressParse`] per skipped spec
    pub rejected: Vec<ScanError>,
}

/// Expands address specs into scan targets
#[derive(Debug, Clone)]
pub struct AddressExpander {
    max_hosts_per_range: u64,
}

impl Default for AddressExpander {
    fn default() -> Self {
        Self {
            max_hosts_per_range: crate::config::DEFAULT_MAX_HOSTS_PER_RANGE,
        }
    }
}

impl AddressExpander {
    pub fn new(max_hosts_per_range: u64) -> Self {
        Self { max_hosts_per_range }
    }

    /// Expand every spec, collecting parse failures instead of stopping on them
    pub fn expand<S: AsRef<str>>(&self, specs: &[S]) -> Expansion {
        let mut expansion = Expansion::default();

        for spec in specs {
            let spec = spec.as_ref();
            match self.parse_within_limit(spec) {
                Ok(range) => {
                    let range = Arc::new(range);
                    expansion.targets.extend(range.hosts().map(|address| ScanTarget {
                        address,
                        range: Arc::clone(&range),
                    }));
                }
                Err(e) => {
                    log::debug!("Skipping address spec {:?}: {}", spec, e);
                    expansion.rejected.push(e);
                }
            }
        }

        expansion
    }

    fn parse_within_limit(&self, spec: &str) -> crate::Result<TargetRange> {
        let range = TargetRange::parse(spec)?;
        let total = range.span().total;

        if total > self.max_hosts_per_range as u128 {
            return Err(ScanError::address(
                spec,
                format!(
                    "expands to {} hosts (max: {})",
                    total, self.max_hosts_per_range
                ),
            ));
        }

        Ok(range)
    }
}
