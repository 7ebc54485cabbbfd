// Self Address Resolution - Which address do we tell peers about?
//
// Precedence, highest first:
// 1. An explicit identifier from configuration
// 2. The preferred interface's addresses (IPv6 first when asked for)
// 3. A concrete host in the peer listen address
// 4. Every non-loopback interface
//
// The result is joined with the peer listen port to form the PeerAddress.

use crate::config::PeerConfig;
use crate::peers::PeerError;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use thiserror::Error;

/// Address resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No usable address found on {}", .interface.as_deref().unwrap_or("any interface"))]
    NoAddressFound { interface: Option<String> },

    #[error("Failed to enumerate network interfaces: {0}")]
    Enumeration(String),

    #[error("Invalid address '{0}': expected host:port")]
    InvalidAddress(String),
}

/// One address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddress {
    pub interface: String,
    pub ip: IpAddr,
    pub loopback: bool,
}

impl LocalAddress {
    pub fn new(interface: &str, ip: IpAddr) -> Self {
        Self {
            interface: interface.to_string(),
            ip,
            loopback: ip.is_loopback(),
        }
    }
}

/// Enumerate the addresses of every local interface
pub fn local_addresses() -> Result<Vec<LocalAddress>, ResolveError> {
    let interfaces =
        if_addrs::get_if_addrs().map_err(|e| ResolveError::Enumeration(e.to_string()))?;

    Ok(interfaces
        .into_iter()
        .map(|iface| LocalAddress {
            loopback: iface.is_loopback(),
            ip: iface.ip(),
            interface: iface.name,
        })
        .collect())
}

/// Pick one address out of `candidates`.
///
/// With `interface_name` only that interface is considered (loopback included),
/// otherwise every non-loopback interface. IPv6 link-local addresses are never
/// picked: they are unreachable without a scope id. Within a family the
/// lexicographically smallest address string wins so every run picks the same one.
pub fn select_address(
    candidates: &[LocalAddress],
    interface_name: Option<&str>,
    prefer_ipv6: bool,
) -> Result<IpAddr, ResolveError> {
    let pool: Vec<IpAddr> = candidates
        .iter()
        .filter(|c| match interface_name {
            Some(name) => c.interface == name,
            None => !c.loopback,
        })
        .map(|c| c.ip)
        .filter(|ip| !is_ipv6_link_local(ip))
        .collect();

    let smallest = |want_v6: bool| {
        pool.iter()
            .filter(|ip| ip.is_ipv6() == want_v6)
            .min_by_key(|ip| ip.to_string())
            .copied()
    };

    let picked = if prefer_ipv6 {
        smallest(true).or_else(|| smallest(false))
    } else {
        smallest(false).or_else(|| smallest(true))
    };

    picked.ok_or_else(|| ResolveError::NoAddressFound {
        interface: interface_name.map(str::to_string),
    })
}

/// Resolve the host this node advertises.
///
/// A non-empty `fallback` is returned untouched without looking at interfaces.
pub fn resolve_self_address(
    interface_name: Option<&str>,
    prefer_ipv6: bool,
    fallback: Option<&str>,
) -> Result<String, ResolveError> {
    if let Some(explicit) = fallback.filter(|f| !f.trim().is_empty()) {
        return Ok(explicit.to_string());
    }

    let candidates = local_addresses()?;
    let ip = select_address(&candidates, interface_name, prefer_ipv6)?;
    Ok(ip.to_string())
}

/// Resolve this node's full PeerAddress (host:port) from configuration
pub fn advertised_address(config: &dyn PeerConfig) -> Result<String, PeerError> {
    let listen = config.peer_listen_addr()?;
    let (listen_host, port) = split_host_port(&listen)?;
    let interface = config.identifier_interface_name()?;
    let prefer_ipv6 = config.use_ipv6_identifier()?;

    let fallback = match config.identifier()? {
        Some(identifier) => Some(identifier),
        None if interface.is_none() && !is_unspecified_host(&listen_host) => Some(listen_host),
        None => None,
    };

    let host = resolve_self_address(interface.as_deref(), prefer_ipv6, fallback.as_deref())?;
    Ok(join_host_port(&host, port))
}

/// Split `host:port`, accepting bracketed IPv6 hosts
pub fn split_host_port(addr: &str) -> Result<(String, u16), ResolveError> {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return Ok((socket.ip().to_string(), socket.port()));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ResolveError::InvalidAddress(addr.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ResolveError::InvalidAddress(addr.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(ResolveError::InvalidAddress(addr.to_string()));
    }

    Ok((host.to_string(), port))
}

/// Join a host and port, bracketing IPv6 literals
pub fn join_host_port(host: &str, port: u16) -> String {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<Ipv6Addr>() {
        Ok(v6) => format!("[{}]:{}", v6, port),
        Err(_) => format!("{}:{}", host, port),
    }
}

fn is_unspecified_host(host: &str) -> bool {
    host.is_empty()
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_unspecified())
            .unwrap_or(false)
}

fn is_ipv6_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        IpAddr::V4(_) => false,
    }
}
