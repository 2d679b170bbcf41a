//! Port probing and negotiation.

use regpack_common::{Error, Result, RpcConfig};
use std::net::TcpListener;
use tracing::{debug, warn};

/// Fixed starting point for the reverse-proxy port scan.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// Bound on each linear forward scan.
pub const MAX_SCAN_ATTEMPTS: u16 = 100;

/// Probe whether a TCP port on localhost is free to bind.
pub fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Linear forward scan from `start` for the next free port, bounded by
/// `max_attempts` probes.
pub fn find_free_port(start: u16, max_attempts: u16) -> Result<u16> {
    for offset in 0..max_attempts {
        let port = start.checked_add(offset).ok_or_else(|| {
            Error::PortConflict(format!("port scan from {} overflowed the port range", start))
        })?;
        if port_is_free(port) {
            return Ok(port);
        }
        debug!("Port {} occupied, trying next", port);
    }
    Err(Error::PortConflict(format!(
        "no free port within {} attempts starting at {}",
        max_attempts, start
    )))
}

/// Resolve non-conflicting RPC and P2P ports, updating `rpc` in place and
/// returning the resolved pair.
///
/// Each conflicting port gets its own independent forward scan; the two
/// scans are not coordinated with each other or with the proxy scan.
/// Callers must persist the resolved values, not the requested ones.
pub fn ensure_ports_available(rpc: &mut RpcConfig) -> Result<(u16, u16)> {
    if !port_is_free(rpc.rpc_port) {
        let resolved = find_free_port(rpc.rpc_port, MAX_SCAN_ATTEMPTS)?;
        warn!("RPC port {} in use, resolved to {}", rpc.rpc_port, resolved);
        rpc.rpc_port = resolved;
    }
    if !port_is_free(rpc.p2p_port) {
        let resolved = find_free_port(rpc.p2p_port, MAX_SCAN_ATTEMPTS)?;
        warn!("P2P port {} in use, resolved to {}", rpc.p2p_port, resolved);
        rpc.p2p_port = resolved;
    }
    Ok((rpc.rpc_port, rpc.p2p_port))
}
