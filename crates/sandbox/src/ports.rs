//! Host port allocation for container port bindings.

use std::collections::BTreeMap;
use std::net::TcpListener;

use helios_core::Result;

/// Declared container port → allocated host port.
pub type PortMap = BTreeMap<u16, u16>;

/// Allocate a free host port by binding port 0 and reading the OS-assigned
/// port back.
///
/// Best-effort uniqueness only: the socket is released before the container
/// runtime binds it, so a bind failure at container start is a retryable
/// condition for the caller, not an allocator fault.
pub fn allocate() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    Ok(port)
}

/// Allocate one host port per declared container port.
pub fn allocate_map(declared: &[u16]) -> Result<PortMap> {
    declared
        .iter()
        .map(|&container_port| Ok((container_port, allocate()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_nonzero_port() {
        let port = allocate().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn allocates_one_host_port_per_declared_port() {
        let declared = [7788, 6080, 5901, 8000, 8080];
        let map = allocate_map(&declared).unwrap();
        assert_eq!(map.len(), declared.len());
        for port in declared {
            assert!(map[&port] > 0);
        }
    }
}
