use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;

static SERVER_ADDRESS: OnceLock<String> = OnceLock::new();

/// The address this process is reachable on, resolved once per process.
///
/// Only asks the routing table, so it is safe to call from async code. Falls
/// back to loopback when no route exists.
pub fn server_address() -> &'static str {
    SERVER_ADDRESS.get_or_init(|| {
        let address = outbound_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        tracing::debug!(%address, "Resolved server address");
        address.to_string()
    })
}

/// Like [`server_address`], with a host name lookup before the loopback
/// fallback. The lookup blocks; run it on a blocking thread.
pub fn lookup_server_address() -> String {
    outbound_ip()
        .or_else(hostname_ip)
        .map_or_else(|| server_address().to_string(), |ip| ip.to_string())
}

// Connecting a UDP socket only selects a route; no packet leaves the host.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

fn hostname_ip() -> Option<IpAddr> {
    let name = hostname::get().ok()?.into_string().ok()?;
    (name.as_str(), 0)
        .to_socket_addrs()
        .ok()?
        .map(|addr| addr.ip())
        .find(|ip| ip.is_ipv4() && !ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_address_is_stable_and_parseable() {
        let first = server_address();
        let second = server_address();
        assert_eq!(first, second);
        assert!(first.parse::<IpAddr>().is_ok());
    }

    #[tokio::test]
    async fn test_lookup_runs_on_blocking_pool() {
        let address = tokio::task::spawn_blocking(lookup_server_address)
            .await
            .unwrap();
        assert!(address.parse::<IpAddr>().is_ok());
    }
}
