//! Server address selection for multi-homed clusters

use federation_api::ServerAddressByClientCidr;
use ipnetwork::IpNetwork;
use std::io;
use std::net::{IpAddr, UdpSocket};
use tracing::debug;

use crate::{ConnectionError, Result};

/// Any routable address works; connecting a UDP socket sends no packets.
/// IPv6 is tried when the host has no IPv4 route.
const DEFAULT_ROUTES: [(&str, &str); 2] = [
    ("0.0.0.0:0", "8.8.8.8:53"),
    ("[::]:0", "[2001:4860:4860::8888]:53"),
];

/// Source of the address this process uses for outbound traffic
pub trait HostInterface: Send + Sync {
    fn outbound_ip(&self) -> io::Result<IpAddr>;
}

/// Picks the address of the interface holding the default route
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRouteInterface;

impl HostInterface for DefaultRouteInterface {
    fn outbound_ip(&self) -> io::Result<IpAddr> {
        first_routed(&DEFAULT_ROUTES)
    }
}

/// Local address used for the first `(bind, target)` pair the host can
/// route
fn first_routed(routes: &[(&str, &str)]) -> io::Result<IpAddr> {
    let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no routes to try");
    for (bind, target) in routes {
        match routed_from(bind, target) {
            Ok(ip) => return Ok(ip),
            Err(e) => {
                debug!("No route to {}: {}", target, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

fn routed_from(bind: &str, target: &str) -> io::Result<IpAddr> {
    let socket = UdpSocket::bind(bind)?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Fixed outbound address, for hosts where the default route is not the
/// interface that reaches member clusters
#[derive(Clone, Copy, Debug)]
pub struct StaticHostInterface(pub IpAddr);

impl HostInterface for StaticHostInterface {
    fn outbound_ip(&self) -> io::Result<IpAddr> {
        Ok(self.0)
    }
}

/// Return the server address of the first candidate whose client CIDR
/// contains the host's outbound address
pub fn resolve_server_address(
    candidates: &[ServerAddressByClientCidr],
    host: &dyn HostInterface,
) -> Result<String> {
    let host_ip = host.outbound_ip().map_err(|e| {
        ConnectionError::NoReachableAddress(format!("unable to determine host address: {}", e))
    })?;

    for candidate in candidates {
        let network: IpNetwork = candidate.client_cidr.parse().map_err(|e| {
            ConnectionError::InvalidConfiguration(format!(
                "invalid client CIDR {:?}: {}",
                candidate.client_cidr, e
            ))
        })?;
        if network.contains(host_ip) {
            debug!(
                "Client address {} matched {}, using {}",
                host_ip, candidate.client_cidr, candidate.server_address
            );
            return Ok(candidate.server_address.clone());
        }
    }

    Err(ConnectionError::NoReachableAddress(format!(
        "no server address configured for client IP {}",
        host_ip
    )))
}
