//! Local interface addresses and broadcast address computation.

use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::error::DiscoveryError;

/// List the addresses bound to local interfaces.
///
/// IPv4 addresses only, unless `include_ipv6` is set, in which case IPv6
/// addresses are listed first. Enumeration can be slow; callers are expected
/// to call this once and keep the result.
pub fn local_addresses(include_ipv6: bool) -> Result<Vec<IpAddr>, DiscoveryError> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| DiscoveryError::Interfaces(e.to_string()))?;

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for (name, ip) in interfaces {
        debug!(interface = %name, address = %ip, "found local address");
        match ip {
            IpAddr::V4(_) if !v4.contains(&ip) => v4.push(ip),
            IpAddr::V6(_) if include_ipv6 && !v6.contains(&ip) => v6.push(ip),
            _ => {}
        }
    }

    v6.extend(v4);
    Ok(v6)
}

/// Choose the address to advertise: the first non-loopback one, falling
/// back to the first address, then to `127.0.0.1`.
pub fn pick_advertised_ip(addrs: &[IpAddr]) -> IpAddr {
    addrs
        .iter()
        .find(|ip| !ip.is_loopback())
        .or_else(|| addrs.first())
        .copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Broadcast address for `ip`, assuming a /24 subnet.
///
/// There is no IPv6 broadcast; those fall back to the limited broadcast
/// address.
pub fn broadcast_address(ip: IpAddr) -> Ipv4Addr {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Ipv4Addr::new(a, b, c, 255)
        }
        IpAddr::V6(_) => Ipv4Addr::BROADCAST,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_replaces_last_octet() {
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        assert_eq!(broadcast_address(ip), Ipv4Addr::new(192, 168, 1, 255));

        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(broadcast_address(ip), Ipv4Addr::new(127, 0, 0, 255));
    }

    #[test]
    fn broadcast_for_ipv6_is_limited_broadcast() {
        let ip: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(broadcast_address(ip), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn picks_first_non_loopback() {
        let addrs: Vec<IpAddr> = vec![
            "127.0.0.1".parse().unwrap(),
            "10.0.0.5".parse().unwrap(),
            "192.168.1.2".parse().unwrap(),
        ];
        assert_eq!(pick_advertised_ip(&addrs), "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn falls_back_to_loopback() {
        let addrs: Vec<IpAddr> = vec!["127.0.0.1".parse().unwrap()];
        assert_eq!(pick_advertised_ip(&addrs), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(pick_advertised_ip(&[]), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn ipv4_only_by_default() {
        // Enumeration may legitimately fail in a sandbox; only check shape.
        if let Ok(addrs) = local_addresses(false) {
            assert!(addrs.iter().all(IpAddr::is_ipv4));
        }
    }
}
