//! Bind-address resolution.
//!
//! `resolve` maps the small set of symbolic names a config file or CLI flag
//! typically offers ("local", "all", or a network interface name) onto a
//! concrete [`IpAddr`] to bind. Named-interface lookup uses [`if_addrs`]
//! since `std::net` has no interface enumeration API.

use std::net::IpAddr;

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("no network interface named {0:?}")]
    InterfaceNotFound(String),
    #[error("no IPv4: interface {0:?} has no non-loopback IPv4 address")]
    NoIpv4(String),
    #[error("failed to enumerate network interfaces: {0}")]
    Enumeration(#[source] std::io::Error),
}

/// Resolve a bind-address name to a concrete [`IpAddr`].
///
/// - `"local"` / `"localhost"` → loopback (`127.0.0.1`)
/// - `"all"` / `""` → unspecified (`0.0.0.0`), binds every interface
/// - anything else is treated as a network interface name, and its first
///   non-loopback IPv4 address is returned; an interface with only IPv6 or
///   loopback addresses is a hard error, not a silent fallback
pub fn resolve(name: &str) -> Result<IpAddr, AddressError> {
    match name {
        "local" | "localhost" => Ok(IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
        "all" | "" => Ok(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
        iface => resolve_interface(iface),
    }
}

fn resolve_interface(name: &str) -> Result<IpAddr, AddressError> {
    let interfaces = if_addrs::get_if_addrs().map_err(AddressError::Enumeration)?;

    let matching: Vec<_> = interfaces.into_iter().filter(|i| i.name == name).collect();
    if matching.is_empty() {
        return Err(AddressError::InterfaceNotFound(name.to_string()));
    }

    matching
        .iter()
        .find(|i| i.ip().is_ipv4() && !i.ip().is_loopback())
        .map(|i| i.ip())
        .ok_or_else(|| AddressError::NoIpv4(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_local_to_loopback() {
        assert_eq!(resolve("local").unwrap(), IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        assert_eq!(resolve("localhost").unwrap(), IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn resolves_all_to_unspecified() {
        assert_eq!(resolve("all").unwrap(), IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
        assert_eq!(resolve("").unwrap(), IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn unknown_interface_is_an_error() {
        let err = resolve("definitely-not-a-real-nic-0").unwrap_err();
        assert!(matches!(err, AddressError::InterfaceNotFound(_)));
    }
}
