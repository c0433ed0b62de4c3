//! Network interface discovery.
//!
//! Lists candidate interfaces for the classifier and picks a default when
//! none is configured: the first non-loopback interface that is up and has
//! at least one IP address.

use std::net::IpAddr;

use scanaware_common::error::Result;
use scanaware_common::types::{InterfaceInfo, InterfaceStatus};

/// One address entry as reported by the OS, before grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AddressEntry {
    name: String,
    up: bool,
    loopback: bool,
    address: Option<(IpAddr, u8)>,
}

/// Groups per-address entries into one [`InterfaceInfo`] per interface,
/// keeping the order in which interfaces first appear.
fn group(entries: impl IntoIterator<Item = AddressEntry>, keep_loopback: bool) -> Vec<InterfaceInfo> {
    let mut out: Vec<InterfaceInfo> = Vec::new();
    for entry in entries {
        if entry.loopback && !keep_loopback {
            continue;
        }
        let position = match out.iter().position(|i| i.name == entry.name) {
            Some(position) => position,
            None => {
                out.push(InterfaceInfo {
                    name: entry.name.clone(),
                    ips: Vec::new(),
                    status: if entry.up {
                        InterfaceStatus::Up
                    } else {
                        InterfaceStatus::Down
                    },
                });
                out.len() - 1
            }
        };
        if let Some((ip, prefix)) = entry.address {
            out[position].ips.push(format!("{ip}/{prefix}"));
        }
    }
    out
}

/// Returns the first interface that is up and has an address.
#[must_use]
pub fn pick_default(interfaces: &[InterfaceInfo]) -> Option<String> {
    interfaces
        .iter()
        .find(|i| i.status == InterfaceStatus::Up && !i.ips.is_empty())
        .map(|i| i.name.clone())
}

#[cfg(unix)]
fn prefix_len(mask: Option<&nix::sys::socket::SockaddrStorage>) -> Option<u8> {
    let mask = mask?;
    let ones = if let Some(v4) = mask.as_sockaddr_in() {
        u32::from(v4.ip()).count_ones()
    } else {
        u128::from(mask.as_sockaddr_in6()?.ip()).count_ones()
    };
    u8::try_from(ones).ok()
}

#[cfg(unix)]
fn address_entries() -> Result<Vec<AddressEntry>> {
    use nix::net::if_::InterfaceFlags;
    use scanaware_common::error::ScanError;

    let addrs = nix::ifaddrs::getifaddrs().map_err(|e| ScanError::io("getifaddrs", e.into()))?;
    Ok(addrs
        .map(|ifa| {
            let address = ifa.address.as_ref().and_then(|addr| {
                let ip = if let Some(v4) = addr.as_sockaddr_in() {
                    IpAddr::V4(v4.ip())
                } else {
                    IpAddr::V6(addr.as_sockaddr_in6()?.ip())
                };
                let default_prefix = if ip.is_ipv4() { 32 } else { 128 };
                Some((ip, prefix_len(ifa.netmask.as_ref()).unwrap_or(default_prefix)))
            });
            AddressEntry {
                name: ifa.interface_name,
                up: ifa.flags.contains(InterfaceFlags::IFF_UP),
                loopback: ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                address,
            }
        })
        .collect())
}

#[cfg(not(unix))]
fn address_entries() -> Result<Vec<AddressEntry>> {
    Ok(Vec::new())
}

/// Lists non-loopback interfaces with their addresses (CIDR notation) and
/// administrative status.
///
/// # Errors
///
/// Returns an error if the OS interface table cannot be read.
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    Ok(group(address_entries()?, false))
}

/// Returns the name of the default interface, if any qualifies.
#[must_use]
pub fn default_interface() -> Option<String> {
    match list_interfaces() {
        Ok(interfaces) => pick_default(&interfaces),
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate interfaces");
            None
        }
    }
}

/// Looks up one interface by name, loopback included.
///
/// # Errors
///
/// Returns an error if the OS interface table cannot be read.
pub fn find_interface(name: &str) -> Result<Option<InterfaceInfo>> {
    Ok(group(address_entries()?, true)
        .into_iter()
        .find(|i| i.name == name))
}
