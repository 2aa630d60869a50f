//! Deciding whether a peer's forwarding headers may be believed.
//!
//! A request only honours `X-Forwarded-Host`, `X-Forwarded-Proto` and
//! `X-Forwarded-Port` when the configured [`TrustPolicy`] says the peer is trusted.
//! [`TrustedProxies`] is the stock policy: a list of exact addresses, CIDR subnets
//! and host names matched against the inbound `Host` header. An empty list trusts
//! nobody.

use std::net::IpAddr;
use std::str::FromStr;

use crate::protocol::ConfigError;

/// Facts about the connection a trust decision is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Address of the party that opened the connection.
    pub addr: IpAddr,
    /// Raw `Host` header of the request, if any.
    pub host: Option<String>,
}

/// Predicate deciding whether forwarding headers from `peer` are honoured.
#[cfg_attr(test, mockall::automock)]
pub trait TrustPolicy {
    fn is_trusted(&self, peer: &Peer) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProxyMatcher {
    Addr(IpAddr),
    Subnet { network: IpAddr, prefix: u8 },
    Host { host: String, port: Option<u16> },
}

impl ProxyMatcher {
    fn parse(entry: &str) -> Result<Self, ConfigError> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(ConfigError::invalid_proxy(entry, "empty entry"));
        }

        if let Some((network, prefix)) = entry.split_once('/') {
            let network = IpAddr::from_str(network).map_err(|e| ConfigError::invalid_proxy(entry, e))?;
            let prefix = u8::from_str(prefix).map_err(|e| ConfigError::invalid_proxy(entry, e))?;
            let max_prefix = if network.is_ipv4() { 32 } else { 128 };
            if prefix > max_prefix {
                return Err(ConfigError::invalid_proxy(entry, format!("prefix exceeds {max_prefix}")));
            }
            // a v4-mapped subnet is stored as plain IPv4 with the prefix rebased to 32 bits
            let canonical = network.to_canonical();
            let prefix = if network.is_ipv6() && canonical.is_ipv4() {
                prefix
                    .checked_sub(96)
                    .ok_or_else(|| ConfigError::invalid_proxy(entry, "v4-mapped prefix below 96"))?
            } else {
                prefix
            };
            return Ok(Self::Subnet { network: canonical, prefix });
        }

        if let Ok(addr) = IpAddr::from_str(entry) {
            return Ok(Self::Addr(addr));
        }

        let (host, port) = split_host_port(entry).ok_or_else(|| ConfigError::invalid_proxy(entry, "invalid port"))?;
        if !is_valid_host(host) {
            return Err(ConfigError::invalid_proxy(entry, "invalid host"));
        }
        Ok(Self::Host { host: host.to_ascii_lowercase(), port })
    }

    fn matches(&self, peer: &Peer) -> bool {
        match self {
            Self::Addr(addr) => addr.to_canonical() == peer.addr.to_canonical(),
            Self::Subnet { network, prefix } => subnet_contains(*network, *prefix, peer.addr),
            Self::Host { host, port } => {
                let Some((peer_host, peer_port)) = peer.host.as_deref().and_then(split_host_port) else {
                    return false;
                };
                peer_host.eq_ignore_ascii_case(host) && port.is_none_or(|port| peer_port == Some(port))
            }
        }
    }
}

/// The stock [`TrustPolicy`]: a list of trusted addresses, subnets and host names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    matchers: Vec<ProxyMatcher>,
}

impl TrustedProxies {
    /// A policy that trusts nobody.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a policy from entries such as `10.0.0.1`, `10.0.0.0/8`, `fd00::/8`
    /// or `example.com:8080`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProxy`] for malformed subnets, ports or host names.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = entries
            .into_iter()
            .map(|entry| ProxyMatcher::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }
}

impl TrustPolicy for TrustedProxies {
    fn is_trusted(&self, peer: &Peer) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(peer))
    }
}

fn subnet_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network.to_canonical(), addr.to_canonical()) {
        (IpAddr::V4(network), IpAddr::V4(addr)) => {
            let Some(shift) = 32_u32.checked_sub(u32::from(prefix)) else {
                return false;
            };
            let mask = u32::MAX.checked_shl(shift).unwrap_or(0);
            u32::from(network) & mask == u32::from(addr) & mask
        }
        (IpAddr::V6(network), IpAddr::V6(addr)) => {
            let Some(shift) = 128_u32.checked_sub(u32::from(prefix)) else {
                return false;
            };
            let mask = u128::MAX.checked_shl(shift).unwrap_or(0);
            u128::from(network) & mask == u128::from(addr) & mask
        }
        _ => false,
    }
}

/// Splits `host[:port]`, understanding bracketed IPv6 literals.
///
/// Returns `None` when a port is present but not a valid `u16`.
pub(crate) fn split_host_port(value: &str) -> Option<(&str, Option<u16>)> {
    let value = value.trim();

    if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return match tail.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if tail.is_empty() => Some((host, None)),
            None => None,
        };
    }

    // a bare IPv6 literal has several colons and no port
    if value.matches(':').count() > 1 {
        return Some((value, None));
    }

    match value.split_once(':') {
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((value, None)),
    }
}

/// Accepts registered names (letters, digits, `-`, `_`, `.`) and IP literals.
pub(crate) fn is_valid_host(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if IpAddr::from_str(host).is_ok() {
        return true;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(addr: &str, host: Option<&str>) -> Peer {
        Peer { addr: addr.parse().unwrap(), host: host.map(str::to_string) }
    }

    #[test]
    fn empty_list_trusts_nobody() {
        let proxies = TrustedProxies::none();
        assert!(proxies.is_empty());
        assert!(!proxies.is_trusted(&peer("127.0.0.1", Some("localhost"))));
    }

    #[test]
    fn exact_address() {
        let proxies = TrustedProxies::new(["192.168.1.100", "::1"]).unwrap();

        assert!(proxies.is_trusted(&peer("192.168.1.100", None)));
        assert!(proxies.is_trusted(&peer("::ffff:192.168.1.100", None)));
        assert!(proxies.is_trusted(&peer("::1", None)));
        assert!(!proxies.is_trusted(&peer("192.168.1.101", None)));
    }

    #[test]
    fn subnet_containment() {
        let proxies = TrustedProxies::new(["10.0.0.0/8", "fd00::/8", "0.0.0.0/0"]).unwrap();
        assert!(proxies.is_trusted(&peer("10.20.30.40", None)));
        assert!(proxies.is_trusted(&peer("fd12::1", None)));
        assert!(!proxies.is_trusted(&peer("fe80::1", None)));

        let narrow = TrustedProxies::new(["172.16.0.0/12"]).unwrap();
        assert!(narrow.is_trusted(&peer("172.31.255.255", None)));
        assert!(!narrow.is_trusted(&peer("172.32.0.1", None)));

        let single = TrustedProxies::new(["203.0.113.7/32"]).unwrap();
        assert!(single.is_trusted(&peer("203.0.113.7", None)));
        assert!(!single.is_trusted(&peer("203.0.113.8", None)));
    }

    #[test]
    fn v4_mapped_subnet() {
        let proxies = TrustedProxies::new(["::ffff:10.0.0.0/104"]).unwrap();
        assert!(proxies.is_trusted(&peer("10.1.2.3", None)));
        assert!(proxies.is_trusted(&peer("::ffff:10.9.9.9", None)));
        assert!(!proxies.is_trusted(&peer("203.0.113.9", None)));
        assert!(!proxies.is_trusted(&peer("::ffff:11.0.0.1", None)));

        assert!(matches!(TrustedProxies::new(["::ffff:10.0.0.0/64"]), Err(ConfigError::InvalidProxy { .. })));
    }

    #[test]
    fn host_allow_list() {
        let proxies = TrustedProxies::new(["real-domain.tld:8080", "Other.tld"]).unwrap();

        assert!(proxies.is_trusted(&peer("192.168.1.100", Some("real-domain.tld:8080"))));
        assert!(!proxies.is_trusted(&peer("192.168.1.100", Some("real-domain.tld:9090"))));
        assert!(!proxies.is_trusted(&peer("192.168.1.100", Some("real-domain.tld"))));
        assert!(proxies.is_trusted(&peer("192.168.1.100", Some("other.TLD:1234"))));
        assert!(!proxies.is_trusted(&peer("192.168.1.100", None)));
    }

    #[test]
    fn rejects_bad_entries() {
        assert!(matches!(TrustedProxies::new(["10.0.0.0/33"]), Err(ConfigError::InvalidProxy { .. })));
        assert!(TrustedProxies::new(["10.0.0.0/x"]).is_err());
        assert!(TrustedProxies::new(["nope/8"]).is_err());
        assert!(TrustedProxies::new(["host:port"]).is_err());
        assert!(TrustedProxies::new(["bad host"]).is_err());
        assert!(TrustedProxies::new([""]).is_err());
    }

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("example.com"), Some(("example.com", None)));
        assert_eq!(split_host_port("example.com:8080"), Some(("example.com", Some(8080))));
        assert_eq!(split_host_port("[::1]:443"), Some(("::1", Some(443))));
        assert_eq!(split_host_port("[::1]"), Some(("::1", None)));
        assert_eq!(split_host_port("::1"), Some(("::1", None)));
        assert_eq!(split_host_port("example.com:http"), None);
        assert_eq!(split_host_port("[::1]x"), None);
    }

    #[test]
    fn validates_hosts() {
        assert!(is_valid_host("real-domain.tld"));
        assert!(is_valid_host("127.0.0.1"));
        assert!(is_valid_host("::1"));
        assert!(!is_valid_host(""));
        assert!(!is_valid_host("evil.com/path"));
        assert!(!is_valid_host("-bad.tld"));
        assert!(!is_valid_host("a..b"));
    }
}
