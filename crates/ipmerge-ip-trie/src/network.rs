//! Network keys (address prefix + length)

use crate::IpTreeError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of a trie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    /// IPv4 only (32-bit tree)
    V4,
    /// IPv6 (128-bit tree, IPv4 lives under `::/96`)
    V6,
}

impl IpVersion {
    /// Number of address bits, which is also the maximum tree depth
    pub fn bit_count(self) -> usize {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// The `ip_version` metadata value (4 or 6)
    pub fn as_u16(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Parse the `ip_version` metadata value
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            4 => Some(IpVersion::V4),
            6 => Some(IpVersion::V6),
            _ => None,
        }
    }
}

const V4_MAPPED_PREFIX: u128 = 0xffff << 32;

/// An IP network: base address plus prefix length
///
/// The address is held in 128-bit canonical form. IPv4 networks are stored
/// IPv4-mapped (`::ffff:a.b.c.d/(96 + len)`) and remember that they were
/// written as IPv4. Host bits past the prefix are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    bits: u128,
    prefix_len: u8,
    ipv4: bool,
}

impl Network {
    /// Create a network from an address and a prefix length in that
    /// address's family (0-32 for IPv4, 0-128 for IPv6)
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, IpTreeError> {
        match addr {
            IpAddr::V4(v4) => Self::from_ipv4(v4, prefix_len),
            IpAddr::V6(v6) => Self::from_ipv6(v6, prefix_len),
        }
    }

    /// Create an IPv4 network
    pub fn from_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, IpTreeError> {
        if prefix_len > 32 {
            return Err(IpTreeError::InvalidNetwork(format!(
                "prefix length {} exceeds 32 for {}",
                prefix_len, addr
            )));
        }
        let bits = V4_MAPPED_PREFIX | u32::from(addr) as u128;
        Ok(Self {
            bits: mask(bits, 96 + prefix_len),
            prefix_len: 96 + prefix_len,
            ipv4: true,
        })
    }

    /// Create an IPv6 network
    pub fn from_ipv6(addr: Ipv6Addr, prefix_len: u8) -> Result<Self, IpTreeError> {
        if prefix_len > 128 {
            return Err(IpTreeError::InvalidNetwork(format!(
                "prefix length {} exceeds 128 for {}",
                prefix_len, addr
            )));
        }
        Ok(Self {
            bits: mask(u128::from(addr), prefix_len),
            prefix_len,
            ipv4: false,
        })
    }

    /// Network containing exactly one address
    pub fn host(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self {
                bits: V4_MAPPED_PREFIX | u32::from(v4) as u128,
                prefix_len: 128,
                ipv4: true,
            },
            IpAddr::V6(v6) => Self {
                bits: u128::from(v6),
                prefix_len: 128,
                ipv4: false,
            },
        }
    }

    /// True if written as an IPv4 network
    pub fn is_ipv4(&self) -> bool {
        self.ipv4
    }

    /// Base address in the network's own family
    pub fn addr(&self) -> IpAddr {
        if self.ipv4 {
            IpAddr::V4(Ipv4Addr::from(self.bits as u32))
        } else {
            IpAddr::V6(Ipv6Addr::from(self.bits))
        }
    }

    /// Prefix length in the network's own family
    pub fn prefix_len(&self) -> u8 {
        if self.ipv4 {
            self.prefix_len - 96
        } else {
            self.prefix_len
        }
    }

    /// 128-bit canonical base address (IPv4 as IPv4-mapped)
    pub fn canonical_bits(&self) -> u128 {
        self.bits
    }

    /// 128-bit canonical prefix length
    pub fn canonical_prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// True if `addr` falls inside this network
    pub fn contains(&self, addr: IpAddr) -> bool {
        let other = Self::host(addr);
        mask(other.bits, self.prefix_len) == self.bits
    }

    /// Position of this network in a trie of `version`: left-aligned key
    /// bits and the depth at which the prefix ends
    pub(crate) fn tree_key(&self, version: IpVersion) -> Result<(u128, usize), IpTreeError> {
        match (version, self.ipv4) {
            (IpVersion::V4, true) => Ok((
                (self.bits as u32 as u128) << 96,
                self.prefix_len as usize - 96,
            )),
            (IpVersion::V4, false) => Err(IpTreeError::InvalidNetwork(format!(
                "cannot insert IPv6 network {} into an IPv4 database",
                self
            ))),
            // IPv4 data lives under ::/96
            (IpVersion::V6, true) => Ok((self.bits as u32 as u128, self.prefix_len as usize)),
            (IpVersion::V6, false) => Ok((self.bits, self.prefix_len as usize)),
        }
    }

    /// Rebuild a network from a trie position
    ///
    /// In an IPv6 trie, positions under `::/96` are reported as IPv4.
    pub(crate) fn from_tree_position(version: IpVersion, key: u128, depth: usize) -> Self {
        let depth = depth as u8;
        match version {
            IpVersion::V4 => Self {
                bits: V4_MAPPED_PREFIX | (key >> 96),
                prefix_len: 96 + depth,
                ipv4: true,
            },
            IpVersion::V6 if depth >= 96 && key >> 32 == 0 => Self {
                bits: V4_MAPPED_PREFIX | key,
                prefix_len: depth,
                ipv4: true,
            },
            IpVersion::V6 => Self {
                bits: key,
                prefix_len: depth,
                ipv4: false,
            },
        }
    }
}

/// Zero every bit past `prefix_len`
fn mask(bits: u128, prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        len if len >= 128 => bits,
        len => bits & !(u128::MAX >> len),
    }
}

/// Bit of `key` at tree depth `depth` (0 = most significant)
#[inline]
pub(crate) fn bit_at(key: u128, depth: usize) -> bool {
    (key >> (127 - depth)) & 1 == 1
}

impl FromStr for Network {
    type Err = IpTreeError;

    /// Parse `addr/len` CIDR notation, or a bare address as a host network
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_part, len_part) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let addr: IpAddr = addr_part
            .parse()
            .map_err(|e| IpTreeError::InvalidNetwork(format!("'{}': {}", s, e)))?;
        match len_part {
            Some(len) => {
                let len: u8 = len.parse().map_err(|_| {
                    IpTreeError::InvalidNetwork(format!("'{}': invalid prefix length", s))
                })?;
                Self::new(addr, len)
            }
            None => Ok(Self::host(addr)),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix_len())
    }
}

/// Anything that names a network for insertion
pub trait IntoNetwork {
    /// Convert into a [`Network`]
    fn into_network(self) -> Result<Network, IpTreeError>;
}

impl IntoNetwork for Network {
    fn into_network(self) -> Result<Network, IpTreeError> {
        Ok(self)
    }
}

impl IntoNetwork for &Network {
    fn into_network(self) -> Result<Network, IpTreeError> {
        Ok(*self)
    }
}

impl IntoNetwork for &str {
    fn into_network(self) -> Result<Network, IpTreeError> {
        self.parse()
    }
}

impl IntoNetwork for &String {
    fn into_network(self) -> Result<Network, IpTreeError> {
        self.parse()
    }
}

impl IntoNetwork for (IpAddr, u8) {
    fn into_network(self) -> Result<Network, IpTreeError> {
        Network::new(self.0, self.1)
    }
}

impl IntoNetwork for IpAddr {
    fn into_network(self) -> Result<Network, IpTreeError> {
        Ok(Network::host(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_cidr() {
        let net: Network = "56.0.0.0/16".parse().unwrap();
        assert!(net.is_ipv4());
        assert_eq!(net.prefix_len(), 16);
        assert_eq!(net.canonical_prefix_len(), 112);
        assert_eq!(net.to_string(), "56.0.0.0/16");
        assert_eq!(net.canonical_bits() >> 32, 0xffff);
    }

    #[test]
    fn test_parse_masks_host_bits() {
        let net: Network = "10.1.2.3/8".parse().unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/8");
        let net: Network = "2001:db8::1/32".parse().unwrap();
        assert_eq!(net.to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_bare_address() {
        let net: Network = "1.2.3.4".parse().unwrap();
        assert_eq!(net.prefix_len(), 32);
        let net: Network = "::1".parse().unwrap();
        assert_eq!(net.prefix_len(), 128);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "1.2.3.4/33".parse::<Network>(),
            Err(IpTreeError::InvalidNetwork(_))
        ));
        assert!(matches!(
            "nope/8".parse::<Network>(),
            Err(IpTreeError::InvalidNetwork(_))
        ));
        assert!(matches!(
            "1.2.3.0/x".parse::<Network>(),
            Err(IpTreeError::InvalidNetwork(_))
        ));
        assert!("::/129".parse::<Network>().is_err());
    }

    #[test]
    fn test_contains() {
        let net: Network = "10.0.0.0/8".parse().unwrap();
        assert!(net.contains("10.200.1.1".parse().unwrap()));
        assert!(!net.contains("11.0.0.1".parse().unwrap()));
        let all: Network = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains("255.255.255.255".parse().unwrap()));
    }

    #[test]
    fn test_tree_key_positions() {
        let net: Network = "128.0.0.0/1".parse().unwrap();
        let (key, len) = net.tree_key(IpVersion::V4).unwrap();
        assert!(bit_at(key, 0));
        assert_eq!(len, 1);

        let (key, len) = net.tree_key(IpVersion::V6).unwrap();
        assert_eq!(len, 97);
        assert!(!bit_at(key, 0));
        assert!(bit_at(key, 96));

        let v6: Network = "2001:db8::/32".parse().unwrap();
        assert!(v6.tree_key(IpVersion::V4).is_err());
    }

    #[test]
    fn test_from_tree_position_reports_ipv4_under_96() {
        let net: Network = "56.1.0.0/16".parse().unwrap();
        let (key, len) = net.tree_key(IpVersion::V6).unwrap();
        assert_eq!(Network::from_tree_position(IpVersion::V6, key, len), net);

        let (key, len) = net.tree_key(IpVersion::V4).unwrap();
        assert_eq!(Network::from_tree_position(IpVersion::V4, key, len), net);
    }
}
