// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use crate::waf::error::{InvalidIpTokenSnafu, Result};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// An ordered collection of CIDR blocks of both address families.
///
/// Blocks keep the order they were added in, membership only compares
/// against blocks of the same family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    blocks: Vec<IpNet>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[IpNet] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        let addr = addr.to_canonical();
        self.blocks.iter().any(|block| block.contains(&addr))
    }

    /// Appends a block, host bits beyond the prefix are cleared. Blocks
    /// within the IPv4-mapped space are stored as IPv4.
    pub fn add_cidr(&mut self, block: IpNet) {
        self.blocks.push(canonical(block.trunc()));
    }

    /// Appends the minimal CIDR cover of the inclusive range `start..=end`.
    pub fn add_range(&mut self, start: &str, end: &str) -> Result<()> {
        let token = format!("{}-{}", start, end);
        let fail = |reason: &str| {
            InvalidIpTokenSnafu {
                token: token.as_str(),
                reason,
            }
            .fail()
        };
        let (Ok(first), Ok(last)) = (start.trim().parse::<IpAddr>(), end.trim().parse::<IpAddr>()) else {
            return fail("range endpoint is not an address");
        };
        match (first.to_canonical(), last.to_canonical()) {
            (IpAddr::V4(first), IpAddr::V4(last)) => {
                let (first, last) = (u32::from(first) as u128, u32::from(last) as u128);
                if last < first {
                    return fail("range end is lower than its start");
                }
                for (base, prefix) in cidr_cover(first, last, 32) {
                    let net = Ipv4Net::new(Ipv4Addr::from(base as u32), prefix);
                    match net {
                        Ok(net) => self.blocks.push(IpNet::V4(net)),
                        Err(_) => return fail("prefix length out of range"),
                    }
                }
            }
            (IpAddr::V6(first), IpAddr::V6(last)) => {
                let (first, last) = (u128::from(first), u128::from(last));
                if last < first {
                    return fail("range end is lower than its start");
                }
                for (base, prefix) in cidr_cover(first, last, 128) {
                    match Ipv6Net::new(Ipv6Addr::from(base), prefix) {
                        Ok(net) => self.blocks.push(IpNet::V6(net)),
                        Err(_) => return fail("prefix length out of range"),
                    }
                }
            }
            _ => return fail("range endpoints are of mixed address families"),
        }
        Ok(())
    }

    /// Appends the block implied by an IPv4 address given with 1 to 3
    /// octets, e.g. "192.168" is 192.168.0.0/16.
    pub fn add_shorthand(&mut self, partial: &str) -> Result<()> {
        let fail = |reason: &str| InvalidIpTokenSnafu { token: partial, reason }.fail();
        let parts = partial.split('.').collect::<Vec<_>>();
        if parts.len() > 3 {
            return fail("shorthand has more than 3 octets");
        }
        let mut octets = [0u8; 4];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return fail("empty octet");
            }
            match part.parse::<u8>() {
                Ok(octet) => octets[i] = octet,
                Err(_) => return fail("invalid octet"),
            }
        }
        match Ipv4Net::new(Ipv4Addr::from(octets), 8 * parts.len() as u8) {
            Ok(net) => {
                self.blocks.push(IpNet::V4(net));
                Ok(())
            }
            Err(_) => fail("prefix length out of range"),
        }
    }

    /// Parses one `ip` directive token: a single address, a CIDR literal,
    /// a last octet range "a.b.c.d-e", a full "start-end" range of either
    /// family or a dotted shorthand.
    pub fn add_token(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return InvalidIpTokenSnafu { token, reason: "empty token" }.fail();
        }
        if token.contains('/') {
            let block = token
                .parse::<IpNet>()
                .map_err(|_| InvalidIpTokenSnafu { token, reason: "invalid CIDR" }.build())?;
            self.add_cidr(block);
            return Ok(());
        }
        if let Some((start, end)) = token.split_once('-') {
            let (start, end) = (start.trim(), end.trim());
            if end.is_empty() {
                return InvalidIpTokenSnafu {
                    token,
                    reason: "missing range end",
                }
                .fail();
            }
            // "10.0.0.1-150" substitutes the last octet of the start address.
            if let Ok(first) = start.parse::<Ipv4Addr>() {
                if end.bytes().all(|b| b.is_ascii_digit()) {
                    let last = end
                        .parse::<u8>()
                        .map_err(|_| InvalidIpTokenSnafu { token, reason: "invalid octet" }.build())?;
                    let [a, b, c, _] = first.octets();
                    return self.add_range(start, &Ipv4Addr::new(a, b, c, last).to_string());
                }
            }
            return self.add_range(start, end);
        }
        if token.contains(':') {
            let ip = token.parse::<Ipv6Addr>().map_err(|_| {
                InvalidIpTokenSnafu {
                    token,
                    reason: "invalid IPv6 address",
                }
                .build()
            })?;
            self.add_cidr(IpNet::V6(Ipv6Net::from(ip)));
            return Ok(());
        }
        if token.split('.').count() < 4 {
            return self.add_shorthand(token);
        }
        let ip = token.parse::<Ipv4Addr>().map_err(|_| {
            InvalidIpTokenSnafu {
                token,
                reason: "invalid IPv4 address",
            }
            .build()
        })?;
        self.add_cidr(IpNet::V4(Ipv4Net::from(ip)));
        Ok(())
    }
}

// "::ffff:a.b.c.d/n" with n >= 96 covers exactly a.b.c.d/(n - 96).
fn canonical(block: IpNet) -> IpNet {
    match block {
        IpNet::V6(net) if net.prefix_len() >= 96 => match net.addr().to_ipv4_mapped() {
            Some(addr) => Ipv4Net::new(addr, net.prefix_len() - 96).map_or(block, IpNet::V4),
            None => block,
        },
        _ => block,
    }
}

/// Decomposes `first..=last` into the minimal list of aligned blocks as
/// (base, prefix length) pairs, for an address width of `bits`.
fn cidr_cover(first: u128, last: u128, bits: u8) -> Vec<(u128, u8)> {
    let bits = bits as u32;
    let host_mask = |size: u32| if size >= 128 { u128::MAX } else { (1u128 << size) - 1 };
    let mut blocks = vec![];
    let mut floor = first;
    loop {
        // The largest block aligned at floor that does not pass the ceiling.
        let mut size = if floor == 0 { bits } else { floor.trailing_zeros().min(bits) };
        while floor | host_mask(size) > last {
            size -= 1;
        }
        let top = floor | host_mask(size);
        blocks.push((floor, (bits - size) as u8));
        if top >= last {
            break;
        }
        floor = top + 1;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnet::{Ipv4Subnets, Ipv6Subnets};

    fn v4(s: &str) -> IpAddr {
        IpAddr::V4(s.parse().unwrap())
    }

    fn set_of(tokens: &[&str]) -> RangeSet {
        let mut set = RangeSet::new();
        for token in tokens {
            set.add_token(token).unwrap();
        }
        set
    }

    #[test]
    fn test_empty_contains_nothing() {
        let set = RangeSet::new();
        assert!(set.is_empty());
        assert!(!set.contains(&v4("0.0.0.0")));
        assert!(!set.contains(&"::".parse().unwrap()));
    }

    #[test]
    fn test_last_octet_range() {
        let set = set_of(&["10.0.0.1-150"]);
        assert!(set.contains(&v4("10.0.0.1")));
        assert!(set.contains(&v4("10.0.0.64")));
        assert!(set.contains(&v4("10.0.0.150")));
        assert!(!set.contains(&v4("10.0.0.0")));
        assert!(!set.contains(&v4("10.0.0.151")));
        let expected = [
            "10.0.0.1/32",
            "10.0.0.2/31",
            "10.0.0.4/30",
            "10.0.0.8/29",
            "10.0.0.16/28",
            "10.0.0.32/27",
            "10.0.0.64/26",
            "10.0.0.128/28",
            "10.0.0.144/30",
            "10.0.0.148/31",
            "10.0.0.150/32",
        ];
        let got = set.blocks().iter().map(|b| b.to_string()).collect::<Vec<_>>();
        assert_eq!(expected.to_vec(), got);
    }

    #[test]
    fn test_range_cover_matches_ipnet() {
        let cases = [
            ("10.0.0.1", "10.0.0.150"),
            ("0.0.0.0", "255.255.255.255"),
            ("192.168.1.255", "192.168.2.0"),
            ("1.2.3.4", "1.2.3.4"),
            ("9.255.255.0", "11.0.0.7"),
            ("255.255.255.254", "255.255.255.255"),
        ];
        for (start, end) in cases {
            let mut set = RangeSet::new();
            set.add_range(start, end).unwrap();
            let expected = Ipv4Subnets::new(start.parse().unwrap(), end.parse().unwrap(), 0)
                .map(IpNet::V4)
                .collect::<Vec<_>>();
            assert_eq!(expected, set.blocks(), "{}-{}", start, end);
        }
    }

    #[test]
    fn test_v6_range_cover_matches_ipnet() {
        let cases = [
            ("2001:db8::", "2001:db8::3f"),
            ("2001:db8::5", "2001:db8::1:7"),
            ("::", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff"),
            ("fe80::1", "fe80::1"),
        ];
        for (start, end) in cases {
            let mut set = RangeSet::new();
            set.add_range(start, end).unwrap();
            let expected = Ipv6Subnets::new(start.parse().unwrap(), end.parse().unwrap(), 0)
                .map(IpNet::V6)
                .collect::<Vec<_>>();
            assert_eq!(expected, set.blocks(), "{}-{}", start, end);
        }
    }

    #[test]
    fn test_cover_is_exact_around_edges() {
        let mut set = RangeSet::new();
        set.add_range("192.168.1.250", "192.168.2.5").unwrap();
        for last in 240..=255u8 {
            let inside = last >= 250;
            assert_eq!(inside, set.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))));
        }
        for last in 0..=15u8 {
            let inside = last <= 5;
            assert_eq!(inside, set.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 2, last))));
        }
    }

    #[test]
    fn test_single_address_range() {
        let mut set = RangeSet::new();
        set.add_range("2001:db8::1", "2001:db8::1").unwrap();
        assert_eq!("2001:db8::1/128", set.blocks()[0].to_string());
        assert_eq!(1, set.len());
    }

    #[test]
    fn test_invalid_ranges() {
        let mut set = RangeSet::new();
        assert!(set.add_range("10.0.0.9", "10.0.0.1").is_err());
        assert!(set.add_range("10.0.0.1", "2001:db8::1").is_err());
        assert!(set.add_range("10.0.0.1", "10.0.0").is_err());
        let tokens = ["10.0.0.9-1", "192.168.1.10-", "10.0.0.1-256", "10.0.0.1-::1", "2001:db8::9-2001:db8::1"];
        for token in tokens {
            assert!(set.add_token(token).is_err(), "{}", token);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn test_full_ranges() {
        let set = set_of(&["10.0.0.250-10.0.1.3", "2001:db8::1-2001:db8::4"]);
        assert!(set.contains(&v4("10.0.0.255")));
        assert!(set.contains(&v4("10.0.1.3")));
        assert!(!set.contains(&v4("10.0.1.4")));
        assert!(set.contains(&"2001:db8::4".parse().unwrap()));
        assert!(!set.contains(&"2001:db8::5".parse().unwrap()));
    }

    #[test]
    fn test_shorthand() {
        let set = set_of(&["192.168", "11.10.12", "0"]);
        let got = set.blocks().iter().map(|b| b.to_string()).collect::<Vec<_>>();
        assert_eq!(vec!["192.168.0.0/16", "11.10.12.0/24", "0.0.0.0/8"], got);
        assert!(set.contains(&v4("192.168.200.1")));
        assert!(set.contains(&v4("11.10.12.255")));
        assert!(!set.contains(&v4("11.10.13.0")));
    }

    #[test]
    fn test_invalid_shorthand() {
        let mut set = RangeSet::new();
        for token in ["11.", "192..1", "300.1", "a.b", "1.2.3.4.5"] {
            assert!(set.add_token(token).is_err(), "{}", token);
        }
    }

    #[test]
    fn test_cidr_is_truncated() {
        let set = set_of(&["70.1.130.7/19"]);
        assert_eq!("70.1.128.0/19", set.blocks()[0].to_string());
        assert!(set.contains(&v4("70.1.159.255")));
        assert!(!set.contains(&v4("70.1.160.0")));
    }

    #[test]
    fn test_mixed_families_and_reflexive() {
        let tokens = ["70.1.128.0/19", "2001:db8::/122", "9.12.20.16", "::1"];
        let set = set_of(&tokens);
        assert!(set.contains(&v4("70.1.128.0")));
        assert!(set.contains(&v4("9.12.20.16")));
        assert!(set.contains(&"2001:db8::".parse().unwrap()));
        assert!(set.contains(&"2001:db8::3f".parse().unwrap()));
        assert!(!set.contains(&"2001:db8::40".parse().unwrap()));
        assert!(set.contains(&"::1".parse().unwrap()));
        assert!(!set.contains(&v4("9.12.20.17")));
        // An IPv4 block never covers a native IPv6 address.
        assert!(!set.contains(&"64:ff9b::90c:1410".parse().unwrap()));
    }

    #[test]
    fn test_mapped_tokens_are_stored_as_v4() {
        let set = set_of(&["::ffff:1.2.3.4", "::ffff:10.0.0.0/104", "::ffff:172.16.0.1-::ffff:172.16.0.3"]);
        let got = set.blocks().iter().map(|b| b.to_string()).collect::<Vec<_>>();
        assert_eq!(vec!["1.2.3.4/32", "10.0.0.0/8", "172.16.0.1/32", "172.16.0.2/31"], got);
        assert!(set.contains(&v4("1.2.3.4")));
        assert!(set.contains(&"::ffff:1.2.3.4".parse().unwrap()));
        assert!(set.contains(&v4("10.200.0.1")));
        assert!(set.contains(&v4("172.16.0.3")));
        // A prefix shorter than the mapped space stays IPv6.
        let wide = set_of(&["::ffff:0:0/95"]);
        assert!(matches!(wide.blocks()[0], IpNet::V6(_)));
    }

    #[test]
    fn test_invalid_single_addresses() {
        let mut set = RangeSet::new();
        for token in ["1.2.3.256", "2001:db8:::1", "1.2.3.4/33", "", "   "] {
            assert!(set.add_token(token).is_err(), "{:?}", token);
        }
    }
}
