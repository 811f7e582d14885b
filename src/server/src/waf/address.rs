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

use crate::waf::error::{AddressParseSnafu, InvalidHeaderNameSnafu, Result};
use axum::http::{HeaderMap, HeaderName};
use std::net::IpAddr;

/// Extracts the canonical client address of a request.
///
/// The forwarded header (set by a trusted reverse proxy) takes precedence over
/// the socket peer address unless the strict policy is in effect.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    header: HeaderName,
}

impl AddressResolver {
    pub fn new(header_name: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(header_name.trim().as_bytes())
            .map_err(|_| InvalidHeaderNameSnafu { name: header_name }.build())?;
        Ok(Self { header })
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }

    pub fn resolve(&self, remote_addr: &str, headers: &HeaderMap, strict: bool) -> Result<IpAddr> {
        if !strict {
            if let Some(forwarded) = self.forwarded_value(headers) {
                return parse_ip(forwarded);
            }
        }
        parse_ip(split_host(remote_addr)?)
    }

    // The left-most entry of a comma separated chain is the originating client.
    fn forwarded_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = headers.get(&self.header)?.to_str().ok()?;
        let first = value.split(',').next().unwrap_or_default().trim();
        if first.is_empty() {
            None
        } else {
            Some(first)
        }
    }
}

fn parse_ip(text: &str) -> Result<IpAddr> {
    text.parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| AddressParseSnafu { input: text }.build())
}

/// Splits "host:port" or "[v6]:port" into the host part, the port itself
/// is not interpreted. A zone suffix ("[fe80::1%2]:80", as printed for
/// link-local peers) is dropped.
fn split_host(remote_addr: &str) -> Result<&str> {
    let fail = || AddressParseSnafu { input: remote_addr }.build();
    if let Some(rest) = remote_addr.strip_prefix('[') {
        let (host, port) = rest.split_once(']').ok_or_else(fail)?;
        if !port.starts_with(':') {
            return Err(fail());
        }
        return match host.split_once('%') {
            Some((host, zone)) if !zone.is_empty() => Ok(host),
            Some(_) => Err(fail()),
            None => Ok(host),
        };
    }
    match remote_addr.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => Ok(host),
        _ => Err(fail()),
    }
}
