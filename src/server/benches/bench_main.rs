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

use axum::http::{HeaderMap, HeaderValue};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ipgate_server::waf::{
    address::AddressResolver,
    chain::{FilterChain, FilterRequest},
    range::RangeSet,
    rule::FilterRule,
};
use ipgate_types::ipfilter::Polarity;
use std::net::IpAddr;

fn range_set() -> RangeSet {
    let mut set = RangeSet::new();
    for i in 0..=255u8 {
        set.add_token(&format!("10.{}.0.0/16", i)).unwrap();
        set.add_token(&format!("172.16.{}.1-200", i)).unwrap();
    }
    set.add_token("2001:db8::/48").unwrap();
    set
}

fn bench_range_contains(c: &mut Criterion) {
    let set = range_set();
    let hit: IpAddr = "172.16.200.100".parse().unwrap();
    let miss: IpAddr = "192.0.2.1".parse().unwrap();
    c.bench_function("range_set_contains_hit", |b| b.iter(|| set.contains(black_box(&hit))));
    c.bench_function("range_set_contains_miss", |b| b.iter(|| set.contains(black_box(&miss))));
}

fn bench_chain_evaluate(c: &mut Criterion) {
    let rules = vec![
        FilterRule::builder(Polarity::Block)
            .path("/")
            .ranges(range_set())
            .build()
            .unwrap(),
        FilterRule::builder(Polarity::Allow)
            .path("/allowed")
            .ip("172.16.0.0/12")
            .unwrap()
            .build()
            .unwrap(),
    ];
    let chain = FilterChain::new(AddressResolver::new("X-Forwarded-For").unwrap(), rules);
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static("172.16.200.100, 10.0.0.1"));
    let req = FilterRequest {
        path: "/allowed/index.html".to_string(),
        remote_addr: "10.0.0.1:50000".to_string(),
        headers,
    };
    c.bench_function("filter_chain_evaluate", |b| b.iter(|| chain.evaluate(black_box(&req))));
}

criterion_group!(benches, bench_range_contains, bench_chain_evaluate);
criterion_main!(benches);
