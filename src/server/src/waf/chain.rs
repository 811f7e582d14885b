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

use crate::waf::{address::AddressResolver, error::Result, rule::FilterRule};
use axum::http::HeaderMap;
use ipgate_types::ipfilter::Decision;
use std::net::IpAddr;

/// What the chain needs to know about a request.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    pub path: String,
    /// The socket peer as "host:port".
    pub remote_addr: String,
    pub headers: HeaderMap,
}

/// The outcome of a chain evaluation with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTrace {
    pub decision: Decision,
    /// Index of the last applicable rule, `None` when no rule applied.
    pub rule: Option<usize>,
    /// The address the deciding rule evaluated.
    pub client: Option<IpAddr>,
}

/// The ordered rules of a configuration. Every applicable rule is evaluated
/// and the last one decides, requests no rule applies to proceed.
#[derive(Debug)]
pub struct FilterChain {
    resolver: AddressResolver,
    rules: Vec<FilterRule>,
}

impl FilterChain {
    pub fn new(resolver: AddressResolver, rules: Vec<FilterRule>) -> Self {
        Self { resolver, rules }
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, req: &FilterRequest) -> Result<Decision> {
        self.evaluate_traced(req).map(|trace| trace.decision)
    }

    pub fn evaluate_traced(&self, req: &FilterRequest) -> Result<RuleTrace> {
        let mut trace = RuleTrace {
            decision: Decision::Proceed,
            rule: None,
            client: None,
        };
        // Resolved lazily, once per trust policy.
        let (mut trusting, mut strict) = (None, None);

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.applies_to(&req.path) {
                continue;
            }
            let slot = if rule.strict() { &mut strict } else { &mut trusting };
            let client = match *slot {
                Some(client) => client,
                None => *slot.insert(self.resolver.resolve(&req.remote_addr, &req.headers, rule.strict())?),
            };
            let verdict = rule.evaluate(&req.path, &client)?;
            if let Some(decision) = rule.decide(verdict) {
                tracing::trace!("ipfilter rule #{} decided {:?} for {} on {}", index, decision, client, req.path);
                trace = RuleTrace {
                    decision,
                    rule: Some(index),
                    client: Some(client),
                };
            }
        }
        Ok(trace)
    }
}
