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

use crate::waf::{
    blocklist::BlocklistDirectory,
    error::{MissingCriteriaSnafu, MissingPathScopeSnafu, NoSuchFileSnafu, Result},
    geo::GeoClassifier,
    range::RangeSet,
};
use ipgate_types::ipfilter::{Decision, Polarity, Verdict};
use std::{fmt, net::IpAddr, path::PathBuf};

/// One path scoped policy. Which criteria are active is decided once at
/// construction from what was configured, rules are immutable afterwards.
#[derive(Debug, Clone)]
pub struct FilterRule {
    paths: Vec<String>,
    polarity: Polarity,
    geo: Option<GeoClassifier>,
    ranges: Option<RangeSet>,
    blocklist: Option<BlocklistDirectory>,
    blockpage: Option<PathBuf>,
    strict: bool,
}

impl FilterRule {
    pub fn builder(polarity: Polarity) -> FilterRuleBuilder {
        FilterRuleBuilder {
            paths: vec![],
            polarity,
            geo: None,
            ranges: RangeSet::new(),
            blocklist: None,
            blockpage: None,
            strict: false,
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn blockpage(&self) -> Option<&PathBuf> {
        self.blockpage.as_ref()
    }

    pub fn ranges(&self) -> Option<&RangeSet> {
        self.ranges.as_ref()
    }

    pub fn applies_to(&self, path: &str) -> bool {
        self.paths.iter().any(|scope| path.starts_with(scope.as_str()))
    }

    /// Whether any configured criterion is satisfied by the address. Every
    /// configured criterion is checked, a failing check aborts the rule.
    pub fn check(&self, addr: &IpAddr) -> Result<bool> {
        let mut matched = false;
        if let Some(geo) = &self.geo {
            matched |= geo.matches(addr)?;
        }
        if let Some(ranges) = &self.ranges {
            matched |= ranges.contains(addr);
        }
        if let Some(blocklist) = &self.blocklist {
            matched |= blocklist.contains(addr)?;
        }
        Ok(matched)
    }

    pub fn evaluate(&self, path: &str, addr: &IpAddr) -> Result<Verdict> {
        if !self.applies_to(path) {
            return Ok(Verdict::NotApplicable);
        }
        self.check(addr).map(Verdict::from_matched)
    }

    /// Combines a verdict of this rule with its polarity.
    pub fn decide(&self, verdict: Verdict) -> Option<Decision> {
        verdict.decide(self.polarity, self.blockpage.as_ref())
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "paths=[{}] rule={}", self.paths.join(", "), self.polarity)?;
        if let Some(geo) = &self.geo {
            let mut countries = geo.countries().iter().map(String::as_str).collect::<Vec<_>>();
            countries.sort_unstable();
            write!(f, " country=[{}]", countries.join(", "))?;
        }
        if let Some(ranges) = &self.ranges {
            write!(f, " ip={} blocks", ranges.len())?;
        }
        if let Some(blocklist) = &self.blocklist {
            write!(f, " prefix-dir={}", blocklist.path().display())?;
        }
        if let Some(page) = &self.blockpage {
            write!(f, " blockpage={}", page.display())?;
        }
        write!(f, " strict={}", self.strict)
    }
}

pub struct FilterRuleBuilder {
    paths: Vec<String>,
    polarity: Polarity,
    geo: Option<GeoClassifier>,
    ranges: RangeSet,
    blocklist: Option<BlocklistDirectory>,
    blockpage: Option<PathBuf>,
    strict: bool,
}

impl FilterRuleBuilder {
    pub fn path(mut self, scope: impl Into<String>) -> Self {
        self.paths.push(scope.into());
        self
    }

    pub fn countries(mut self, geo: GeoClassifier) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn ip(mut self, token: &str) -> Result<Self> {
        self.ranges.add_token(token)?;
        Ok(self)
    }

    pub fn ranges(mut self, ranges: RangeSet) -> Self {
        for block in ranges.blocks() {
            self.ranges.add_cidr(*block);
        }
        self
    }

    pub fn blocklist(mut self, blocklist: BlocklistDirectory) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    pub fn blockpage(mut self, page: impl Into<PathBuf>) -> Self {
        self.blockpage = Some(page.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Result<FilterRule> {
        if self.paths.is_empty() {
            return MissingPathScopeSnafu.fail();
        }
        let ranges = if self.ranges.is_empty() { None } else { Some(self.ranges) };
        let geo = self.geo.filter(|geo| !geo.countries().is_empty());
        if geo.is_none() && ranges.is_none() && self.blocklist.is_none() {
            return MissingCriteriaSnafu.fail();
        }
        if let Some(page) = &self.blockpage {
            if !page.is_file() {
                return NoSuchFileSnafu { path: page.to_owned() }.fail();
            }
        }
        Ok(FilterRule {
            paths: self.paths,
            polarity: self.polarity,
            geo,
            ranges,
            blocklist: self.blocklist,
            blockpage: self.blockpage,
            strict: self.strict,
        })
    }
}
