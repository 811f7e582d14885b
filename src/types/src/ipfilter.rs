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

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Whether the matched criteria of a rule deny the request (block) or are
/// required for the request to be admitted (allow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Allow,
    Block,
}

impl Polarity {
    /// Combines the outcome of the criteria checks with the polarity,
    /// returns true if the request has to be denied.
    pub fn denies(&self, matched: bool) -> bool {
        match self {
            Polarity::Block => matched,
            Polarity::Allow => !matched,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Allow => write!(f, "allow"),
            Polarity::Block => write!(f, "block"),
        }
    }
}

/// The outcome of checking one rule against one request, before the
/// polarity is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request path is outside of the rule scopes.
    NotApplicable,
    /// At least one configured criterion was satisfied.
    Match,
    /// Every configured criterion was checked and none was satisfied.
    NoMatch,
}

impl Verdict {
    pub fn from_matched(matched: bool) -> Self {
        if matched {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }

    /// Applies the polarity, `None` if the rule does not apply at all.
    pub fn decide(&self, polarity: Polarity, blockpage: Option<&PathBuf>) -> Option<Decision> {
        match self {
            Verdict::NotApplicable => None,
            Verdict::Match | Verdict::NoMatch => {
                if polarity.denies(*self == Verdict::Match) {
                    Some(match blockpage {
                        Some(page) => Decision::DenyWithPage(page.to_owned()),
                        None => Decision::DenyForbidden,
                    })
                } else {
                    Some(Decision::Proceed)
                }
            }
        }
    }
}

/// The admission decision for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Delegate to the next handler.
    Proceed,
    /// Answer 200 with the contents of the block page.
    DenyWithPage(PathBuf),
    /// Answer 403 with an empty body.
    DenyForbidden,
}

impl Decision {
    pub fn is_denied(&self) -> bool {
        !matches!(self, Decision::Proceed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_denies() {
        assert!(Polarity::Block.denies(true));
        assert!(!Polarity::Block.denies(false));
        assert!(!Polarity::Allow.denies(true));
        assert!(Polarity::Allow.denies(false));
    }

    #[test]
    fn test_decision_is_denied() {
        assert!(!Decision::Proceed.is_denied());
        assert!(Decision::DenyForbidden.is_denied());
        assert!(Decision::DenyWithPage(PathBuf::from("default.html")).is_denied());
    }

    #[test]
    fn test_verdict_decide() {
        let page = PathBuf::from("default.html");
        assert_eq!(None, Verdict::NotApplicable.decide(Polarity::Block, None));
        assert_eq!(Some(Decision::DenyForbidden), Verdict::Match.decide(Polarity::Block, None));
        assert_eq!(Some(Decision::Proceed), Verdict::NoMatch.decide(Polarity::Block, Some(&page)));
        assert_eq!(Some(Decision::Proceed), Verdict::Match.decide(Polarity::Allow, Some(&page)));
        assert_eq!(
            Some(Decision::DenyWithPage(page.clone())),
            Verdict::NoMatch.decide(Polarity::Allow, Some(&page))
        );
    }

    #[test]
    fn test_polarity_serde() {
        let p: Polarity = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(Polarity::Block, p);
        assert!(serde_json::from_str::<Polarity>("\"deny\"").is_err());
        assert_eq!("allow", Polarity::Allow.to_string());
    }
}
