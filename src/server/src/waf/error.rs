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

use common_error::ext::ErrorExt;
use common_error::status_code::StatusCode;
use snafu::{Location, Snafu};
use std::{any::Any, net::IpAddr, path::PathBuf};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    // ====== Load time (configuration) errors ======
    #[snafu(display("Failed to load configuration"))]
    LoadConfig {
        #[snafu(source)]
        error: config::ConfigError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid configuration: {}", error))]
    ValidateConfig {
        error: validator::ValidationErrors,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid ipfilter rule #{}", index))]
    InvalidRule {
        index: usize,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid forwarded header name '{}'", name))]
    InvalidHeaderName {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("At least one path scope is required"))]
    MissingPathScope {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("No IPs, country codes or prefix directory has been provided"))]
    MissingCriteria {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("A database is required to block/allow by country"))]
    MissingDatabase {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Can't open database: {}", path.display()))]
    OpenDatabase {
        path: PathBuf,
        #[snafu(source)]
        error: maxminddb::MaxMindDBError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("No such file: {}", path.display()))]
    NoSuchFile {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("No such directory: {}", path.display()))]
    NoSuchDirectory {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Can't parse ip token '{}': {}", token, reason))]
    InvalidIpToken {
        token: String,
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },

    // ====== Request time errors ======
    #[snafu(display("Unable to parse client address '{}'", input))]
    AddressParse {
        input: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Country lookup of {} failed: {}", ip, reason))]
    Lookup {
        ip: IpAddr,
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to check prefix directory entry {}", path.display()))]
    BlocklistIo {
        path: PathBuf,
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to read block page {}", path.display()))]
    ReadBlockPage {
        path: PathBuf,
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Ipfilter evaluation task failed"))]
    EvaluationJoin {
        #[snafu(source)]
        error: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Load time errors prevent the filter from being installed at all.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::LoadConfig { .. }
                | Error::ValidateConfig { .. }
                | Error::InvalidRule { .. }
                | Error::InvalidHeaderName { .. }
                | Error::MissingPathScope { .. }
                | Error::MissingCriteria { .. }
                | Error::MissingDatabase { .. }
                | Error::OpenDatabase { .. }
                | Error::NoSuchFile { .. }
                | Error::NoSuchDirectory { .. }
                | Error::InvalidIpToken { .. }
        )
    }
}

impl ErrorExt for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRule { source, .. } => source.status_code(),
            Error::NoSuchFile { .. } | Error::NoSuchDirectory { .. } => StatusCode::FileNotFound,
            Error::LoadConfig { .. }
            | Error::ValidateConfig { .. }
            | Error::InvalidHeaderName { .. }
            | Error::MissingPathScope { .. }
            | Error::MissingCriteria { .. }
            | Error::MissingDatabase { .. }
            | Error::OpenDatabase { .. }
            | Error::InvalidIpToken { .. } => StatusCode::InvalidConfig,
            Error::AddressParse { .. } => StatusCode::InvalidClientAddress,
            Error::Lookup { .. } => StatusCode::LookupFailure,
            Error::BlocklistIo { .. } | Error::ReadBlockPage { .. } => StatusCode::StorageUnavailable,
            Error::EvaluationJoin { .. } => StatusCode::Unexpected,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Renders the whole source chain on one line, e.g. for the `check` command.
pub fn display_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::ResultExt;

    fn invalid_token() -> Result<()> {
        InvalidIpTokenSnafu {
            token: "11.",
            reason: "empty octet",
        }
        .fail()
    }

    #[test]
    fn test_rule_error_keeps_cause() {
        let err = invalid_token().context(InvalidRuleSnafu { index: 2usize }).unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(StatusCode::InvalidConfig, err.status_code());
        assert_eq!(
            "Invalid ipfilter rule #2: Can't parse ip token '11.': empty octet",
            display_chain(&err)
        );
    }

    #[test]
    fn test_request_errors_are_internal() {
        let err = AddressParseSnafu { input: "bogus" }.build();
        assert!(!err.is_config_error());
        assert_eq!(500, err.status_code().http_status());
    }
}
