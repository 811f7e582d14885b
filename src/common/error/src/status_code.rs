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

use strum::{AsRefStr, EnumIter, EnumString, FromRepr};

/// Common status code for public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, EnumIter, FromRepr)]
pub enum StatusCode {
    // ====== Begin of common status code ==============
    /// Success.
    Success = 0,
    /// Unknown error.
    Unknown = 1000,
    /// Unsupported operation.
    Unsupported = 1001,
    /// Unexpected error, maybe there is a BUG.
    Unexpected = 1002,
    /// Internal server error.
    Internal = 1003,
    /// Invalid arguments.
    InvalidArguments = 1004,
    // ====== End of common status code ================

    // ====== Begin of configuration related status code =====
    /// The configuration could not be read or parsed.
    InvalidConfig = 2000,
    /// A file or directory named by the configuration does not exist.
    FileNotFound = 2001,
    // ====== End of configuration related status code =======

    // ====== Begin of request related status code ===========
    /// The client address could not be determined.
    InvalidClientAddress = 3000,
    /// An external lookup (e.g. geolocation) failed.
    LookupFailure = 3001,
    /// A storage backend (e.g. the filesystem) failed.
    StorageUnavailable = 3002,
    // ====== End of request related status code =============
}

impl StatusCode {
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Returns true when the failure was caused by the caller's input or
    /// configuration rather than by the server itself.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StatusCode::InvalidArguments | StatusCode::InvalidConfig | StatusCode::FileNotFound
        )
    }

    /// Maps to the HTTP status a request handler should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            StatusCode::Success => 200,
            StatusCode::InvalidArguments => 400,
            StatusCode::FileNotFound => 404,
            StatusCode::Unsupported => 501,
            StatusCode::Unknown
            | StatusCode::Unexpected
            | StatusCode::Internal
            | StatusCode::InvalidConfig
            | StatusCode::InvalidClientAddress
            | StatusCode::LookupFailure
            | StatusCode::StorageUnavailable => 500,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The current debug format is suitable to display.
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_status_code_from_repr() {
        for code in StatusCode::iter() {
            assert_eq!(Some(code), StatusCode::from_repr(code as usize));
        }
        assert_eq!(None, StatusCode::from_repr(4242));
    }

    #[test]
    fn test_request_failures_are_server_errors() {
        assert_eq!(500, StatusCode::InvalidClientAddress.http_status());
        assert_eq!(500, StatusCode::LookupFailure.http_status());
        assert_eq!(500, StatusCode::StorageUnavailable.http_status());
        assert!(!StatusCode::StorageUnavailable.is_user_error());
        assert!(StatusCode::InvalidConfig.is_user_error());
    }

    #[test]
    fn test_is_success() {
        assert!(StatusCode::is_success(0));
        assert!(!StatusCode::is_success(1003));
    }
}
