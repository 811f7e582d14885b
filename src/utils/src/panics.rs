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

pub struct PanicHelper {}

impl PanicHelper {
    /// Routes panics through tracing, so they end up in the log files
    /// instead of only on the terminal.
    pub fn set_hook_default() {
        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let payload = info
                .payload()
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_default();
            match info.location() {
                Some(location) => {
                    tracing::error!(
                        "Oh, Occurred Panic Error panicked at {}:{}: {}",
                        Self::relative_path(location.file()),
                        location.line(),
                        payload
                    );
                }
                None => tracing::error!("Oh, Occurred Panic Error: {}", payload),
            }
            default_hook(info);
        }));
    }

    // Only print source relative file path instead of full path.
    fn relative_path(file_path: &str) -> String {
        match file_path.rsplit_once("/src/") {
            Some((_, relative)) => format!("src/{}", relative),
            None => std::path::Path::new(file_path)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| file_path.to_string()),
        }
    }
}
