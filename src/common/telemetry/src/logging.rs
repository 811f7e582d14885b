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
use std::env;
use std::sync::Once;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{filter, EnvFilter, Registry};

pub const DEFAULT_LOG_TARGETS: &str = "info";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingOptions {
    /// The directory to store log files. If empty, logs are only written to stdout.
    pub dir: String,

    /// The log level that can be one of "trace", "debug", "info", "warn", "error",
    /// or a comma separated list of targets, e.g. "info,ipgate_server::waf=debug".
    pub level: Option<String>,

    /// The log format that can be one of "json" or "text". Default is "text".
    pub log_format: LogFormat,

    /// The maximum number of log files to keep.
    pub max_log_files: usize,

    /// Whether to append logs to stdout. Default is true.
    pub append_stdout: bool,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Text,
}

impl PartialEq for LoggingOptions {
    fn eq(&self, other: &Self) -> bool {
        self.dir == other.dir
            && self.level == other.level
            && self.log_format == other.log_format
            && self.append_stdout == other.append_stdout
    }
}

impl Eq for LoggingOptions {}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: "./ipgate/logs".to_string(),
            level: None,
            log_format: LogFormat::Text,
            append_stdout: true,
            // Rotation hourly, 24 files per day, keeps info log files of 30 days
            max_log_files: 720,
        }
    }
}

fn rolling_writer(
    opts: &LoggingOptions,
    prefix: &str,
    guards: &mut Vec<WorkerGuard>,
) -> tracing_appender::non_blocking::NonBlocking {
    let rolling_appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| panic!("initializing rolling file appender at {} failed: {}", &opts.dir, e));
    let (writer, guard) = tracing_appender::non_blocking(rolling_appender);
    guards.push(guard);
    writer
}

/// Installs the global subscriber. The returned guards must be held for
/// the lifetime of the process, dropping them flushes and stops the
/// background writers.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        // Enable log compatible layer to convert log record to tracing span.
        LogTracer::init().expect("log tracer must be valid");

        // Configure the stdout logging layer.
        let stdout_logging_layer = if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);

            if opts.log_format == LogFormat::Json {
                Some(
                    Layer::new()
                        .json()
                        .with_writer(writer)
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .boxed(),
                )
            } else {
                Some(
                    Layer::new()
                        .with_writer(writer)
                        .with_ansi(atty::is(atty::Stream::Stdout))
                        .boxed(),
                )
            }
        } else {
            None
        };

        // Configure the file logging layer with rolling policy.
        let file_logging_layer = if !opts.dir.is_empty() {
            let writer = rolling_writer(opts, app_name, &mut guards);
            if opts.log_format == LogFormat::Json {
                Some(Layer::new().json().with_writer(writer).with_ansi(false).boxed())
            } else {
                Some(Layer::new().with_writer(writer).with_ansi(false).boxed())
            }
        } else {
            None
        };

        // Configure the error file logging layer with rolling policy.
        let err_file_logging_layer = if !opts.dir.is_empty() {
            let writer = rolling_writer(opts, &format!("{}-err", app_name), &mut guards);
            if opts.log_format == LogFormat::Json {
                Some(
                    Layer::new()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(filter::LevelFilter::ERROR)
                        .boxed(),
                )
            } else {
                Some(
                    Layer::new()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(filter::LevelFilter::ERROR)
                        .boxed(),
                )
            }
        } else {
            None
        };

        // resolve log level settings from:
        // - options from command line or config files
        // - environment variable: RUST_LOG
        // - default settings
        let filter = resolve_log_targets(opts.level.as_deref(), env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_logging_layer)
            .with(file_logging_layer)
            .with(err_file_logging_layer);

        tracing::subscriber::set_global_default(subscriber).expect("error setting global tracing subscriber");
    });

    guards
}

fn resolve_log_targets(configured: Option<&str>, from_env: Option<&str>) -> filter::Targets {
    configured
        .or(from_env)
        .unwrap_or(DEFAULT_LOG_TARGETS)
        .parse::<filter::Targets>()
        .unwrap_or_else(|e| {
            // The subscriber is not installed yet, so this is the only way to report it.
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Invalid log level settings, fallback to '{}': {}", DEFAULT_LOG_TARGETS, e);
            }
            DEFAULT_LOG_TARGETS.parse().unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_configured_level_wins_over_env() {
        let targets = resolve_log_targets(Some("warn"), Some("trace"));
        assert!(targets.would_enable("ipgate_server", &Level::WARN));
        assert!(!targets.would_enable("ipgate_server", &Level::INFO));
    }

    #[test]
    fn test_per_target_levels() {
        let targets = resolve_log_targets(None, Some("info,ipgate_server::waf=debug"));
        assert!(targets.would_enable("ipgate_server::waf::chain", &Level::DEBUG));
        assert!(!targets.would_enable("ipgate_forwarder", &Level::DEBUG));
    }

    #[test]
    fn test_invalid_level_falls_back_to_default() {
        let targets = resolve_log_targets(Some("ipgate=bogus"), None);
        assert!(targets.would_enable("anything", &Level::INFO));
        assert!(!targets.would_enable("anything", &Level::DEBUG));
    }

    #[test]
    fn test_options_deserialize_kebab_case() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"dir":"","log-format":"json","append-stdout":false}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Json);
        assert!(!opts.append_stdout);
        assert_eq!(opts.max_log_files, 720);
    }
}
