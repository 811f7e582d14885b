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

use crate::waf::error::{LoadConfigSnafu, Result, ValidateConfigSnafu};
use arc_swap::ArcSwap;
use common_telemetry::LoggingOptions;
use config::{Config, FileFormat};
use dotenv::dotenv;
use ipgate_types::ipfilter::Polarity;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::{env, ops::Deref, sync::Arc};
use validator::Validate;

pub const DEFAULT_CFG_PATH_ENV: &str = "IPGATE_CFG_PATH";
pub const DEFAULT_FORWARDED_HEADER: &str = "X-Forwarded-For";

// App Properties.

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfigProperties {
    #[serde(rename = "service-name", default = "default_service_name")]
    #[validate(length(min = 1, max = 32))]
    pub service_name: String,
    #[serde(default = "ServerProperties::default")]
    pub server: ServerProperties,
    #[serde(default = "LoggingOptions::default")]
    pub logging: LoggingOptions,
    #[serde(default = "ForwardProperties::default")]
    pub forward: ForwardProperties,
    #[serde(default = "IpFilterProperties::default")]
    #[validate(nested)]
    pub ipfilter: IpFilterProperties,
}

// Server Properties.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerProperties {
    #[serde(rename = "host")]
    pub host: String,
    #[serde(rename = "port")]
    pub port: u16,
}

// Forward Properties.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ForwardProperties {
    /// The upstream the admitted requests are forwarded to, e.g. "http://127.0.0.1:8080".
    #[serde(rename = "upstream-url")]
    pub upstream_url: Option<String>,
    #[serde(rename = "max-body-bytes")]
    pub max_body_bytes: usize,
    #[serde(rename = "http-proxy")]
    pub http_proxy: Option<String>,
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,
    #[serde(rename = "read-timeout")]
    pub read_timeout: u64,
    #[serde(rename = "total-timeout")]
    pub total_timeout: u64,
    #[serde(rename = "verbose")]
    pub verbose: bool,
}

// IP Filter Properties.

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct IpFilterProperties {
    /// The header carrying the client address set by a trusted reverse proxy.
    #[serde(rename = "forwarded-header", default = "default_forwarded_header")]
    #[validate(length(min = 1))]
    pub forwarded_header: String,
    /// Evaluated in declaration order, the last rule whose scope matches decides.
    #[serde(rename = "rules", default)]
    #[validate(nested)]
    pub rules: Vec<IpFilterRuleProperties>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct IpFilterRuleProperties {
    /// The URL path prefixes this rule applies to.
    #[serde(rename = "paths")]
    #[validate(length(min = 1))]
    pub paths: Vec<String>,
    #[serde(rename = "rule")]
    pub rule: Polarity,
    /// The MaxMind country database, required by `country`.
    #[serde(rename = "database")]
    pub database: Option<String>,
    /// ISO country codes.
    #[serde(rename = "country", default)]
    pub country: Vec<String>,
    /// Addresses, CIDRs, dash ranges or dotted shorthands.
    #[serde(rename = "ip", default)]
    pub ip: Vec<String>,
    #[serde(rename = "prefix-dir")]
    pub prefix_dir: Option<String>,
    #[serde(rename = "blockpage")]
    pub blockpage: Option<String>,
    /// Ignore the forwarded header and only trust the socket peer address.
    #[serde(rename = "strict", default)]
    pub strict: bool,
}

fn default_service_name() -> String {
    String::from("ipgate")
}

fn default_forwarded_header() -> String {
    String::from(DEFAULT_FORWARDED_HEADER)
}

// App Properties impls.

impl Default for AppConfigProperties {
    fn default() -> Self {
        AppConfigProperties {
            service_name: default_service_name(),
            server: ServerProperties::default(),
            logging: LoggingOptions::default(),
            forward: ForwardProperties::default(),
            ipfilter: IpFilterProperties::default(),
        }
    }
}

impl Default for ServerProperties {
    fn default() -> Self {
        ServerProperties {
            host: String::from("127.0.0.1"),
            port: 9000,
        }
    }
}

impl ServerProperties {
    pub fn get_bind_addr(&self) -> String {
        self.host.to_owned() + ":" + &self.port.to_string()
    }
}

impl Default for ForwardProperties {
    fn default() -> Self {
        ForwardProperties {
            upstream_url: None,
            max_body_bytes: 10 * 1024 * 1024,
            http_proxy: None,
            connect_timeout: 5,
            read_timeout: 30,
            total_timeout: 60,
            verbose: false,
        }
    }
}

impl Default for IpFilterProperties {
    fn default() -> Self {
        IpFilterProperties {
            forwarded_header: default_forwarded_header(),
            rules: vec![],
        }
    }
}

#[derive(Debug)]
pub struct AppConfig {
    pub inner: AppConfigProperties,
}

impl Deref for AppConfig {
    type Target = AppConfigProperties;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AppConfig {
    pub fn new(config: &AppConfigProperties) -> Arc<AppConfig> {
        Arc::new(AppConfig { inner: config.clone() })
    }
}

/// Parses a YAML document, used by tests and by `check --stdin` style callers.
pub fn from_yaml_str(yaml: &str) -> Result<AppConfigProperties> {
    let props = Config::builder()
        .add_source(config::File::from_str(yaml, FileFormat::Yaml))
        .build()
        .context(LoadConfigSnafu)?
        .try_deserialize::<AppConfigProperties>()
        .context(LoadConfigSnafu)?;
    props.validate().map_err(|error| ValidateConfigSnafu { error }.build())?;
    Ok(props)
}

/// Loads the configuration file given by `path`, or by the `IPGATE_CFG_PATH`
/// environment, falling back to defaults when neither is set.
pub fn load(path: Option<&str>) -> Result<AppConfigProperties> {
    dotenv().ok(); // Notice: Must be called before parse from environment file (.env).

    let path = path.map(|p| p.to_string()).or_else(|| env::var(DEFAULT_CFG_PATH_ENV).ok());
    let props = match path {
        Some(path) => Config::builder()
            .add_source(config::File::with_name(path.as_str()))
            .add_source(
                // Notice: Use double "_" to distinguish between different hierarchy struct, e.g. IPGATE__SERVER__PORT.
                config::Environment::with_prefix("IPGATE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context(LoadConfigSnafu)?
            .try_deserialize::<AppConfigProperties>()
            .context(LoadConfigSnafu)?,
        None => AppConfigProperties::default(),
    };
    props.validate().map_err(|error| ValidateConfigSnafu { error }.build())?;
    Ok(props)
}

pub fn get_config() -> Arc<AppConfig> {
    CONFIG.load().clone()
}

pub fn refresh_config(path: Option<&str>) -> Result<Arc<AppConfig>> {
    let config = AppConfig::new(&load(path)?);
    CONFIG.store(config.clone());
    Ok(config)
}

// Global the single refreshable configuration instance.
static CONFIG: Lazy<ArcSwap<AppConfig>> =
    Lazy::new(|| ArcSwap::from(AppConfig::new(&AppConfigProperties::default())));

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_rules() {
        let props = from_yaml_str("service-name: ipgate-test").unwrap();
        assert_eq!("ipgate-test", props.service_name);
        assert_eq!("127.0.0.1:9000", props.server.get_bind_addr());
        assert_eq!(DEFAULT_FORWARDED_HEADER, props.ipfilter.forwarded_header);
        assert!(props.ipfilter.rules.is_empty());
        assert!(props.forward.upstream_url.is_none());
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
ipfilter:
  forwarded-header: X-Real-IP
  rules:
    - paths: ["/private", "/blog"]
      rule: block
      ip: ["11.10.12", "192.168.8.4-50 20.20.20.20"]
      country: [us, JP]
      database: ./GeoLite2-Country.mmdb
      blockpage: ./blockpage.html
    - paths: ["/allowed"]
      rule: allow
      prefix-dir: ./whitelisted
      strict: true
"#;
        let props = from_yaml_str(yaml).unwrap();
        let rules = &props.ipfilter.rules;
        assert_eq!("X-Real-IP", props.ipfilter.forwarded_header);
        assert_eq!(2, rules.len());
        assert_eq!(Polarity::Block, rules[0].rule);
        assert_eq!(vec!["/private", "/blog"], rules[0].paths);
        assert_eq!(vec!["11.10.12", "192.168.8.4-50 20.20.20.20"], rules[0].ip);
        assert_eq!(Some("./GeoLite2-Country.mmdb".to_string()), rules[0].database);
        assert!(!rules[0].strict);
        assert_eq!(Polarity::Allow, rules[1].rule);
        assert_eq!(Some("./whitelisted".to_string()), rules[1].prefix_dir);
        assert!(rules[1].country.is_empty());
        assert!(rules[1].strict);
    }

    #[test]
    fn test_invalid_polarity_is_rejected() {
        let yaml = r#"
ipfilter:
  rules:
    - paths: ["/"]
      rule: deny
      ip: ["10.0.0.1"]
"#;
        let err = from_yaml_str(yaml).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_empty_paths_are_rejected() {
        let yaml = r#"
ipfilter:
  rules:
    - paths: []
      rule: allow
      ip: ["10.0.0.1"]
"#;
        let err = from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, crate::waf::error::Error::ValidateConfig { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "server:\n  host: 0.0.0.0\n  port: 8088").unwrap();
        let props = load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!("0.0.0.0:8088", props.server.get_bind_addr());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load(Some("/nonexistent/ipgate.yaml")).unwrap_err();
        assert!(err.is_config_error());
    }
}
