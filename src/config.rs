// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SUPABASE_URL` | Hosted backend project URL | In-memory backend when unset |
//! | `SUPABASE_ANON_KEY` | Hosted backend public (anon) key | In-memory backend when unset |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `HTTP_TIMEOUT_SECS` | Timeout for hosted backend requests | `15` |
//! | `SETTLE_TIMEOUT_MS` | How long sign-in waits for the profile load | `5000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

/// Environment variable name for the hosted backend project URL.
pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";

/// Environment variable name for the hosted backend anon key.
///
/// This is the public key the browser client would use; row access is
/// still governed by the signed-in user's token.
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const HTTP_TIMEOUT_ENV: &str = "HTTP_TIMEOUT_SECS";
pub const SETTLE_TIMEOUT_ENV: &str = "SETTLE_TIMEOUT_MS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration resolved at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub host: String,
    pub port: u16,
    pub http_timeout: Duration,
    pub settle_timeout: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve configuration through an arbitrary lookup.
    ///
    /// Blank values count as unset; unparsable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            supabase_url: get(SUPABASE_URL_ENV),
            supabase_anon_key: get(SUPABASE_ANON_KEY_ENV),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: get(PORT_ENV)
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            http_timeout: get(HTTP_TIMEOUT_ENV)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            settle_timeout: get(SETTLE_TIMEOUT_ENV)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SETTLE_TIMEOUT),
            log_format,
        }
    }

    /// Both hosted backend settings are present.
    pub fn hosted_backend_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_anon_key.is_some()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::default();
        assert!(!config.hosted_backend_configured());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn reads_values_and_ignores_blanks() {
        let config = config(&[
            (SUPABASE_URL_ENV, "https://proj.supabase.co"),
            (SUPABASE_ANON_KEY_ENV, "   "),
            (PORT_ENV, "9000"),
            (LOG_FORMAT_ENV, "JSON"),
            (SETTLE_TIMEOUT_ENV, "250"),
        ]);
        assert_eq!(
            config.supabase_url.as_deref(),
            Some("https://proj.supabase.co")
        );
        assert!(config.supabase_anon_key.is_none());
        assert!(!config.hosted_backend_configured());
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.settle_timeout, Duration::from_millis(250));
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[(PORT_ENV, "http"), (HTTP_TIMEOUT_ENV, "-1")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }
}
