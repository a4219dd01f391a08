use std::path::PathBuf;
use std::time::Duration;

use concierge_core::DelegateSettings;
use url::Url;

pub const DELEGATE_TIMEOUT_ENV: &str = "CONCIERGE_DELEGATE_TIMEOUT_MS";
pub const MIN_REPLY_CHARS_ENV: &str = "CONCIERGE_MIN_REPLY_CHARS";
pub const TICKET_SERVICE_URL_ENV: &str = "CONCIERGE_TICKET_SERVICE_URL";
pub const REASONING_URL_ENV: &str = "CONCIERGE_REASONING_URL";
pub const TICKETS_FILE_ENV: &str = "CONCIERGE_TICKETS_FILE";
pub const REQUIRE_HTTPS_ENV: &str = "CONCIERGE_REQUIRE_HTTPS";

const DEFAULT_TIMEOUT_MS: u64 = 3000;
const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MIN_REPLY_CHARS: u64 = 40;
const DEFAULT_PORT: u16 = 3000;

/// Runtime configuration read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub require_https: bool,
    pub delegate: DelegateSettings,
    /// Remote validation/pricing/recommendation service; in-process reference when unset
    pub ticket_service_url: Option<Url>,
    /// Remote reasoning delegate; templates only when unset
    pub reasoning_url: Option<Url>,
    /// JSON ticket records for the in-process registry
    pub tickets_file: Option<PathBuf>,
}

fn parse_env_bool_flag(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

fn parse_env_u64_with_bounds(
    name: &str,
    raw: Option<String>,
    min: u64,
    max: u64,
    default: u64,
) -> u64 {
    let Some(raw) = raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(parsed) => {
            let bounded = parsed.clamp(min, max);
            if bounded != parsed {
                tracing::warn!(env = name, value = parsed, min, max, "value out of range, clamped");
            }
            bounded
        }
        Err(err) => {
            tracing::warn!(
                env = name,
                value = %raw,
                error = %err,
                default,
                "ignoring unparsable value"
            );
            default
        }
    }
}

fn parse_env_url(name: &str, raw: Option<String>) -> Option<Url> {
    let raw = raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())?;
    match Url::parse(&raw) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(env = name, error = %err, "ignoring invalid URL");
            None
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let timeout_ms = parse_env_u64_with_bounds(
            DELEGATE_TIMEOUT_ENV,
            lookup(DELEGATE_TIMEOUT_ENV),
            MIN_TIMEOUT_MS,
            MAX_TIMEOUT_MS,
            DEFAULT_TIMEOUT_MS,
        );
        let min_reply_chars = parse_env_u64_with_bounds(
            MIN_REPLY_CHARS_ENV,
            lookup(MIN_REPLY_CHARS_ENV),
            0,
            2000,
            DEFAULT_MIN_REPLY_CHARS,
        );
        let port = match lookup("PORT").map(|v| v.trim().to_string()) {
            Some(raw) if !raw.is_empty() => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(env = "PORT", value = %raw, error = %err, "ignoring unparsable port");
                DEFAULT_PORT
            }),
            _ => DEFAULT_PORT,
        };

        Self {
            port,
            require_https: parse_env_bool_flag(lookup(REQUIRE_HTTPS_ENV), false),
            delegate: DelegateSettings {
                timeout: Duration::from_millis(timeout_ms),
                min_reply_chars: min_reply_chars as usize,
            },
            ticket_service_url: parse_env_url(TICKET_SERVICE_URL_ENV, lookup(TICKET_SERVICE_URL_ENV)),
            reasoning_url: parse_env_url(REASONING_URL_ENV, lookup(REASONING_URL_ENV)),
            tickets_file: lookup(TICKETS_FILE_ENV)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
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
    fn defaults_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 3000);
        assert!(!cfg.require_https);
        assert_eq!(cfg.delegate.timeout, Duration::from_millis(3000));
        assert_eq!(cfg.delegate.min_reply_chars, 40);
        assert!(cfg.ticket_service_url.is_none());
        assert!(cfg.reasoning_url.is_none());
        assert!(cfg.tickets_file.is_none());
    }

    #[test]
    fn timeout_is_clamped() {
        assert_eq!(
            config(&[(DELEGATE_TIMEOUT_ENV, "5")]).delegate.timeout,
            Duration::from_millis(100)
        );
        assert_eq!(
            config(&[(DELEGATE_TIMEOUT_ENV, "60000")]).delegate.timeout,
            Duration::from_millis(10_000)
        );
        assert_eq!(
            config(&[(DELEGATE_TIMEOUT_ENV, "soon")]).delegate.timeout,
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let cfg = config(&[
            (MIN_REPLY_CHARS_ENV, "forty"),
            (DELEGATE_TIMEOUT_ENV, "  "),
            ("PORT", "-1"),
        ]);
        assert_eq!(cfg.delegate.min_reply_chars, 40);
        assert_eq!(cfg.delegate.timeout, Duration::from_millis(3000));
        assert_eq!(cfg.port, 3000);

        assert_eq!(parse_env_u64_with_bounds("X", Some("12".to_string()), 0, 10, 5), 10);
        assert_eq!(parse_env_u64_with_bounds("X", Some("1.5".to_string()), 0, 10, 5), 5);
        assert_eq!(parse_env_u64_with_bounds("X", None, 0, 10, 5), 5);
    }

    #[test]
    fn port_is_read_from_the_environment() {
        assert_eq!(config(&[("PORT", " 8080 ")]).port, 8080);
        assert_eq!(config(&[("PORT", "70000")]).port, 3000);
    }

    #[test]
    fn bool_flag_accepts_common_spellings() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(parse_env_bool_flag(Some(raw.to_string()), false), "{raw}");
        }
        assert!(!parse_env_bool_flag(Some("nope".to_string()), true));
        assert!(parse_env_bool_flag(None, true));
    }

    #[test]
    fn invalid_urls_are_ignored() {
        let cfg = config(&[
            (TICKET_SERVICE_URL_ENV, "not a url"),
            (REASONING_URL_ENV, "http://localhost:8081/reply"),
            (TICKETS_FILE_ENV, "/data/tickets.json"),
        ]);
        assert!(cfg.ticket_service_url.is_none());
        assert_eq!(
            cfg.reasoning_url.unwrap().as_str(),
            "http://localhost:8081/reply"
        );
        assert_eq!(cfg.tickets_file.unwrap(), PathBuf::from("/data/tickets.json"));
    }
}
