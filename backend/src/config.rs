use std::time::Duration;

use crate::logs::LogTimezone;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8001;

/// 启动时从环境变量读取的服务配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_timezone: LogTimezone,
    pub log_datefmt: Option<String>,
    pub sse_interval: Duration,
    pub baz_unit: Duration,
    pub cors_allow_any: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_timezone: LogTimezone::Jst,
            log_datefmt: None,
            sse_interval: Duration::from_millis(1000),
            baz_unit: Duration::from_millis(1000),
            cors_allow_any: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            host: get("LAB_HOST").unwrap_or(defaults.host),
            port: get("LAB_PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            log_timezone: get("LAB_LOG_TZ")
                .and_then(|v| v.parse::<LogTimezone>().ok())
                .unwrap_or(defaults.log_timezone),
            log_datefmt: get("LAB_LOG_DATEFMT"),
            sse_interval: get("LAB_SSE_INTERVAL_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sse_interval),
            baz_unit: get("LAB_BAZ_UNIT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.baz_unit),
            cors_allow_any: get("LAB_CORS_ALLOW_ANY")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.cors_allow_any),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8001");
        assert_eq!(cfg.log_timezone, LogTimezone::Jst);
        assert_eq!(cfg.log_datefmt, None);
        assert_eq!(cfg.sse_interval, Duration::from_secs(1));
        assert!(cfg.cors_allow_any);
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let cfg = config_from(&[
            ("LAB_HOST", " 127.0.0.1 "),
            ("LAB_PORT", "not-a-port"),
            ("LAB_LOG_TZ", "UTC"),
            ("LAB_LOG_DATEFMT", "%Y-%m-%dT%H:%M:%SZ"),
            ("LAB_SSE_INTERVAL_MS", "5"),
            ("LAB_BAZ_UNIT_MS", "   "),
            ("LAB_CORS_ALLOW_ANY", "off"),
        ]);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8001");
        assert_eq!(cfg.log_timezone, LogTimezone::Utc);
        assert_eq!(cfg.log_datefmt.as_deref(), Some("%Y-%m-%dT%H:%M:%SZ"));
        assert_eq!(cfg.sse_interval, Duration::from_millis(5));
        assert_eq!(cfg.baz_unit, Duration::from_secs(1));
        assert!(!cfg.cors_allow_any);
    }
}
