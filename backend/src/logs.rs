use std::fmt::{self, Write as _};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use tracing::warn;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Same shape as Python logging's default asctime: `2023-02-07 09:00:00,000`.
const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTimezone {
    Jst,
    Utc,
    Local,
}

impl FromStr for LogTimezone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "jst" | "asia/tokyo" | "+09:00" => Ok(Self::Jst),
            "utc" | "z" | "+00:00" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown log timezone: {other}")),
        }
    }
}

/// 按指定时区渲染日志时间戳的 timer，供 `tracing_subscriber::fmt` 使用
#[derive(Debug, Clone)]
pub struct ZonedTimer {
    zone: LogTimezone,
    datefmt: Option<String>,
}

/// strftime 模式里只要有一个无法识别的 `%` 指令就视为无效
pub fn datefmt_is_valid(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

impl ZonedTimer {
    /// An invalid `datefmt` is dropped in favour of the default format.
    pub fn new(zone: LogTimezone, datefmt: Option<String>) -> Self {
        let datefmt = datefmt.filter(|p| datefmt_is_valid(p));
        Self { zone, datefmt }
    }

    pub fn render(&self, at: DateTime<Utc>) -> String {
        match self.zone {
            LogTimezone::Utc => self.format_in(at),
            LogTimezone::Local => self.format_in(at.with_timezone(&Local)),
            LogTimezone::Jst => match FixedOffset::east_opt(JST_OFFSET_SECS) {
                Some(jst) => self.format_in(at.with_timezone(&jst)),
                None => self.format_in(at),
            },
        }
    }

    fn format_in<Tz>(&self, at: DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let pattern = self.datefmt.as_deref().unwrap_or(DEFAULT_TIME_FORMAT);
        let mut out = String::new();
        if write!(out, "{}", at.format(pattern)).is_err() {
            out.clear();
            let _ = write!(out, "{}", at.format(DEFAULT_TIME_FORMAT));
        }
        out
    }
}

impl FormatTime for ZonedTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", self.render(Utc::now()))
    }
}

pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ZonedTimer::new(
            config.log_timezone,
            config.log_datefmt.clone(),
        ))
        .init();

    if let Some(pattern) = config.log_datefmt.as_deref().filter(|p| !datefmt_is_valid(p)) {
        warn!(
            "Ignoring invalid LAB_LOG_DATEFMT {:?}, using {:?}",
            pattern, DEFAULT_TIME_FORMAT
        );
    }
}
