use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// What happens when a watch rule fires while its previous run is still in
/// flight.
///
/// - `Serialize`: the rule runs at most once at a time; triggers arriving
///   during a run collapse into a single pending rerun (default).
/// - `Concurrent`: every trigger starts its own run immediately, even if an
///   earlier run of the same rule has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchOverlap {
    #[default]
    Serialize,
    Concurrent,
}

impl FromStr for WatchOverlap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "serialize" => Ok(WatchOverlap::Serialize),
            "concurrent" => Ok(WatchOverlap::Concurrent),
            other => Err(format!(
                "invalid watch_overlap: {other} (expected \"serialize\" or \"concurrent\")"
            )),
        }
    }
}

/// Kind of live-reload signal pushed to connected browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Full page reload.
    Page,
    /// Refresh stylesheets in place.
    Css,
}

impl ReloadKind {
    /// Event name used on the live-reload event stream.
    pub fn event_name(self) -> &'static str {
        match self {
            ReloadKind::Page => "reload",
            ReloadKind::Css => "css",
        }
    }
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Bundler build mode; exported to bundle tasks as `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
        }
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| "duration too large".to_string()),
        "h" => value
            .checked_mul(60 * 60)
            .map(Duration::from_secs)
            .ok_or_else(|| "duration too large".to_string()),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
