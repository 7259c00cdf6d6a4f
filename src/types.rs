// src/types.rs

//! Small shared types: name aliases, port pairs and duration strings.

use std::str::FromStr;
use std::time::Duration;

/// Name of a rule as written in `[rule.<name>]`.
pub type RuleName = String;

/// A command string after a matched path has been substituted into a rule's
/// template. This is the identity of a unit of work.
pub type RenderedCommand = String;

const DEFAULT_DEV_PORT: u16 = 8080;

/// Dev/app port pair as given on the command line, e.g. `8080:8888`.
///
/// - `":9000"` means dev port 8080, app port 9000.
/// - `"3000"` means dev port 3000, app port 3001.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub dev: u16,
    pub app: u16,
}

impl PortSpec {
    /// App port used when only a dev port is known.
    pub fn app_for(dev: u16) -> Result<u16, String> {
        dev.checked_add(1)
            .ok_or_else(|| format!("cannot derive app port from dev port {dev}"))
    }
}

impl FromStr for PortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dev_part, app_part) = match s.trim().split_once(':') {
            Some((dev, app)) => (dev.trim(), Some(app.trim())),
            None => (s.trim(), None),
        };

        let dev = if dev_part.is_empty() {
            DEFAULT_DEV_PORT
        } else {
            parse_port(dev_part)?
        };

        let app = match app_part {
            Some(app) if !app.is_empty() => parse_port(app)?,
            _ => Self::app_for(dev)?,
        };

        Ok(PortSpec { dev, app })
    }
}

fn parse_port(s: &str) -> Result<u16, String> {
    s.parse::<u16>()
        .map_err(|e| format!("invalid port '{s}': {e}"))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let dur = match unit.as_str() {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 60 * 60),
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    if dur.is_zero() {
        return Err(format!("duration '{s}' must be greater than zero"));
    }
    Ok(dur)
}
