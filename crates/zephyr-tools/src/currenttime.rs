//! `currenttime`: the current time in a chosen zone and format.

use crate::args::{optional_bool, optional_str, schema_object};
use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde_json::{Value, json};
use std::fmt::Write;
use tokio_util::sync::CancellationToken;
use zephyr_core::{Arguments, Error, JsonObject, Result, ToolOutput};
use zephyr_plugin::DynamicPlugin;

/// Zone a time is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Coordinated Universal Time
    Utc,
    /// The host's local zone
    Local,
    /// A fixed offset from UTC
    Fixed(FixedOffset),
}

impl Zone {
    /// Parses `"UTC"`, `"Local"` or an offset such as `"+05:30"`, `"-0800"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for anything else.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Self::Utc);
        }
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        parse_offset(trimmed).map(Self::Fixed).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "invalid timezone '{text}' (expected UTC, Local, or an offset like +05:30)"
            ))
        })
    }

    fn apply(self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Self::Utc => now.fixed_offset(),
            Self::Local => now.with_timezone(&Local).fixed_offset(),
            Self::Fixed(offset) => now.with_timezone(&offset),
        }
    }
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if (digits.len() != 2 && digits.len() != 4) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..].parse().ok()?
    } else {
        0
    };
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Renders `time` as `"rfc3339"`, `"rfc2822"`, `"unix"` or a strftime pattern.
fn render(time: &DateTime<FixedOffset>, format: &str) -> Result<String> {
    match format {
        "rfc3339" => Ok(time.to_rfc3339()),
        "rfc2822" => Ok(time.to_rfc2822()),
        "unix" => Ok(time.timestamp().to_string()),
        pattern => {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(Error::InvalidArgument(format!(
                    "invalid time format '{pattern}'"
                )));
            }
            let mut rendered = String::new();
            write!(rendered, "{}", time.format_with_items(StrftimeItems::new(pattern))).map_err(
                |_| Error::InvalidArgument(format!("time format '{pattern}' cannot be rendered")),
            )?;
            Ok(rendered)
        }
    }
}

/// Reports the current time.
#[derive(Debug, Clone)]
pub struct CurrentTime {
    default_zone: String,
}

impl Default for CurrentTime {
    fn default() -> Self {
        Self::new("UTC")
    }
}

impl CurrentTime {
    /// Tool name.
    pub const NAME: &'static str = "currenttime";

    /// Creates the tool with the zone used when a call names none.
    #[must_use]
    pub fn new(default_zone: impl Into<String>) -> Self {
        Self {
            default_zone: default_zone.into(),
        }
    }

    /// Builds the response for `args` at the instant `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a bad zone or format.
    pub fn describe(&self, now: DateTime<Utc>, args: &Arguments) -> Result<Value> {
        let zone_name = optional_str(args, "timezone")?.unwrap_or(self.default_zone.as_str());
        let format = optional_str(args, "format")?.unwrap_or("rfc3339");
        let include_utc = optional_bool(args, "include_utc")?.unwrap_or(true);

        let zone = Zone::parse(zone_name)?;
        let local = zone.apply(now);

        let mut response = json!({
            "time": render(&local, format)?,
            "timezone": zone_name,
            "format": format,
            "unix": local.timestamp(),
        });
        if include_utc && zone != Zone::Utc {
            response["utc"] = json!({
                "time": render(&now.fixed_offset(), format)?,
                "unix": now.timestamp(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl DynamicPlugin for CurrentTime {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Get the current time in a chosen timezone and format"
    }

    fn input_schema(&self) -> JsonObject {
        let schema = json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "UTC, Local, or a fixed offset such as +05:30",
                    "default": self.default_zone,
                },
                "format": {
                    "type": "string",
                    "description": "rfc3339, rfc2822, unix, or a strftime pattern",
                    "default": "rfc3339",
                },
                "include_utc": {
                    "type": "boolean",
                    "description": "Also report UTC when another zone is requested",
                    "default": true,
                },
            },
        });
        schema_object(schema)
    }

    async fn execute(&self, _ct: CancellationToken, args: Arguments) -> Result<ToolOutput> {
        self.describe(Utc::now(), &args).map(ToolOutput::structured)
    }
}
