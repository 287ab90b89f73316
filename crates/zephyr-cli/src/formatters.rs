//! Output formatters for CLI commands.
//!
//! Every command renders its result through [`format_output`] so `--format`
//! behaves the same everywhere.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use zephyr_core::cli::OutputFormat;

/// Formats `data` in the requested output format.
///
/// # Errors
///
/// Returns an error if `data` cannot be serialized.
///
/// # Examples
///
/// ```
/// use serde::Serialize;
/// use zephyr_cli::formatters::format_output;
/// use zephyr_core::cli::OutputFormat;
///
/// #[derive(Serialize)]
/// struct Status {
///     loaded: bool,
///     name: String,
/// }
///
/// let status = Status { loaded: true, name: "echo".to_string() };
/// assert_eq!(format_output(&status, OutputFormat::Text)?, "loaded: true\nname: echo");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::Text => text::format(data),
        OutputFormat::Pretty => pretty::format(data),
    }
}

/// Compact line-oriented output for scripts.
pub mod text {
    use super::{Result, Serialize, Value};

    /// Formats an object as one `key: value` line per field.
    ///
    /// Scalars print bare, nested values print as compact JSON. A
    /// top-level array prints one element per line.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        let lines: Vec<String> = match &value {
            Value::Object(map) => map
                .iter()
                .map(|(key, val)| format!("{key}: {}", scalar(val)))
                .collect(),
            Value::Array(items) => items.iter().map(scalar).collect(),
            other => vec![scalar(other)],
        };
        Ok(lines.join("\n"))
    }

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => "-".to_string(),
            other => other.to_string(),
        }
    }
}

/// Colored, indented output for terminals.
pub mod pretty {
    use super::{Colorize, Result, Serialize, Value, Write};

    const INDENT: &str = "  ";

    /// Formats `data` as a colored tree.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        let mut out = String::new();
        render(&mut out, &value, 0)?;
        Ok(out)
    }

    fn render(out: &mut String, value: &Value, depth: usize) -> std::fmt::Result {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (i, (key, val)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    write!(out, "{}{}:", INDENT.repeat(depth), key.blue().bold())?;
                    if is_nested(val) {
                        out.push('\n');
                        render(out, val, depth + 1)?;
                    } else {
                        out.push(' ');
                        leaf(out, val)?;
                    }
                }
                Ok(())
            }
            Value::Array(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    write!(out, "{}{}", INDENT.repeat(depth), "-".dimmed())?;
                    if is_nested(item) {
                        out.push('\n');
                        render(out, item, depth + 1)?;
                    } else {
                        out.push(' ');
                        leaf(out, item)?;
                    }
                }
                Ok(())
            }
            other => {
                out.push_str(&INDENT.repeat(depth));
                leaf(out, other)
            }
        }
    }

    fn is_nested(value: &Value) -> bool {
        match value {
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => false,
        }
    }

    fn leaf(out: &mut String, value: &Value) -> std::fmt::Result {
        match value {
            Value::Null => write!(out, "{}", "null".dimmed()),
            Value::Bool(b) => write!(out, "{}", b.to_string().yellow()),
            Value::Number(n) => write!(out, "{}", n.to_string().cyan()),
            Value::String(s) => write!(out, "{}", s.green()),
            Value::Array(_) => out.write_str("[]"),
            Value::Object(_) => out.write_str("{}"),
        }
    }
}
