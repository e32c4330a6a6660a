//! Output formats and shared text helpers.

use clap::{Args, ValueEnum};
use serde::Serialize;

/// Output format for command results.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// Whether this format is meant for other programs.
    pub const fn is_machine_readable(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// `--format` flag shared by every command.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct FormatArg {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        #[allow(clippy::cast_precision_loss)]
        let result = bytes as f64 / GB as f64;
        format!("{result:.1} GB")
    } else if bytes >= MB {
        #[allow(clippy::cast_precision_loss)]
        let result = bytes as f64 / MB as f64;
        format!("{result:.1} MB")
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}

/// Thousands-separated integer.
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let chunks: Vec<&str> = s
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    chunks.join(",")
}

/// Join a set of display values, or `-` when there are none.
pub fn join_or_dash<'a>(values: impl IntoIterator<Item = &'a String>) -> String {
    let joined = values
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(4096), "4 KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5 MB");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(7), "7");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn test_join_or_dash() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(join_or_dash(&empty), "-");
        let values = vec!["Acme".to_string(), "Globex".to_string()];
        assert_eq!(join_or_dash(&values), "Acme, Globex");
    }
}
