//! Output formatting utilities

use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Self::Text,
            _ => Self::Json,
        }
    }
}

/// Print `data` as pretty JSON, or through `text` in text mode
pub fn emit<T: Serialize>(
    data: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => println!("{}", text(data)),
    }
    Ok(())
}

/// One-line summary of a list of labels
pub fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_str() {
        assert_eq!(OutputFormat::from("TEXT"), OutputFormat::Text);
        assert_eq!(OutputFormat::from("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("table"), OutputFormat::Json);
    }

    #[test]
    fn test_join_or() {
        assert_eq!(join_or(&[], "none"), "none");
        assert_eq!(join_or(&["a".to_string(), "b".to_string()], "none"), "a, b");
    }
}
