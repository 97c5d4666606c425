//! Append-only diagnostic log collected during one conversion.
//!
//! A [`TraceLog`] is created per conversion and handed back to the caller
//! inside [`crate::output::ConversionOutput`] (or inside the fatal error
//! variants that carry one). Nothing in the pipeline shares it, so concurrent
//! conversions never interleave their entries.
//!
//! Every entry is also emitted as a `tracing` DEBUG event under the
//! `mhtml2md::trace` target, which lets the CLI surface it with `-v` without
//! holding on to the log.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered list of human-readable diagnostic lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceLog {
    entries: Vec<String>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn push(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(target: "mhtml2md::trace", "{}", entry);
        self.entries.push(entry);
    }

    /// All entries in the order they were recorded.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries joined with `\n`, one per line.
    pub fn as_text(&self) -> String {
        self.entries.join("\n")
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Display for TraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_order() {
        let mut log = TraceLog::new();
        log.push("first");
        log.push(String::from("second"));
        assert_eq!(log.entries(), &["first".to_string(), "second".to_string()]);
        assert_eq!(log.as_text(), "first\nsecond");
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = TraceLog::new();
        log.push("x");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.as_text(), "");
    }

    #[test]
    fn serialises_as_plain_array() {
        let mut log = TraceLog::new();
        log.push("boundary found");
        let json = serde_json::to_string(&log).unwrap();
        assert_eq!(json, r#"["boundary found"]"#);
    }
}
