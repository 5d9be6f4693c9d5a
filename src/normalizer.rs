//! Log normalization
//!
//! Turns raw container log text into a bounded [`LogWindow`] that the
//! classifiers can analyze. Normalization is pure: the same input and bound
//! always produce the same window.

use serde::Serialize;
use thiserror::Error;

/// Error returned when there is nothing to normalize
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// Raw text was empty or contained only blank lines
    #[error("log input is empty")]
    Empty,
    /// A window bound of zero lines can never hold anything
    #[error("max_lines must be greater than zero")]
    ZeroBound,
}

impl InputError {
    pub fn kind(&self) -> &'static str {
        "InputError"
    }
}

/// An ordered, bounded window of log lines for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogWindow {
    source: Option<String>,
    /// Trace id of the triage cycle this window belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    lines: Vec<String>,
    /// Number of non-blank lines dropped from the front to respect the bound
    truncated: usize,
}

impl LogWindow {
    /// Attach the target id the window was fetched from
    pub fn labelled(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Case-sensitive substring search across all lines
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Join the window back into newline-separated text
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Normalize raw log text into a window of at most `max_lines` lines.
///
/// Trailing whitespace is stripped from every line, blank lines are dropped,
/// and when more than `max_lines` remain the oldest ones are discarded.
pub fn normalize(raw_text: &str, max_lines: usize) -> Result<LogWindow, InputError> {
    if max_lines == 0 {
        return Err(InputError::ZeroBound);
    }

    let mut lines: Vec<String> = raw_text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim_start().is_empty())
        .map(ToString::to_string)
        .collect();

    if lines.is_empty() {
        return Err(InputError::Empty);
    }

    let truncated = lines.len().saturating_sub(max_lines);
    if truncated > 0 {
        lines.drain(..truncated);
    }

    Ok(LogWindow {
        source: None,
        trace_id: None,
        lines,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_whitespace_and_blank_lines() {
        let raw = "first line   \n\n   \nsecond\t\r\n\nthird";
        let window = normalize(raw, 10).unwrap();
        assert_eq!(window.lines(), &["first line", "second", "third"]);
        assert_eq!(window.truncated(), 0);
    }

    #[test]
    fn test_keeps_most_recent_lines() {
        let raw = (1..=10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let window = normalize(&raw, 3).unwrap();
        assert_eq!(window.lines(), &["line 8", "line 9", "line 10"]);
        assert_eq!(window.truncated(), 7);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert_eq!(normalize("", 5), Err(InputError::Empty));
        assert_eq!(normalize("  \n\t\n", 5), Err(InputError::Empty));
    }

    #[test]
    fn test_zero_bound_is_rejected() {
        assert_eq!(normalize("boom", 0), Err(InputError::ZeroBound));
    }

    #[test]
    fn test_leading_whitespace_is_preserved() {
        let raw = "Exception in thread main\n    at com.example.Main(Main.java:10)";
        let window = normalize(raw, 5).unwrap();
        assert_eq!(window.lines()[1], "    at com.example.Main(Main.java:10)");
    }

    #[test]
    fn test_bound_order_and_blank_invariants_hold() {
        let inputs = [
            "a\nb\nc",
            "\n\nx  \n\ny\n",
            "only",
            "1\n2\n3\n4\n5\n6\n7\n8\n9",
            "tab\t\n \n  indented\nlast   ",
        ];
        for raw in inputs {
            let expected: Vec<&str> = raw
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.trim().is_empty())
                .collect();
            for max_lines in 1..=6 {
                let window = normalize(raw, max_lines).unwrap();
                assert!(window.len() <= max_lines);
                assert!(window.lines().iter().all(|l| !l.trim().is_empty()));
                // Output is always a suffix of the cleaned input, so order is preserved
                let tail = &expected[expected.len() - window.len()..];
                assert_eq!(window.lines(), tail);
            }
        }
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = "x\n\ny  \nz";
        assert_eq!(normalize(raw, 2), normalize(raw, 2));
    }

    #[test]
    fn test_labelled_window() {
        let window = normalize("boom", 1).unwrap().labelled("api");
        assert_eq!(window.source(), Some("api"));
        assert!(window.contains("boo"));
        assert_eq!(window.text(), "boom");
    }
}
