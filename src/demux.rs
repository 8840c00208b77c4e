//! Cleaning and attribution of container runtime output.
//!
//! `docker-compose up` interleaves log lines of every service it attaches
//! to, each prefixed with `<service>-<index> | `, plus its own progress
//! lines. [`ServiceFilter`] keeps only the lines of one service.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").expect("ANSI pattern is valid"));

/// Remove terminal control sequences (`ESC [ digits/; letter`).
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}

/// ANSI-strip and trim output that is already scoped to one container.
pub fn clean(text: &str) -> String {
    strip_ansi(text).trim().to_string()
}

/// Matches and strips the log prefix of one compose service.
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    prefix: Regex,
}

impl ServiceFilter {
    /// Build a filter for `service`. The name is matched literally and
    /// case-insensitively; compose v2 (`-1`) and v1 (`_1`) suffixes both
    /// match.
    pub fn new(service: &str) -> Result<Self, regex::Error> {
        let pattern = format!(r"^{}[-_]\d+\s+\|\s*", regex::escape(service));
        let prefix = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        Ok(Self { prefix })
    }

    /// Strip ANSI sequences, keep this service's lines without their
    /// prefix, and join them. Returns an empty string when nothing matched.
    pub fn attribute(&self, raw: &str) -> String {
        let stripped = strip_ansi(raw);
        stripped
            .split('\n')
            .filter_map(|line| {
                self.prefix
                    .find(line)
                    .map(|m| line[m.end()..].trim())
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}
