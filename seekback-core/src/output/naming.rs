//! Output file naming from a `%s` template.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, TimeZone};

use crate::error::{Result, SeekbackError};

const PLACEHOLDER: &str = "%s";

/// A file name template containing exactly one `%s`, replaced by the RFC 3339
/// trigger timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    prefix: String,
    suffix: String,
}

impl NameTemplate {
    /// Parse `template`.
    ///
    /// # Errors
    /// `SeekbackError::Config` unless the template contains exactly one `%s`.
    pub fn parse(template: &str) -> Result<Self> {
        let count = template.matches(PLACEHOLDER).count();
        if count != 1 {
            return Err(SeekbackError::Config(format!(
                "file name template {template:?} must contain exactly one %s (found {count})"
            )));
        }
        let (prefix, suffix) = template
            .split_once(PLACEHOLDER)
            .ok_or_else(|| SeekbackError::Config(format!("missing %s in {template:?}")))?;
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// Path for a dump triggered at `at`.
    pub fn render<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: fmt::Display,
    {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        PathBuf::from(format!("{}{stamp}{}", self.prefix, self.suffix))
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self {
            prefix: "seekback-".into(),
            suffix: ".aiff".into(),
        }
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PLACEHOLDER}{}", self.prefix, self.suffix)
    }
}
