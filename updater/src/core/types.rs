//! Shared deterministic types for checkout tasks.
//!
//! These types define stable contracts between the checkout task, the update
//! client and the caller. They do not depend on external state or I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::path::{is_contained, last_path_component};

/// How much of the remote tree is materialized locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Only the target directory itself.
    Empty,
    /// The directory and its file children.
    Files,
    /// The directory, its files and empty child directories.
    Immediates,
    /// The whole tree.
    #[default]
    Infinity,
    /// Leave depth up to the client (no explicit depth argument).
    Unknown,
}

impl Depth {
    /// Value for the client's `--depth` argument, `None` for [`Depth::Unknown`].
    pub fn as_arg(self) -> Option<&'static str> {
        match self {
            Self::Empty => Some("empty"),
            Self::Files => Some("files"),
            Self::Immediates => Some("immediates"),
            Self::Infinity => Some("infinity"),
            Self::Unknown => None,
        }
    }
}

impl FromStr for Depth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "files" => Ok(Self::Files),
            "immediates" => Ok(Self::Immediates),
            "infinity" => Ok(Self::Infinity),
            "unknown" | "as-it-is" => Ok(Self::Unknown),
            other => Err(anyhow!("unknown depth '{other}'")),
        }
    }
}

/// A point in the repository history.
///
/// Serializes as its canonical string form (`HEAD`, `42`, `{2024-01-02T03:04:05Z}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Revision {
    Head,
    Number(u64),
    Date(DateTime<FixedOffset>),
}

impl Revision {
    /// Timestamp carried by a date revision.
    pub fn date(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, Self::Head)
    }

    /// Human-readable rendering used in the build log.
    ///
    /// Date revisions render as `'yyyy-MM-ddTHH:mm:ss.SSS +zzzz'` (quoted), everything
    /// else as its canonical form.
    pub fn display_name(&self) -> String {
        match self.date() {
            Some(date) => date.format("'%Y-%m-%dT%H:%M:%S%.3f %z'").to_string(),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => write!(f, "HEAD"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(date) => write!(
                f,
                "{{{}}}",
                date.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.fZ")
            ),
        }
    }
}

impl FromStr for Revision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("head") {
            return Ok(Self::Head);
        }
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            let n = s
                .parse::<u64>()
                .map_err(|e| anyhow!("invalid revision number '{s}': {e}"))?;
            return Ok(Self::Number(n));
        }
        let inner = s
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);
        parse_date(inner)
            .map(Self::Date)
            .ok_or_else(|| anyhow!("invalid revision '{s}'"))
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Revision {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Parse the date forms accepted inside `{...}`; zone-less values are UTC.
fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(date) = DateTime::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Remote source to check out, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLocation {
    /// Repository URL, optionally pinned with an `@REV` suffix.
    pub remote: String,
    /// Directory below the workspace root. Defaults to the last URL path segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(default)]
    pub depth: Depth,
    #[serde(default)]
    pub ignore_externals: bool,
}

impl CheckoutLocation {
    pub fn new(remote: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            local: None,
            depth: Depth::default(),
            ignore_externals: false,
        }
    }

    pub fn with_local(mut self, local: impl Into<String>) -> Self {
        self.local = Some(local.into());
        self
    }

    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_ignore_externals(mut self, ignore: bool) -> Self {
        self.ignore_externals = ignore;
        self
    }

    /// Repository URL without the `@REV` pin.
    pub fn url(&self) -> &str {
        match self.pin_split() {
            Some(idx) => &self.remote[..idx],
            None => &self.remote,
        }
    }

    /// Revision pinned by an `@REV` suffix on the remote, if any.
    pub fn revision_pin(&self) -> Result<Option<Revision>> {
        match self.pin_split() {
            Some(idx) => {
                let pin = &self.remote[idx + 1..];
                let revision = pin
                    .parse::<Revision>()
                    .map_err(|e| anyhow!("bad revision pin in {}: {e}", self.remote))?;
                Ok(Some(revision))
            }
            None => Ok(None),
        }
    }

    /// Local directory name relative to the workspace root.
    pub fn local_dir(&self) -> String {
        match self.local.as_deref().map(str::trim) {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => last_path_component(self.url()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.trim().is_empty() {
            return Err(anyhow!("location remote must be non-empty"));
        }
        self.revision_pin()?;
        let local = self.local_dir();
        if local.is_empty() {
            return Err(anyhow!("cannot derive a local directory from {}", self.remote));
        }
        if local != "." && !is_contained(&local) {
            return Err(anyhow!(
                "local directory '{local}' must be relative and stay inside the workspace"
            ));
        }
        Ok(())
    }

    /// `@` after the last `/` separates the pin; earlier ones belong to user info.
    fn pin_split(&self) -> Option<usize> {
        let path_start = match self.remote.find("://") {
            Some(idx) => idx + 3 + self.remote[idx + 3..].find('/')?,
            None => 0,
        };
        let at = self.remote.rfind('@')?;
        let slash = self.remote.rfind('/').unwrap_or(0);
        (at > path_start && at > slash).then_some(at)
    }
}

/// Nested, independently versioned location discovered during a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct External {
    /// `/`-separated path relative to the workspace root.
    pub local_path: String,
    /// Remote the external points at.
    pub remote: String,
    /// Revision the definition pins the external to, if any.
    pub pinned_revision: Option<Revision>,
}
