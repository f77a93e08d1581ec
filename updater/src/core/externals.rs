//! Parsing of `svn:externals` definitions.
//!
//! Two line formats are accepted:
//!
//! - pre-1.5: `DIR [-r N] URL` (URL must be absolute)
//! - 1.5+: `[-r N] URL[@PEG] DIR` (URL may be relative: `../`, `^/`, `//`, `/`)
//!
//! Blank lines and `#` comments are ignored. Tokens may be quoted or use
//! backslash escapes.

use anyhow::{Result, anyhow, bail};

use crate::core::path::is_contained;
use crate::core::types::Revision;

/// One well-formed line of an externals definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEntry {
    /// Target directory relative to the directory that owns the definition.
    pub target: String,
    /// URL as written (possibly relative).
    pub url: String,
    /// Operative revision from `-r`.
    pub revision: Option<Revision>,
    /// Peg revision from an `@PEG` suffix.
    pub peg: Option<Revision>,
}

impl ExternalEntry {
    /// Revision the external is pinned to; `HEAD` counts as unpinned.
    pub fn pinned_revision(&self) -> Option<Revision> {
        self.revision
            .clone()
            .or_else(|| self.peg.clone())
            .filter(|rev| !rev.is_head())
    }
}

/// A definition line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDefinition {
    pub entries: Vec<ExternalEntry>,
    pub malformed: Vec<MalformedEntry>,
}

/// Parse a full `svn:externals` property value, keeping line order.
pub fn parse_definition(text: &str) -> ParsedDefinition {
    let mut parsed = ParsedDefinition::default();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(entry) => parsed.entries.push(entry),
            Err(err) => parsed.malformed.push(MalformedEntry {
                line: line.to_string(),
                reason: err.to_string(),
            }),
        }
    }
    parsed
}

fn parse_line(line: &str) -> Result<ExternalEntry> {
    let tokens = tokenize(line)?;
    let mut revision = None;
    let mut positional = Vec::new();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        if token == "-r" {
            let value = iter.next().ok_or_else(|| anyhow!("-r without a revision"))?;
            revision = Some(parse_revision(&value)?);
        } else if let Some(value) = token.strip_prefix("-r") {
            revision = Some(parse_revision(value)?);
        } else {
            positional.push(token);
        }
    }

    let [first, second]: [String; 2] = positional
        .try_into()
        .map_err(|rest: Vec<String>| anyhow!("expected 2 fields, found {}", rest.len()))?;

    let (target, url, peg) = if is_url_like(&first) {
        let (url, peg) = split_peg(&first)?;
        (second, url, peg)
    } else if is_url_like(&second) {
        if !second.contains("://") {
            bail!("relative URL '{second}' requires the 'URL DIR' form");
        }
        (first, second, None)
    } else {
        bail!("neither field looks like a URL");
    };

    if !is_contained(&target) {
        bail!("target '{target}' must be a relative path inside the working copy");
    }

    Ok(ExternalEntry {
        target,
        url,
        revision,
        peg,
    })
}

fn parse_revision(value: &str) -> Result<Revision> {
    value
        .parse()
        .map_err(|e| anyhow!("bad revision '{value}': {e}"))
}

/// Split an `@PEG` suffix; `@` before the last `/` belongs to the URL.
fn split_peg(url: &str) -> Result<(String, Option<Revision>)> {
    match url.rfind('@') {
        Some(at) if at > url.rfind('/').unwrap_or(0) => {
            let peg = parse_revision(&url[at + 1..])?;
            Ok((url[..at].to_string(), Some(peg)))
        }
        _ => Ok((url.to_string(), None)),
    }
}

fn is_url_like(token: &str) -> bool {
    token.contains("://")
        || token.starts_with("^/")
        || token.starts_with("../")
        || token.starts_with('/')
}

fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', _) => {
                let escaped = chars.next().ok_or_else(|| anyhow!("dangling escape"))?;
                current.push(escaped);
                in_token = true;
            }
            (q, Some(open)) if q == open => quote = None,
            (_, Some(_)) => current.push(c),
            ('"' | '\'', None) => {
                quote = Some(c);
                in_token = true;
            }
            (c, None) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (c, None) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        bail!("unterminated quote");
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Resolve a possibly relative external URL.
///
/// `owner_url` is the URL of the directory carrying the definition and
/// `repository_root` the root of its repository. When the base a form needs
/// is unknown the URL is returned as written.
pub fn resolve_url(url: &str, owner_url: Option<&str>, repository_root: Option<&str>) -> String {
    if url.contains("://") {
        return url.to_string();
    }
    let resolved = if let Some(rest) = url.strip_prefix("^/") {
        repository_root.map(|root| join_url(root, rest))
    } else if url.starts_with("//") {
        owner_url
            .and_then(|owner| owner.find("://").map(|idx| &owner[..idx]))
            .map(|scheme| format!("{scheme}:{url}"))
    } else if url.starts_with('/') {
        owner_url
            .and_then(split_url)
            .map(|(scheme, authority, _)| format!("{scheme}://{authority}{url}"))
    } else if url.starts_with("../") {
        owner_url.map(|owner| join_url(owner, url))
    } else {
        None
    };
    resolved.unwrap_or_else(|| url.to_string())
}

/// Split `scheme://authority/path` into its parts.
fn split_url(url: &str) -> Option<(&str, &str, &str)> {
    let idx = url.find("://")?;
    let scheme = &url[..idx];
    let rest = &url[idx + 3..];
    match rest.find('/') {
        Some(slash) => Some((scheme, &rest[..slash], &rest[slash..])),
        None => Some((scheme, rest, "")),
    }
}

/// Append `relative` to `base`, collapsing `.` and `..` within the path part.
fn join_url(base: &str, relative: &str) -> String {
    let Some((scheme, authority, path)) = split_url(base) else {
        return format!("{}/{}", base.trim_end_matches('/'), relative);
    };
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("{scheme}://{authority}/{}", segments.join("/"))
}
