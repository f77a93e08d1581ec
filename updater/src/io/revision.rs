//! Revision resolution for checkout locations.

use anyhow::Result;
use tracing::debug;

use crate::core::types::{CheckoutLocation, Revision};

/// Maps a location's revision specifier to a concrete revision.
pub trait RevisionResolver {
    fn resolve(&self, location: &CheckoutLocation) -> Result<Revision>;
}

/// Uses the `@REV` pin on the location URL, falling back to a default.
#[derive(Debug, Clone)]
pub struct UrlRevisionResolver {
    fallback: Revision,
}

impl UrlRevisionResolver {
    /// Resolver falling back to `HEAD` for unpinned locations.
    pub fn new() -> Self {
        Self {
            fallback: Revision::Head,
        }
    }

    /// Resolver falling back to `fallback` (e.g. the build's point in time).
    pub fn with_fallback(fallback: Revision) -> Self {
        Self { fallback }
    }
}

impl Default for UrlRevisionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionResolver for UrlRevisionResolver {
    fn resolve(&self, location: &CheckoutLocation) -> Result<Revision> {
        let revision = location
            .revision_pin()?
            .unwrap_or_else(|| self.fallback.clone());
        debug!(remote = %location.remote, %revision, "resolved revision");
        Ok(revision)
    }
}

/// Always resolves to the same revision.
#[derive(Debug, Clone)]
pub struct FixedRevisionResolver(pub Revision);

impl RevisionResolver for FixedRevisionResolver {
    fn resolve(&self, _location: &CheckoutLocation) -> Result<Revision> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pin_wins_over_fallback() {
        let resolver = UrlRevisionResolver::with_fallback(Revision::Number(5));
        let pinned = CheckoutLocation::new("https://svn.example.org/repo/trunk@17");
        let unpinned = CheckoutLocation::new("https://svn.example.org/repo/trunk");
        assert_eq!(resolver.resolve(&pinned).expect("pinned"), Revision::Number(17));
        assert_eq!(resolver.resolve(&unpinned).expect("unpinned"), Revision::Number(5));
    }

    #[test]
    fn default_resolver_uses_head() {
        let loc = CheckoutLocation::new("https://svn.example.org/repo/trunk");
        assert_eq!(UrlRevisionResolver::new().resolve(&loc).expect("head"), Revision::Head);
    }

    #[test]
    fn bad_pin_is_an_error() {
        let loc = CheckoutLocation::new("https://svn.example.org/repo/trunk@soon");
        assert!(UrlRevisionResolver::new().resolve(&loc).is_err());
    }
}
