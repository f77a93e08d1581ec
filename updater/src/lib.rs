//! Fresh Subversion checkouts with a decoupled build log.
//!
//! A [`checkout::CheckoutTask`] wipes a location's local directory, checks it
//! out again through an [`io::client::UpdateClient`] and returns the externals
//! discovered along the way. Progress output travels through an in-memory
//! pipe drained by a relay thread, so a slow log sink never stalls the
//! checkout.
//!
//! - **[`core`]**: Pure, deterministic logic (types, externals parsing, paths).
//! - **[`io`]**: Side-effecting adapters (log sink, pipe, relay, workspace,
//!   `svn` client, config).
//!
//! [`collector`] and [`checkout`] coordinate the two.

pub mod checkout;
pub mod collector;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
