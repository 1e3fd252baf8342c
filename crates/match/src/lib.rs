//! Metadata reconciliation for the video-on-demand catalog.
//!
//! Records from the external metadata service are matched to local rows:
//! an indexed fast path over previously written external-id tags, and a
//! title-and-year slow path whose successes are tagged write-through so
//! they never pay the slow path again. [`CachedProvider`] memoizes raw
//! provider responses in a bounded LRU+TTL cache.

pub mod error;
mod provider;
mod reconcile;

pub use crate::provider::{CachedProvider, MetadataProvider, MetadataRecord};
pub use crate::reconcile::{MatchBasis, MovieMatch, Reconciler, SeriesMatch};
