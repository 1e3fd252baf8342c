//! SQLite catalog store.
//!
//! This crate owns the on-disk catalog: sources, their categories and
//! channels, the program guide, video-on-demand entries, and the user's
//! state layered on top (favorites, custom groups, recency, enabled flags).
//! Provider refreshes land through the bulk ingestion path; everything the
//! query layer reads goes through [`Repository`].
//!
//! # Conventions
//! - Provider data and user state share rows but never share columns; bulk
//!   upserts COALESCE around the user-owned columns so a refresh cannot
//!   clobber them.
//! - Queries over caller-supplied id lists are chunked through [`sql`] so
//!   no statement exceeds the bound-parameter ceiling.

mod bulk;
mod db;
pub mod error;
mod models;
mod repo;
pub mod sql;

pub use crate::bulk::{
    BulkResult, CategoryUpsert, ChannelUpsert, MovieUpsert, ProgramUpsert, SeriesUpsert, SourceUpsert,
};
pub use crate::db::Database;
pub use crate::models::{Category, Channel, CustomGroup, Movie, Program, SeriesEntry, Source};
pub use crate::repo::{ChannelPageFilter, PageSort, Repository};
