//! View composition over the catalog store.
//!
//! This crate turns stored rows into the snapshots a UI renders: selector
//! resolution (real categories, virtual categories, custom groups),
//! filter-word scrubbing, capped search, the navigation grouping tree, and
//! windowed pagination. [`live`] binds any of those views to the change
//! bus so they stay fresh without polling.

pub mod compose;
pub mod error;
mod filter;
pub mod live;
mod selector;
mod window;

pub use crate::compose::{CategoryCount, ChannelSort, Composer, SourceGroup, VirtualCategory};
pub use crate::filter::NameScrubber;
pub use crate::live::{ChannelView, DEFAULT_DEBOUNCE, observe_category_groups, observe_virtual_categories};
pub use crate::selector::ChannelSelector;
pub use crate::window::{DEFAULT_PAGE_SIZE, Pager, WindowState};
