//! Change-notification bus and debounced live-query engine.
//!
//! This crate keeps UI-bound queries fresh without polling. Writers publish
//! an opaque "something changed" signal on the [`ChangeBus`]; every active
//! [`LiveQuery`] subscription coalesces bursts of signals into a single
//! debounced re-run and delivers the new snapshot to its consumer. Results
//! from superseded runs are discarded by a run-version check, so a consumer
//! never observes an out-of-order snapshot.
//!
//! The bus is an explicit service object: construct one at the composition
//! root and hand clones to whoever needs to publish or observe. There is no
//! process-global instance.

mod bus;
pub mod error;
mod live;

pub use crate::bus::{ChangeBus, ChangeEvent, Subscription};
pub use crate::live::LiveQuery;
