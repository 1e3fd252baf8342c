use exn::ResultExt;

use crate::error::{ErrorKind, Result};

mod category;
mod channel;
mod group;
mod program;
mod source;
mod vod;

pub use self::category::Category;
pub use self::channel::Channel;
pub use self::group::CustomGroup;
pub use self::program::Program;
pub use self::source::Source;
pub use self::vod::{Movie, SeriesEntry};

pub(crate) use self::category::CategoryRow;
pub(crate) use self::channel::ChannelRow;
pub(crate) use self::group::CustomGroupRow;
pub(crate) use self::program::ProgramRow;
pub(crate) use self::source::SourceRow;
pub(crate) use self::vod::{MovieRow, SeriesRow};

/// Parse a JSON-array-valued column (`category_ids`, `filter_words`).
/// NULL and empty text both mean "no entries".
pub(crate) fn parse_json_list(raw: Option<&str>, what: &'static str) -> Result<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.trim().is_empty() => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s).or_raise(|| ErrorKind::InvalidData(what)),
    }
}

/// Serialize a list back into its JSON column shape; empty lists are stored
/// as NULL.
pub(crate) fn to_json_list(values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    // Serializing a Vec<String> cannot fail.
    serde_json::to_string(values).ok()
}
