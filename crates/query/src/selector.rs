//! View selectors.
//!
//! A channel view is addressed by a selector token. `None` means every
//! visible channel; a handful of reserved tokens address the virtual
//! categories; anything else is first tried as a real category id, then as
//! a custom-group id.

/// Reserved token for the favorites virtual category.
pub const FAVORITES: &str = "favorites";
/// Reserved token for the recency virtual category.
pub const RECENTLY_VIEWED: &str = "recently-viewed";
/// Reserved token for the built-in watchlist group.
pub const WATCHLIST: &str = "watchlist";

/// What a channel view should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSelector {
    /// Every channel of every enabled source.
    All,
    /// One category by id. If the id names no real category, custom-group
    /// membership is consulted before the view is declared empty.
    Category(String),
    /// Channels flagged favorite, explicit position first.
    Favorites,
    /// The bounded recency list, most recent first, requested sort ignored.
    RecentlyViewed,
    /// The built-in watchlist, stored as a custom group with a fixed id.
    Watchlist,
    /// A user-defined group by id.
    CustomGroup(String),
}

impl ChannelSelector {
    /// Resolve a raw selector token.
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            None => Self::All,
            Some(FAVORITES) => Self::Favorites,
            Some(RECENTLY_VIEWED) => Self::RecentlyViewed,
            Some(WATCHLIST) => Self::Watchlist,
            Some(id) => Self::Category(id.to_string()),
        }
    }

    /// Stable key identifying this selector for dependency tracking.
    pub fn dep_key(&self) -> String {
        match self {
            Self::All => "channels:all".to_string(),
            Self::Category(id) => format!("channels:category:{id}"),
            Self::Favorites => format!("channels:{FAVORITES}"),
            Self::RecentlyViewed => format!("channels:{RECENTLY_VIEWED}"),
            Self::Watchlist => format!("channels:{WATCHLIST}"),
            Self::CustomGroup(id) => format!("channels:group:{id}"),
        }
    }
}
