//! GigBridge Core - Entity and Query Types
//!
//! Pure data structures shared by the storage, query and API crates:
//! typed identifiers, marketplace entities, search filters, pagination,
//! analytics windows and the error taxonomy. No I/O happens here.

#[macro_use]
mod enums;

mod entities;
mod error;
mod filter;
mod identity;
pub mod params;
mod window;

pub use entities::*;
pub use enums::*;
pub use error::*;
pub use filter::*;
pub use identity::*;
pub use params::{
    AnalyticsParams, ConversationSearchParams, JobListParams, MessageSearchParams,
    SuggestionParams, UserSearchParams,
};
pub use window::*;
