mod articles;
mod error;
mod groups;

pub use articles::*;
pub use error::*;
pub use groups::*;

/// Response header carrying the unpaginated match count of a list request.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";
