mod error;
mod service;

pub use error::GroupError;
pub use service::GroupService;
