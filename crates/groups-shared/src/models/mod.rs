mod article;
mod group;

pub use article::*;
pub use group::*;
