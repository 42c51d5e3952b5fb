//! Application services for the demo site.

pub mod content;
pub mod error;
pub mod render;
