//! Reporting: Monte-Carlo aggregation into target records, and terminal output.

pub mod format;
pub mod params;

pub use format::*;
pub use params::*;
