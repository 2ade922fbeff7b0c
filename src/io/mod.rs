//! Input/output helpers.
//!
//! - spectrum / target list JSON ingest (`spectrum`)
//! - record and catalog JSON exports (`record`)

pub mod record;
pub mod spectrum;

pub use record::*;
pub use spectrum::*;
