//! Recipe extraction: the pattern-based and model-assisted tracks
//!
//! Both tracks emit the same loose [`crate::models::ParsedRecipe`]; the
//! repair pass coerces either one into the canonical record before staging.

pub mod local;
pub mod model;
pub mod repair;
pub mod units;

pub use local::LocalParser;
pub use model::ModelParser;
pub use repair::{into_recipe, repair, SourceMeta};
