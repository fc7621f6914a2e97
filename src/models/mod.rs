//! Data models for the Cuisinova backend.
//!
//! Field names serialize to the camelCase shapes the web front end reads.

mod ai_generated;
mod ingredient;
mod recipe;
mod user;

pub use ai_generated::*;
pub use ingredient::*;
pub use recipe::*;
pub use user::*;
