//! Data model shared by every stage of the linker
//!
//! Symbols live in sections, sections live in intermediates. An intermediate
//! carries a processing level that only ever advances.

mod symbol;
mod intermediate;
mod localization;
mod message;
mod tracking;

pub use symbol::*;
pub use intermediate::*;
pub use localization::*;
pub use message::*;
pub use tracking::*;
