//! Content screening with a secondary safety model
mod classifier;
pub use classifier::*;
