//! Per-user message activity over a rolling window of periods

pub mod codec;
pub mod store;

pub use store::{PadSide, RollingStore};
