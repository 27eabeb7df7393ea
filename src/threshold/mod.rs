//! Monthly lending ceiling admission control

mod model;
mod service;

pub use model::*;
pub use service::ThresholdAllocator;
