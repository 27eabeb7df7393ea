//! Delinquency classification over the deduction schedule

mod model;
mod service;

pub use model::*;
pub use service::DelinquencyMonitor;
