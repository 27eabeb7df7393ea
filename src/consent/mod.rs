//! Guarantor consent tracking

mod model;
mod service;

pub use model::*;
pub use service::ConsentService;
