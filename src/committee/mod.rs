//! Credit committee review aggregation

mod model;
mod service;

pub use model::*;
pub use service::CommitteeService;
