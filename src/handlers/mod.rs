//! API handlers

mod application;
mod committee;
mod consent;
mod delinquency;
mod eligibility;
mod health;
mod register;
mod schedule;
mod threshold;

pub use application::*;
pub use committee::*;
pub use consent::*;
pub use delinquency::*;
pub use eligibility::*;
pub use health::*;
pub use register::*;
pub use schedule::*;
pub use threshold::*;
