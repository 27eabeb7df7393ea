//! Route definitions for the lending API

mod application;
mod committee;
mod consent;
mod delinquency;
mod eligibility;
mod register;
mod schedule;
mod threshold;

pub use application::application_routes;
pub use committee::committee_routes;
pub use consent::consent_routes;
pub use delinquency::delinquency_routes;
pub use eligibility::eligibility_routes;
pub use register::register_routes;
pub use schedule::schedule_routes;
pub use threshold::threshold_routes;
