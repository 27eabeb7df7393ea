//! Deduction schedules and payroll reconciliation

mod csv;
mod engine;
mod model;
mod service;

pub use csv::{read_actuals_csv, write_period_report_csv, ActualDeductionRecord};
pub use engine::{classify, generate_schedule, ScheduleLine};
pub use model::*;
pub use service::ScheduleService;
