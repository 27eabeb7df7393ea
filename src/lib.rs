//! Cooperative credit lending backend
//!
//! Loan origination and monthly capacity allocation for a cooperative
//! credit society: eligibility evaluation, guarantor consent, committee
//! review, ceiling-bound registration, payroll deduction schedules,
//! reconciliation and delinquency monitoring.

pub mod application;
pub mod committee;
pub mod config;
pub mod consent;
pub mod db;
pub mod delinquency;
pub mod eligibility;
pub mod error;
pub mod events;
pub mod handlers;
pub mod jobs;
pub mod member;
pub mod middleware;
pub mod models;
pub mod register;
pub mod register_service;
pub mod routes;
pub mod schedule;
pub mod state;
pub mod threshold;
