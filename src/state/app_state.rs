//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::application::ApplicationService;
use crate::committee::CommitteeService;
use crate::config::Config;
use crate::consent::ConsentService;
use crate::delinquency::DelinquencyMonitor;
use crate::events::Notifier;
use crate::member::MemberDirectory;
use crate::register_service::RegistrarService;
use crate::schedule::ScheduleService;
use crate::threshold::ThresholdAllocator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub members: Arc<MemberDirectory>,
    pub applications: Arc<ApplicationService>,
    pub consents: Arc<ConsentService>,
    pub committee: Arc<CommitteeService>,
    pub allocator: Arc<ThresholdAllocator>,
    pub registrar: Arc<RegistrarService>,
    pub schedules: Arc<ScheduleService>,
    pub delinquency: Arc<DelinquencyMonitor>,
    pub notifier: Notifier,
}

impl FromRef<AppState> for Arc<ApplicationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.applications.clone()
    }
}

impl FromRef<AppState> for Arc<ConsentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.consents.clone()
    }
}

impl FromRef<AppState> for Arc<CommitteeService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.committee.clone()
    }
}

impl FromRef<AppState> for Arc<ThresholdAllocator> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.allocator.clone()
    }
}

impl FromRef<AppState> for Arc<RegistrarService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.registrar.clone()
    }
}

impl FromRef<AppState> for Arc<ScheduleService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.schedules.clone()
    }
}

impl FromRef<AppState> for Arc<DelinquencyMonitor> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.delinquency.clone()
    }
}

impl FromRef<AppState> for Notifier {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notifier.clone()
    }
}
