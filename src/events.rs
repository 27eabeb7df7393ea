//! Domain events and the outbound notifier
//!
//! Mutating operations return the events they produced as an explicit list;
//! nothing is raised implicitly. The notifier forwards events to the
//! external notification collaborator over a webhook and logs them.
//! Delivery failures are logged, never fatal.

use serde::Serialize;
use uuid::Uuid;

use crate::delinquency::DelinquencyLevel;
use crate::models::Period;

/// Outbound domain event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ApplicationSubmitted {
        application_id: Uuid,
        member_id: Uuid,
        amount: i64,
    },
    GuarantorConsentRequested {
        application_id: Uuid,
        guarantor_member_id: Uuid,
    },
    GuarantorConsentResolved {
        application_id: Uuid,
        guarantor_member_id: Uuid,
        outcome: String,
    },
    GuarantorSetInvalidated {
        application_id: Uuid,
    },
    CommitteeDecided {
        application_id: Uuid,
        outcome: String,
        approved_amount: Option<i64>,
    },
    LoanAdmitted {
        application_id: Uuid,
        period: Period,
        granted_amount: i64,
    },
    LoanQueued {
        application_id: Uuid,
        period: Period,
        position: i64,
    },
    LoanRegistered {
        application_id: Uuid,
        loan_id: Uuid,
        serial_year: i32,
        serial_number: i32,
    },
    LoanCancelled {
        loan_id: Uuid,
        released_amount: i64,
        period: Period,
    },
    PeriodClosed {
        period: Period,
        unused_capacity: i64,
    },
    PeriodOpened {
        period: Period,
        maximum_amount: i64,
        carried_forward: i64,
    },
    DelinquencyEscalated {
        loan_id: Uuid,
        level: DelinquencyLevel,
        consecutive_missed: i32,
    },
    ReconciliationCompleted {
        period: Period,
        matched: usize,
        partially_paid: usize,
        overpaid: usize,
        unmatched: usize,
    },
}

/// Forwards domain events to the external notification collaborator
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Publish a batch of events. Best effort: failures are logged and
    /// swallowed so notification trouble never fails the operation that
    /// produced the events.
    pub async fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            tracing::info!(event = ?event, "Domain event");

            if let Some(url) = &self.webhook_url {
                if let Err(e) = self.client.post(url).json(event).send().await {
                    tracing::warn!(error = %e, "Failed to deliver notification webhook");
                }
            }
        }
    }

    /// Fire-and-forget publish from a request handler.
    pub fn publish_detached(&self, events: Vec<DomainEvent>) {
        if events.is_empty() {
            return;
        }
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.publish(&events).await;
        });
    }
}
