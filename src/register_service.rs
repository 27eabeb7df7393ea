//! Loan registrar
//!
//! Registration is the gate between approval and the books: it checks the
//! application and consent gates, asks the allocator for capacity, draws a
//! gap-free serial for the year, and opens the deduction schedule. The
//! whole operation is idempotent on application id.

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::application::{ApplicationService, ApplicationStatus};
use crate::config::Config;
use crate::consent::{ConsentService, ConsentSetState};
use crate::delinquency::DelinquencyLevel;
use crate::eligibility::{monthly_installment, ProductRules};
use crate::error::{ApiError, ApiResult};
use crate::events::DomainEvent;
use crate::models::Period;
use crate::register::{LoanRegister, LoanRegisterStatus, RegistrationOutcome};
use crate::schedule::ScheduleService;
use crate::threshold::{AllocationOutcome, ThresholdAllocator};

#[derive(Clone)]
pub struct RegistrarService {
    db_pool: PgPool,
    applications: ApplicationService,
    consents: ConsentService,
    allocator: ThresholdAllocator,
    schedules: ScheduleService,
    config: Config,
}

impl RegistrarService {
    pub fn new(
        db_pool: PgPool,
        applications: ApplicationService,
        consents: ConsentService,
        allocator: ThresholdAllocator,
        schedules: ScheduleService,
        config: Config,
    ) -> Self {
        Self {
            db_pool,
            applications,
            consents,
            allocator,
            schedules,
            config,
        }
    }

    pub async fn get(&self, loan_id: Uuid) -> ApiResult<LoanRegister> {
        sqlx::query_as::<_, LoanRegister>("SELECT * FROM loan_register WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))
    }

    pub async fn get_by_application(&self, application_id: Uuid) -> ApiResult<Option<LoanRegister>> {
        let loan = sqlx::query_as::<_, LoanRegister>(
            "SELECT * FROM loan_register WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(loan)
    }

    pub async fn list_active(&self) -> ApiResult<Vec<LoanRegister>> {
        let loans = sqlx::query_as::<_, LoanRegister>(
            "SELECT * FROM loan_register WHERE status = 'active' \
             ORDER BY serial_year, serial_number",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(loans)
    }

    /// Register an approved, fully-consented application against the given
    /// period's capacity. Re-invoking for an already-registered application
    /// returns the existing entry untouched.
    pub async fn register(
        &self,
        application_id: Uuid,
        period: Period,
    ) -> ApiResult<(RegistrationOutcome, Vec<DomainEvent>)> {
        if let Some(existing) = self.get_by_application(application_id).await? {
            return Ok((
                RegistrationOutcome::AlreadyRegistered { loan: existing },
                Vec::new(),
            ));
        }

        let application = self.applications.get(application_id).await?;
        if application.status != ApplicationStatus::Approved {
            return Ok((
                RegistrationOutcome::Refused {
                    reason: format!(
                        "Application is not approved (status {:?})",
                        application.status
                    ),
                },
                Vec::new(),
            ));
        }

        match self.consents.set_state(application_id).await? {
            ConsentSetState::Complete => {}
            state => {
                return Ok((
                    RegistrationOutcome::Refused {
                        reason: format!("Guarantor consent set is {:?}", state),
                    },
                    Vec::new(),
                ));
            }
        }

        let amount = application.approved_amount.unwrap_or(application.amount);
        let mut events = Vec::new();

        match self
            .allocator
            .try_allocate(period, application_id, amount)
            .await?
        {
            AllocationOutcome::Admitted { granted_amount } => {
                events.push(DomainEvent::LoanAdmitted {
                    application_id,
                    period,
                    granted_amount,
                });
                let (loan, mut registered_events) =
                    self.write_register_entry(&application, period, granted_amount).await?;
                events.append(&mut registered_events);
                Ok((RegistrationOutcome::Registered { loan }, events))
            }
            AllocationOutcome::Queued { position } => {
                events.push(DomainEvent::LoanQueued {
                    application_id,
                    period,
                    position,
                });
                Ok((RegistrationOutcome::Queued { position }, events))
            }
            AllocationOutcome::Rejected { .. } => Err(ApiError::PeriodClosed(format!(
                "Period {} no longer accepts registrations",
                period
            ))),
        }
    }

    /// Register an application the queue drainer has already admitted. The
    /// capacity is spent; only the register entry and schedule remain.
    pub async fn register_admitted(
        &self,
        application_id: Uuid,
        period: Period,
        amount: i64,
    ) -> ApiResult<(LoanRegister, Vec<DomainEvent>)> {
        if let Some(existing) = self.get_by_application(application_id).await? {
            return Ok((existing, Vec::new()));
        }
        let application = self.applications.get(application_id).await?;
        self.write_register_entry(&application, period, amount).await
    }

    /// Cancel a loan before disbursement. Releases the allocated capacity
    /// back into the period; the serial stays burned.
    pub async fn cancel(&self, loan_id: Uuid) -> ApiResult<(LoanRegister, Vec<DomainEvent>)> {
        let loan = sqlx::query_as::<_, LoanRegister>(
            "UPDATE loan_register SET status = 'cancelled', updated_at = now() \
             WHERE id = $1 AND status = 'active' AND disbursed_at IS NULL \
             RETURNING *",
        )
        .bind(loan_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "Loan {} is not active or already disbursed",
                loan_id
            ))
        })?;

        let period = loan.allocation_period();
        let mut events = vec![DomainEvent::LoanCancelled {
            loan_id: loan.id,
            released_amount: loan.principal,
            period,
        }];

        let (_, drained) = self.allocator.release(period, loan.principal).await?;
        for admission in drained {
            let (_, mut more) = self
                .register_admitted(admission.application_id, period, admission.amount)
                .await?;
            events.append(&mut more);
        }

        Ok((loan, events))
    }

    /// Mark a loan disbursed. Cancellation is no longer possible past this
    /// point.
    pub async fn mark_disbursed(&self, loan_id: Uuid) -> ApiResult<LoanRegister> {
        sqlx::query_as::<_, LoanRegister>(
            "UPDATE loan_register SET disbursed_at = $1, updated_at = $1 \
             WHERE id = $2 AND status = 'active' AND disbursed_at IS NULL \
             RETURNING *",
        )
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(format!("Loan {} is not awaiting disbursement", loan_id))
        })
    }

    /// Insert the register entry with a fresh serial, flip the application
    /// to registered and open the deduction schedule.
    async fn write_register_entry(
        &self,
        application: &crate::application::LoanApplication,
        period: Period,
        amount: i64,
    ) -> ApiResult<(LoanRegister, Vec<DomainEvent>)> {
        let rules = ProductRules::for_loan_type(&self.config, application.loan_type);
        let tenor_months = application
            .approved_tenor_months
            .unwrap_or(application.tenor_months);
        let installment = monthly_installment(amount, rules.annual_rate_bps, tenor_months as u32);
        let first_deduction = period.next().first_day();
        let registered_at = Utc::now();
        let maturity = crate::register::maturity_date(registered_at.date_naive(), tenor_months);

        // Serial draw and register insert share a transaction: if a
        // concurrent registration of the same application wins the insert,
        // the rollback also undoes the counter increment, so serials stay
        // gap-free.
        let mut tx = self.db_pool.begin().await?;

        let serial_year = registered_at.year();
        let serial_number: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO loan_serials (year, last_serial) VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_serial = loan_serials.last_serial + 1
            RETURNING last_serial
            "#,
        )
        .bind(serial_year)
        .fetch_one(&mut *tx)
        .await?;

        let loan = sqlx::query_as::<_, LoanRegister>(
            r#"
            INSERT INTO loan_register (
                id, application_id, member_id, loan_type, serial_year, serial_number,
                principal, annual_rate_bps, tenor_months, monthly_installment,
                allocation_year, allocation_month, first_deduction_date, maturity_date,
                status, delinquency_level, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $17)
            ON CONFLICT (application_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application.id)
        .bind(application.member_id)
        .bind(application.loan_type)
        .bind(serial_year)
        .bind(serial_number)
        .bind(amount)
        .bind(rules.annual_rate_bps)
        .bind(tenor_months)
        .bind(installment)
        .bind(period.year)
        .bind(period.month as i32)
        .bind(first_deduction)
        .bind(maturity)
        .bind(LoanRegisterStatus::Active)
        .bind(DelinquencyLevel::Current)
        .bind(registered_at)
        .fetch_optional(&mut *tx)
        .await?;

        let loan = match loan {
            Some(loan) => {
                tx.commit().await?;
                loan
            }
            None => {
                // Lost the insert race; the winner owns the follow-up steps.
                tx.rollback().await?;
                let existing = self
                    .get_by_application(application.id)
                    .await?
                    .ok_or_else(|| ApiError::Internal("Register entry vanished".to_string()))?;
                return Ok((existing, Vec::new()));
            }
        };

        self.applications.mark_registered(application.id).await?;
        self.schedules.generate_for_loan(&loan).await?;

        let events = vec![DomainEvent::LoanRegistered {
            application_id: application.id,
            loan_id: loan.id,
            serial_year: loan.serial_year,
            serial_number: loan.serial_number,
        }];

        Ok((loan, events))
    }
}
