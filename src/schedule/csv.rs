//! CSV exchange with the payroll system
//!
//! Actuals arrive as a CSV upload keyed by loan id, period and the payroll
//! system's own reference. The deduction report goes back out as CSV.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DeductionSchedule, ReconciliationStatus};
use crate::error::{ApiError, ApiResult};
use crate::models::Period;

/// One row of an actuals upload
#[derive(Debug, Deserialize)]
pub struct ActualDeductionRecord {
    pub loan_id: Uuid,
    pub period: Period,
    pub amount: i64,
    pub source_ref: String,
}

#[derive(Debug, Serialize)]
struct PeriodReportRecord {
    loan_id: Uuid,
    period: Period,
    period_index: i32,
    due_date: chrono::NaiveDate,
    installment: i64,
    principal_portion: i64,
    interest_portion: i64,
    balance_after: i64,
    reconciliation_status: ReconciliationStatus,
}

/// Parse an actuals CSV into rows for [`super::ScheduleService::record_actuals`].
pub fn read_actuals_csv(data: &[u8]) -> ApiResult<Vec<(Uuid, Period, i64, String)>> {
    let mut reader = csv::Reader::from_reader(data);
    let mut rows = Vec::new();
    for record in reader.deserialize::<ActualDeductionRecord>() {
        let record = record?;
        rows.push((record.loan_id, record.period, record.amount, record.source_ref));
    }
    Ok(rows)
}

/// Render the period deduction report as CSV.
pub fn write_period_report_csv(rows: &[DeductionSchedule]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(PeriodReportRecord {
            loan_id: row.loan_id,
            period: row.period(),
            period_index: row.period_index,
            due_date: row.due_date,
            installment: row.installment,
            principal_portion: row.principal_portion,
            interest_portion: row.interest_portion,
            balance_after: row.balance_after,
            reconciliation_status: row.reconciliation_status,
        })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("CSV encoding error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_read_actuals_csv() {
        let data = b"loan_id,period,amount,source_ref\n\
            7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c,2026-08,23537,PAY-001\n\
            7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c,2026-09,23537,PAY-002\n";
        let rows = read_actuals_csv(data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, Period::new(2026, 8).unwrap());
        assert_eq!(rows[0].2, 23_537);
        assert_eq!(rows[1].3, "PAY-002");
    }

    #[test]
    fn test_read_actuals_csv_rejects_garbage() {
        assert!(read_actuals_csv(b"loan_id,period,amount,source_ref\nnot-a-uuid,2026-08,1,x\n").is_err());
        assert!(read_actuals_csv(b"loan_id,period,amount,source_ref\n7f9c24e5-2b3a-4f1e-9c6d-8a5b3e2f1d0c,2026-13,1,x\n").is_err());
    }

    #[test]
    fn test_write_period_report_round_trips_headers() {
        let row = DeductionSchedule {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            period_index: 1,
            year: 2026,
            month: 9,
            due_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            installment: 23_537,
            principal_portion: 18_537,
            interest_portion: 5_000,
            balance_after: 481_463,
            reconciliation_status: ReconciliationStatus::Pending,
            actual_amount: None,
            reconciled_at: None,
            created_at: Utc::now(),
        };
        let csv = write_period_report_csv(&[row]).unwrap();
        assert!(csv.starts_with("loan_id,period,period_index,due_date"));
        assert!(csv.contains("2026-09"));
        assert!(csv.contains("23537"));
    }
}
