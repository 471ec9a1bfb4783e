//! Loan data maintenance - normalises the workflow JSON columns of every loan.
//!
//! Years of clients writing the JSON columns by hand left empty-string company keys,
//! null statuses, legacy list shapes and stale `status` values behind. The scan
//! decodes each loan leniently, aligns its entries with the linked companies,
//! re-derives the status and rewrites the canonical form. All writes share one
//! transaction; with `dry_run` the transaction is rolled back.

use crate::{
    core::{
        loan::linked_companies,
        loan_state::{Fix, LoanDocument, derive_status},
    },
    entities::{Loan, loan},
    errors::Result,
};
use chrono::Utc;
use sea_orm::{PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{info, instrument};

const BATCH_SIZE: u64 = 100;

/// Fixes found on one loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanFixes {
    /// Loan id
    pub loan_id: i64,
    /// Loan code
    pub code: String,
    /// Everything that deviated from the canonical form
    pub fixes: Vec<Fix>,
}

/// Result of [`normalize_loans`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    /// Loans examined
    pub scanned: usize,
    /// Loans that needed (or, in a dry run, would need) a rewrite
    pub changed: usize,
    /// Whether nothing was written
    pub dry_run: bool,
    /// Per-loan fixes, only for changed loans
    pub loans: Vec<LoanFixes>,
}

/// Scans every loan and rewrites those whose JSON columns or status deviate from
/// the canonical form.
#[instrument(skip(db))]
pub async fn normalize_loans(db: &DatabaseConnection, dry_run: bool) -> Result<NormalizeReport> {
    let txn = db.begin().await?;
    let mut report = NormalizeReport {
        dry_run,
        ..NormalizeReport::default()
    };

    let mut pages = Loan::find()
        .order_by_asc(loan::Column::Id)
        .paginate(&txn, BATCH_SIZE);
    while let Some(batch) = pages.fetch_and_next().await? {
        for row in batch {
            report.scanned += 1;
            let codes: Vec<String> = linked_companies(&txn, row.id)
                .await?
                .into_iter()
                .map(|c| c.code)
                .collect();

            let (mut doc, mut fixes) = LoanDocument::decode(
                &row.approvals,
                &row.warehouse_status,
                row.return_request.as_ref(),
                &row.need_details,
            );
            fixes.extend(doc.reconcile_companies(&codes));
            let derived = derive_status(&doc, &codes, row.cancelled);
            if row.status != derived.as_str() {
                fixes.push(Fix::StatusMismatch {
                    stored: row.status.clone(),
                    derived: derived.as_str().to_string(),
                });
            }
            if fixes.is_empty() {
                continue;
            }

            report.changed += 1;
            report.loans.push(LoanFixes {
                loan_id: row.id,
                code: row.code.clone(),
                fixes,
            });
            if dry_run {
                continue;
            }

            let mut active: loan::ActiveModel = row.into();
            active.status = Set(derived.as_str().to_string());
            active.approvals = Set(doc.approvals_json()?);
            active.warehouse_status = Set(doc.warehouse_json()?);
            active.return_request = Set(doc.return_request_json()?);
            active.need_details = Set(doc.needs_json()?);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }
    }

    if dry_run {
        txn.rollback().await?;
    } else {
        txn.commit().await?;
    }
    info!(
        scanned = report.scanned,
        changed = report.changed,
        dry_run,
        "Loan normalisation finished"
    );
    Ok(report)
}
