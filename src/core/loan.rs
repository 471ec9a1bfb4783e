//! Loan workflow - submission, per-company approvals, warehouse hand-over and returns.
//!
//! Every workflow step runs inside one database transaction: load the loan, decode
//! its JSON columns into a [`LoanDocument`], apply the step, re-derive the overall
//! status, write the canonical columns back and append an audit entry. The stored
//! `status` column is therefore always the derived one after any write.
//!
//! Approvals across companies are independent; any company may decide first.

use crate::{
    core::{
        audit,
        auth::{Actor, ROLE_APPROVER, ROLE_WAREHOUSE},
        loan_state::{
            ApprovalStatus, LoanDocument, LoanStatus, NeedItem, ReturnRequest, ReturnStatus,
            WarehouseStage, derive_status,
        },
        organization,
    },
    entities::{Loan, LoanMktCompany, MktCompany, loan, loan_mkt_company, mkt_company},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{Condition, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

/// Prefix of every loan code
pub const CODE_PREFIX: &str = "LN";

/// Loan submission input
#[derive(Debug, Clone, Deserialize)]
pub struct NewLoan {
    /// Organisational unit the loan is charged to
    pub entitas_id: i64,
    /// Why the items are needed
    pub purpose: String,
    /// Where the items will be used
    #[serde(default)]
    pub location: Option<String>,
    /// First day of use
    pub start_date: NaiveDate,
    /// Day the items are due back
    pub end_date: NaiveDate,
    /// Marketing companies lending the items
    pub mkt_company_ids: Vec<i64>,
    /// Requested items
    pub needs: Vec<NeedItem>,
}

/// Filter for [`list_loans`]; all set fields must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanFilter {
    /// Derived status
    pub status: Option<LoanStatus>,
    /// Charged organisational unit
    pub entitas_id: Option<i64>,
    /// Submitting user
    pub borrower_id: Option<i64>,
    /// Linked marketing company
    pub mkt_company_id: Option<i64>,
    /// Visibility limit set by [`LoanFilter::scoped_to`], never taken from a query string
    #[serde(skip)]
    pub scope: Option<LoanScope>,
}

/// Loans a non-admin may see: their own, plus those linked to the company they act for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanScope {
    /// The caller, as borrower
    pub user_id: i64,
    /// Company of an approver or warehouse user
    pub mkt_company_id: Option<i64>,
}

impl LoanFilter {
    /// Narrows the filter to what `actor` may see, matching [`LoanDetail::visible_to`].
    ///
    /// Admins see everything. Approvers and warehouse staff linked to a company see
    /// that company's loans and their own; everybody else sees only their own.
    #[must_use]
    pub fn scoped_to(mut self, actor: &Actor) -> Self {
        if actor.is_admin() {
            return self;
        }
        let company_role = actor.role == ROLE_APPROVER || actor.role == ROLE_WAREHOUSE;
        self.scope = Some(LoanScope {
            user_id: actor.id,
            mkt_company_id: actor.mkt_company_id.filter(|_| company_role),
        });
        self
    }
}

/// An approval decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Lend the items
    Approve,
    /// Refuse
    Reject,
}

/// A loan with its linked companies and decoded workflow document
#[derive(Debug, Clone, Serialize)]
pub struct LoanDetail {
    /// The stored row
    pub loan: loan::Model,
    /// Linked marketing companies, ordered by code
    pub companies: Vec<mkt_company::Model>,
    /// Decoded workflow state
    pub document: LoanDocument,
}

impl LoanDetail {
    /// Whether `actor` may see this loan
    #[must_use]
    pub fn visible_to(&self, actor: &Actor) -> bool {
        if actor.is_admin() || self.loan.borrower_id == actor.id {
            return true;
        }
        let company_role = actor.role == ROLE_APPROVER || actor.role == ROLE_WAREHOUSE;
        company_role
            && actor
                .mkt_company_id
                .is_some_and(|id| self.companies.iter().any(|c| c.id == id))
    }
}

/// A loan loaded for a workflow step
struct Working {
    model: loan::Model,
    companies: Vec<mkt_company::Model>,
    codes: Vec<String>,
    doc: LoanDocument,
}

impl Working {
    fn status(&self) -> LoanStatus {
        derive_status(&self.doc, &self.codes, self.model.cancelled)
    }

    fn require_status(&self, action: &'static str, allowed: &[LoanStatus]) -> Result<()> {
        let status = self.status();
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                action,
                state: status.to_string(),
            })
        }
    }

    fn company(&self, code: &str) -> Result<&mkt_company::Model> {
        let code = code.trim().to_uppercase();
        self.companies
            .iter()
            .find(|c| c.code == code)
            .ok_or_else(|| Error::not_found("loan company", code))
    }
}

/// Marketing companies linked to a loan, ordered by code.
pub(crate) async fn linked_companies<C>(db: &C, loan_id: i64) -> Result<Vec<mkt_company::Model>>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = LoanMktCompany::find()
        .filter(loan_mkt_company::Column::LoanId.eq(loan_id))
        .all(db)
        .await?
        .into_iter()
        .map(|link| link.mkt_company_id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    MktCompany::find()
        .filter(mkt_company::Column::Id.is_in(ids))
        .order_by_asc(mkt_company::Column::Code)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn load<C>(db: &C, loan_id: i64) -> Result<Working>
where
    C: ConnectionTrait,
{
    let model = Loan::find_by_id(loan_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("loan", loan_id))?;
    let companies = linked_companies(db, loan_id).await?;
    let codes: Vec<String> = companies.iter().map(|c| c.code.clone()).collect();
    let (mut doc, _) = LoanDocument::decode(
        &model.approvals,
        &model.warehouse_status,
        model.return_request.as_ref(),
        &model.need_details,
    );
    doc.reconcile_companies(&codes);
    Ok(Working {
        model,
        companies,
        codes,
        doc,
    })
}

async fn save<C>(db: &C, working: Working) -> Result<loan::Model>
where
    C: ConnectionTrait,
{
    let status = working.status();
    let cancelled = working.model.cancelled;
    let mut active: loan::ActiveModel = working.model.into();
    active.status = Set(status.as_str().to_string());
    active.approvals = Set(working.doc.approvals_json()?);
    active.warehouse_status = Set(working.doc.warehouse_json()?);
    active.return_request = Set(working.doc.return_request_json()?);
    active.need_details = Set(working.doc.needs_json()?);
    active.cancelled = Set(cancelled);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map_err(Into::into)
}

async fn next_code<C>(db: &C, day: NaiveDate) -> Result<String>
where
    C: ConnectionTrait,
{
    let prefix = format!("{CODE_PREFIX}-{}-", day.format("%Y%m%d"));
    // Suffixes outgrow four digits, so compare them as numbers
    let codes: Vec<String> = Loan::find()
        .filter(loan::Column::Code.starts_with(&prefix))
        .select_only()
        .column(loan::Column::Code)
        .into_tuple()
        .all(db)
        .await?;
    let next = codes
        .iter()
        .filter_map(|code| code.strip_prefix(&prefix)?.parse::<u32>().ok())
        .max()
        .map_or(1, |n| n + 1);
    Ok(format!("{prefix}{next:04}"))
}

fn is_unique_violation(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        }
        _ => false,
    }
}

fn validate_needs(needs: Vec<NeedItem>) -> Result<Vec<NeedItem>> {
    if needs.is_empty() {
        return Err(Error::validation("needs", "at least one item is required"));
    }
    needs
        .into_iter()
        .map(|item| {
            let name = item.name.trim().to_string();
            if name.is_empty() {
                return Err(Error::validation("needs", "item name cannot be empty"));
            }
            if item.quantity == 0 {
                return Err(Error::validation(
                    "needs",
                    format!("quantity of '{name}' must be greater than zero"),
                ));
            }
            Ok(NeedItem {
                name,
                quantity: item.quantity,
                unit: item.unit.filter(|u| !u.trim().is_empty()),
                note: item.note.filter(|n| !n.trim().is_empty()),
            })
        })
        .collect()
}

/// Validated loan submission
struct Submission {
    borrower_id: i64,
    entitas_id: i64,
    purpose: String,
    location: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    company_ids: Vec<i64>,
    needs: Vec<NeedItem>,
}

async fn insert_submission(db: &DatabaseConnection, submission: &Submission) -> Result<loan::Model> {
    let txn = db.begin().await?;

    let entitas = organization::get_entitas(&txn, submission.entitas_id).await?;
    if !entitas.is_active {
        return Err(Error::validation(
            "entitas_id",
            format!("entitas {} is inactive", entitas.code),
        ));
    }
    let mut codes = Vec::with_capacity(submission.company_ids.len());
    for id in &submission.company_ids {
        let company = organization::get_mkt_company(&txn, *id).await?;
        if !company.is_active {
            return Err(Error::validation(
                "mkt_company_ids",
                format!("marketing company {} is inactive", company.code),
            ));
        }
        codes.push(company.code);
    }

    let doc = LoanDocument::new_for(&codes, submission.needs.clone());
    let now = Utc::now();
    let code = next_code(&txn, now.date_naive()).await?;
    let created = loan::ActiveModel {
        code: Set(code),
        borrower_id: Set(submission.borrower_id),
        entitas_id: Set(entitas.id),
        purpose: Set(submission.purpose.clone()),
        location: Set(submission.location.clone()),
        start_date: Set(submission.start_date),
        end_date: Set(submission.end_date),
        status: Set(derive_status(&doc, &codes, false).as_str().to_string()),
        approvals: Set(doc.approvals_json()?),
        warehouse_status: Set(doc.warehouse_json()?),
        return_request: Set(None),
        need_details: Set(doc.needs_json()?),
        cancelled: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for id in &submission.company_ids {
        loan_mkt_company::ActiveModel {
            loan_id: Set(created.id),
            mkt_company_id: Set(*id),
        }
        .insert(&txn)
        .await?;
    }

    audit::record(
        &txn,
        Some(submission.borrower_id),
        "loan.submit",
        "loan",
        created.id,
        json!({ "code": created.code, "companies": codes }),
    )
    .await?;
    txn.commit().await?;
    Ok(created)
}

/// Submits a new loan request.
///
/// Creates one pending approval and warehouse entry per company, the join rows and
/// a code of the form `LN-YYYYMMDD-NNNN`, all in one transaction.
///
/// # Errors
/// - `VALIDATION_ERROR` for empty purpose, end before start, no companies, inactive
///   companies or entitas, no items or zero quantities
/// - `NOT_FOUND` for unknown entitas or companies
#[instrument(skip(db, input))]
pub async fn submit_loan(db: &DatabaseConnection, borrower_id: i64, input: NewLoan) -> Result<LoanDetail> {
    let purpose = input.purpose.trim().to_string();
    if purpose.is_empty() {
        return Err(Error::validation("purpose", "cannot be empty"));
    }
    if input.end_date < input.start_date {
        return Err(Error::validation("end_date", "must not be before start_date"));
    }
    let mut company_ids = input.mkt_company_ids;
    company_ids.sort_unstable();
    company_ids.dedup();
    if company_ids.is_empty() {
        return Err(Error::validation(
            "mkt_company_ids",
            "at least one marketing company is required",
        ));
    }
    let needs = validate_needs(input.needs)?;

    let submission = Submission {
        borrower_id,
        entitas_id: input.entitas_id,
        purpose,
        location: input
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty()),
        start_date: input.start_date,
        end_date: input.end_date,
        company_ids,
        needs,
    };

    // A concurrent submission may take the same code; the second attempt sees it
    let created = match insert_submission(db, &submission).await {
        Err(e) if is_unique_violation(&e) => {
            warn!("Loan code taken concurrently, retrying: {e}");
            insert_submission(db, &submission).await?
        }
        other => other?,
    };

    info!(loan_id = created.id, code = %created.code, "Loan submitted");
    get_loan_detail(db, created.id).await
}

async fn loan_ids_for_company(db: &DatabaseConnection, company_id: i64) -> Result<Vec<i64>> {
    LoanMktCompany::find()
        .filter(loan_mkt_company::Column::MktCompanyId.eq(company_id))
        .select_only()
        .column(loan_mkt_company::Column::LoanId)
        .into_tuple()
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists loans matching the filter, newest first.
pub async fn list_loans(db: &DatabaseConnection, filter: LoanFilter) -> Result<Vec<loan::Model>> {
    let mut query = Loan::find();
    if let Some(status) = filter.status {
        query = query.filter(loan::Column::Status.eq(status.as_str()));
    }
    if let Some(entitas_id) = filter.entitas_id {
        query = query.filter(loan::Column::EntitasId.eq(entitas_id));
    }
    if let Some(borrower_id) = filter.borrower_id {
        query = query.filter(loan::Column::BorrowerId.eq(borrower_id));
    }
    if let Some(company_id) = filter.mkt_company_id {
        let loan_ids = loan_ids_for_company(db, company_id).await?;
        query = query.filter(loan::Column::Id.is_in(loan_ids));
    }
    if let Some(scope) = filter.scope {
        let mut visible = Condition::any().add(loan::Column::BorrowerId.eq(scope.user_id));
        if let Some(company_id) = scope.mkt_company_id {
            let loan_ids = loan_ids_for_company(db, company_id).await?;
            visible = visible.add(loan::Column::Id.is_in(loan_ids));
        }
        query = query.filter(visible);
    }

    query
        .order_by_desc(loan::Column::CreatedAt)
        .order_by_desc(loan::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a loan with its companies and decoded workflow document.
pub async fn get_loan_detail(db: &DatabaseConnection, loan_id: i64) -> Result<LoanDetail> {
    let working = load(db, loan_id).await?;
    Ok(LoanDetail {
        loan: working.model,
        companies: working.companies,
        document: working.doc,
    })
}

/// Records one company's approval decision.
///
/// Only while the loan is pending. The actor must be an admin or an approver acting
/// for that company, and an entry that is already decided stays as it is.
#[instrument(skip(db, actor, note), fields(actor_id = actor.id))]
pub async fn decide_approval(
    db: &DatabaseConnection,
    actor: &Actor,
    loan_id: i64,
    company_code: &str,
    decision: Decision,
    note: Option<String>,
) -> Result<LoanDetail> {
    let txn = db.begin().await?;
    let mut working = load(&txn, loan_id).await?;
    working.require_status("decide_approval", &[LoanStatus::Pending])?;

    let company = working.company(company_code)?.clone();
    let acts_for_company =
        actor.role == ROLE_APPROVER && actor.mkt_company_id == Some(company.id);
    if !actor.is_admin() && !acts_for_company {
        return Err(Error::forbidden(format!(
            "not an approver for {}",
            company.code
        )));
    }

    let entry = working
        .doc
        .approvals
        .get_mut(&company.code)
        .ok_or_else(|| Error::not_found("approval", &company.code))?;
    if entry.status != ApprovalStatus::Pending {
        return Err(Error::Conflict {
            message: format!("{} has already decided", company.code),
        });
    }
    entry.status = match decision {
        Decision::Approve => ApprovalStatus::Approved,
        Decision::Reject => ApprovalStatus::Rejected,
    };
    entry.approver_id = Some(actor.id);
    entry.note = note.clone();
    entry.decided_at = Some(Utc::now());

    let saved = save(&txn, working).await?;
    let action = match decision {
        Decision::Approve => "loan.approve",
        Decision::Reject => "loan.reject",
    };
    audit::record(
        &txn,
        Some(actor.id),
        action,
        "loan",
        loan_id,
        json!({ "company": company.code, "note": note, "status": saved.status }),
    )
    .await?;
    txn.commit().await?;

    info!(loan_id, company = %company.code, status = %saved.status, "Approval recorded");
    get_loan_detail(db, loan_id).await
}

/// Moves one company's warehouse entry forward.
///
/// Allowed once every company has approved and until the return completes. The
/// actor must be an admin or warehouse staff acting for that company.
#[instrument(skip(db, actor, note), fields(actor_id = actor.id))]
pub async fn update_warehouse(
    db: &DatabaseConnection,
    actor: &Actor,
    loan_id: i64,
    company_code: &str,
    stage: WarehouseStage,
    note: Option<String>,
) -> Result<LoanDetail> {
    let txn = db.begin().await?;
    let mut working = load(&txn, loan_id).await?;
    working.require_status(
        "update_warehouse",
        &[
            LoanStatus::Approved,
            LoanStatus::InUse,
            LoanStatus::ReturnRequested,
        ],
    )?;

    let company = working.company(company_code)?.clone();
    let acts_for_company =
        actor.role == ROLE_WAREHOUSE && actor.mkt_company_id == Some(company.id);
    if !actor.is_admin() && !acts_for_company {
        return Err(Error::forbidden(format!(
            "not warehouse staff for {}",
            company.code
        )));
    }

    let entry = working
        .doc
        .warehouse
        .get_mut(&company.code)
        .ok_or_else(|| Error::not_found("warehouse entry", &company.code))?;
    if !entry.status.can_advance_to(stage) {
        return Err(Error::InvalidTransition {
            action: "update_warehouse",
            state: entry.status.as_str().to_string(),
        });
    }
    let from = entry.status;
    entry.status = stage;
    entry.updated_by = Some(actor.id);
    entry.note = note.clone();
    entry.updated_at = Some(Utc::now());

    let saved = save(&txn, working).await?;
    audit::record(
        &txn,
        Some(actor.id),
        "loan.warehouse",
        "loan",
        loan_id,
        json!({
            "company": company.code,
            "from": from.as_str(),
            "to": stage.as_str(),
            "note": note,
            "status": saved.status,
        }),
    )
    .await?;
    txn.commit().await?;
    get_loan_detail(db, loan_id).await
}

/// Asks to hand the items back. Borrower or admin, while the loan is in use.
#[instrument(skip(db, actor, note), fields(actor_id = actor.id))]
pub async fn request_return(
    db: &DatabaseConnection,
    actor: &Actor,
    loan_id: i64,
    note: Option<String>,
) -> Result<LoanDetail> {
    let txn = db.begin().await?;
    let mut working = load(&txn, loan_id).await?;
    if !actor.is_admin() && working.model.borrower_id != actor.id {
        return Err(Error::forbidden("only the borrower can request a return"));
    }
    working.require_status("request_return", &[LoanStatus::InUse])?;

    working.doc.return_request = Some(ReturnRequest {
        status: ReturnStatus::Requested,
        requested_by: Some(actor.id),
        requested_at: Some(Utc::now()),
        note: note.clone(),
        decided_by: None,
        decided_at: None,
        decision_note: None,
    });

    save(&txn, working).await?;
    audit::record(
        &txn,
        Some(actor.id),
        "loan.request_return",
        "loan",
        loan_id,
        json!({ "note": note }),
    )
    .await?;
    txn.commit().await?;
    get_loan_detail(db, loan_id).await
}

/// Confirms or refuses a return request.
///
/// Admins and warehouse staff of a linked company may decide. Approval marks every
/// warehouse entry returned, which completes the loan; refusal puts it back in use.
#[instrument(skip(db, actor, note), fields(actor_id = actor.id))]
pub async fn decide_return(
    db: &DatabaseConnection,
    actor: &Actor,
    loan_id: i64,
    approve: bool,
    note: Option<String>,
) -> Result<LoanDetail> {
    let txn = db.begin().await?;
    let mut working = load(&txn, loan_id).await?;
    working.require_status("decide_return", &[LoanStatus::ReturnRequested])?;

    let linked_warehouse = actor.role == ROLE_WAREHOUSE
        && actor
            .mkt_company_id
            .is_some_and(|id| working.companies.iter().any(|c| c.id == id));
    if !actor.is_admin() && !linked_warehouse {
        return Err(Error::forbidden("not warehouse staff for this loan"));
    }

    let now = Utc::now();
    if let Some(request) = working.doc.return_request.as_mut() {
        request.status = if approve {
            ReturnStatus::Approved
        } else {
            ReturnStatus::Rejected
        };
        request.decided_by = Some(actor.id);
        request.decided_at = Some(now);
        request.decision_note = note.clone();
    }
    if approve {
        for entry in working.doc.warehouse.values_mut() {
            if entry.status != WarehouseStage::Returned {
                entry.status = WarehouseStage::Returned;
                entry.updated_by = Some(actor.id);
                entry.updated_at = Some(now);
            }
        }
    }

    let saved = save(&txn, working).await?;
    audit::record(
        &txn,
        Some(actor.id),
        if approve {
            "loan.approve_return"
        } else {
            "loan.reject_return"
        },
        "loan",
        loan_id,
        json!({ "note": note, "status": saved.status }),
    )
    .await?;
    txn.commit().await?;
    get_loan_detail(db, loan_id).await
}

/// Withdraws a loan that is still waiting for approvals. Borrower or admin.
#[instrument(skip(db, actor), fields(actor_id = actor.id))]
pub async fn cancel_loan(db: &DatabaseConnection, actor: &Actor, loan_id: i64) -> Result<LoanDetail> {
    let txn = db.begin().await?;
    let mut working = load(&txn, loan_id).await?;
    if !actor.is_admin() && working.model.borrower_id != actor.id {
        return Err(Error::forbidden("only the borrower can cancel this loan"));
    }
    working.require_status("cancel_loan", &[LoanStatus::Pending])?;
    working.model.cancelled = true;
    save(&txn, working).await?;

    audit::record(&txn, Some(actor.id), "loan.cancel", "loan", loan_id, json!({})).await?;
    txn.commit().await?;
    info!(loan_id, "Loan cancelled");
    get_loan_detail(db, loan_id).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::auth::{ROLE_ADMIN, ROLE_USER},
        test_utils::*,
    };

    struct Fixture {
        db: DatabaseConnection,
        admin: Actor,
        borrower: Actor,
        approver_a: Actor,
        approver_b: Actor,
        warehouse_a: Actor,
        company_a: mkt_company::Model,
        company_b: mkt_company::Model,
        entitas_id: i64,
    }

    async fn fixture() -> Result<Fixture> {
        let db = setup_test_db().await?;
        let company_a = create_test_company(&db, "MKT-A").await?;
        let company_b = create_test_company(&db, "MKT-B").await?;
        let entitas = create_test_entitas(&db, "ENT-HQ").await?;
        let admin = create_test_actor(&db, "admin", ROLE_ADMIN).await?;
        let borrower = create_test_actor(&db, "borrower", ROLE_USER).await?;
        let approver_a =
            create_company_actor(&db, "appr-a", ROLE_APPROVER, company_a.id).await?;
        let approver_b =
            create_company_actor(&db, "appr-b", ROLE_APPROVER, company_b.id).await?;
        let warehouse_a =
            create_company_actor(&db, "wh-a", ROLE_WAREHOUSE, company_a.id).await?;
        Ok(Fixture {
            db,
            admin,
            borrower,
            approver_a,
            approver_b,
            warehouse_a,
            company_a,
            company_b,
            entitas_id: entitas.id,
        })
    }

    fn new_loan(f: &Fixture, companies: Vec<i64>) -> NewLoan {
        NewLoan {
            entitas_id: f.entitas_id,
            purpose: "Quarterly expo".to_string(),
            location: Some("Hall B".to_string()),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            mkt_company_ids: companies,
            needs: vec![NeedItem {
                name: "Projector".to_string(),
                quantity: 2,
                unit: Some("pcs".to_string()),
                note: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_submit_loan_creates_pending_document() -> Result<()> {
        let f = fixture().await?;
        let detail = submit_loan(
            &f.db,
            f.borrower.id,
            new_loan(&f, vec![f.company_b.id, f.company_a.id, f.company_a.id]),
        )
        .await?;

        assert_eq!(detail.loan.status, "pending");
        assert!(detail.loan.code.starts_with("LN-"));
        assert!(detail.loan.code.ends_with("-0001"));
        assert_eq!(detail.companies.len(), 2);
        assert_eq!(detail.companies[0].code, "MKT-A");
        assert_eq!(detail.document.approvals.len(), 2);
        assert_eq!(detail.document.warehouse.len(), 2);
        assert_eq!(detail.document.needs[0].quantity, 2);

        let second = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        assert!(second.loan.code.ends_with("-0002"));
        Ok(())
    }

    #[tokio::test]
    async fn test_loan_codes_count_past_four_digits() -> Result<()> {
        let f = fixture().await?;
        let first = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let prefix = format!("{CODE_PREFIX}-{}-", Utc::now().format("%Y%m%d"));
        assert_eq!(first.loan.code, format!("{prefix}0001"));

        let mut active: loan::ActiveModel = first.loan.into();
        active.code = Set(format!("{prefix}9999"));
        active.update(&f.db).await?;

        let second = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let third = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        assert_eq!(second.loan.code, format!("{prefix}10000"));
        assert_eq!(third.loan.code, format!("{prefix}10001"));
        Ok(())
    }

    #[test]
    fn test_unique_violation_detection() {
        let err = Error::Database(DbErr::Custom("boom".to_string()));
        assert!(!is_unique_violation(&err));
        assert!(!is_unique_violation(&Error::Unauthorized));
    }

    #[tokio::test]
    async fn test_submit_loan_validation() -> Result<()> {
        let f = fixture().await?;

        let mut bad_dates = new_loan(&f, vec![f.company_a.id]);
        bad_dates.end_date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(matches!(
            submit_loan(&f.db, f.borrower.id, bad_dates).await,
            Err(Error::Validation { field: "end_date", .. })
        ));

        assert!(matches!(
            submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![])).await,
            Err(Error::Validation { field: "mkt_company_ids", .. })
        ));

        let mut zero_qty = new_loan(&f, vec![f.company_a.id]);
        zero_qty.needs[0].quantity = 0;
        assert!(matches!(
            submit_loan(&f.db, f.borrower.id, zero_qty).await,
            Err(Error::Validation { field: "needs", .. })
        ));

        let mut no_needs = new_loan(&f, vec![f.company_a.id]);
        no_needs.needs.clear();
        assert!(submit_loan(&f.db, f.borrower.id, no_needs).await.is_err());

        let mut bad_entitas = new_loan(&f, vec![f.company_a.id]);
        bad_entitas.entitas_id = 999;
        assert!(matches!(
            submit_loan(&f.db, f.borrower.id, bad_entitas).await,
            Err(Error::NotFound { entity: "entitas", .. })
        ));

        // Nothing was written by the failed attempts
        assert!(list_loans(&f.db, LoanFilter::default()).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_company_cannot_be_attached() -> Result<()> {
        let f = fixture().await?;
        organization::update_mkt_company(
            &f.db,
            f.admin.id,
            f.company_b.id,
            organization::MktCompanyUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
        let err = submit_loan(
            &f.db,
            f.borrower.id,
            new_loan(&f, vec![f.company_a.id, f.company_b.id]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        Ok(())
    }

    #[tokio::test]
    async fn test_full_workflow_to_completion() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(
            &f.db,
            f.borrower.id,
            new_loan(&f, vec![f.company_a.id, f.company_b.id]),
        )
        .await?;
        let id = loan.loan.id;

        // Company B may decide before company A
        let d = decide_approval(&f.db, &f.approver_b, id, "mkt-b", Decision::Approve, None).await?;
        assert_eq!(d.loan.status, "pending");
        let d = decide_approval(&f.db, &f.approver_a, id, "MKT-A", Decision::Approve, None).await?;
        assert_eq!(d.loan.status, "approved");

        let d = update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Prepared, None).await?;
        assert_eq!(d.loan.status, "approved");
        update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::PickedUp, None).await?;
        // Skipping Prepared is allowed
        let d = update_warehouse(&f.db, &f.admin, id, "MKT-B", WarehouseStage::PickedUp, None).await?;
        assert_eq!(d.loan.status, "in_use");

        let d = request_return(&f.db, &f.borrower, id, Some("all good".to_string())).await?;
        assert_eq!(d.loan.status, "return_requested");

        let d = decide_return(&f.db, &f.warehouse_a, id, true, None).await?;
        assert_eq!(d.loan.status, "completed");
        assert!(
            d.document
                .warehouse
                .values()
                .all(|e| e.status == WarehouseStage::Returned)
        );

        let history = audit::list(
            &f.db,
            audit::AuditFilter {
                entity_type: Some("loan".to_string()),
                entity_id: Some(id.to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(history.len(), 8);
        assert_eq!(history[0].action, "loan.approve_return");
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_and_redecision() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let id = loan.loan.id;

        let err = decide_approval(&f.db, &f.approver_b, id, "MKT-A", Decision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        let err = decide_approval(&f.db, &f.borrower, id, "MKT-A", Decision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(matches!(
            decide_approval(&f.db, &f.admin, id, "MKT-Z", Decision::Approve, None).await,
            Err(Error::NotFound { .. })
        ));

        let d = decide_approval(
            &f.db,
            &f.approver_a,
            id,
            "MKT-A",
            Decision::Reject,
            Some("out of stock".to_string()),
        )
        .await?;
        assert_eq!(d.loan.status, "rejected");
        assert_eq!(d.document.approvals["MKT-A"].note.as_deref(), Some("out of stock"));

        let err = decide_approval(&f.db, &f.admin, id, "MKT-A", Decision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        Ok(())
    }

    #[tokio::test]
    async fn test_decided_entry_cannot_be_decided_again() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(
            &f.db,
            f.borrower.id,
            new_loan(&f, vec![f.company_a.id, f.company_b.id]),
        )
        .await?;
        let id = loan.loan.id;
        decide_approval(&f.db, &f.approver_a, id, "MKT-A", Decision::Approve, None).await?;
        let err = decide_approval(&f.db, &f.approver_a, id, "MKT-A", Decision::Reject, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        Ok(())
    }

    #[tokio::test]
    async fn test_warehouse_rules() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let id = loan.loan.id;

        // Not approved yet
        let err = update_warehouse(&f.db, &f.admin, id, "MKT-A", WarehouseStage::Prepared, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        decide_approval(&f.db, &f.admin, id, "MKT-A", Decision::Approve, None).await?;

        // Items cannot come back before they were picked up
        let err = update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Returned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Prepared, None).await?;
        let err = update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Returned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(get_loan_detail(&f.db, id).await?.loan.status, "approved");

        update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::PickedUp, None).await?;

        // Backwards
        let err = update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Prepared, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        // Wrong role
        let err = update_warehouse(&f.db, &f.approver_a, id, "MKT-A", WarehouseStage::Returned, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        // Returning every company's items completes the loan
        let d = update_warehouse(&f.db, &f.warehouse_a, id, "MKT-A", WarehouseStage::Returned, None).await?;
        assert_eq!(d.loan.status, "completed");
        Ok(())
    }

    #[tokio::test]
    async fn test_return_rules() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let id = loan.loan.id;
        decide_approval(&f.db, &f.admin, id, "MKT-A", Decision::Approve, None).await?;

        // Not in use yet
        assert!(matches!(
            request_return(&f.db, &f.borrower, id, None).await,
            Err(Error::InvalidTransition { .. })
        ));
        update_warehouse(&f.db, &f.admin, id, "MKT-A", WarehouseStage::PickedUp, None).await?;

        assert!(matches!(
            request_return(&f.db, &f.approver_a, id, None).await,
            Err(Error::Forbidden { .. })
        ));
        request_return(&f.db, &f.borrower, id, None).await?;

        assert!(matches!(
            decide_return(&f.db, &f.borrower, id, true, None).await,
            Err(Error::Forbidden { .. })
        ));
        let d = decide_return(&f.db, &f.admin, id, false, Some("missing cable".to_string())).await?;
        assert_eq!(d.loan.status, "in_use");
        assert_eq!(
            d.document.return_request.as_ref().unwrap().status,
            ReturnStatus::Rejected
        );

        // Borrower may ask again after a refusal
        let d = request_return(&f.db, &f.borrower, id, None).await?;
        assert_eq!(d.loan.status, "return_requested");
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_loan() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let id = loan.loan.id;

        assert!(matches!(
            cancel_loan(&f.db, &f.approver_a, id).await,
            Err(Error::Forbidden { .. })
        ));
        let d = cancel_loan(&f.db, &f.borrower, id).await?;
        assert_eq!(d.loan.status, "cancelled");
        assert!(d.loan.cancelled);

        assert!(matches!(
            cancel_loan(&f.db, &f.admin, id).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            decide_approval(&f.db, &f.admin, id, "MKT-A", Decision::Approve, None).await,
            Err(Error::InvalidTransition { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_loans_filters_and_scope() -> Result<()> {
        let f = fixture().await?;
        let other = create_test_actor(&f.db, "other", ROLE_USER).await?;
        let a = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        submit_loan(&f.db, other.id, new_loan(&f, vec![f.company_b.id])).await?;
        decide_approval(&f.db, &f.admin, a.loan.id, "MKT-A", Decision::Approve, None).await?;

        let all = list_loans(&f.db, LoanFilter::default()).await?;
        assert_eq!(all.len(), 2);

        let approved = list_loans(
            &f.db,
            LoanFilter {
                status: Some(LoanStatus::Approved),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, a.loan.id);

        let own = list_loans(&f.db, LoanFilter::default().scoped_to(&f.borrower)).await?;
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].borrower_id, f.borrower.id);

        let for_b = list_loans(&f.db, LoanFilter::default().scoped_to(&f.approver_b)).await?;
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].borrower_id, other.id);

        let everything = list_loans(&f.db, LoanFilter::default().scoped_to(&f.admin)).await?;
        assert_eq!(everything.len(), 2);

        // An approver's own loan with another company stays listed
        let own_elsewhere =
            submit_loan(&f.db, f.approver_a.id, new_loan(&f, vec![f.company_b.id])).await?;
        assert!(own_elsewhere.visible_to(&f.approver_a));
        let for_a = list_loans(&f.db, LoanFilter::default().scoped_to(&f.approver_a)).await?;
        let ids: Vec<i64> = for_a.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![own_elsewhere.loan.id, a.loan.id]);
        let for_b = list_loans(&f.db, LoanFilter::default().scoped_to(&f.approver_b)).await?;
        assert_eq!(for_b.len(), 2);
        assert!(
            list_loans(&f.db, LoanFilter::default().scoped_to(&f.borrower))
                .await?
                .iter()
                .all(|l| l.borrower_id == f.borrower.id)
        );

        let detail = get_loan_detail(&f.db, a.loan.id).await?;
        assert!(detail.visible_to(&f.borrower));
        assert!(detail.visible_to(&f.approver_a));
        assert!(!detail.visible_to(&f.approver_b));
        assert!(!detail.visible_to(&other));
        Ok(())
    }

    #[tokio::test]
    async fn test_workflow_repairs_legacy_document() -> Result<()> {
        let f = fixture().await?;
        let loan = submit_loan(&f.db, f.borrower.id, new_loan(&f, vec![f.company_a.id])).await?;
        let id = loan.loan.id;

        // An older client stored the approval under an empty key with a null status
        let mut active: loan::ActiveModel = loan.loan.clone().into();
        active.approvals = Set(json!({ "": { "status": null } }));
        active.update(&f.db).await?;

        let d = decide_approval(&f.db, &f.approver_a, id, "MKT-A", Decision::Approve, None).await?;
        assert_eq!(d.loan.status, "approved");
        assert_eq!(d.loan.approvals["MKT-A"]["status"], "approved");
        assert!(d.loan.approvals.get("").is_none());
        Ok(())
    }
}
