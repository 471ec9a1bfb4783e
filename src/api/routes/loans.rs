//! Loan submission and workflow steps.
//!
//! Listing is scoped to what the caller may see; a loan outside that scope answers
//! `404` rather than `403` so ids of other loans stay hidden.

use super::AppStateRef;
use crate::{
    api::auth::{AuthUser, require_role},
    core::{
        auth::{ROLE_APPROVER, ROLE_WAREHOUSE},
        loan::{self, Decision, LoanDetail, LoanFilter, NewLoan},
        loan_state::WarehouseStage,
    },
    entities,
    errors::{Error, Result},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

/// GET /api/loans
pub async fn list_loans(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Query(filter): Query<LoanFilter>,
) -> Result<Json<Vec<entities::loan::Model>>> {
    let loans = loan::list_loans(&state.db, filter.scoped_to(&actor)).await?;
    Ok(Json(loans))
}

/// POST /api/loans
pub async fn submit_loan(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Json(body): Json<NewLoan>,
) -> Result<(StatusCode, Json<LoanDetail>)> {
    let detail = loan::submit_loan(&state.db, actor.id, body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/loans/{id}
pub async fn get_loan(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<LoanDetail>> {
    let detail = loan::get_loan_detail(&state.db, id).await?;
    if !detail.visible_to(&actor) {
        return Err(Error::not_found("loan", id));
    }
    Ok(Json(detail))
}

/// Body of `POST /api/loans/{id}/approvals`
#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    /// Company whose entry is decided
    pub company_code: String,
    /// `approve` or `reject`
    pub decision: Decision,
    /// Optional remark
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/loans/{id}/approvals
pub async fn decide_approval(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<ApprovalRequest>,
) -> Result<Json<LoanDetail>> {
    require_role(&actor, &[ROLE_APPROVER])?;
    let detail = loan::decide_approval(
        &state.db,
        &actor,
        id,
        &body.company_code,
        body.decision,
        body.note,
    )
    .await?;
    Ok(Json(detail))
}

/// Body of `PUT /api/loans/{id}/warehouse`
#[derive(Debug, Deserialize)]
pub struct WarehouseRequest {
    /// Company whose entry moves
    pub company_code: String,
    /// Target stage
    pub stage: WarehouseStage,
    /// Optional remark
    #[serde(default)]
    pub note: Option<String>,
}

/// PUT /api/loans/{id}/warehouse
pub async fn update_warehouse(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<WarehouseRequest>,
) -> Result<Json<LoanDetail>> {
    require_role(&actor, &[ROLE_WAREHOUSE])?;
    let detail = loan::update_warehouse(
        &state.db,
        &actor,
        id,
        &body.company_code,
        body.stage,
        body.note,
    )
    .await?;
    Ok(Json(detail))
}

/// Body carrying only an optional remark
#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    /// Optional remark
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/loans/{id}/return-request
pub async fn request_return(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<LoanDetail>> {
    Ok(Json(
        loan::request_return(&state.db, &actor, id, body.note).await?,
    ))
}

/// Body of `POST /api/loans/{id}/return-request/decision`
#[derive(Debug, Deserialize)]
pub struct ReturnDecisionRequest {
    /// Accept the returned items
    pub approve: bool,
    /// Optional remark
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/loans/{id}/return-request/decision
pub async fn decide_return(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<ReturnDecisionRequest>,
) -> Result<Json<LoanDetail>> {
    require_role(&actor, &[ROLE_WAREHOUSE])?;
    Ok(Json(
        loan::decide_return(&state.db, &actor, id, body.approve, body.note).await?,
    ))
}

/// POST /api/loans/{id}/cancel
pub async fn cancel_loan(
    State(state): AppStateRef,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<LoanDetail>> {
    Ok(Json(loan::cancel_loan(&state.db, &actor, id).await?))
}
