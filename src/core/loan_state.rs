//! Typed view over the loan workflow JSON columns.
//!
//! Loans store their workflow state in loosely-typed JSON columns that have been
//! written by several generations of clients. [`LoanDocument::decode`] reads every
//! historical shape it knows about and reports each deviation from the canonical
//! shape as a [`Fix`]; [`LoanDocument`] always re-encodes canonically.
//!
//! Canonical shapes (keys are marketing-company codes):
//!
//! ```json
//! { "approvals":        { "MKT-A": { "status": "approved", "approver_id": 3, "note": null, "decided_at": "..." } },
//!   "warehouse_status": { "MKT-A": { "status": "picked_up", "updated_by": 5, "note": null, "updated_at": "..." } },
//!   "return_request":   { "status": "requested", "requested_by": 9, "requested_at": "...", ... },
//!   "need_details":     [ { "name": "Projector", "quantity": 1, "unit": "pcs", "note": null } ] }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Column names, used in [`Fix`] reports
pub const APPROVALS: &str = "approvals";
/// Column name of the warehouse board
pub const WAREHOUSE_STATUS: &str = "warehouse_status";
/// Column name of the return request
pub const RETURN_REQUEST: &str = "return_request";
/// Column name of the requested items
pub const NEED_DETAILS: &str = "need_details";

/// Decision of one company on a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// No decision yet
    Pending,
    /// Company agreed to lend
    Approved,
    /// Company refused
    Rejected,
}

impl ApprovalStatus {
    fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "pending" | "waiting" | "submitted" => Some(Self::Pending),
            "approved" | "approve" | "accepted" => Some(Self::Approved),
            "rejected" | "reject" | "declined" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Hand-over progress of one company's part of a loan.
///
/// Stages only move forward; see [`WarehouseStage::can_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseStage {
    /// Nothing done yet
    Pending,
    /// Items set aside for pickup
    Prepared,
    /// Items handed to the borrower
    PickedUp,
    /// Items back in the warehouse
    Returned,
}

impl WarehouseStage {
    fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "" | "pending" | "waiting" => Some(Self::Pending),
            "prepared" | "ready" | "packed" => Some(Self::Prepared),
            "picked_up" | "pickedup" | "taken" | "borrowed" | "delivered" => Some(Self::PickedUp),
            "returned" | "done" => Some(Self::Returned),
            _ => None,
        }
    }

    /// Whether a board entry at `self` may move to `next`: one step forward, or
    /// straight from pending to picked up.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Prepared | Self::PickedUp)
                | (Self::Prepared, Self::PickedUp)
                | (Self::PickedUp, Self::Returned)
        )
    }

    /// Lower-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Prepared => "prepared",
            Self::PickedUp => "picked_up",
            Self::Returned => "returned",
        }
    }
}

/// State of the borrower's return request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Waiting for the warehouse to confirm
    Requested,
    /// Items confirmed back
    Approved,
    /// Warehouse refused (e.g. items incomplete)
    Rejected,
}

impl ReturnStatus {
    fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "requested" | "pending" => Some(Self::Requested),
            "approved" | "accepted" | "returned" => Some(Self::Approved),
            "rejected" | "declined" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Overall loan status, derived by [`derive_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Awaiting at least one company approval
    Pending,
    /// Refused by at least one company
    Rejected,
    /// Approved by every company, not yet handed over
    Approved,
    /// Every company has handed its items over
    InUse,
    /// Borrower asked to return the items
    ReturnRequested,
    /// Items are back
    Completed,
    /// Withdrawn
    Cancelled,
}

impl LoanStatus {
    /// Lower-case wire name, also stored in `loans.status`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::Approved => "approved",
            Self::InUse => "in_use",
            Self::ReturnRequested => "return_requested",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "rejected" => Ok(Self::Rejected),
            "approved" => Ok(Self::Approved),
            "in_use" => Ok(Self::InUse),
            "return_requested" => Ok(Self::ReturnRequested),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown loan status '{other}'")),
        }
    }
}

/// One company's approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    /// Decision
    pub status: ApprovalStatus,
    /// User who decided
    pub approver_id: Option<i64>,
    /// Optional remark
    pub note: Option<String>,
    /// When the decision was made
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalEntry {
    /// A fresh, undecided entry
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: ApprovalStatus::Pending,
            approver_id: None,
            note: None,
            decided_at: None,
        }
    }
}

/// One company's warehouse progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseEntry {
    /// Current stage
    pub status: WarehouseStage,
    /// User who last moved the entry
    pub updated_by: Option<i64>,
    /// Optional remark
    pub note: Option<String>,
    /// When the entry last moved
    pub updated_at: Option<DateTime<Utc>>,
}

impl WarehouseEntry {
    /// A fresh entry with nothing handed over
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            status: WarehouseStage::Pending,
            updated_by: None,
            note: None,
            updated_at: None,
        }
    }
}

/// The borrower's request to hand items back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    /// Current state
    pub status: ReturnStatus,
    /// Who asked
    pub requested_by: Option<i64>,
    /// When it was asked
    pub requested_at: Option<DateTime<Utc>>,
    /// Borrower remark (e.g. condition of the items)
    pub note: Option<String>,
    /// Who decided
    pub decided_by: Option<i64>,
    /// When it was decided
    pub decided_at: Option<DateTime<Utc>>,
    /// Decision remark
    pub decision_note: Option<String>,
}

/// One requested item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedItem {
    /// Item name
    pub name: String,
    /// How many
    pub quantity: u32,
    /// Unit of measure
    #[serde(default)]
    pub unit: Option<String>,
    /// Free text
    #[serde(default)]
    pub note: Option<String>,
}

/// A deviation from the canonical shape found while decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fix {
    /// Column was `null` or not the expected JSON type
    MissingColumn {
        /// Column name
        column: &'static str,
    },
    /// Map entry stored under `""`
    EmptyKey {
        /// Column name
        column: &'static str,
    },
    /// Stored as a list of `{company, status}` objects instead of a map
    LegacyList {
        /// Column name
        column: &'static str,
    },
    /// Entry had `null` or no status
    NullStatus {
        /// Column name
        column: &'static str,
        /// Company code
        key: String,
    },
    /// Entry had a status nobody recognises
    UnknownStatus {
        /// Column name
        column: &'static str,
        /// Company code
        key: String,
        /// The unrecognised value
        value: String,
    },
    /// Entry could not be read at all
    MalformedEntry {
        /// Column name
        column: &'static str,
        /// Company code or list index
        key: String,
    },
    /// Entry stored for a company that is not linked to the loan
    UnlinkedCompany {
        /// Column name
        column: &'static str,
        /// Company code
        key: String,
    },
    /// Linked company had no entry
    MissingEntry {
        /// Column name
        column: &'static str,
        /// Company code
        key: String,
    },
    /// Stored overall status disagreed with the derived one
    StatusMismatch {
        /// Value in `loans.status`
        stored: String,
        /// Value from [`derive_status`]
        derived: String,
    },
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { column } => write!(f, "{column}: missing or not an object"),
            Self::EmptyKey { column } => write!(f, "{column}: entry under empty key"),
            Self::LegacyList { column } => write!(f, "{column}: legacy list form"),
            Self::NullStatus { column, key } => write!(f, "{column}[{key}]: null status"),
            Self::UnknownStatus { column, key, value } => {
                write!(f, "{column}[{key}]: unknown status '{value}'")
            }
            Self::MalformedEntry { column, key } => write!(f, "{column}[{key}]: malformed entry"),
            Self::UnlinkedCompany { column, key } => {
                write!(f, "{column}[{key}]: company not linked to loan")
            }
            Self::MissingEntry { column, key } => write!(f, "{column}[{key}]: missing entry"),
            Self::StatusMismatch { stored, derived } => {
                write!(f, "status: stored '{stored}', derived '{derived}'")
            }
        }
    }
}

/// Decoded workflow state of one loan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoanDocument {
    /// Approval entries by company code
    pub approvals: BTreeMap<String, ApprovalEntry>,
    /// Warehouse entries by company code
    pub warehouse: BTreeMap<String, WarehouseEntry>,
    /// Return request, if any
    pub return_request: Option<ReturnRequest>,
    /// Requested items
    pub needs: Vec<NeedItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawApproval {
    status: Option<Value>,
    #[serde(alias = "approverId", alias = "approver")]
    approver_id: Option<i64>,
    #[serde(alias = "notes", alias = "comment")]
    note: Option<String>,
    #[serde(alias = "decidedAt", alias = "date")]
    decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawWarehouse {
    status: Option<Value>,
    #[serde(alias = "updatedBy")]
    updated_by: Option<i64>,
    #[serde(alias = "notes")]
    note: Option<String>,
    #[serde(alias = "updatedAt")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReturn {
    status: Option<Value>,
    #[serde(alias = "requestedBy")]
    requested_by: Option<i64>,
    #[serde(alias = "requestedAt")]
    requested_at: Option<DateTime<Utc>>,
    #[serde(alias = "notes", alias = "condition")]
    note: Option<String>,
    #[serde(alias = "decidedBy")]
    decided_by: Option<i64>,
    #[serde(alias = "decidedAt")]
    decided_at: Option<DateTime<Utc>>,
    #[serde(alias = "decisionNote")]
    decision_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNeed {
    #[serde(alias = "item", alias = "itemName")]
    name: String,
    #[serde(alias = "qty", default = "default_quantity")]
    quantity: Value,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default, alias = "notes")]
    note: Option<String>,
}

const fn default_quantity() -> Value {
    Value::Null
}

/// Outcome of reading a status field
enum StatusRead<T> {
    Ok(T),
    Null,
    Unknown(String),
}

fn read_status<T>(raw: Option<&Value>, parse: fn(&str) -> Option<T>) -> StatusRead<T> {
    match raw {
        None | Some(Value::Null) => StatusRead::Null,
        Some(Value::String(s)) => parse(s).map_or_else(|| StatusRead::Unknown(s.clone()), StatusRead::Ok),
        Some(other) => StatusRead::Unknown(other.to_string()),
    }
}

/// Turns a column value into `(key, entry)` pairs, accepting the map form and
/// the legacy list form `[{ "company": "...", ... }]`.
fn entries_of(column: &'static str, value: &Value, fixes: &mut Vec<Fix>) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.clone()))
            .collect(),
        Value::Array(items) => {
            fixes.push(Fix::LegacyList { column });
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    let key = item
                        .get("company")
                        .or_else(|| item.get("company_code"))
                        .or_else(|| item.get("companyCode"))
                        .and_then(Value::as_str)
                        .map_or_else(|| format!("#{index}"), |s| s.trim().to_string());
                    (key, item.clone())
                })
                .collect()
        }
        _ => {
            fixes.push(Fix::MissingColumn { column });
            Vec::new()
        }
    }
}

fn note_empty_key(column: &'static str, key: &str, fixes: &mut Vec<Fix>) {
    if key.is_empty() {
        fixes.push(Fix::EmptyKey { column });
    }
}

fn decode_approvals(value: &Value, fixes: &mut Vec<Fix>) -> BTreeMap<String, ApprovalEntry> {
    let mut out = BTreeMap::new();
    for (key, entry) in entries_of(APPROVALS, value, fixes) {
        note_empty_key(APPROVALS, &key, fixes);
        // A bare string is the oldest form: { "MKT-A": "approved" }
        let raw = if entry.is_string() {
            RawApproval {
                status: Some(entry),
                ..RawApproval::default()
            }
        } else if let Ok(raw) = serde_json::from_value::<RawApproval>(entry) {
            raw
        } else {
            fixes.push(Fix::MalformedEntry {
                column: APPROVALS,
                key: key.clone(),
            });
            out.insert(key, ApprovalEntry::pending());
            continue;
        };

        let status = match read_status(raw.status.as_ref(), ApprovalStatus::parse_lenient) {
            StatusRead::Ok(status) => status,
            StatusRead::Null => {
                fixes.push(Fix::NullStatus {
                    column: APPROVALS,
                    key: key.clone(),
                });
                ApprovalStatus::Pending
            }
            StatusRead::Unknown(value) => {
                fixes.push(Fix::UnknownStatus {
                    column: APPROVALS,
                    key: key.clone(),
                    value,
                });
                ApprovalStatus::Pending
            }
        };

        out.insert(
            key,
            ApprovalEntry {
                status,
                approver_id: raw.approver_id,
                note: raw.note,
                decided_at: raw.decided_at,
            },
        );
    }
    out
}

fn decode_warehouse(value: &Value, fixes: &mut Vec<Fix>) -> BTreeMap<String, WarehouseEntry> {
    let mut out = BTreeMap::new();
    for (key, entry) in entries_of(WAREHOUSE_STATUS, value, fixes) {
        note_empty_key(WAREHOUSE_STATUS, &key, fixes);
        let raw = if entry.is_string() {
            RawWarehouse {
                status: Some(entry),
                ..RawWarehouse::default()
            }
        } else if let Ok(raw) = serde_json::from_value::<RawWarehouse>(entry) {
            raw
        } else {
            fixes.push(Fix::MalformedEntry {
                column: WAREHOUSE_STATUS,
                key: key.clone(),
            });
            out.insert(key, WarehouseEntry::pending());
            continue;
        };

        let status = match read_status(raw.status.as_ref(), WarehouseStage::parse_lenient) {
            StatusRead::Ok(status) => status,
            StatusRead::Null => {
                fixes.push(Fix::NullStatus {
                    column: WAREHOUSE_STATUS,
                    key: key.clone(),
                });
                WarehouseStage::Pending
            }
            StatusRead::Unknown(value) => {
                fixes.push(Fix::UnknownStatus {
                    column: WAREHOUSE_STATUS,
                    key: key.clone(),
                    value,
                });
                WarehouseStage::Pending
            }
        };

        out.insert(
            key,
            WarehouseEntry {
                status,
                updated_by: raw.updated_by,
                note: raw.note,
                updated_at: raw.updated_at,
            },
        );
    }
    out
}

fn decode_return(value: Option<&Value>, fixes: &mut Vec<Fix>) -> Option<ReturnRequest> {
    let value = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Object(map)) if map.is_empty() => return None,
        Some(v) => v.clone(),
    };

    let Ok(raw) = serde_json::from_value::<RawReturn>(value) else {
        fixes.push(Fix::MalformedEntry {
            column: RETURN_REQUEST,
            key: String::new(),
        });
        return None;
    };

    let status = match read_status(raw.status.as_ref(), ReturnStatus::parse_lenient) {
        StatusRead::Ok(status) => status,
        StatusRead::Null => {
            fixes.push(Fix::NullStatus {
                column: RETURN_REQUEST,
                key: String::new(),
            });
            ReturnStatus::Requested
        }
        StatusRead::Unknown(value) => {
            fixes.push(Fix::UnknownStatus {
                column: RETURN_REQUEST,
                key: String::new(),
                value,
            });
            ReturnStatus::Requested
        }
    };

    Some(ReturnRequest {
        status,
        requested_by: raw.requested_by,
        requested_at: raw.requested_at,
        note: raw.note,
        decided_by: raw.decided_by,
        decided_at: raw.decided_at,
        decision_note: raw.decision_note,
    })
}

fn quantity_of(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|q| u32::try_from(q).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn decode_needs(value: &Value, fixes: &mut Vec<Fix>) -> Vec<NeedItem> {
    let Value::Array(items) = value else {
        fixes.push(Fix::MissingColumn {
            column: NEED_DETAILS,
        });
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let parsed = serde_json::from_value::<RawNeed>(item.clone())
            .ok()
            .and_then(|raw| {
                quantity_of(&raw.quantity).map(|quantity| NeedItem {
                    name: raw.name,
                    quantity,
                    unit: raw.unit,
                    note: raw.note,
                })
            });
        match parsed {
            Some(need) => out.push(need),
            None => fixes.push(Fix::MalformedEntry {
                column: NEED_DETAILS,
                key: format!("#{index}"),
            }),
        }
    }
    out
}

impl LoanDocument {
    /// Reads the four workflow columns, returning the decoded document and every
    /// deviation from the canonical shape.
    #[must_use]
    pub fn decode(
        approvals: &Value,
        warehouse: &Value,
        return_request: Option<&Value>,
        needs: &Value,
    ) -> (Self, Vec<Fix>) {
        let mut fixes = Vec::new();
        let doc = Self {
            approvals: decode_approvals(approvals, &mut fixes),
            warehouse: decode_warehouse(warehouse, &mut fixes),
            return_request: decode_return(return_request, &mut fixes),
            needs: decode_needs(needs, &mut fixes),
        };
        (doc, fixes)
    }

    /// A new document with one pending approval and warehouse entry per company
    #[must_use]
    pub fn new_for(companies: &[String], needs: Vec<NeedItem>) -> Self {
        Self {
            approvals: companies
                .iter()
                .map(|c| (c.clone(), ApprovalEntry::pending()))
                .collect(),
            warehouse: companies
                .iter()
                .map(|c| (c.clone(), WarehouseEntry::pending()))
                .collect(),
            return_request: None,
            needs,
        }
    }

    /// Canonical `approvals` column value
    pub fn approvals_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.approvals)
    }

    /// Canonical `warehouse_status` column value
    pub fn warehouse_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.warehouse)
    }

    /// Canonical `return_request` column value
    pub fn return_request_json(&self) -> serde_json::Result<Option<Value>> {
        self.return_request
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
    }

    /// Canonical `need_details` column value
    pub fn needs_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.needs)
    }

    /// Aligns both maps with the linked companies.
    ///
    /// An entry under the empty key moves to the single linked company that has no
    /// entry; when that is ambiguous it is dropped. Entries for unlinked companies are
    /// dropped and linked companies without an entry get a pending one. Returns the
    /// fixes applied.
    pub fn reconcile_companies(&mut self, companies: &[String]) -> Vec<Fix> {
        let mut fixes = Vec::new();
        reconcile_map(
            APPROVALS,
            &mut self.approvals,
            companies,
            ApprovalEntry::pending,
            &mut fixes,
        );
        reconcile_map(
            WAREHOUSE_STATUS,
            &mut self.warehouse,
            companies,
            WarehouseEntry::pending,
            &mut fixes,
        );
        fixes
    }
}

fn reconcile_map<T>(
    column: &'static str,
    map: &mut BTreeMap<String, T>,
    companies: &[String],
    pending: fn() -> T,
    fixes: &mut Vec<Fix>,
) {
    if let Some(orphan) = map.remove("") {
        let missing: Vec<&String> = companies.iter().filter(|c| !map.contains_key(*c)).collect();
        if let [only] = missing.as_slice() {
            map.insert((*only).clone(), orphan);
        }
    }

    let unlinked: Vec<String> = map
        .keys()
        .filter(|k| !companies.contains(*k))
        .cloned()
        .collect();
    for key in unlinked {
        map.remove(&key);
        fixes.push(Fix::UnlinkedCompany { column, key });
    }

    for company in companies {
        if !map.contains_key(company) {
            map.insert(company.clone(), pending());
            fixes.push(Fix::MissingEntry {
                column,
                key: company.clone(),
            });
        }
    }
}

/// Reconciles the overall status from the workflow document.
///
/// `companies` are the codes linked to the loan; only their entries count.
#[must_use]
pub fn derive_status(doc: &LoanDocument, companies: &[String], cancelled: bool) -> LoanStatus {
    if cancelled {
        return LoanStatus::Cancelled;
    }

    let approval = |c: &String| doc.approvals.get(c).map(|e| e.status);
    if companies
        .iter()
        .any(|c| approval(c) == Some(ApprovalStatus::Rejected))
    {
        return LoanStatus::Rejected;
    }
    if companies.is_empty()
        || companies
            .iter()
            .any(|c| approval(c) != Some(ApprovalStatus::Approved))
    {
        return LoanStatus::Pending;
    }

    let stage = |c: &String| {
        doc.warehouse
            .get(c)
            .map_or(WarehouseStage::Pending, |e| e.status)
    };
    let return_status = doc.return_request.as_ref().map(|r| r.status);

    if return_status == Some(ReturnStatus::Approved)
        || companies.iter().all(|c| stage(c) == WarehouseStage::Returned)
    {
        return LoanStatus::Completed;
    }
    if return_status == Some(ReturnStatus::Requested) {
        return LoanStatus::ReturnRequested;
    }
    if companies
        .iter()
        .all(|c| stage(c) >= WarehouseStage::PickedUp)
    {
        return LoanStatus::InUse;
    }
    LoanStatus::Approved
}
