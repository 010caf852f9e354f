//! HTTP endpoints of the settlement node.
//!
//! The node exposes the engine's sponsorship validation and the ledger's
//! registration, invoice, settlement, and withdrawal operations:
//!
//! - `POST /validate` answers whether an operation would be sponsored.
//! - `POST /registrations`, `GET`/`DELETE /registrations/{account}` manage
//!   the per-account paymaster bindings.
//! - `POST /invoices` and `GET /invoices/{id}` record and inspect invoices.
//! - `POST /repay` settles an invoice against a proof.
//! - `POST /withdrawals` refunds vault balances to the account itself, on
//!   its registered paymaster's instruction.
//!
//! All payloads are the JSON forms of the types in `cab-types` and `cab-rs`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use alloy_primitives::{Address, Bytes, U256};
use cab_rs::engine::{CabPaymaster, DeclineReason, Sponsorship, SponsorshipError};
use cab_rs::ledger::{InvoiceLedger, LedgerError};
use cab_rs::registry::RegistryError;
use cab_rs::vault::VaultError;
use cab_types::invoice::{Invoice, InvoiceDetails, InvoiceId, ValidityWindow};
use cab_types::operation::Operation;
use cab_types::registration::Registration;
use cab_types::timestamp::UnixTimestamp;

/// Shared state behind every handler: the sponsoring engine and the
/// settlement ledger for this node's chain.
pub struct AppState {
    pub paymaster: CabPaymaster,
    pub ledger: InvoiceLedger,
}

/// Assembles the node's routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/healthz", get(get_health))
        .route("/validate", post(post_validate))
        .route("/registrations", post(post_registration))
        .route(
            "/registrations/{account}",
            get(get_registration).delete(delete_registration),
        )
        .route("/invoices", post(post_invoice))
        .route("/invoices/{id}", get(get_invoice))
        .route("/repay", post(post_repay))
        .route("/withdrawals", post(post_withdrawal))
}

/// A standard JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `POST /validate` request: the operation to ask sponsorship for.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub operation: Operation,
}

/// `POST /validate` response.
///
/// On a grant, carries the invoice the paymaster would commit to if the
/// operation succeeds. The node only answers the question; the scoped
/// approvals taken during validation are released before responding.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub sponsored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<DeclineReason>,
    pub window: ValidityWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<InvoiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<InvoiceDetails>,
}

/// `POST /registrations` request body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub account: Address,
    #[serde(flatten)]
    pub registration: Registration,
}

/// Registration read-back, shared by create, get, and delete responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub account: Address,
    #[serde(flatten)]
    pub registration: Registration,
}

/// `POST /invoices` request body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub account: Address,
    #[serde(with = "cab_types::util::decimal_u256")]
    pub nonce: U256,
    pub paymaster: Address,
    pub invoice_id: InvoiceId,
}

/// Invoice read-back: the stored record keyed by its id.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub invoice_id: InvoiceId,
    #[serde(flatten)]
    pub invoice: Invoice,
}

/// `POST /repay` request body: the claimed invoice, its full details, and
/// the settlement proof for the account's registered verifier.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayRequest {
    pub invoice_id: InvoiceId,
    pub details: InvoiceDetails,
    pub proof: Bytes,
}

/// `POST /withdrawals` request body. `paymaster` is the caller claiming
/// the refund on the account's behalf.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub account: Address,
    pub paymaster: Address,
    pub items: Vec<WithdrawalItem>,
}

/// One vault balance to draw from in a withdrawal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalItem {
    pub vault: Address,
    #[serde(with = "cab_types::util::decimal_u256")]
    pub amount: U256,
}

/// `GET /healthz`: liveness probe.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// `POST /validate`: asks the engine whether it would sponsor `operation`
/// right now.
///
/// Responds 200 with `sponsored: true` and the derived invoice on a grant,
/// 200 with a decline reason when the window is closed, and 401 when the
/// signature does not recover to the trusted signer. Malformed
/// `paymasterAndData` is a 400; a sponsor token with no repay route is
/// a 422.
#[instrument(skip_all)]
pub async fn post_validate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateRequest>,
) -> impl IntoResponse {
    let now = UnixTimestamp::now();
    match state.paymaster.validate(&body.operation, now) {
        Ok(Sponsorship::Granted(grant)) => {
            let response = ValidateResponse {
                sponsored: true,
                decline_reason: None,
                window: grant.window(),
                invoice_id: Some(grant.details().id()),
                details: Some(grant.details().clone()),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(Sponsorship::Declined { reason, window }) => {
            tracing::warn!(reason = ?reason, sender = %body.operation.sender, "Sponsorship declined");
            let status = match reason {
                DeclineReason::UntrustedSigner => StatusCode::UNAUTHORIZED,
                DeclineReason::NotYetValid | DeclineReason::Expired => StatusCode::OK,
            };
            let response = ValidateResponse {
                sponsored: false,
                decline_reason: Some(reason),
                window,
                invoice_id: None,
                details: None,
            };
            (status, Json(response)).into_response()
        }
        Err(error) => {
            tracing::warn!(
                error = ?error,
                body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
                "Validation failed"
            );
            let status = match &error {
                SponsorshipError::Format(_) => StatusCode::BAD_REQUEST,
                SponsorshipError::NoRepayRoute(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (
                status,
                Json(ErrorResponse {
                    error: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// `POST /registrations`: binds a paymaster and verifier to an account.
///
/// Responds 201 with the stored registration, 409 if the account already
/// has a live one, 400 if the expiry is not in the future.
#[instrument(skip_all)]
pub async fn post_registration(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegistrationRequest>,
) -> impl IntoResponse {
    let now = UnixTimestamp::now();
    match state
        .ledger
        .register_paymaster(body.account, body.registration, now)
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(RegistrationResponse {
                account: body.account,
                registration: body.registration,
            }),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, account = %body.account, "Registration failed");
            ledger_error_response(error)
        }
    }
}

/// `GET /registrations/{account}`: the account's registration, live or
/// expired. 404 when none exists.
#[instrument(skip_all)]
pub async fn get_registration(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> impl IntoResponse {
    let account: Address = match account.parse() {
        Ok(account) => account,
        Err(_) => return bad_path_segment("account"),
    };
    match state.ledger.registration(account) {
        Some(registration) => (
            StatusCode::OK,
            Json(RegistrationResponse {
                account,
                registration,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("account {account} has no registration"),
            }),
        )
            .into_response(),
    }
}

/// `DELETE /registrations/{account}`: removes an expired registration.
///
/// Responds 200 with the removed binding, 409 while it is still live,
/// 404 when none exists.
#[instrument(skip_all)]
pub async fn delete_registration(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> impl IntoResponse {
    let account: Address = match account.parse() {
        Ok(account) => account,
        Err(_) => return bad_path_segment("account"),
    };
    let now = UnixTimestamp::now();
    match state.ledger.revoke_paymaster(account, now) {
        Ok(removed) => (
            StatusCode::OK,
            Json(RegistrationResponse {
                account,
                registration: removed,
            }),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, %account, "Revocation failed");
            ledger_error_response(error)
        }
    }
}

/// `POST /invoices`: records an invoice under its id. 409 if the id is
/// already recorded.
#[instrument(skip_all)]
pub async fn post_invoice(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateInvoiceRequest>,
) -> impl IntoResponse {
    match state
        .ledger
        .create_invoice(body.account, body.nonce, body.paymaster, body.invoice_id)
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(InvoiceResponse {
                invoice_id: body.invoice_id,
                invoice: Invoice {
                    account: body.account,
                    nonce: body.nonce,
                    paymaster: body.paymaster,
                    created_on_chain_id: state.ledger.chain_id(),
                    repaid: false,
                },
            }),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, invoice_id = %body.invoice_id, "Invoice creation failed");
            ledger_error_response(error)
        }
    }
}

/// `GET /invoices/{id}`: the stored invoice record. 404 when unknown.
#[instrument(skip_all)]
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let invoice_id: InvoiceId = match id.parse() {
        Ok(id) => id,
        Err(_) => return bad_path_segment("invoice id"),
    };
    match state.ledger.invoice(invoice_id) {
        Some(invoice) => (
            StatusCode::OK,
            Json(InvoiceResponse {
                invoice_id,
                invoice,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("invoice {invoice_id} is not known to this ledger"),
            }),
        )
            .into_response(),
    }
}

/// `POST /repay`: settles an invoice against a proof.
///
/// Responds 200 with the settlement on success. Conflict-family failures
/// (already repaid, reentrant, missing verifier) are 409, an unknown
/// invoice is 404, a proof the verifier rejects is 422, and a vault
/// transport failure is 502.
#[instrument(skip_all)]
pub async fn post_repay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RepayRequest>,
) -> impl IntoResponse {
    match state
        .ledger
        .repay(body.invoice_id, &body.details, &body.proof)
        .await
    {
        Ok(settlement) => (StatusCode::OK, Json(settlement)).into_response(),
        Err(error) => {
            tracing::warn!(
                error = ?error,
                body = %serde_json::to_string(&body).unwrap_or_else(|_| "<can-not-serialize>".to_string()),
                "Settlement failed"
            );
            ledger_error_response(error)
        }
    }
}

/// `POST /withdrawals`: pays the listed vault balances back to `account`.
/// Refused unless `paymaster` is the one registered for the account.
#[instrument(skip_all)]
pub async fn post_withdrawal(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WithdrawalRequest>,
) -> impl IntoResponse {
    let vaults: Vec<Address> = body.items.iter().map(|item| item.vault).collect();
    let amounts: Vec<U256> = body.items.iter().map(|item| item.amount).collect();
    match state
        .ledger
        .withdraw_to_account(body.paymaster, body.account, &vaults, &amounts)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => {
            tracing::warn!(error = ?error, account = %body.account, "Withdrawal failed");
            ledger_error_response(error)
        }
    }
}

/// Maps ledger failures onto the endpoint status taxonomy.
fn status_for(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Registry(RegistryError::AlreadyRegistered(_))
        | LedgerError::Registry(RegistryError::NotYetExpired { .. })
        | LedgerError::AlreadyExists(_)
        | LedgerError::AlreadyRepaid(_)
        | LedgerError::NoVerifier(_)
        | LedgerError::ReentrantCall => StatusCode::CONFLICT,
        LedgerError::Registry(RegistryError::NotRegistered(_))
        | LedgerError::UnknownInvoice(_) => StatusCode::NOT_FOUND,
        LedgerError::Registry(RegistryError::InvalidExpiry { .. }) => StatusCode::BAD_REQUEST,
        LedgerError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        LedgerError::InvalidInvoice(_) => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::Vault(VaultError::Rejected(_)) => StatusCode::BAD_REQUEST,
        LedgerError::Vault(VaultError::Transport(_)) => StatusCode::BAD_GATEWAY,
    }
}

fn ledger_error_response(error: LedgerError) -> Response {
    (
        status_for(&error),
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn bad_path_segment(what: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("invalid {what} in path"),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, address};

    #[test]
    fn test_status_taxonomy() {
        let id = InvoiceId(B256::ZERO);
        let account = address!("0x1111111111111111111111111111111111111111");
        assert_eq!(
            status_for(&LedgerError::AlreadyRepaid(id)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LedgerError::UnknownInvoice(id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LedgerError::InvalidInvoice(id)),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&LedgerError::NoVerifier(account)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LedgerError::Vault(VaultError::Transport(
                "rpc down".to_string()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&LedgerError::Registry(RegistryError::NotRegistered(
                account
            ))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&LedgerError::Unauthorized {
                caller: account,
                account
            }),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_validate_response_omits_absent_fields() {
        let declined = ValidateResponse {
            sponsored: false,
            decline_reason: Some(DeclineReason::Expired),
            window: ValidityWindow {
                valid_after: UnixTimestamp::from_secs(100),
                valid_until: UnixTimestamp::from_secs(200),
            },
            invoice_id: None,
            details: None,
        };
        let json = serde_json::to_string(&declined).unwrap();
        assert!(json.contains("\"declineReason\":\"expired\""));
        assert!(!json.contains("invoiceId"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_registration_request_is_flat() {
        let json = r#"{
            "account": "0x1111111111111111111111111111111111111111",
            "paymaster": "0x2222222222222222222222222222222222222222",
            "verifier": "0x3333333333333333333333333333333333333333",
            "expiry": "1700000000"
        }"#;
        let request: RegistrationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.registration.verifier,
            address!("0x3333333333333333333333333333333333333333")
        );
        assert_eq!(
            request.registration.expiry,
            UnixTimestamp::from_secs(1_700_000_000)
        );
    }
}
