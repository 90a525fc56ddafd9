use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::parse_currency;
use crate::api::error::ApiError;
use crate::api::server::ApiState;
use crate::common::DepositdError;
use crate::storage::StorageError;
use crate::types::{units_to_coin_string, BalanceRecord, Currency, TransactionRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionList {
    pub count: usize,
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: String,
    pub currency: Currency,
    pub amount: u64,
    /// Decimal coin amount, e.g. "0.01000000"
    pub formatted: String,
    pub updated_at: Option<u64>,
}

impl From<BalanceRecord> for BalanceResponse {
    fn from(record: BalanceRecord) -> Self {
        Self {
            formatted: units_to_coin_string(record.amount),
            updated_at: (record.updated_at > 0).then_some(record.updated_at),
            user_id: record.user_id,
            currency: record.currency,
            amount: record.amount,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceList {
    pub user_id: String,
    pub balances: Vec<BalanceResponse>,
}

/// GET /api/transactions?userId=&currency=
pub async fn handle_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionList>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::validation("userId is required"))?;
    let currency = query.currency.as_deref().map(parse_currency).transpose()?;

    let transactions = state.processor.transaction_history(&user_id, currency).await?;
    Ok(Json(TransactionList {
        count: transactions.len(),
        transactions,
    }))
}

/// GET /api/transactions/:tx_hash
pub async fn handle_get_transaction(
    State(state): State<ApiState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<TransactionRecord>, ApiError> {
    state
        .processor
        .transaction_by_hash(&tx_hash)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError(DepositdError::Storage(StorageError::NotFound(format!(
                "transaction {}",
                tx_hash
            ))))
        })
}

/// GET /api/balances/:user_id/:currency
pub async fn handle_get_balance(
    State(state): State<ApiState>,
    Path((user_id, currency)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let currency = parse_currency(&currency)?;
    let balance = state.processor.balance(&user_id, currency).await?;

    let (amount, updated_at) = balance
        .map(|b| (b.amount, Some(b.updated_at)))
        .unwrap_or((0, None));

    Ok(Json(BalanceResponse {
        user_id,
        currency,
        amount,
        formatted: units_to_coin_string(amount),
        updated_at,
    }))
}

/// GET /api/balances/:user_id
pub async fn handle_list_balances(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceList>, ApiError> {
    let balances = state.processor.balances(&user_id).await?;
    Ok(Json(BalanceList {
        user_id,
        balances: balances.into_iter().map(BalanceResponse::from).collect(),
    }))
}
