use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::parse_currency;
use crate::api::error::ApiError;
use crate::api::server::ApiState;
use crate::types::DepositAddress;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAddressRequest {
    pub user_id: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct AddressList {
    pub count: usize,
    pub addresses: Vec<DepositAddress>,
}

/// POST /api/addresses
pub async fn handle_assign_address(
    State(state): State<ApiState>,
    Json(req): Json<AssignAddressRequest>,
) -> Result<(StatusCode, Json<DepositAddress>), ApiError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::validation("userId is required"));
    }
    let currency = parse_currency(&req.currency)?;

    let address = state.directory.assign_address(user_id, currency).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// GET /api/addresses/:user_id
pub async fn handle_list_addresses(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<AddressList>, ApiError> {
    let addresses = state.directory.addresses_for_user(&user_id).await?;
    Ok(Json(AddressList {
        count: addresses.len(),
        addresses,
    }))
}
