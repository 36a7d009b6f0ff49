//! Tariff purchase handler.

use crate::{
    error::AppError,
    handlers::AppState,
    middleware::auth::AuthContext,
    models::tariff::{PurchaseTariffRequest, Tariff},
    services::billing_service,
};
use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TariffResponse {
    pub tariff: Tariff,
    pub tariff_expires_at: Option<DateTime<Utc>>,
}

/// `POST /api/v1/tariffs` with `{ "tariff": "business" }`.
///
/// Pays the first month from the main balance.
pub async fn purchase_tariff(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<PurchaseTariffRequest>,
) -> Result<Json<TariffResponse>, AppError> {
    let prices = state.config.tariff_prices();
    let user =
        billing_service::purchase_tariff(&state.store, auth.user_id, request.tariff, &prices)
            .await?;

    Ok(Json(TariffResponse {
        tariff: user.tariff,
        tariff_expires_at: user.tariff_expires_at,
    }))
}
