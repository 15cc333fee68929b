use crate::application::Services;
use crate::domain::order::{Order, OrderStatus};
use crate::error::OrderError;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// `OrderError` rendered as a JSON `{error}` body with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub OrderError);

impl From<OrderError> for ApiError {
    fn from(error: OrderError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrderError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrderError::IllegalTransition { .. } | OrderError::Conflict(_) => StatusCode::CONFLICT,
            OrderError::ValidationError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "Order API request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

/// Loads the order, treating orders of other stores as missing.
async fn store_order(
    services: &Services,
    store_id: Uuid,
    order_id: Uuid,
) -> Result<Order, ApiError> {
    services
        .orders
        .find_by_id(order_id)
        .await?
        .filter(|order| order.store_id == store_id)
        .ok_or_else(|| ApiError(OrderError::order_not_found(order_id)))
}

/// GET - Order with its status history.
pub(super) async fn get_order(
    State(services): State<Services>,
    Path((store_id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(store_order(&services, store_id, order_id).await?))
}

/// PATCH - Move the order to a new status.
///
/// The caller's store ownership is checked upstream; here the order only has
/// to belong to `store_id`.
pub(super) async fn update_status(
    State(services): State<Services>,
    Path((store_id, order_id)): Path<(Uuid, Uuid)>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError(OrderError::ValidationError(e.body_text())))?;
    let next: OrderStatus = request.status.parse()?;

    store_order(&services, store_id, order_id).await?;
    let order = services
        .state_machine
        .apply_transition(order_id, next, request.comment)
        .await?;

    info!(
        store_id = %store_id,
        order_id = %order_id,
        status = %order.status,
        "Order status updated via API"
    );
    Ok(Json(order))
}
