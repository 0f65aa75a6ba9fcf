//! Order routes.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, Result};
use crate::middleware::{RequireAuth, RequireSeller};
use crate::models::{Order, SalesSummary, SellerOrder};
use crate::services::OrderDraft;
use crate::state::AppState;

use super::MessageResponse;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub message: &'static str,
    pub order: Order,
}

/// `GET /api/orders`
pub async fn list(
    State(state): State<AppState>,
    RequireSeller(_seller): RequireSeller,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<SellerOrder>>> {
    let orders = state
        .order_service()
        .list_for_seller(query.user_id.as_deref())
        .await?;
    Ok(Json(orders))
}

/// `POST /api/orders`
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(draft): ApiJson<OrderDraft>,
) -> Result<(StatusCode, Json<OrderCreated>)> {
    let order = state.order_service().create(user.id, draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            message: "New Order Created",
            order,
        }),
    ))
}

/// `GET /api/orders/summary`
pub async fn summary(
    State(state): State<AppState>,
    RequireSeller(_seller): RequireSeller,
) -> Result<Json<SalesSummary>> {
    Ok(Json(state.order_service().summary().await?))
}

/// `GET /api/orders/mine`
pub async fn mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.order_service().list_for_buyer(user.id).await?))
}

/// `GET /api/orders/{id}`
///
/// Any signed-in user may read any order.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.order_service().get(&id).await?))
}

/// `PUT /api/orders/{id}/deliver`
pub async fn deliver(
    State(state): State<AppState>,
    RequireSeller(seller): RequireSeller,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    tracing::info!(order_id = %id, seller = %seller.id, "Delivery requested");
    state.order_service().mark_delivered(&id).await?;
    Ok(Json(MessageResponse {
        message: "Order Delivered",
    }))
}
