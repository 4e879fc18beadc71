use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use skybook_shared::{Order, OrderStatus};

use super::state::OrderState;
use crate::error::AppError;
use crate::identity::{CallerId, CallerRole};

pub fn app(state: OrderState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/orders", get(list_orders))
        .route("/orders/admin", get(list_all_orders))
        .with_state(state);

    crate::with_common_layers(router)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub ticket_id: String,
    pub price: f64,
    pub status: OrderStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            ticket_id: order.ticket_id,
            price: order.price,
            status: order.status,
            created_at: order.created_at,
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

/// GET /orders
pub async fn list_orders(
    State(state): State<OrderState>,
    CallerId(user_id): CallerId,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.list_orders(&user_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/admin
pub async fn list_all_orders(
    State(state): State<OrderState>,
    role: CallerRole,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    if !role.is_admin() {
        return Err(AppError::AuthorizationError("Admin role required".to_string()));
    }

    let orders = state.orders.list_all_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use skybook_core::repository::OrderRepository;
    use skybook_shared::PaymentRequestEvent;
    use skybook_store::InMemoryOrderRepository;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn seeded() -> Router {
        let orders = Arc::new(InMemoryOrderRepository::new());
        for (ticket, user) in [("T1", "u1"), ("T2", "u2")] {
            let request = PaymentRequestEvent {
                ticket_id: ticket.to_string(),
                user_id: user.to_string(),
                price: 2500.0,
            };
            orders.insert_order(&Order::from_request(&request)).await.unwrap();
        }
        app(OrderState { orders })
    }

    fn get(uri: &str, user: Option<&str>, role: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        if let Some(role) = role {
            builder = builder.header("x-user-role", role);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn orders_in(response: axum::response::Response) -> Vec<OrderResponse> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_caller_sees_only_own_orders() {
        let response = seeded().await.oneshot(get("/orders", Some("u1"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let orders = orders_in(response).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].ticket_id, "T1");
        assert_eq!(orders[0].status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_admin_listing_requires_role() {
        let app = seeded().await;

        let denied = app.clone().oneshot(get("/orders/admin", Some("u1"), None)).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = app
            .clone()
            .oneshot(get("/orders/admin", Some("ops"), Some("admin")))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(orders_in(allowed).await.len(), 2);

        let anonymous = app.clone().oneshot(get("/orders", None, None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        // The role header alone is enough for the admin listing
        let role_only = app.oneshot(get("/orders/admin", None, Some("admin"))).await.unwrap();
        assert_eq!(role_only.status(), StatusCode::OK);
        assert_eq!(orders_in(role_only).await.len(), 2);
    }

    #[tokio::test]
    async fn test_health() {
        let response = seeded().await.oneshot(get("/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
