use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::*;

use crate::db::Backend;
use crate::service::{ServiceError, TrackingService};

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub location: String,
    pub status: String,
    #[serde(default)]
    pub vehicle_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub amount: f64,
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedCustomer {
    pub customer_id: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: i32,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound { resource: &'static str, id: String },
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::NotFound { resource, id } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} '{}' not found", resource, id),
            ),
            Self::Service(ServiceError::Validation(e)) => {
                (StatusCode::BAD_REQUEST, "validation_error", e.to_string())
            }
            Self::Service(ServiceError::Rejected(message)) => {
                (StatusCode::CONFLICT, "rejected", message)
            }
            Self::Service(ServiceError::Backend(e)) if e.is_unavailable() => {
                tracing::error!("Database unavailable: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "the database is unavailable".to_string(),
                )
            }
            Self::Service(ServiceError::Backend(e)) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "an internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router<B: Backend + 'static>(service: TrackingService<B>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/dashboard", get(dashboard::<B>))
        .route("/customers", get(list_customers::<B>).post(create_customer::<B>))
        .route("/customers/by-contact/:contact", get(customer_by_contact::<B>))
        .route("/customers/:id/orders", get(customer_orders::<B>))
        .route("/products", get(list_products::<B>).post(create_product::<B>))
        .route("/orders", get(list_orders::<B>).post(create_order::<B>))
        .route("/orders/:id", get(order_details::<B>))
        .route("/orders/:id/products", get(order_products::<B>))
        .route(
            "/orders/:id/tracking",
            get(tracking_history::<B>).post(record_tracking::<B>),
        )
        .route("/orders/:id/history", get(order_history::<B>))
        .route("/orders/:id/payments", post(record_payment::<B>))
        .route("/vehicles", get(list_vehicles::<B>).post(create_vehicle::<B>))
        .route("/vehicles/available", get(available_vehicles::<B>))
        .with_state(service)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn dashboard<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> Json<DashboardStats> {
    Json(service.get_dashboard_stats().await)
}

async fn list_customers<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(service.get_all_customers().await?))
}

async fn create_customer<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Json(request): Json<NewCustomer>,
) -> ApiResult<(StatusCode, Json<CreatedCustomer>)> {
    let customer_id = service.add_customer(&request).await?;
    Ok((StatusCode::CREATED, Json(CreatedCustomer { customer_id })))
}

async fn customer_by_contact<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(contact): Path<String>,
) -> ApiResult<Json<Customer>> {
    service
        .get_customer_by_contact(&contact)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "customer",
            id: contact,
        })
}

async fn customer_orders<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(customer_id): Path<i32>,
) -> ApiResult<Json<Vec<CustomerOrder>>> {
    Ok(Json(service.get_customer_orders(customer_id).await?))
}

async fn list_products<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(service.get_all_products().await?))
}

async fn create_product<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Json(request): Json<NewProduct>,
) -> ApiResult<StatusCode> {
    service.add_product(&request).await?;
    Ok(StatusCode::CREATED)
}

async fn list_orders<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> ApiResult<Json<Vec<OrderSummary>>> {
    Ok(Json(service.get_all_orders().await?))
}

async fn create_order<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Json(request): Json<NewOrder>,
) -> ApiResult<(StatusCode, Json<CreatedOrder>)> {
    let order_id = service.submit_order(&request).await?;
    Ok((StatusCode::CREATED, Json(CreatedOrder { order_id })))
}

async fn order_details<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
) -> ApiResult<Json<OrderDetails>> {
    service
        .get_order_details(order_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "order",
            id: order_id.to_string(),
        })
}

async fn order_products<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
) -> ApiResult<Json<Vec<OrderProduct>>> {
    Ok(Json(service.get_order_products(order_id).await?))
}

async fn tracking_history<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
) -> ApiResult<Json<Vec<TrackingEvent>>> {
    Ok(Json(service.get_tracking_history(order_id).await?))
}

async fn record_tracking<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
    Json(request): Json<TrackingRequest>,
) -> ApiResult<StatusCode> {
    let update = TrackingUpdate {
        order_id,
        location: request.location,
        status: request.status,
        vehicle_id: request.vehicle_id,
    };
    service.update_tracking(&update).await?;
    Ok(StatusCode::CREATED)
}

async fn order_history<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
) -> ApiResult<Json<Vec<OrderHistoryEvent>>> {
    Ok(Json(service.get_order_history(order_id).await?))
}

async fn record_payment<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Path(order_id): Path<i32>,
    Json(request): Json<PaymentBody>,
) -> ApiResult<StatusCode> {
    let payment = PaymentRequest {
        order_id,
        amount: request.amount,
        method: request.method,
    };
    service.process_payment(&payment).await?;
    Ok(StatusCode::CREATED)
}

async fn list_vehicles<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> ApiResult<Json<Vec<Vehicle>>> {
    Ok(Json(service.get_all_vehicles().await?))
}

async fn available_vehicles<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
) -> ApiResult<Json<Vec<Vehicle>>> {
    Ok(Json(service.get_available_vehicles().await?))
}

async fn create_vehicle<B: Backend + 'static>(
    State(service): State<TrackingService<B>>,
    Json(request): Json<NewVehicle>,
) -> ApiResult<StatusCode> {
    service.add_vehicle(&request).await?;
    Ok(StatusCode::CREATED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use crate::testing::ScriptedBackend;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(backend: ScriptedBackend) -> Router {
        create_router(TrackingService::new(Arc::new(backend)))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = app(ScriptedBackend::new()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_order_is_404() {
        let response = app(ScriptedBackend::new())
            .oneshot(get("/orders/404"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn places_order() {
        let backend = ScriptedBackend::new().rows(vec![json!({ "order_id": 12 })]);
        let response = app(backend)
            .oneshot(post_json(
                "/orders",
                json!({ "customer_id": 1, "product_ids": [10, 20], "quantities": [2, 1] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["order_id"], 12);
    }

    #[tokio::test]
    async fn misaligned_order_is_400() {
        let response = app(ScriptedBackend::new())
            .oneshot(post_json(
                "/orders",
                json!({ "customer_id": 1, "product_ids": [10, 20], "quantities": [2] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn unavailable_database_is_503() {
        let backend = ScriptedBackend::new().fails(StoreError::NotConnected);
        let response = app(backend).oneshot(get("/orders")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn dashboard_survives_failed_counts() {
        let backend = ScriptedBackend::new()
            .fails(StoreError::NotConnected)
            .fails(StoreError::NotConnected)
            .fails(StoreError::NotConnected)
            .fails(StoreError::NotConnected)
            .fails(StoreError::NotConnected);
        let response = app(backend).oneshot(get("/dashboard")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let stats: DashboardStats = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(stats, DashboardStats::default());
    }

    #[tokio::test]
    async fn tracking_uses_path_order_id() {
        let backend = Arc::new(ScriptedBackend::new().rows(vec![json!({ "tracking_id": 1 })]));
        let router = create_router(TrackingService::new(Arc::clone(&backend)));

        let response = router
            .oneshot(post_json(
                "/orders/33/tracking",
                json!({ "location": "Warehouse B", "status": "Dispatched", "vehicle_id": 2 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let calls = backend.calls();
        assert_eq!(calls[0].params()[0], crate::db::SqlParam::Int(Some(33)));
        assert_eq!(calls[0].params()[3], crate::db::SqlParam::Int(Some(2)));
    }
}
