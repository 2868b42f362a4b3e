use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    serve, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::auth::AuthCaller;
use super::body::ApiJson;
use crate::application::catalog_service::CatalogService;
use crate::application::order_service::OrderService;
use crate::application::review_service::{ReviewOutcome, ReviewService};
use crate::auth::JwtAuth;
use crate::errors::AppError;
use storefront_types::domain::order::{LineRequest, OrderStatus, PaymentMethod};
use storefront_types::ports::notifier::Notifier;
use storefront_types::ports::StoreRepository;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
}

/// Everything a handler can reach.
pub struct AppState<R: StoreRepository> {
    pub repo: Arc<R>,
    pub orders: Arc<OrderService<R>>,
    pub reviews: Arc<ReviewService<R>>,
    pub catalog: Arc<CatalogService<R>>,
    pub auth: Arc<JwtAuth>,
}

impl<R: StoreRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            orders: self.orders.clone(),
            reviews: self.reviews.clone(),
            catalog: self.catalog.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<R: StoreRepository> AppState<R> {
    /// Wires the three services over one repository.
    pub fn new(repo: Arc<R>, notifier: Arc<dyn Notifier>, auth: JwtAuth) -> Self {
        let orders = Arc::new(OrderService::new(repo.clone(), notifier));
        let reviews = Arc::new(ReviewService::new(orders.clone()));
        let catalog = Arc::new(CatalogService::new(repo.clone()));
        Self {
            repo,
            orders,
            reviews,
            catalog,
            auth: Arc::new(auth),
        }
    }
}

pub struct HttpServer<R: StoreRepository> {
    pub state: AppState<R>,
    pub config: HttpServerConfig,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub products: Vec<LineRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuantityRequest {
    pub product_id: Uuid,
    pub new_quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct UpdateReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

impl<R: StoreRepository> HttpServer<R> {
    pub async fn new(state: AppState<R>, config: HttpServerConfig) -> anyhow::Result<Self> {
        Ok(Self { state, config })
    }

    pub fn router(state: AppState<R>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route(
                "/api/orders",
                post(create_order::<R>).get(list_all_orders::<R>),
            )
            .route("/api/orders/user", get(list_user_orders::<R>))
            .route(
                "/api/orders/{order_id}/updateQuantity",
                put(update_quantity::<R>),
            )
            .route("/api/orders/update-status", post(update_status::<R>))
            .route("/api/orders/checkout", post(checkout::<R>))
            .route("/api/orders/{order_id}", delete(delete_order::<R>))
            .route(
                "/api/reviews",
                post(add_or_update_review::<R>).get(list_all_reviews::<R>),
            )
            .route("/api/reviews/user", get(user_review_history::<R>))
            .route(
                "/api/reviews/{review_id}",
                put(update_review::<R>).delete(delete_review::<R>),
            )
            .route("/api/sales", get(sales::<R>))
            .route("/api/products", get(list_products::<R>))
            .route("/api/products/{product_id}", get(get_product::<R>))
            .route("/api/brands", get(list_brands::<R>))
            .with_state(state)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    uri
                )
            })
            .on_request(
                |request: &axum::extract::Request<_>, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        method = %request.method(),
                        uri = %request.uri(),
                        "request"
                    );
                },
            )
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        status = %response.status(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                },
            );

        let app = Self::router(self.state)
            .layer(trace_layer)
            .layer(CorsLayer::permissive());

        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|e| AppError::BadRequest(format!("invalid id {raw:?}: {e}")))
}

async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn create_order<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    ApiJson(payload): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let order = state.orders.create_order(&caller, payload.products).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Order created successfully", "order": order })),
    ))
}

async fn list_user_orders<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Value>, AppError> {
    let orders = state.orders.list_user_orders(&caller).await?;
    Ok(Json(json!({ "message": "Orders fetched", "orders": orders })))
}

async fn list_all_orders<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Value>, AppError> {
    let orders = state.orders.list_all_orders(&caller).await?;
    Ok(Json(json!({ "message": "Orders fetched", "orders": orders })))
}

async fn update_quantity<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(order_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateQuantityRequest>,
) -> Result<Json<Value>, AppError> {
    let order_id = parse_id(&order_id)?;
    let order = state
        .orders
        .update_order_quantity(&caller, order_id, payload.product_id, payload.new_quantity)
        .await?;
    Ok(Json(json!({ "message": "Order quantity updated", "order": order })))
}

async fn update_status<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    ApiJson(payload): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state
        .orders
        .update_order_status(&caller, payload.order_id, payload.status)
        .await?;
    Ok(Json(json!({ "message": "Order status updated", "order": order })))
}

async fn checkout<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    ApiJson(payload): ApiJson<CheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let order = state
        .orders
        .checkout_order(&caller, payload.order_id, payload.payment_method)
        .await?;
    Ok(Json(json!({ "message": "Checkout completed", "order": order })))
}

async fn delete_order<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let order_id = parse_id(&order_id)?;
    state.orders.delete_order(&caller, order_id).await?;
    Ok(Json(json!({ "message": "Order deleted and stock restored" })))
}

async fn add_or_update_review<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    ApiJson(payload): ApiJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = state
        .reviews
        .add_or_update_review(
            &caller,
            payload.product_id,
            payload.order_id,
            payload.rating,
            payload.comment,
        )
        .await?;
    let (code, message) = match &outcome {
        ReviewOutcome::Created(_) => (StatusCode::CREATED, "Review added successfully"),
        ReviewOutcome::Updated(_) => (StatusCode::OK, "Review updated successfully"),
    };
    Ok((
        code,
        Json(json!({ "message": message, "review": outcome.review() })),
    ))
}

async fn list_all_reviews<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Value>, AppError> {
    let reviews = state.reviews.list_all_reviews(&caller).await?;
    Ok(Json(json!({ "message": "Reviews fetched", "reviews": reviews })))
}

async fn user_review_history<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Value>, AppError> {
    let reviews = state.reviews.user_review_history(&caller).await?;
    Ok(Json(json!({ "message": "Review history fetched", "reviews": reviews })))
}

async fn update_review<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(review_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateReviewRequest>,
) -> Result<Json<Value>, AppError> {
    let review_id = parse_id(&review_id)?;
    let review = state
        .reviews
        .update_review(&caller, review_id, payload.rating, payload.comment)
        .await?;
    Ok(Json(json!({ "message": "Review updated successfully", "review": review })))
}

async fn delete_review<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
    Path(review_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let review_id = parse_id(&review_id)?;
    state.reviews.delete_review(&caller, review_id).await?;
    Ok(Json(json!({ "message": "Review deleted successfully" })))
}

async fn sales<R: StoreRepository>(
    State(state): State<AppState<R>>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Value>, AppError> {
    let sales = state.orders.sales_by_month(&caller).await?;
    Ok(Json(json!({ "message": "Sales fetched", "sales": sales })))
}

async fn list_products<R: StoreRepository>(
    State(state): State<AppState<R>>,
) -> Result<Json<Value>, AppError> {
    let products = state.catalog.list_products().await?;
    Ok(Json(json!({ "message": "Products fetched", "products": products })))
}

async fn get_product<R: StoreRepository>(
    State(state): State<AppState<R>>,
    Path(product_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let product_id = parse_id(&product_id)?;
    let product = state.catalog.get_product(product_id).await?;
    Ok(Json(json!({ "message": "Product fetched", "product": product })))
}

async fn list_brands<R: StoreRepository>(
    State(state): State<AppState<R>>,
) -> Result<Json<Value>, AppError> {
    let brands = state.catalog.list_brands().await?;
    Ok(Json(json!({ "message": "Brands fetched", "brands": brands })))
}
