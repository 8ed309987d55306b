use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ragstore_core::{
    AsyncVectorStore, CollectionConfig, CollectionInfo, DistanceMetric, Document, DocumentId,
    Error, Filter, MetadataMode, Metadata, Schema, SearchRequest, StoreConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[derive(Clone)]
struct AppState {
    store: AsyncVectorStore,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = StoreConfig::from_env()?;
    let addr: SocketAddr = std::env::var("RAGSTORE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let store = AsyncVectorStore::open(config).await?;
    let state = AppState {
        store: store.clone(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/collections", get(list_collections))
        .route(
            "/collections/:name",
            post(create_collection).delete(drop_collection),
        )
        .route("/collections/:name/documents", post(upsert_documents))
        .route("/collections/:name/documents/get", post(get_documents))
        .route("/collections/:name/documents/delete", post(delete_documents))
        .route("/collections/:name/count", get(count_documents))
        .route("/collections/:name/search", post(search))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.checkpoint().await?;
    tracing::info!("checkpoint written, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Store errors mapped onto HTTP statuses.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidFilter(_) | Error::InvalidArgument(_) | Error::DimensionMismatch { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Backend(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }
        let body = json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn list_collections(State(state): State<AppState>) -> Json<Vec<CollectionInfo>> {
    Json(state.store.list_collections())
}

#[derive(Deserialize)]
struct CreateCollectionRequest {
    dimension: usize,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    metadata_mode: MetadataMode,
    #[serde(default)]
    schema: Schema,
}

async fn create_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<CreateCollectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let metric = match req.metric.as_deref() {
        Some(metric) => metric.parse::<DistanceMetric>()?,
        None => DistanceMetric::default(),
    };
    let config = CollectionConfig {
        dimension: req.dimension,
        metric,
        metadata_mode: req.metadata_mode,
        schema: req.schema,
    };
    state.store.create_collection(&name, config).await?;
    let info = state.store.collection(&name)?;
    Ok((
        StatusCode::CREATED,
        Json(CollectionInfo {
            name,
            config: info.as_ref().clone(),
        }),
    ))
}

async fn drop_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let dropped = state.store.drop_collection(&name).await?;
    Ok(Json(json!({"dropped": dropped})))
}

#[derive(Deserialize)]
struct UpsertRequest {
    documents: Vec<Document>,
}

#[derive(Serialize)]
struct UpsertResponse {
    ids: Vec<DocumentId>,
}

async fn upsert_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpsertRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let ids = state.store.upsert(&name, req.documents).await?;
    Ok(Json(UpsertResponse { ids }))
}

#[derive(Deserialize)]
struct IdsRequest {
    ids: Vec<DocumentId>,
}

/// A stored document without its embedding.
#[derive(Serialize)]
struct DocumentView {
    id: DocumentId,
    content: String,
    metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f32>,
}

async fn get_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<IdsRequest>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let documents = state.store.get(&name, req.ids).await?;
    Ok(Json(
        documents
            .into_iter()
            .map(|d| DocumentView {
                id: d.id,
                content: d.content,
                metadata: d.metadata,
                score: None,
                distance: None,
            })
            .collect(),
    ))
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(default)]
    ids: Option<Vec<DocumentId>>,
    #[serde(default)]
    filter: Option<Filter>,
}

async fn delete_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let deleted = match (req.ids, req.filter) {
        (Some(ids), None) => state.store.delete_by_ids(&name, ids).await?,
        (None, Some(filter)) => state.store.delete_by_filter(&name, filter).await?,
        _ => {
            return Err(Error::InvalidArgument(
                "exactly one of `ids` or `filter` is required".to_string(),
            )
            .into())
        }
    };
    Ok(Json(json!({"deleted": deleted})))
}

async fn count_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let count = state.store.count(&name).await?;
    Ok(Json(json!({"count": count})))
}

async fn search(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<Vec<DocumentView>>> {
    let results = state.store.search(&name, req).await?;
    Ok(Json(
        results
            .into_iter()
            .map(|r| DocumentView {
                id: r.document.id,
                content: r.document.content,
                metadata: r.document.metadata,
                score: Some(r.score),
                distance: Some(r.distance),
            })
            .collect(),
    ))
}
