//! HTTP 查询服务：目录的对外只读面 + 手动刷新触发。
//!
//! 每个请求开头取一次快照引用，整个请求期间数据一致；
//! ETag 由快照指纹 + 查询参数决定，If-None-Match 命中返回 304。

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{CatalogStore, ModelRecord};
use crate::query::{self, QueryError, QueryParams};
use crate::refresh::RefreshScheduler;
use crate::stats::{HealthReport, RefreshStats};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CatalogStore>,
    pub scheduler: Arc<RefreshScheduler>,
}

#[derive(Serialize)]
struct ModelListResponse {
    count: usize,
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_refreshed: Option<DateTime<Utc>>,
    models: Vec<Arc<ModelRecord>>,
}

#[derive(Serialize)]
struct RefreshResponse {
    coalesced: bool,
    stats: RefreshStats,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(store: Arc<CatalogStore>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self {
            state: AppState { store, scheduler },
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/models", get(list_models))
            .route("/models/:id", get(get_model))
            .route("/refresh", post(trigger_refresh))
            .route("/health", get(health))
            .with_state(self.state)
    }

    pub async fn run(self, port: u16) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        tracing::info!("HTTP API listening on port {}", port);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn list_models(
    Query(params): Query<QueryParams>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    // 快照引用贯穿整个请求：过滤、排序、ETag 都基于同一份数据
    let snapshot = state.store.current();

    let models = match query::run(&snapshot, &params) {
        Ok(models) => models,
        Err(e) => return query_error(e),
    };

    let etag = query::response_etag(&snapshot.fingerprint, &params);
    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if candidate == etag {
            return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
        }
    }

    let body = ModelListResponse {
        count: models.len(),
        version: snapshot.version,
        last_refreshed: state.scheduler.last_refresh().map(|s| s.started_at),
        models,
    };
    (StatusCode::OK, [(header::ETAG, etag)], Json(body)).into_response()
}

async fn get_model(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.store.get(&id) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("model not found: {id}"),
            }),
        )
            .into_response(),
    }
}

async fn trigger_refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    let outcome = state.scheduler.trigger().await;
    Json(RefreshResponse {
        coalesced: outcome.coalesced,
        stats: outcome.stats,
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.scheduler.health())
}

fn query_error(e: QueryError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::source::OfflineFetcher;
    use crate::storage::SnapshotFile;

    async fn test_app() -> (Router, AppState) {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("model-atlas-api-{}", nanos));

        let store = Arc::new(CatalogStore::new());
        let scheduler = Arc::new(RefreshScheduler::new(
            store.clone(),
            Arc::new(SnapshotFile::new(dir.join("catalog.db"))),
            Arc::new(OfflineFetcher),
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_secs(10),
        ));
        scheduler.trigger().await;

        let state = AppState {
            store,
            scheduler,
        };
        let app = Router::new()
            .route("/models", get(list_models))
            .route("/models/:id", get(get_model))
            .route("/refresh", post(trigger_refresh))
            .route("/health", get(health))
            .with_state(state.clone());
        (app, state)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn list_models_sets_etag_and_honors_if_none_match() {
        let (app, _) = test_app().await;

        let resp = app
            .clone()
            .oneshot(Request::get("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let etag = resp
            .headers()
            .get(header::ETAG)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let body = body_json(resp).await;
        assert!(body["count"].as_u64().unwrap() > 0);
        assert_eq!(body["version"], 1);

        // 同快照同参数重放：304，不带 body
        let resp = app
            .oneshot(
                Request::get("/models")
                    .header(header::IF_NONE_MATCH, &etag)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn etag_varies_with_params() {
        let (app, _) = test_app().await;

        let e1 = app
            .clone()
            .oneshot(Request::get("/models").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .headers()
            .get(header::ETAG)
            .unwrap()
            .clone();
        let e2 = app
            .oneshot(
                Request::get("/models?provider=google")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .headers()
            .get(header::ETAG)
            .unwrap()
            .clone();
        assert_ne!(e1, e2);
    }

    #[tokio::test]
    async fn get_model_found_and_missing() {
        let (app, _) = test_app().await;

        let resp = app
            .clone()
            .oneshot(Request::get("/models/gpt-5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["id"], "gpt-5");
        assert_eq!(body["provider"], "openai");

        let resp = app
            .oneshot(Request::get("/models/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_price_filter_is_bad_request() {
        let (app, _) = test_app().await;
        let resp = app
            .oneshot(
                Request::get("/models?max_input_price=-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_endpoint_advances_version() {
        let (app, state) = test_app().await;
        let resp = app
            .oneshot(Request::post("/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["coalesced"], false);
        assert_eq!(body["stats"]["version"], 2);
        assert_eq!(state.store.current().version, 2);
    }

    #[tokio::test]
    async fn health_reports_catalog_state() {
        let (app, _) = test_app().await;
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], 1);
        assert!(body["record_count"].as_u64().unwrap() > 0);
    }
}
