//! HTTP routes
//!
//! Request bodies keep the field names existing clients already send. The
//! propose and delete routes accept the full update body and ignore the
//! fields they do not use.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mixtune_common::{
    validate_max_weightings, validate_metric, validate_weights, ErrorKind, MaxWeightConstraint,
    MixtuneError, WeightVector, MIN_NUMBER_OF_NODES,
};
use mixtune_engine::{ProposalResult, SessionEngine};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SessionEngine>,
    pub weight_sum_tolerance: f64,
}

/// Body of `/weights_log/`
#[derive(Debug, Deserialize)]
pub struct WeightsLog {
    pub number_of_nodes: usize,
    pub weights: Vec<f64>,
}

/// Body of `/weights_update/`
#[derive(Debug, Deserialize)]
pub struct WeightsUpdate {
    pub session_id: String,
    pub number_of_nodes: usize,
    pub weights: Vec<f64>,
    pub max_weightings: Vec<f64>,
    pub performance_metric: f64,
}

/// Body of `/weights_gen/`; current weights and metric are not required
#[derive(Debug, Deserialize)]
pub struct WeightsGen {
    pub session_id: String,
    pub number_of_nodes: usize,
    pub max_weightings: Vec<f64>,
}

/// Body of `/weights_update_delete/`
#[derive(Debug, Deserialize)]
pub struct SessionDelete {
    pub session_id: String,
}

/// Error response carrying the route it came from
#[derive(Debug)]
pub struct ApiError {
    route: String,
    error: MixtuneError,
}

impl ApiError {
    fn new(route: impl Into<String>, error: MixtuneError) -> Self {
        Self {
            route: route.into(),
            error,
        }
    }

    fn status(&self) -> StatusCode {
        match self.error.kind() {
            ErrorKind::DimensionMismatch => StatusCode::CONFLICT,
            ErrorKind::CorruptLedger | ErrorKind::Config | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::EmptyAcceptanceSet
            | ErrorKind::FitDivergence
            | ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(route = %self.route, error = %self.error, "Request failed");
        }
        let body = json!({
            "message": format!("{}: FAILURE", self.route),
            "error": {
                "type": self.error.kind(),
                "message": self.error.to_string(),
            },
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// JSON body extractor whose rejections carry the route's error body
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let route = req.uri().path().to_string();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::new(
                route,
                MixtuneError::InvalidInput(rejection.body_text()),
            )),
        }
    }
}

/// Build the router over a shared engine
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
        .route("/api/v1/version", get(version))
        .route("/weights_log/", post(weights_log))
        .route("/weights_gen/", post(weights_gen))
        .route("/weights_update/", post(weights_update))
        .route("/weights_update_delete/", post(weights_update_delete))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "An analytics tool to help users get better performance for multi-node setups.",
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "service": "mixtune",
        "version": mixtune_common::VERSION,
        "description": "Adaptive weight tuning for multi-node setups",
    }))
}

async fn weights_log(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<WeightsLog>,
) -> ApiResult {
    const ROUTE: &str = "/weights_log/";
    validate_weights(body.number_of_nodes, &body.weights, state.weight_sum_tolerance)
        .map_err(|e| ApiError::new(ROUTE, e))?;

    Ok(Json(json!({
        "message": "weights_log: SUCCESS",
        "number_of_nodes": body.number_of_nodes,
        "weights": body.weights,
    })))
}

async fn weights_gen(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<WeightsGen>,
) -> ApiResult {
    const ROUTE: &str = "/weights_gen/";
    let fail = |e| ApiError::new(ROUTE, e);

    if body.number_of_nodes < MIN_NUMBER_OF_NODES {
        return Err(fail(MixtuneError::InvalidInput(format!(
            "number_of_nodes must be greater than or equal to {}.",
            MIN_NUMBER_OF_NODES
        ))));
    }
    validate_max_weightings(body.number_of_nodes, &body.max_weightings).map_err(fail)?;

    let bound = MaxWeightConstraint::new(body.max_weightings);
    let proposal = state
        .engine
        .propose(&body.session_id, body.number_of_nodes, &bound)
        .await
        .map_err(fail)?;

    let mut response = json!({
        "weights": proposal.weights,
        "result": proposal.result.tag(),
    });
    let message = match &proposal.result {
        ProposalResult::Fitted { concentration } => {
            response["concentration"] = json!(concentration);
            "SUCCESS, model fit, generated weights"
        }
        ProposalResult::RandomAfterFitFailure { kind, message } => {
            response["error"] = json!({ "type": kind, "message": message });
            "SUCCESS, model failed to be fit, generated random weights"
        }
        ProposalResult::RandomInsufficientData => {
            "SUCCESS, not enough data, generated random weights"
        }
    };
    response["message"] = json!(format!("{}: {}", ROUTE, message));

    Ok(Json(response))
}

async fn weights_update(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<WeightsUpdate>,
) -> ApiResult {
    const ROUTE: &str = "/weights_update/";
    let fail = |e| ApiError::new(ROUTE, e);

    validate_weights(body.number_of_nodes, &body.weights, state.weight_sum_tolerance)
        .map_err(fail)?;
    validate_metric(body.performance_metric).map_err(fail)?;
    validate_max_weightings(body.number_of_nodes, &body.max_weightings).map_err(fail)?;

    let result = state
        .engine
        .record(
            &body.session_id,
            body.number_of_nodes,
            WeightVector::new(body.weights),
            body.performance_metric,
        )
        .await
        .map_err(fail)?;

    let message = if result.created {
        "SUCCESS, first weights in"
    } else if result.best_changed {
        "SUCCESS, best weights updated"
    } else {
        "SUCCESS, no change in best weights"
    };

    Ok(Json(json!({
        "message": format!("{}: {}", ROUTE, message),
        "best_perf_metric": result.best_performance_metric,
        "best_weights": result.best_weights,
        "best_out_of": result.num_observations,
        "created": result.created,
        "best_changed": result.best_changed,
    })))
}

async fn weights_update_delete(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SessionDelete>,
) -> ApiResult {
    const ROUTE: &str = "/weights_update_delete/";
    let key = state.engine.ledger().key(&body.session_id);

    let deleted = state
        .engine
        .delete(&body.session_id)
        .await
        .map_err(|e| ApiError::new(ROUTE, e))?;

    let message = if deleted {
        format!("{}: SUCCESS, key {} deleted", ROUTE, key)
    } else {
        format!("{}: FAILURE, key {} not found", ROUTE, key)
    };

    Ok(Json(json!({ "message": message, "deleted": deleted })))
}
