use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::compare::{
    run_comparison, run_sweep, ComparisonRequest, MeasureComparison, RemoteEvaluation,
    RemoteReportLookup, SweepReport,
};
use crate::config::{Config, ConfigOverrides, ServerEndpoint};
use crate::fhir::resource::{
    expect_resource_type, Library, Measure, MeasureReport, Patient, PatientGroup, Subject,
};
use crate::ops;
use crate::ops::patients::PatientRoster;

#[derive(Clone)]
struct ApiState {
    config: Config,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn upstream(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Clone, Default, Deserialize)]
struct TargetRequest {
    knowledge_repo: Option<String>,
    data_repo: Option<String>,
    evaluation: Option<String>,
    access_token: Option<String>,
    period_start: Option<String>,
    period_end: Option<String>,
}

#[derive(Debug, Clone)]
struct EffectiveContext {
    knowledge_repo: ServerEndpoint,
    data_repo: ServerEndpoint,
    evaluation: ServerEndpoint,
    period_start: String,
    period_end: String,
    page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct CompareRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    patient: Option<String>,
    group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SweepRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    group: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct EvaluateRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    patient: Option<String>,
    group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CollectRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    patient: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubmitRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    patient: Option<String>,
    payload: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RequirementsRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ListRequest {
    #[serde(flatten)]
    target: TargetRequest,
}

#[derive(Debug, Clone, Deserialize)]
struct ReportsRequest {
    #[serde(flatten)]
    target: TargetRequest,
    measure: String,
    patient: Option<String>,
    group: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct MeasuresResponse {
    measures: Vec<Measure>,
}

#[derive(Debug, Serialize)]
struct GroupsResponse {
    groups: Vec<PatientGroup>,
}

#[derive(Debug, Serialize)]
struct ReportsResponse {
    reports: Vec<MeasureReport>,
}

#[derive(Debug, Serialize)]
struct CollectResponse {
    resources: usize,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    submitted_resources: usize,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let state = ApiState { config };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/compare", post(compare))
        .route("/v1/sweep", post(sweep))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/collect", post(collect))
        .route("/v1/submit", post(submit))
        .route("/v1/requirements", post(requirements))
        .route("/v1/measures", post(measures))
        .route("/v1/patients", post(patients))
        .route("/v1/groups", post(groups))
        .route("/v1/reports", post(reports))
        .route("/v1/config", get(show_config))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse { status: "ok" })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config.redacted())
}

async fn compare(
    State(state): State<ApiState>,
    Json(request): Json<CompareRequest>,
) -> ApiResult<MeasureComparison> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let server = require_endpoint(&effective.evaluation, "evaluation")?;
    let subject = resolve_subject(request.patient, request.group)?;

    let comparison_request = ComparisonRequest {
        server: server.clone(),
        measure: request.measure,
        subject,
        period_start: effective.period_start,
        period_end: effective.period_end,
    };
    let reports = RemoteReportLookup {
        page_size: effective.page_size,
    };
    let comparison = run_comparison(&RemoteEvaluation, &reports, &comparison_request)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(comparison))
}

async fn sweep(
    State(state): State<ApiState>,
    Json(request): Json<SweepRequest>,
) -> ApiResult<SweepReport> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let evaluation = require_endpoint(&effective.evaluation, "evaluation")?;
    let data_repo = require_endpoint(&effective.data_repo, "data repository")?;

    let mut roster = match request.group {
        Some(group_id) => {
            let group = ops::groups::fetch_group(data_repo, &group_id)
                .await
                .map_err(ApiError::upstream)?;
            let ids = group.member_patient_ids().map_err(ApiError::upstream)?;
            ids.into_iter().map(roster_patient).collect()
        }
        None => {
            ops::patients::fetch_patients(data_repo, effective.page_size)
                .await
                .map_err(ApiError::upstream)?
                .patients
        }
    };
    if let Some(limit) = request.limit {
        roster.truncate(limit.max(1));
    }

    let base = ComparisonRequest {
        server: evaluation.clone(),
        measure: request.measure,
        subject: None,
        period_start: effective.period_start,
        period_end: effective.period_end,
    };
    let reports = RemoteReportLookup {
        page_size: effective.page_size,
    };
    Ok(ok(run_sweep(&RemoteEvaluation, &reports, &base, &roster).await))
}

async fn evaluate(
    State(state): State<ApiState>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<MeasureReport> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let server = require_endpoint(&effective.evaluation, "evaluation")?;
    let subject = resolve_subject(request.patient, request.group)?;

    let report = ops::evaluate::evaluate_measure(
        server,
        &request.measure,
        subject.as_ref(),
        &effective.period_start,
        &effective.period_end,
    )
    .await
    .map_err(ApiError::upstream)?;
    Ok(ok(report))
}

async fn collect(
    State(state): State<ApiState>,
    Json(request): Json<CollectRequest>,
) -> ApiResult<CollectResponse> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let server = require_endpoint(&effective.evaluation, "evaluation")?;

    let parameters = ops::collect::fetch_collected(
        server,
        &request.measure,
        &effective.period_start,
        &effective.period_end,
        request.patient.as_deref(),
    )
    .await
    .map_err(ApiError::upstream)?;
    Ok(ok(CollectResponse {
        resources: ops::collect::collected_resource_count(&parameters),
        parameters,
    }))
}

async fn submit(
    State(state): State<ApiState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<SubmitResponse> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let data_repo = require_endpoint(&effective.data_repo, "data repository")?;

    let payload = match request.payload {
        Some(payload) => {
            expect_resource_type(&payload, "Parameters")
                .map_err(|error| ApiError::bad_request(error.to_string()))?;
            payload
        }
        None => {
            let evaluation = require_endpoint(&effective.evaluation, "evaluation")?;
            ops::collect::fetch_collected(
                evaluation,
                &request.measure,
                &effective.period_start,
                &effective.period_end,
                request.patient.as_deref(),
            )
            .await
            .map_err(ApiError::upstream)?
        }
    };
    let submitted_resources = ops::collect::collected_resource_count(&payload);
    ops::submit::submit_data(data_repo, &request.measure, &payload)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(SubmitResponse {
        submitted_resources,
    }))
}

async fn requirements(
    State(state): State<ApiState>,
    Json(request): Json<RequirementsRequest>,
) -> ApiResult<Library> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let server = require_endpoint(&effective.knowledge_repo, "knowledge repository")?;

    let library = ops::requirements::fetch_data_requirements(
        server,
        &request.measure,
        &effective.period_start,
        &effective.period_end,
    )
    .await
    .map_err(ApiError::upstream)?;
    Ok(ok(library))
}

async fn measures(
    State(state): State<ApiState>,
    Json(request): Json<ListRequest>,
) -> ApiResult<MeasuresResponse> {
    let effective = resolve_effective_context(&state, &request.target);
    let server = require_endpoint(&effective.knowledge_repo, "knowledge repository")?;
    let measures = ops::measures::fetch_measures(server, effective.page_size)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(MeasuresResponse { measures }))
}

async fn patients(
    State(state): State<ApiState>,
    Json(request): Json<ListRequest>,
) -> ApiResult<PatientRoster> {
    let effective = resolve_effective_context(&state, &request.target);
    let server = require_endpoint(&effective.data_repo, "data repository")?;
    let roster = ops::patients::fetch_patients(server, effective.page_size)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(roster))
}

async fn groups(
    State(state): State<ApiState>,
    Json(request): Json<ListRequest>,
) -> ApiResult<GroupsResponse> {
    let effective = resolve_effective_context(&state, &request.target);
    let server = require_endpoint(&effective.data_repo, "data repository")?;
    let groups = ops::groups::fetch_groups(server, effective.page_size)
        .await
        .map_err(ApiError::upstream)?;
    Ok(ok(GroupsResponse { groups }))
}

async fn reports(
    State(state): State<ApiState>,
    Json(request): Json<ReportsRequest>,
) -> ApiResult<ReportsResponse> {
    let effective = resolve_effective_context(&state, &request.target);
    require_measure(&request.measure)?;
    let server = require_endpoint(&effective.evaluation, "evaluation")?;
    let subject = resolve_subject(request.patient, request.group)?;

    let reports = ops::reports::fetch_reports(
        server,
        &request.measure,
        subject.as_ref(),
        &effective.period_start,
        &effective.period_end,
        effective.page_size,
    )
    .await
    .map_err(ApiError::upstream)?;
    Ok(ok(ReportsResponse { reports }))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

fn resolve_effective_context(state: &ApiState, target: &TargetRequest) -> EffectiveContext {
    let mut config = state.config.clone();
    config.apply_overrides(ConfigOverrides {
        knowledge_repo: target.knowledge_repo.clone(),
        data_repo: target.data_repo.clone(),
        evaluation: target.evaluation.clone(),
        access_token: target.access_token.clone(),
        period_start: target.period_start.clone(),
        period_end: target.period_end.clone(),
    });
    EffectiveContext {
        knowledge_repo: config.servers.knowledge_repo,
        data_repo: config.servers.data_repo,
        evaluation: config.servers.evaluation,
        period_start: config.period.start,
        period_end: config.period.end,
        page_size: config.fetch.page_size,
    }
}

fn require_endpoint<'a>(
    endpoint: &'a ServerEndpoint,
    name: &'static str,
) -> std::result::Result<&'a ServerEndpoint, ApiError> {
    if !endpoint.is_configured() {
        return Err(ApiError::bad_request(format!(
            "no {name} server configured"
        )));
    }
    Ok(endpoint)
}

fn require_measure(measure: &str) -> std::result::Result<(), ApiError> {
    if measure.trim().is_empty() {
        return Err(ApiError::bad_request("measure is required"));
    }
    Ok(())
}

fn resolve_subject(
    patient: Option<String>,
    group: Option<String>,
) -> std::result::Result<Option<Subject>, ApiError> {
    match (patient, group) {
        (Some(_), Some(_)) => Err(ApiError::bad_request(
            "patient and group are mutually exclusive",
        )),
        (Some(patient), None) => {
            let id = patient.strip_prefix("Patient/").unwrap_or(&patient);
            if id.trim().is_empty() {
                return Err(ApiError::bad_request("patient id cannot be empty"));
            }
            Ok(Some(Subject::Patient(id.to_string())))
        }
        (None, Some(group)) => {
            let id = group.strip_prefix("Group/").unwrap_or(&group);
            if id.trim().is_empty() {
                return Err(ApiError::bad_request("group id cannot be empty"));
            }
            Ok(Some(Subject::Group(id.to_string())))
        }
        (None, None) => Ok(None),
    }
}

fn roster_patient(id: String) -> Patient {
    Patient {
        resource_type: "Patient".to_string(),
        id,
        name: Vec::new(),
        birth_date: None,
    }
}
