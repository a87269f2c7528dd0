use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{get, post},
};
use futures::{Stream, stream};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use lore_service::{
	AgentRequest, AgentResponse, AnswerResponse, Error, RebuildProgress, RetrievalMethod, RetrievalResult,
	RetrieveRequest, SourceSummary, ToolDescriptor,
};

#[derive(Debug, Deserialize)]
pub struct RetrieveBody {
	pub query: String,
	pub top_k: Option<u32>,
	pub method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
	pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct CorpusStatus {
	pub snapshot_version: u64,
	pub chunk_count: usize,
	pub sources: Vec<SourceSummary>,
	pub rebuild: RebuildProgress,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/retrieve", post(retrieve))
		.route("/v1/answer", post(answer))
		.route("/v1/agent/run", post(run_agent))
		.route("/v1/agent/stream", post(stream_agent))
		.route("/v1/tools", get(tools))
		.with_state(state)
}

pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/admin/corpus/rebuild", post(rebuild_corpus))
		.route("/v1/admin/corpus/status", get(corpus_status))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn retrieve(
	State(state): State<AppState>,
	Json(payload): Json<RetrieveBody>,
) -> Result<Json<RetrievalResult>, ApiError> {
	let method = match payload.method.as_deref() {
		None => RetrievalMethod::default(),
		Some(raw) => RetrievalMethod::parse(raw).ok_or_else(|| {
			json_error(
				StatusCode::BAD_REQUEST,
				"invalid_request",
				"method must be one of hybrid, lexical or vector.",
				Some(vec!["method".to_string()]),
			)
		})?,
	};
	let response = state
		.service
		.retrieve(RetrieveRequest { query: payload.query, top_k: payload.top_k, method })
		.await?;

	Ok(Json(response))
}

async fn answer(
	State(state): State<AppState>,
	Json(payload): Json<AgentRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
	let response = state.service.answer(payload).await?;

	Ok(Json(response))
}

async fn run_agent(
	State(state): State<AppState>,
	Json(payload): Json<AgentRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
	let response = state.service.run_agent(payload).await?;

	Ok(Json(response))
}

/// One `data:` frame per event. Dropping the connection drops the receiver,
/// which cancels the run.
async fn stream_agent(
	State(state): State<AppState>,
	Json(payload): Json<AgentRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
	let rx = state.service.stream_agent(payload)?;
	let events = stream::unfold(rx, |mut rx| async move {
		rx.recv().await.map(|event| (Event::default().json_data(&event), rx))
	});

	Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn tools(State(state): State<AppState>) -> Json<ToolsResponse> {
	Json(ToolsResponse { tools: state.service.tool_catalog() })
}

async fn rebuild_corpus(
	State(state): State<AppState>,
) -> Result<(StatusCode, Json<RebuildProgress>), ApiError> {
	let progress = state.service.start_rebuild()?;

	Ok((StatusCode::ACCEPTED, Json(progress)))
}

async fn corpus_status(State(state): State<AppState>) -> Json<CorpusStatus> {
	let snapshot = state.service.corpus.snapshot();

	Json(CorpusStatus {
		snapshot_version: snapshot.version,
		chunk_count: snapshot.len(),
		sources: snapshot.sources(),
		rebuild: state.service.rebuild_progress(),
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let (status, code) = match &err {
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
			Error::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
			Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
			Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
			Error::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
			Error::Corpus { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "corpus_error"),
			Error::Configuration { .. } =>
				(StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
		};

		if status.is_server_error() {
			tracing::error!(error = %err, "Request failed.");
		}

		json_error(status, code, err.to_string(), None)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
