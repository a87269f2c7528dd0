pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Corpus error: {message}")]
	Corpus { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Run cancelled by the consumer.")]
	Cancelled,
	#[error("{operation} timed out after {timeout_ms} ms.")]
	Timeout { operation: String, timeout_ms: u64 },
}
impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
