pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to prepare {path}: {source}")]
	Io { path: std::path::PathBuf, source: std::io::Error },
}
