use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Validation variants name the offending setting by its dotted TOML key.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read config file {path:?}.")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Config file {path:?} is not valid TOML: {source}")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	#[error("{key} must be non-empty.")]
	Blank { key: String },
	#[error("{key} must be {expected}.")]
	OutOfRange { key: String, expected: &'static str },
	/// Settings that are valid alone but not together.
	#[error("{message}")]
	Conflict { keys: Vec<&'static str>, message: &'static str },
}
impl Error {
	pub(crate) fn blank(key: impl Into<String>) -> Self {
		Self::Blank { key: key.into() }
	}

	pub(crate) fn out_of_range(key: impl Into<String>, expected: &'static str) -> Self {
		Self::OutOfRange { key: key.into(), expected }
	}

	/// Keys a validation error is about. Empty for read and syntax errors.
	pub fn keys(&self) -> Vec<&str> {
		match self {
			Self::ReadConfig { .. } | Self::ParseConfig { .. } => Vec::new(),
			Self::Blank { key } | Self::OutOfRange { key, .. } => vec![key.as_str()],
			Self::Conflict { keys, .. } => keys.clone(),
		}
	}
}
