use std::{
	io::ErrorKind,
	path::{Component, Path, PathBuf},
};

use serde::Deserialize;
use serde_json::Value;
use tokio::{fs, io::AsyncWriteExt};

use super::{ParamType, ToolExecutor, ToolKind, ToolParam, ToolResult, ToolSpec, decode_input};
use crate::BoxFuture;

const MAX_LIST_ENTRIES: usize = 200;

/// Allow-list of directories. Paths are checked after symlink resolution.
#[derive(Clone, Debug)]
struct Sandbox {
	roots: Vec<PathBuf>,
}
impl Sandbox {
	async fn canonical_roots(&self) -> Vec<PathBuf> {
		let mut out = Vec::with_capacity(self.roots.len());

		for root in &self.roots {
			if let Ok(root) = fs::canonicalize(root).await {
				out.push(root);
			}
		}

		out
	}

	async fn check(&self, canonical: &Path) -> Result<(), String> {
		let roots = self.canonical_roots().await;

		if roots.iter().any(|root| canonical.starts_with(root)) {
			return Ok(());
		}

		Err(format!("Access denied: {} is outside the allowed directories.", canonical.display()))
	}

	async fn resolve_existing(&self, raw: &str) -> Result<PathBuf, String> {
		let canonical = fs::canonicalize(raw).await.map_err(|err| match err.kind() {
			ErrorKind::NotFound => format!("Path not found: {raw}."),
			_ => format!("Cannot resolve {raw}: {err}."),
		})?;

		self.check(&canonical).await?;

		Ok(canonical)
	}

	/// Resolves a possibly missing target through its nearest existing ancestor.
	/// Any existing entry on the way, including a dangling symlink, must resolve
	/// inside a root.
	async fn resolve_for_write(&self, raw: &str) -> Result<PathBuf, String> {
		let path = Path::new(raw);

		if path.components().any(|component| matches!(component, Component::ParentDir)) {
			return Err(format!("Access denied: {raw} contains a parent directory reference."));
		}
		if fs::symlink_metadata(path).await.is_ok() {
			return self.resolve_existing(raw).await.map_err(|message| {
				if message.starts_with("Path not found") {
					format!("Access denied: {raw} is a link that does not resolve.")
				} else {
					message
				}
			});
		}

		for ancestor in path.ancestors().skip(1) {
			let candidate = if ancestor.as_os_str().is_empty() { Path::new(".") } else { ancestor };
			let canonical = match fs::canonicalize(candidate).await {
				Ok(canonical) => canonical,
				Err(_) if fs::symlink_metadata(candidate).await.is_ok() => {
					return Err(format!(
						"Access denied: {} is a link that does not resolve.",
						candidate.display()
					));
				},
				Err(_) => continue,
			};
			let rest = path.strip_prefix(ancestor).map_err(|err| err.to_string())?;
			let target = canonical.join(rest);

			self.check(&target).await?;

			return Ok(target);
		}

		Err(format!("Cannot resolve {raw}."))
	}
}

#[derive(Deserialize)]
struct ReadFileInput {
	file_path: String,
	max_lines: Option<u32>,
}

pub struct ReadFileTool {
	spec: ToolSpec,
	sandbox: Sandbox,
	max_lines: u32,
}
impl ReadFileTool {
	pub fn new(roots: Vec<PathBuf>, max_lines: u32) -> Self {
		let spec = ToolSpec::new(
			"read_file",
			"Read a text file from an allowed directory.",
			ToolKind::FileRead,
			vec![
				ToolParam::required("file_path", ParamType::String, "Path of the file to read."),
				ToolParam::optional("max_lines", ParamType::Integer, "Maximum lines to return."),
			],
		);

		Self { spec, sandbox: Sandbox { roots }, max_lines }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: ReadFileInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let path = match self.sandbox.resolve_existing(&input.file_path).await {
			Ok(path) => path,
			Err(message) => return ToolResult::failure(message),
		};

		match fs::metadata(&path).await {
			Ok(meta) if meta.is_file() => {},
			Ok(_) => return ToolResult::failure(format!("{} is not a file.", input.file_path)),
			Err(err) => return ToolResult::failure(format!("Cannot stat {}: {err}.", input.file_path)),
		}

		let text = match fs::read_to_string(&path).await {
			Ok(text) => text,
			Err(err) if err.kind() == ErrorKind::InvalidData =>
				return ToolResult::failure(format!("{} is not a UTF-8 text file.", input.file_path)),
			Err(err) => return ToolResult::failure(format!("Cannot read {}: {err}.", input.file_path)),
		};
		let limit = input.max_lines.unwrap_or(self.max_lines).clamp(1, self.max_lines) as usize;
		let total_lines = text.lines().count();
		let mut output = text.lines().take(limit).collect::<Vec<_>>().join("\n");
		let truncated = total_lines > limit;

		if truncated {
			output.push_str(&format!("\n\n[truncated: showing {limit} of {total_lines} lines]"));
		}

		ToolResult::ok(output).with_data(serde_json::json!({
			"path": path.display().to_string(),
			"total_lines": total_lines,
			"shown_lines": total_lines.min(limit),
			"truncated": truncated,
		}))
	}
}
impl ToolExecutor for ReadFileTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}

#[derive(Deserialize)]
struct ListDirectoryInput {
	path: String,
}

pub struct ListDirectoryTool {
	spec: ToolSpec,
	sandbox: Sandbox,
}
impl ListDirectoryTool {
	pub fn new(roots: Vec<PathBuf>) -> Self {
		let spec = ToolSpec::new(
			"list_directory",
			"List the entries of an allowed directory.",
			ToolKind::FileRead,
			vec![ToolParam::required("path", ParamType::String, "Directory to list.")],
		);

		Self { spec, sandbox: Sandbox { roots } }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: ListDirectoryInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let path = match self.sandbox.resolve_existing(&input.path).await {
			Ok(path) => path,
			Err(message) => return ToolResult::failure(message),
		};
		let mut reader = match fs::read_dir(&path).await {
			Ok(reader) => reader,
			Err(err) => return ToolResult::failure(format!("Cannot list {}: {err}.", input.path)),
		};
		let mut entries = Vec::new();

		loop {
			match reader.next_entry().await {
				Ok(Some(entry)) => {
					let name = entry.file_name().to_string_lossy().into_owned();
					let (is_dir, size) = match entry.metadata().await {
						Ok(meta) => (meta.is_dir(), meta.len()),
						Err(_) => (false, 0),
					};

					entries.push((name, is_dir, size));
				},
				Ok(None) => break,
				Err(err) =>
					return ToolResult::failure(format!("Cannot list {}: {err}.", input.path)),
			}
		}

		entries.sort_by(|a, b| a.0.cmp(&b.0));

		let total = entries.len();

		entries.truncate(MAX_LIST_ENTRIES);

		let mut output = format!("{} ({total} entries):\n", input.path);

		for (name, is_dir, size) in &entries {
			if *is_dir {
				output.push_str(&format!("- {name}/\n"));
			} else {
				output.push_str(&format!("- {name} ({size} bytes)\n"));
			}
		}
		if total > entries.len() {
			output.push_str(&format!("[showing first {} of {total} entries]\n", entries.len()));
		}

		let data: Vec<Value> = entries
			.iter()
			.map(|(name, is_dir, size)| {
				serde_json::json!({
					"name": name,
					"kind": if *is_dir { "directory" } else { "file" },
					"size": size,
				})
			})
			.collect();

		ToolResult::ok(output).with_data(Value::Array(data))
	}
}
impl ToolExecutor for ListDirectoryTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}

#[derive(Deserialize)]
struct WriteFileInput {
	file_path: String,
	content: String,
	#[serde(default)]
	append: bool,
}

/// The only tool with side effects.
pub struct WriteFileTool {
	spec: ToolSpec,
	sandbox: Sandbox,
	max_bytes: u64,
}
impl WriteFileTool {
	pub fn new(roots: Vec<PathBuf>, max_bytes: u64) -> Self {
		let spec = ToolSpec::new(
			"write_file",
			"Write or append text to a file inside an allowed output directory.",
			ToolKind::FileWrite,
			vec![
				ToolParam::required("file_path", ParamType::String, "Path of the file to write."),
				ToolParam::required("content", ParamType::String, "Text to write."),
				ToolParam::optional("append", ParamType::Boolean, "Append instead of overwrite."),
			],
		);

		Self { spec, sandbox: Sandbox { roots }, max_bytes }
	}

	async fn run(&self, input: &Value) -> ToolResult {
		let input: WriteFileInput = match decode_input(input) {
			Ok(input) => input,
			Err(result) => return result,
		};
		let size = input.content.len() as u64;

		if size > self.max_bytes {
			return ToolResult::failure(format!(
				"Content is {size} bytes, over the {} byte limit.",
				self.max_bytes
			));
		}

		let path = match self.sandbox.resolve_for_write(&input.file_path).await {
			Ok(path) => path,
			Err(message) => return ToolResult::failure(message),
		};

		let created = match create_parents(&path).await {
			Ok(created) => created,
			Err(message) => return ToolResult::failure(message),
		};
		let written = if input.append {
			append(&path, input.content.as_bytes()).await
		} else {
			fs::write(&path, input.content.as_bytes()).await
		};

		if let Err(err) = written {
			if let Some(dir) = created {
				remove_created(&dir).await;
			}

			return ToolResult::failure(format!("Cannot write {}: {err}.", input.file_path));
		}

		tracing::info!(path = %path.display(), bytes = size, append = input.append, "File written.");

		let verb = if input.append { "Appended" } else { "Wrote" };

		ToolResult::ok(format!("{verb} {size} bytes to {}.", input.file_path)).with_data(
			serde_json::json!({
				"path": path.display().to_string(),
				"bytes": size,
				"append": input.append,
			}),
		)
	}
}
impl ToolExecutor for WriteFileTool {
	fn spec(&self) -> &ToolSpec {
		&self.spec
	}

	fn execute<'a>(&'a self, input: &'a Value) -> BoxFuture<'a, ToolResult> {
		Box::pin(self.run(input))
	}
}

/// Creates the missing parents of `path` and returns the topmost directory it
/// created, so a failed write can be rolled back.
async fn create_parents(path: &Path) -> Result<Option<PathBuf>, String> {
	let Some(parent) = path.parent() else {
		return Ok(None);
	};
	let mut topmost = None;

	for dir in parent.ancestors() {
		if fs::symlink_metadata(dir).await.is_ok() {
			break;
		}

		topmost = Some(dir.to_path_buf());
	}

	if let Err(err) = fs::create_dir_all(parent).await {
		if let Some(dir) = &topmost {
			remove_created(dir).await;
		}

		return Err(format!("Cannot create {}: {err}.", parent.display()));
	}

	Ok(topmost)
}

async fn remove_created(dir: &Path) {
	if let Err(err) = fs::remove_dir_all(dir).await {
		tracing::warn!(path = %dir.display(), error = %err, "Failed to remove directories created for a failed write.");
	}
}

async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
	let mut file = fs::OpenOptions::new().create(true).append(true).open(path).await?;

	file.write_all(bytes).await?;
	file.flush().await
}
