use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
	Retrieval,
	ExternalSearch,
	FileRead,
	FileWrite,
	Analysis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
	String,
	Integer,
	Number,
	Boolean,
	Object,
	Array,
}
impl ParamType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::String => "string",
			Self::Integer => "integer",
			Self::Number => "number",
			Self::Boolean => "boolean",
			Self::Object => "object",
			Self::Array => "array",
		}
	}

	fn accepts(self, value: &Value) -> bool {
		match self {
			Self::String => value.is_string(),
			Self::Integer => value.is_i64() || value.is_u64(),
			Self::Number => value.is_number(),
			Self::Boolean => value.is_boolean(),
			Self::Object => value.is_object(),
			Self::Array => value.is_array(),
		}
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct ToolParam {
	pub name: String,
	pub kind: ParamType,
	pub description: String,
	pub required: bool,
	pub allowed: Vec<String>,
}
impl ToolParam {
	pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
		Self {
			name: name.to_string(),
			kind,
			description: description.to_string(),
			required: true,
			allowed: Vec::new(),
		}
	}

	pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
		Self { required: false, ..Self::required(name, kind, description) }
	}

	pub fn one_of(mut self, allowed: &[&str]) -> Self {
		self.allowed = allowed.iter().map(|value| value.to_string()).collect();

		self
	}
}

/// What a tool is and what it accepts, independent of how it runs.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
	pub name: String,
	pub description: String,
	pub kind: ToolKind,
	pub params: Vec<ToolParam>,
}
impl ToolSpec {
	pub fn new(name: &str, description: &str, kind: ToolKind, params: Vec<ToolParam>) -> Self {
		Self { name: name.to_string(), description: description.to_string(), kind, params }
	}

	/// JSON Schema object describing the accepted input.
	pub fn input_schema(&self) -> Value {
		let mut properties = Map::new();
		let mut required = Vec::new();

		for param in &self.params {
			let mut property = serde_json::json!({
				"type": param.kind.as_str(),
				"description": param.description,
			});

			if !param.allowed.is_empty() {
				property["enum"] = Value::from(param.allowed.clone());
			}

			properties.insert(param.name.clone(), property);

			if param.required {
				required.push(Value::String(param.name.clone()));
			}
		}

		serde_json::json!({
			"type": "object",
			"properties": properties,
			"required": required,
		})
	}

	/// Checks object shape, required keys, primitive types and enumerations.
	pub fn validate(&self, input: &Value) -> Result<(), String> {
		let empty = Map::new();
		let object = match input {
			Value::Null => &empty,
			Value::Object(object) => object,
			_ => return Err(format!("Input for {} must be a JSON object.", self.name)),
		};

		for param in &self.params {
			let value = object.get(&param.name).filter(|value| !value.is_null());
			let Some(value) = value else {
				if param.required {
					return Err(format!("Missing required parameter '{}'.", param.name));
				}

				continue;
			};

			if !param.kind.accepts(value) {
				return Err(format!(
					"Parameter '{}' must be of type {}.",
					param.name,
					param.kind.as_str()
				));
			}
			if let Some(raw) = value.as_str() {
				if param.kind == ParamType::String && param.required && raw.trim().is_empty() {
					return Err(format!("Parameter '{}' must be non-empty.", param.name));
				}
				if !param.allowed.is_empty() && !param.allowed.iter().any(|allowed| allowed == raw)
				{
					return Err(format!(
						"Parameter '{}' must be one of: {}.",
						param.name,
						param.allowed.join(", ")
					));
				}
			}
		}

		Ok(())
	}
}
