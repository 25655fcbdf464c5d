use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::MotlError;
use crate::MotlResult;

/// A single model element. Opaque to the interpreter except for property
/// lookup, children traversal, and display identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
	pub type_name: String,
	pub name: Option<String>,
	pub properties: BTreeMap<String, JsonValue>,
	pub children: Vec<Arc<ModelObject>>,
}

impl ModelObject {
	/// Resolve a property by name. `name`, `type`, and `children` are
	/// implicit properties when not shadowed by an explicit one.
	pub fn property(&self, name: &str) -> Option<PropertyValue> {
		if let Some(value) = self.properties.get(name) {
			return Some(PropertyValue::Json(value.clone()));
		}
		match name {
			"name" => {
				self.name
					.as_ref()
					.map(|value| PropertyValue::Json(JsonValue::String(value.clone())))
			}
			"type" => {
				Some(PropertyValue::Json(JsonValue::String(
					self.type_name.clone(),
				)))
			}
			"children" => Some(PropertyValue::Objects(self.children.clone())),
			_ => None,
		}
	}

	/// A stable human-readable identity used for trace links and canonical
	/// display: `Type#name` when named, the bare type otherwise.
	pub fn identity(&self) -> String {
		match &self.name {
			Some(name) => format!("{}#{name}", self.type_name),
			None => self.type_name.clone(),
		}
	}

	/// Build a model object from a JSON value. Objects use the reserved keys
	/// `type`, `name`, `properties`, and `children`; any other top-level key
	/// is treated as a property.
	pub fn from_json(value: &JsonValue) -> MotlResult<Arc<Self>> {
		let JsonValue::Object(map) = value else {
			return Err(MotlError::TypeError(format!(
				"model objects must be JSON objects, found {}",
				json_type_name(value)
			)));
		};

		let type_name = map
			.get("type")
			.and_then(JsonValue::as_str)
			.unwrap_or("Object")
			.to_string();
		let name = map
			.get("name")
			.and_then(JsonValue::as_str)
			.map(str::to_string);

		let mut properties = BTreeMap::new();
		if let Some(JsonValue::Object(explicit)) = map.get("properties") {
			for (key, value) in explicit {
				properties.insert(key.clone(), value.clone());
			}
		}
		for (key, value) in map {
			if matches!(key.as_str(), "type" | "name" | "properties" | "children") {
				continue;
			}
			properties.entry(key.clone()).or_insert_with(|| value.clone());
		}

		let mut children = vec![];
		if let Some(JsonValue::Array(raw_children)) = map.get("children") {
			for child in raw_children {
				children.push(Self::from_json(child)?);
			}
		}

		Ok(Arc::new(Self {
			type_name,
			name,
			properties,
			children,
		}))
	}
}

/// The result of a property lookup: either raw JSON data or nested model
/// objects.
#[derive(Debug, Clone)]
pub enum PropertyValue {
	Json(JsonValue),
	Objects(Vec<Arc<ModelObject>>),
}

/// An opaque model resource: the root objects of one loaded model, accepted
/// by `register_model(alias, resource)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResource {
	pub roots: Vec<Arc<ModelObject>>,
}

impl ModelResource {
	pub fn new(roots: Vec<Arc<ModelObject>>) -> Self {
		Self { roots }
	}

	/// Parse a resource from JSON text: a single root object or an array of
	/// root objects.
	pub fn from_json_str(source: &str) -> MotlResult<Self> {
		let value: JsonValue = serde_json::from_str(source)
			.map_err(|error| MotlError::FileError(format!("invalid model JSON: {error}")))?;

		let roots = match &value {
			JsonValue::Array(items) => {
				items
					.iter()
					.map(ModelObject::from_json)
					.collect::<MotlResult<Vec<_>>>()?
			}
			JsonValue::Object(_) => vec![ModelObject::from_json(&value)?],
			other => {
				return Err(MotlError::TypeError(format!(
					"a model must be a JSON object or array, found {}",
					json_type_name(other)
				)));
			}
		};

		Ok(Self { roots })
	}

	/// Read and parse a resource from a file path.
	pub fn from_path(path: impl AsRef<Path>) -> MotlResult<Self> {
		let source = std::fs::read_to_string(path.as_ref()).map_err(|error| {
			MotlError::FileError(format!(
				"failed to read model `{}`: {error}",
				path.as_ref().display()
			))
		})?;
		Self::from_json_str(&source)
	}
}

fn json_type_name(value: &JsonValue) -> &'static str {
	match value {
		JsonValue::Null => "null",
		JsonValue::Bool(_) => "boolean",
		JsonValue::Number(_) => "number",
		JsonValue::String(_) => "string",
		JsonValue::Array(_) => "array",
		JsonValue::Object(_) => "object",
	}
}
