use std::fmt::Display;
use std::sync::Arc;

use float_cmp::approx_eq;
use serde_json::Value as JsonValue;

use crate::ast::Block;
use crate::model::ModelObject;

/// A captured block passed to a macro as its body parameter. Executing the
/// value re-enters the interpreter with the invocation-site bindings overlaid
/// on the current scope.
#[derive(Debug, Clone)]
pub struct BlockValue {
	pub block: Arc<Block>,
	/// Snapshot of the invocation-site variable bindings.
	pub scope: Vec<(String, Value)>,
}

impl PartialEq for BlockValue {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.block, &other.block)
	}
}

/// The polymorphic runtime value carried by variable bindings and produced
/// by expression evaluation.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Value {
	Null,
	Boolean(bool),
	Integer(i64),
	Real(f64),
	String(String),
	Collection(Vec<Value>),
	Object(Arc<ModelObject>),
	Block(BlockValue),
}

impl Value {
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Strict truthiness: only `Boolean(true)` is true. Conditions that
	/// evaluate to anything else do not match.
	pub fn is_true(&self) -> bool {
		matches!(self, Self::Boolean(true))
	}

	pub fn as_boolean(&self) -> Option<bool> {
		match self {
			Self::Boolean(value) => Some(*value),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(value) => Some(value),
			_ => None,
		}
	}

	/// The value's type name for diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Boolean(_) => "boolean",
			Self::Integer(_) => "integer",
			Self::Real(_) => "real",
			Self::String(_) => "string",
			Self::Collection(_) => "collection",
			Self::Object(_) => "object",
			Self::Block(_) => "block",
		}
	}

	/// View the value as an iterable sequence: collections iterate their
	/// elements, `null` is empty, and any other value is a singleton.
	pub fn into_sequence(self) -> Vec<Value> {
		match self {
			Self::Collection(items) => items,
			Self::Null => vec![],
			other => vec![other],
		}
	}

	/// Convert raw JSON (model property data) into a runtime value.
	pub fn from_json(value: &JsonValue) -> Self {
		match value {
			JsonValue::Null => Self::Null,
			JsonValue::Bool(b) => Self::Boolean(*b),
			JsonValue::Number(number) => {
				if let Some(int) = number.as_i64() {
					Self::Integer(int)
				} else {
					Self::Real(number.as_f64().unwrap_or(f64::NAN))
				}
			}
			JsonValue::String(s) => Self::String(s.clone()),
			JsonValue::Array(items) => {
				Self::Collection(items.iter().map(Self::from_json).collect())
			}
			JsonValue::Object(_) => {
				match ModelObject::from_json(value) {
					Ok(object) => Self::Object(object),
					Err(_) => Self::Null,
				}
			}
		}
	}

	/// The canonical textual form used when writing a value into output.
	/// `null` renders as the empty string; statements skip writing null
	/// results entirely.
	pub fn canonical_string(&self) -> String {
		self.to_string()
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Boolean(a), Self::Boolean(b)) => a == b,
			(Self::Integer(a), Self::Integer(b)) => a == b,
			(Self::Real(a), Self::Real(b)) => approx_eq!(f64, *a, *b, ulps = 2),
			// Numeric comparison crosses the integer/real divide.
			(Self::Integer(a), Self::Real(b)) | (Self::Real(b), Self::Integer(a)) => {
				approx_eq!(f64, *a as f64, *b, ulps = 2)
			}
			(Self::String(a), Self::String(b)) => a == b,
			(Self::Collection(a), Self::Collection(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => a == b,
			(Self::Block(a), Self::Block(b)) => a == b,
			_ => false,
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Null => Ok(()),
			Self::Boolean(value) => write!(f, "{value}"),
			Self::Integer(value) => write!(f, "{value}"),
			Self::Real(value) => {
				if value.fract() == 0.0 && value.is_finite() {
					write!(f, "{value:.1}")
				} else {
					write!(f, "{value}")
				}
			}
			Self::String(value) => write!(f, "{value}"),
			Self::Collection(items) => {
				write!(f, "[")?;
				for (index, item) in items.iter().enumerate() {
					if index > 0 {
						write!(f, ", ")?;
					}
					match item {
						Self::Null => write!(f, "null")?,
						other => write!(f, "{other}")?,
					}
				}
				write!(f, "]")
			}
			Self::Object(object) => write!(f, "{}", object.identity()),
			Self::Block(_) => Ok(()),
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Boolean(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Integer(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Real(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl<T> From<Vec<T>> for Value
where
	T: Into<Value>,
{
	fn from(values: Vec<T>) -> Self {
		Self::Collection(values.into_iter().map(Into::into).collect())
	}
}
