use std::collections::HashMap;

use crate::MotlError;
use crate::MotlResult;
use crate::expr::BinaryOp;
use crate::expr::CollectionOp;
use crate::expr::ExprKind;
use crate::expr::Expression;
use crate::model::PropertyValue;
use crate::value::Value;

/// Name an element binds to inside a collection-operation body when no
/// iterator variable is declared.
const IMPLICIT_ITERATOR: &str = "self";

/// The expression evaluator.
///
/// Owns the variable bindings for a generation run: the execution context
/// delegates its variable scoping here, so expression-level lookups always
/// see exactly the bindings the interpreter wrote.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
	/// Saved scopes, outermost first.
	saved: Vec<HashMap<String, Value>>,
	/// The innermost (current) scope.
	current: HashMap<String, Value>,
}

impl ExpressionEvaluator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bind a variable in the current scope.
	pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
		self.current.insert(name.into(), value);
	}

	/// Look a variable up, innermost scope outwards.
	pub fn get_variable(&self, name: &str) -> Option<&Value> {
		if let Some(value) = self.current.get(name) {
			return Some(value);
		}
		self.saved.iter().rev().find_map(|scope| scope.get(name))
	}

	/// Save the current scope and start a fresh one. Outer bindings remain
	/// visible through the saved stack.
	pub fn push_scope(&mut self) {
		self.saved.push(std::mem::take(&mut self.current));
	}

	/// Restore the most recently saved scope, discarding local shadowings.
	pub fn pop_scope(&mut self) {
		self.current = self.saved.pop().unwrap_or_default();
	}

	pub fn scope_depth(&self) -> usize {
		self.saved.len()
	}

	/// Snapshot every visible binding, outermost first so that re-applying
	/// them in order reproduces the shadowing.
	pub fn visible_bindings(&self) -> Vec<(String, Value)> {
		let mut merged: Vec<(String, Value)> = vec![];
		for scope in self.saved.iter().chain(std::iter::once(&self.current)) {
			for (name, value) in scope {
				if let Some(entry) = merged.iter_mut().find(|(n, _)| n == name) {
					entry.1 = value.clone();
				} else {
					merged.push((name.clone(), value.clone()));
				}
			}
		}
		merged
	}

	/// Evaluate an expression to a value; `Null` models the absent result.
	pub fn evaluate(&mut self, expr: &Expression) -> MotlResult<Value> {
		match &expr.kind {
			ExprKind::Boolean(value) => Ok(Value::Boolean(*value)),
			ExprKind::Integer(value) => Ok(Value::Integer(*value)),
			ExprKind::Real(value) => Ok(Value::Real(*value)),
			ExprKind::String(value) => Ok(Value::String(value.clone())),
			ExprKind::Variable(name) => {
				self.get_variable(name)
					.cloned()
					.ok_or_else(|| MotlError::VariableNotFound(name.clone()))
			}
			ExprKind::Binary { op, left, right } => self.evaluate_binary(*op, left, right),
			ExprKind::Navigation { source, property } => {
				let source = self.evaluate(source)?;
				navigate(&source, property)
			}
			ExprKind::CollectionCall {
				source,
				op,
				iterator,
				body,
			} => {
				let source = self.evaluate(source)?;
				self.evaluate_collection_call(source, *op, iterator.as_deref(), body.as_deref())
			}
		}
	}

	fn evaluate_binary(
		&mut self,
		op: BinaryOp,
		left: &Expression,
		right: &Expression,
	) -> MotlResult<Value> {
		// `and`/`or` short-circuit; everything else evaluates both sides.
		if matches!(op, BinaryOp::And | BinaryOp::Or) {
			let left = self.evaluate(left)?;
			let Some(left) = left.as_boolean() else {
				return Err(MotlError::TypeError(format!(
					"`{op}` expects boolean operands, found {}",
					left.type_name()
				)));
			};
			match (op, left) {
				(BinaryOp::And, false) => return Ok(Value::Boolean(false)),
				(BinaryOp::Or, true) => return Ok(Value::Boolean(true)),
				_ => {}
			}
			let right = self.evaluate(right)?;
			let Some(right) = right.as_boolean() else {
				return Err(MotlError::TypeError(format!(
					"`{op}` expects boolean operands, found {}",
					right.type_name()
				)));
			};
			return Ok(Value::Boolean(right));
		}

		let left = self.evaluate(left)?;
		let right = self.evaluate(right)?;

		match op {
			BinaryOp::Add => add_values(&left, &right),
			BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
				arithmetic(op, &left, &right)
			}
			BinaryOp::Equals => Ok(Value::Boolean(left == right)),
			BinaryOp::NotEquals => Ok(Value::Boolean(left != right)),
			BinaryOp::LessThan
			| BinaryOp::GreaterThan
			| BinaryOp::LessOrEqual
			| BinaryOp::GreaterOrEqual => compare(op, &left, &right),
			BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited above"),
		}
	}

	fn evaluate_collection_call(
		&mut self,
		source: Value,
		op: CollectionOp,
		iterator: Option<&str>,
		body: Option<&Expression>,
	) -> MotlResult<Value> {
		let items = source.into_sequence();

		match op {
			CollectionOp::Size => Ok(Value::Integer(items.len() as i64)),
			CollectionOp::IsEmpty => Ok(Value::Boolean(items.is_empty())),
			CollectionOp::NotEmpty => Ok(Value::Boolean(!items.is_empty())),
			CollectionOp::First => Ok(items.into_iter().next().unwrap_or(Value::Null)),
			CollectionOp::Last => Ok(items.into_iter().next_back().unwrap_or(Value::Null)),
			CollectionOp::Select | CollectionOp::Reject => {
				let body = required_body(op, body)?;
				let keep_on = matches!(op, CollectionOp::Select);
				let mut selected = vec![];
				for item in items {
					if self.iterate_boolean(op, iterator, body, item.clone())? == keep_on {
						selected.push(item);
					}
				}
				Ok(Value::Collection(selected))
			}
			CollectionOp::Any => {
				let body = required_body(op, body)?;
				for item in items {
					if self.iterate_boolean(op, iterator, body, item.clone())? {
						return Ok(item);
					}
				}
				Ok(Value::Null)
			}
			CollectionOp::Exists => {
				let body = required_body(op, body)?;
				for item in items {
					if self.iterate_boolean(op, iterator, body, item)? {
						return Ok(Value::Boolean(true));
					}
				}
				Ok(Value::Boolean(false))
			}
			CollectionOp::ForAll => {
				let body = required_body(op, body)?;
				for item in items {
					if !self.iterate_boolean(op, iterator, body, item)? {
						return Ok(Value::Boolean(false));
					}
				}
				Ok(Value::Boolean(true))
			}
			CollectionOp::Collect => {
				let body = required_body(op, body)?;
				let mut collected = vec![];
				for item in items {
					let value = self.iterate(iterator, body, item)?;
					// One level of flattening, per OCL convention.
					match value {
						Value::Collection(nested) => collected.extend(nested),
						other => collected.push(other),
					}
				}
				Ok(Value::Collection(collected))
			}
		}
	}

	/// Evaluate a lambda body with the element bound to the iterator name.
	fn iterate(
		&mut self,
		iterator: Option<&str>,
		body: &Expression,
		item: Value,
	) -> MotlResult<Value> {
		let name = iterator.unwrap_or(IMPLICIT_ITERATOR);
		self.push_scope();
		self.set_variable(name, item);
		let result = self.evaluate(body);
		self.pop_scope();
		result
	}

	fn iterate_boolean(
		&mut self,
		op: CollectionOp,
		iterator: Option<&str>,
		body: &Expression,
		item: Value,
	) -> MotlResult<bool> {
		let value = self.iterate(iterator, body, item)?;
		value.as_boolean().ok_or_else(|| {
			MotlError::TypeError(format!(
				"`{op}` body must evaluate to a boolean, found {}",
				value.type_name()
			))
		})
	}
}

fn required_body<'a>(
	op: CollectionOp,
	body: Option<&'a Expression>,
) -> MotlResult<&'a Expression> {
	body.ok_or_else(|| {
		MotlError::MalformedExpression(format!("`{op}` requires a body expression"))
	})
}

/// `source.property` resolution. Null propagates; model objects resolve
/// their properties (a missing property is null); any other receiver is a
/// type error.
fn navigate(source: &Value, property: &str) -> MotlResult<Value> {
	match source {
		Value::Null => Ok(Value::Null),
		Value::Object(object) => {
			match object.property(property) {
				Some(PropertyValue::Json(json)) => Ok(Value::from_json(&json)),
				Some(PropertyValue::Objects(objects)) => {
					Ok(Value::Collection(
						objects.into_iter().map(Value::Object).collect(),
					))
				}
				None => Ok(Value::Null),
			}
		}
		other => {
			Err(MotlError::TypeError(format!(
				"cannot navigate `{property}` on a {} value",
				other.type_name()
			)))
		}
	}
}

/// `+`: numeric addition, or string concatenation when either side is a
/// string.
fn add_values(left: &Value, right: &Value) -> MotlResult<Value> {
	match (left, right) {
		(Value::String(_), _) | (_, Value::String(_)) => {
			Ok(Value::String(format!(
				"{}{}",
				left.canonical_string(),
				right.canonical_string()
			)))
		}
		(Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
		_ => {
			let (a, b) = numeric_operands(BinaryOp::Add, left, right)?;
			Ok(Value::Real(a + b))
		}
	}
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> MotlResult<Value> {
	if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
		return match op {
			BinaryOp::Subtract => Ok(Value::Integer(a - b)),
			BinaryOp::Multiply => Ok(Value::Integer(a * b)),
			BinaryOp::Divide => {
				if *b == 0 {
					Err(MotlError::TypeError("division by zero".to_string()))
				} else {
					Ok(Value::Integer(a / b))
				}
			}
			_ => unreachable!("arithmetic handles -, *, / only"),
		};
	}

	let (a, b) = numeric_operands(op, left, right)?;
	match op {
		BinaryOp::Subtract => Ok(Value::Real(a - b)),
		BinaryOp::Multiply => Ok(Value::Real(a * b)),
		BinaryOp::Divide => {
			if b == 0.0 {
				Err(MotlError::TypeError("division by zero".to_string()))
			} else {
				Ok(Value::Real(a / b))
			}
		}
		_ => unreachable!("arithmetic handles -, *, / only"),
	}
}

/// Ordering comparisons: numeric across integer/real, strings by codepoint
/// order.
fn compare(op: BinaryOp, left: &Value, right: &Value) -> MotlResult<Value> {
	let ordering = match (left, right) {
		(Value::String(a), Value::String(b)) => a.cmp(b),
		_ => {
			let (a, b) = numeric_operands(op, left, right)?;
			a.partial_cmp(&b).ok_or_else(|| {
				MotlError::TypeError(format!("`{op}` cannot order {a} and {b}"))
			})?
		}
	};

	let result = match op {
		BinaryOp::LessThan => ordering.is_lt(),
		BinaryOp::GreaterThan => ordering.is_gt(),
		BinaryOp::LessOrEqual => ordering.is_le(),
		BinaryOp::GreaterOrEqual => ordering.is_ge(),
		_ => unreachable!("compare handles ordering operators only"),
	};
	Ok(Value::Boolean(result))
}

fn numeric_operands(op: BinaryOp, left: &Value, right: &Value) -> MotlResult<(f64, f64)> {
	let coerce = |value: &Value| {
		match value {
			Value::Integer(int) => Some(*int as f64),
			Value::Real(real) => Some(*real),
			_ => None,
		}
	};
	match (coerce(left), coerce(right)) {
		(Some(a), Some(b)) => Ok((a, b)),
		_ => {
			Err(MotlError::TypeError(format!(
				"`{op}` expects numeric operands, found {} and {}",
				left.type_name(),
				right.type_name()
			)))
		}
	}
}
