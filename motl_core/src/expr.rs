use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use crate::position::Point;

/// Binary operators of the expression sublanguage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BinaryOp {
	Add,
	Subtract,
	Multiply,
	Divide,
	And,
	Or,
	Equals,
	NotEquals,
	LessThan,
	GreaterThan,
	LessOrEqual,
	GreaterOrEqual,
}

impl BinaryOp {
	pub fn symbol(self) -> &'static str {
		match self {
			Self::Add => "+",
			Self::Subtract => "-",
			Self::Multiply => "*",
			Self::Divide => "/",
			Self::And => "and",
			Self::Or => "or",
			Self::Equals => "=",
			Self::NotEquals => "<>",
			Self::LessThan => "<",
			Self::GreaterThan => ">",
			Self::LessOrEqual => "<=",
			Self::GreaterOrEqual => ">=",
		}
	}

	/// Binding strength, higher binds tighter. Matches the parser's
	/// precedence ladder.
	pub fn precedence(self) -> u8 {
		match self {
			Self::Or => 1,
			Self::And => 2,
			Self::Equals
			| Self::NotEquals
			| Self::LessThan
			| Self::GreaterThan
			| Self::LessOrEqual
			| Self::GreaterOrEqual => 3,
			Self::Add | Self::Subtract => 4,
			Self::Multiply | Self::Divide => 5,
		}
	}
}

impl Display for BinaryOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.symbol())
	}
}

/// Collection operations reachable through `->`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CollectionOp {
	Select,
	Reject,
	Collect,
	Any,
	Exists,
	ForAll,
	Size,
	IsEmpty,
	NotEmpty,
	First,
	Last,
}

impl CollectionOp {
	/// Map an operation name after `->`; `None` means the spelling is not a
	/// collection operation (a parse error).
	pub fn from_name(name: &str) -> Option<Self> {
		let op = match name {
			"select" => Self::Select,
			"reject" => Self::Reject,
			"collect" => Self::Collect,
			"any" => Self::Any,
			"exists" => Self::Exists,
			"forAll" => Self::ForAll,
			"size" => Self::Size,
			"isEmpty" => Self::IsEmpty,
			"notEmpty" => Self::NotEmpty,
			"first" => Self::First,
			"last" => Self::Last,
			_ => return None,
		};
		Some(op)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Select => "select",
			Self::Reject => "reject",
			Self::Collect => "collect",
			Self::Any => "any",
			Self::Exists => "exists",
			Self::ForAll => "forAll",
			Self::Size => "size",
			Self::IsEmpty => "isEmpty",
			Self::NotEmpty => "notEmpty",
			Self::First => "first",
			Self::Last => "last",
		}
	}

	/// True for operations that take an `(iterator | body)` lambda.
	pub fn takes_lambda(self) -> bool {
		matches!(
			self,
			Self::Select | Self::Reject | Self::Collect | Self::Any | Self::Exists | Self::ForAll
		)
	}
}

impl Display for CollectionOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// An expression-language node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ExprKind {
	Boolean(bool),
	Integer(i64),
	Real(f64),
	String(String),
	/// A bare identifier resolved against the variable scope at evaluation
	/// time.
	Variable(String),
	Binary {
		op: BinaryOp,
		left: Box<Expression>,
		right: Box<Expression>,
	},
	/// `source.property`
	Navigation {
		source: Box<Expression>,
		property: String,
	},
	/// `source->op` or `source->op(iterator | body)`
	CollectionCall {
		source: Box<Expression>,
		op: CollectionOp,
		iterator: Option<String>,
		body: Option<Box<Expression>>,
	},
}

/// An expression together with the source location of its first token.
///
/// Equality ignores the location: two expressions parsed from different
/// positions compare equal when their structure matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
	pub kind: ExprKind,
	pub point: Point,
}

impl Expression {
	pub fn new(kind: ExprKind, point: Point) -> Self {
		Self { kind, point }
	}

	/// The string literal value when this expression is exactly a string
	/// literal. Used for file-mode promotion.
	pub fn as_string_literal(&self) -> Option<&str> {
		match &self.kind {
			ExprKind::String(value) => Some(value),
			_ => None,
		}
	}
}

impl PartialEq for Expression {
	fn eq(&self, other: &Self) -> bool {
		self.kind == other.kind
	}
}

impl Display for Expression {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write_expr(f, self, 0)
	}
}

/// Precedence-aware printing; parentheses appear only where re-parsing would
/// otherwise bind differently.
fn write_expr(
	f: &mut std::fmt::Formatter<'_>,
	expr: &Expression,
	enclosing: u8,
) -> std::fmt::Result {
	match &expr.kind {
		ExprKind::Boolean(value) => write!(f, "{value}"),
		ExprKind::Integer(value) => write!(f, "{value}"),
		ExprKind::Real(value) => {
			if value.fract() == 0.0 && value.is_finite() {
				write!(f, "{value:.1}")
			} else {
				write!(f, "{value}")
			}
		}
		ExprKind::String(value) => {
			write!(f, "'")?;
			for ch in value.chars() {
				match ch {
					'\'' => write!(f, "''")?,
					'\\' => write!(f, "\\\\")?,
					'\n' => write!(f, "\\n")?,
					'\t' => write!(f, "\\t")?,
					'\r' => write!(f, "\\r")?,
					other => write!(f, "{other}")?,
				}
			}
			write!(f, "'")
		}
		ExprKind::Variable(name) => write!(f, "{name}"),
		ExprKind::Binary { op, left, right } => {
			let precedence = op.precedence();
			let parenthesise = precedence < enclosing;
			if parenthesise {
				write!(f, "(")?;
			}
			write_expr(f, left, precedence)?;
			write!(f, " {op} ")?;
			// Right operand needs parens at equal precedence to keep
			// left-association on re-parse.
			write_expr(f, right, precedence + 1)?;
			if parenthesise {
				write!(f, ")")?;
			}
			Ok(())
		}
		ExprKind::Navigation { source, property } => {
			write_expr(f, source, u8::MAX)?;
			write!(f, ".{property}")
		}
		ExprKind::CollectionCall {
			source,
			op,
			iterator,
			body,
		} => {
			write_expr(f, source, u8::MAX)?;
			write!(f, "->{op}")?;
			match (iterator, body) {
				(Some(iterator), Some(body)) => write!(f, "({iterator} | {body})"),
				(None, Some(body)) => write!(f, "({body})"),
				_ => write!(f, "()"),
			}
		}
	}
}
