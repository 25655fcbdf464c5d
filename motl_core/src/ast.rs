use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

use crate::MotlError;
use crate::MotlResult;
use crate::expr::Expression;

/// Default output encoding for modules and file blocks.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Visibility of a template or query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
	#[default]
	Public,
	Protected,
	Private,
}

impl Display for Visibility {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Public => write!(f, "public"),
			Self::Protected => write!(f, "protected"),
			Self::Private => write!(f, "private"),
		}
	}
}

/// Output mode of a `file` block.
///
/// The mode argument is an expression in the surface syntax; string literals
/// spelling a mode are promoted at parse time and everything else collapses
/// to `Overwrite`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMode {
	#[default]
	Overwrite,
	Append,
	Create,
}

impl FileMode {
	pub fn from_name(name: &str) -> Option<Self> {
		match name {
			"overwrite" => Some(Self::Overwrite),
			"append" => Some(Self::Append),
			"create" => Some(Self::Create),
			_ => None,
		}
	}
}

impl Display for FileMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Overwrite => write!(f, "overwrite"),
			Self::Append => write!(f, "append"),
			Self::Create => write!(f, "create"),
		}
	}
}

/// A declared parameter: name and type string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
	pub name: String,
	pub type_name: String,
}

impl Parameter {
	pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			type_name: type_name.into(),
		}
	}
}

/// A `let` binding: variable, optional declared type, and initialiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
	pub name: String,
	pub type_name: Option<String>,
	pub init: Expression,
}

/// An ordered sequence of statements.
///
/// A non-inlined block pushes one indentation level on entry and pops it on
/// exit; inlined blocks (macro body arguments, single-line forms) leave the
/// indentation untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
	pub statements: Vec<Statement>,
	pub inlined: bool,
}

impl Block {
	pub fn new(statements: Vec<Statement>) -> Self {
		Self {
			statements,
			inlined: false,
		}
	}

	pub fn inlined(statements: Vec<Statement>) -> Self {
		Self {
			statements,
			inlined: true,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.statements.is_empty()
	}
}

/// The closed set of statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Statement {
	/// Literal text without newlines.
	Text {
		value: String,
		multi_lines: bool,
		new_line_needed: bool,
	},
	/// An embedded expression whose canonical string form is written when
	/// the result is non-null.
	Expression {
		expr: Expression,
		multi_lines: bool,
		new_line_needed: bool,
	},
	/// A line break; `indentation_needed` controls whether the next line
	/// start is indent-eligible.
	NewLine {
		indentation_needed: bool,
		multi_lines: bool,
		new_line_needed: bool,
	},
	/// `[-- ...]` — produces no output.
	Comment { value: String },
	If {
		condition: Expression,
		then_block: Block,
		else_if_clauses: Vec<(Expression, Block)>,
		else_block: Option<Block>,
	},
	For {
		variable: String,
		type_name: Option<String>,
		collection: Expression,
		separator: Option<Expression>,
		body: Block,
	},
	Let {
		bindings: Vec<Binding>,
		body: Block,
	},
	File {
		url: Expression,
		mode: FileMode,
		charset: Option<Expression>,
		body: Block,
	},
	ProtectedArea {
		id: Expression,
		start_prefix: Option<Expression>,
		end_prefix: Option<Expression>,
		body: Block,
	},
	Trace {
		source: Expression,
		body: Block,
	},
	/// `[name(args)/]` or `[name(args)]...[/name]` — resolved against
	/// macros, then templates, then queries at execution time.
	MacroInvocation {
		name: String,
		arguments: Vec<Expression>,
		body: Option<Block>,
	},
}

/// A template: named, guarded, parameterised block of statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
	pub name: String,
	pub visibility: Visibility,
	pub parameters: Vec<Parameter>,
	pub guard: Option<Expression>,
	pub post_condition: Option<Expression>,
	pub body: Block,
	pub is_main: bool,
	pub overrides: Option<String>,
	pub documentation: Option<String>,
}

/// A side-effect-free named expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
	pub name: String,
	pub visibility: Visibility,
	pub parameters: Vec<Parameter>,
	pub return_type: String,
	pub body: Expression,
	pub documentation: Option<String>,
}

/// A macro: a parameterised block that may additionally capture an inline
/// body from the invocation site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
	pub name: String,
	pub parameters: Vec<Parameter>,
	pub body_parameter: Option<String>,
	pub body: Block,
	pub documentation: Option<String>,
}

/// The top-level artifact produced by the parser. Immutable after parsing.
///
/// Templates, queries, and macros preserve their source order; that order is
/// observable through the main-template auto-detect policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
	pub name: String,
	/// Metamodel alias → package URI. Iteration order is deterministic;
	/// insertion order carries no meaning.
	pub metamodels: BTreeMap<String, String>,
	pub extends: Option<String>,
	pub imports: Vec<String>,
	pub templates: Vec<Template>,
	pub queries: Vec<Query>,
	pub macros: Vec<Macro>,
	pub encoding: String,
	pub documentation: Option<String>,
}

impl Module {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			encoding: DEFAULT_ENCODING.to_string(),
			..Self::default()
		}
	}

	pub fn template(&self, name: &str) -> Option<&Template> {
		self.templates.iter().find(|template| template.name == name)
	}

	pub fn query(&self, name: &str) -> Option<&Query> {
		self.queries.iter().find(|query| query.name == name)
	}

	pub fn macro_by_name(&self, name: &str) -> Option<&Macro> {
		self.macros.iter().find(|m| m.name == name)
	}

	/// The entry-point template: the first declared with `main`, else the
	/// first in declaration order, else `None`.
	pub fn main_template(&self) -> Option<&Template> {
		self.templates
			.iter()
			.find(|template| template.is_main)
			.or_else(|| self.templates.first())
	}

	pub fn add_template(&mut self, template: Template) -> MotlResult<()> {
		if self.template(&template.name).is_some() {
			return Err(MotlError::DuplicateName {
				kind: "template".to_string(),
				name: template.name,
			});
		}
		self.templates.push(template);
		Ok(())
	}

	pub fn add_query(&mut self, query: Query) -> MotlResult<()> {
		if self.query(&query.name).is_some() {
			return Err(MotlError::DuplicateName {
				kind: "query".to_string(),
				name: query.name,
			});
		}
		self.queries.push(query);
		Ok(())
	}

	pub fn add_macro(&mut self, r#macro: Macro) -> MotlResult<()> {
		if self.macro_by_name(&r#macro.name).is_some() {
			return Err(MotlError::DuplicateName {
				kind: "macro".to_string(),
				name: r#macro.name,
			});
		}
		self.macros.push(r#macro);
		Ok(())
	}
}
