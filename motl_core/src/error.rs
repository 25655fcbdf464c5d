use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum MotlError {
	#[error(transparent)]
	#[diagnostic(code(motl::io_error))]
	Io(#[from] std::io::Error),

	#[error("syntax error at {line}:{column}: {message}")]
	#[diagnostic(code(motl::invalid_syntax))]
	InvalidSyntax {
		line: usize,
		column: usize,
		message: String,
	},

	#[error("unknown statement type: `{0}`")]
	#[diagnostic(
		code(motl::unknown_statement),
		help("recognised block statements: if, for, let, file, protected, trace")
	)]
	UnknownStatementType(String),

	#[error("malformed expression: {0}")]
	#[diagnostic(code(motl::malformed_expression))]
	MalformedExpression(String),

	#[error("missing attribute `{attribute}` on `{element}`")]
	#[diagnostic(code(motl::missing_attribute))]
	MissingAttribute { attribute: String, element: String },

	#[error("duplicate {kind} name: `{name}`")]
	#[diagnostic(
		code(motl::duplicate_name),
		help("template, query, and macro names must be unique within a module")
	)]
	DuplicateName { kind: String, name: String },

	#[error("template not found: `{0}`")]
	#[diagnostic(code(motl::template_not_found))]
	TemplateNotFound(String),

	#[error("query not found: `{0}`")]
	#[diagnostic(code(motl::query_not_found))]
	QueryNotFound(String),

	#[error("macro not found: `{0}`")]
	#[diagnostic(
		code(motl::macro_not_found),
		help("an invocation `[name(...)]` resolves against macros, then templates, then queries")
	)]
	MacroNotFound(String),

	#[error("module not found: `{0}`")]
	#[diagnostic(code(motl::module_not_found))]
	ModuleNotFound(String),

	#[error("variable not found: `{0}`")]
	#[diagnostic(code(motl::variable_not_found))]
	VariableNotFound(String),

	#[error("type error: {0}")]
	#[diagnostic(code(motl::type_error))]
	TypeError(String),

	#[error("invalid operation: {0}")]
	#[diagnostic(code(motl::invalid_operation))]
	InvalidOperation(String),

	#[error("file error: {0}")]
	#[diagnostic(code(motl::file_error))]
	FileError(String),

	#[error("post-condition failed for template `{0}`")]
	#[diagnostic(code(motl::post_condition_failed))]
	PostConditionFailed(String),

	#[error("protected area conflict: {0}")]
	#[diagnostic(code(motl::protected_area_conflict))]
	ProtectedAreaConflict(String),

	#[error("generation cancelled")]
	#[diagnostic(code(motl::cancelled))]
	Cancelled,
}

pub type MotlResult<T> = Result<T, MotlError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
