use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::MotlError;
use crate::MotlResult;
use crate::ast::FileMode;
use crate::eval::ExpressionEvaluator;
use crate::expr::Expression;
use crate::indent::Indentation;
use crate::model::ModelResource;
use crate::protected::ProtectedAreaManager;
use crate::strategy::OutputStrategy;
use crate::value::Value;
use crate::writer::Writer;

/// A recorded source → target generation link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceLink {
	pub source: String,
	pub target: String,
}

/// A writer on the stack: the base stdout buffer has no target, file
/// writers remember their url and charset for finalisation.
#[derive(Debug)]
struct OpenWriter {
	writer: Writer,
	target: Option<FileTarget>,
}

#[derive(Debug, Clone)]
struct FileTarget {
	url: String,
	charset: String,
}

/// Per-run execution state: variable scopes (delegated to the expression
/// evaluator), the indentation stack, the writer stack, registered models,
/// the protected-area manager, and collected trace links.
///
/// One context exists per top-level `generate` call and is discarded on
/// completion.
pub struct ExecutionContext {
	evaluator: ExpressionEvaluator,
	indentation: Vec<Indentation>,
	writers: Vec<OpenWriter>,
	models: BTreeMap<String, ModelResource>,
	protected: Arc<ProtectedAreaManager>,
	strategy: Arc<dyn OutputStrategy>,
	traces: Vec<TraceLink>,
}

impl ExecutionContext {
	pub fn new(strategy: Arc<dyn OutputStrategy>, protected: Arc<ProtectedAreaManager>) -> Self {
		Self {
			evaluator: ExpressionEvaluator::new(),
			indentation: vec![Indentation::default()],
			writers: vec![OpenWriter {
				writer: Writer::new(),
				target: None,
			}],
			models: BTreeMap::new(),
			protected,
			strategy,
			traces: vec![],
		}
	}

	// ---- variables --------------------------------------------------------

	/// Bind a variable in the innermost scope. The binding is written into
	/// the expression evaluator, so expression lookups and interpreter
	/// lookups always agree.
	pub fn set(&mut self, name: impl Into<String>, value: Value) {
		self.evaluator.set_variable(name, value);
	}

	pub fn get(&self, name: &str) -> MotlResult<Value> {
		self.evaluator
			.get_variable(name)
			.cloned()
			.ok_or_else(|| MotlError::VariableNotFound(name.to_string()))
	}

	pub fn push_scope(&mut self) {
		tracing::debug!(depth = self.evaluator.scope_depth() + 1, "push scope");
		self.evaluator.push_scope();
	}

	pub fn pop_scope(&mut self) {
		tracing::debug!(depth = self.evaluator.scope_depth(), "pop scope");
		self.evaluator.pop_scope();
	}

	/// Snapshot of every visible binding, outermost first. Used to capture
	/// macro body-parameter thunks.
	pub fn visible_bindings(&self) -> Vec<(String, Value)> {
		self.evaluator.visible_bindings()
	}

	// ---- indentation ------------------------------------------------------

	pub fn current_indentation(&self) -> Indentation {
		self.indentation
			.last()
			.cloned()
			.unwrap_or_default()
	}

	pub fn push_indentation(&mut self) {
		let next = self.current_indentation().increment();
		self.indentation.push(next);
		self.sync_writer_indentation();
	}

	/// Pop the top indentation unless only the base remains.
	pub fn pop_indentation(&mut self) {
		if self.indentation.len() > 1 {
			self.indentation.pop();
		}
		self.sync_writer_indentation();
	}

	fn sync_writer_indentation(&mut self) {
		let indentation = self.current_indentation();
		if let Some(open) = self.writers.last_mut() {
			open.writer.set_indentation(indentation);
		}
	}

	// ---- writers ----------------------------------------------------------

	/// Open a writer for a file block and push it onto the stack. Any
	/// existing target content is scanned for protected regions first, so
	/// regeneration preserves user edits.
	pub fn open_file(&mut self, url: &str, mode: FileMode, charset: &str) -> MotlResult<()> {
		tracing::debug!(url, %mode, charset, "open file writer");
		if let Some(existing) = self.strategy.existing_content(url)? {
			self.protected.scan_content(&existing);
		}
		let writer = self
			.strategy
			.create_writer(url, mode, charset, self.current_indentation())?;
		self.writers.push(OpenWriter {
			writer,
			target: Some(FileTarget {
				url: url.to_string(),
				charset: charset.to_string(),
			}),
		});
		Ok(())
	}

	/// Pop the top writer and hand it to the strategy for finalisation.
	/// Returns the finalised url. Popping the base writer is an error.
	pub fn close_file(&mut self) -> MotlResult<String> {
		if self.writers.len() <= 1 {
			return Err(MotlError::InvalidOperation(
				"no open file writer to close".to_string(),
			));
		}
		let open = self.writers.pop().expect("writer stack checked non-empty");
		let target = open.target.expect("non-base writers always carry a target");
		tracing::debug!(url = %target.url, "close file writer");
		self.strategy
			.finalize_writer(&target.url, open.writer, &target.charset)?;
		self.sync_writer_indentation();
		Ok(target.url)
	}

	/// Pop the top writer without finalising it. Used while unwinding.
	pub fn discard_file(&mut self) {
		if self.writers.len() <= 1 {
			return;
		}
		if let Some(open) = self.writers.pop() {
			if let Some(target) = open.target {
				tracing::debug!(url = %target.url, "discard file writer");
				self.strategy.discard_writer(&target.url);
			}
		}
		self.sync_writer_indentation();
	}

	pub fn write(&mut self, text: &str, apply_indent: bool) {
		if let Some(open) = self.writers.last_mut() {
			open.writer.write(text, apply_indent);
		}
	}

	pub fn write_line(&mut self, text: &str, apply_indent: bool) {
		if let Some(open) = self.writers.last_mut() {
			open.writer.write_line(text, apply_indent);
		}
	}

	pub fn current_writer_at_line_start(&self) -> bool {
		self.writers
			.last()
			.is_none_or(|open| open.writer.at_line_start())
	}

	pub fn open_file_count(&self) -> usize {
		self.writers.len().saturating_sub(1)
	}

	// ---- protected areas --------------------------------------------------

	pub fn protected_manager(&self) -> &ProtectedAreaManager {
		&self.protected
	}

	pub fn get_protected(&self, id: &str) -> Option<String> {
		self.protected.content(id)
	}

	pub fn set_protected(&self, id: &str, content: &str, markers: Option<(String, String)>) {
		self.protected.set(id, content, markers);
	}

	pub fn scan(&self, path: impl AsRef<Path>) -> MotlResult<()> {
		self.protected.scan_file(path)
	}

	// ---- traces -----------------------------------------------------------

	pub fn add_trace(&mut self, source: impl Into<String>, target: impl Into<String>) {
		self.traces.push(TraceLink {
			source: source.into(),
			target: target.into(),
		});
	}

	pub fn traces(&self) -> &[TraceLink] {
		&self.traces
	}

	pub fn take_traces(&mut self) -> Vec<TraceLink> {
		std::mem::take(&mut self.traces)
	}

	// ---- models -----------------------------------------------------------

	/// Register a model resource. The alias is also bound as a variable
	/// holding the root objects, and the first root of the first registered
	/// model binds `self` when nothing else has claimed it.
	pub fn register_model(&mut self, alias: impl Into<String>, resource: ModelResource) {
		let alias = alias.into();
		let roots: Vec<Value> = resource
			.roots
			.iter()
			.cloned()
			.map(Value::Object)
			.collect();

		let root_value = match roots.len() {
			0 => Value::Null,
			1 => roots[0].clone(),
			_ => Value::Collection(roots),
		};
		self.set(alias.clone(), root_value);

		if self.evaluator.get_variable("self").is_none() {
			if let Some(first) = resource.roots.first() {
				self.set("self", Value::Object(first.clone()));
			}
		}

		self.models.insert(alias, resource);
	}

	pub fn get_model(&self, alias: &str) -> Option<&ModelResource> {
		self.models.get(alias)
	}

	// ---- expressions ------------------------------------------------------

	pub fn evaluate(&mut self, expr: &Expression) -> MotlResult<Value> {
		self.evaluator.evaluate(expr)
	}

	// ---- finalisation -----------------------------------------------------

	/// Finalise any still-open file writers (innermost first) and return the
	/// base writer's content. The strategy never persists the base buffer.
	pub fn finalize(&mut self) -> MotlResult<String> {
		while self.writers.len() > 1 {
			self.close_file()?;
		}
		let base = self.writers.pop().expect("base writer always present");
		Ok(base.writer.into_content())
	}

	/// Discard all open file writers while unwinding after an error or
	/// cancellation. The base writer is kept so callers can inspect partial
	/// output if they choose.
	pub fn abort(&mut self) {
		while self.writers.len() > 1 {
			self.discard_file();
		}
	}
}
