use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

use crate::MotlError;
use crate::MotlResult;
use crate::ast::Block;
use crate::ast::Macro;
use crate::ast::Module;
use crate::ast::Query;
use crate::ast::Statement;
use crate::ast::Template;
use crate::config::CancellationToken;
use crate::config::GenerateOptions;
use crate::context::ExecutionContext;
use crate::context::TraceLink;
use crate::expr::Expression;
use crate::model::ModelResource;
use crate::protected::END_MARKER;
use crate::protected::START_MARKER;
use crate::strategy::OutputStrategy;
use crate::value::BlockValue;
use crate::value::Value;

/// Counters and outcome for one generation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStatistics {
	pub templates_executed: usize,
	pub files_generated: usize,
	pub protected_areas_restored: usize,
	pub successful: bool,
	pub last_error: Option<String>,
	pub elapsed: Duration,
}

/// The outcome of a successful generation: the base writer's content (the
/// "stdout" pseudo-file, never persisted by the strategy), statistics, and
/// recorded trace links.
#[derive(Debug, Clone)]
pub struct GenerationResult {
	pub stdout: String,
	pub statistics: GenerationStatistics,
	pub traces: Vec<TraceLink>,
}

/// Run a module's main template against the given options and strategy.
pub fn generate(
	module: Arc<Module>,
	options: GenerateOptions,
	strategy: Arc<dyn OutputStrategy>,
) -> MotlResult<GenerationResult> {
	let mut interpreter = Interpreter::new(module, options, strategy);
	interpreter.run()
}

/// The tree-walking statement executor. Single-threaded and cooperative:
/// statements run in sequence, and cancellation is observed at every
/// statement boundary.
pub struct Interpreter {
	module: Arc<Module>,
	ctx: ExecutionContext,
	statistics: GenerationStatistics,
	cancellation: CancellationToken,
	trace_target: String,
	default_charset: String,
	main_template: Option<String>,
	models_pending: Vec<(String, ModelResource)>,
	globals_pending: Vec<(String, Value)>,
	arguments: Vec<Value>,
	/// Ids already emitted in this run; a repeat is a conflict.
	emitted_protected: HashSet<String>,
}

impl Interpreter {
	pub fn new(
		module: Arc<Module>,
		options: GenerateOptions,
		strategy: Arc<dyn OutputStrategy>,
	) -> Self {
		let ctx = ExecutionContext::new(strategy, options.protected.clone());
		Self {
			module,
			ctx,
			statistics: GenerationStatistics::default(),
			cancellation: options.cancellation.clone(),
			trace_target: options.trace_target.clone(),
			default_charset: options.charset.clone(),
			main_template: options.main_template.clone(),
			models_pending: options.models.into_iter().collect(),
			globals_pending: options.globals.into_iter().collect(),
			arguments: options.arguments,
			emitted_protected: HashSet::new(),
		}
	}

	pub fn statistics(&self) -> &GenerationStatistics {
		&self.statistics
	}

	/// Execute the main template and finalise the context. Statistics record
	/// the outcome either way; open file writers are discarded on failure.
	pub fn run(&mut self) -> MotlResult<GenerationResult> {
		self.statistics = GenerationStatistics::default();
		let start = Instant::now();
		let result = self.run_inner();
		self.statistics.elapsed = start.elapsed();

		match result {
			Ok(stdout) => {
				self.statistics.successful = true;
				Ok(GenerationResult {
					stdout,
					statistics: self.statistics.clone(),
					traces: self.ctx.take_traces(),
				})
			}
			Err(error) => {
				self.statistics.successful = false;
				self.statistics.last_error = Some(error.to_string());
				self.ctx.abort();
				Err(error)
			}
		}
	}

	fn run_inner(&mut self) -> MotlResult<String> {
		for (alias, resource) in std::mem::take(&mut self.models_pending) {
			self.ctx.register_model(alias, resource);
		}
		for (name, value) in std::mem::take(&mut self.globals_pending) {
			self.ctx.set(name, value);
		}

		let template = self.resolve_main_template()?;
		tracing::debug!(template = %template.name, module = %self.module.name, "generate");

		let arguments = std::mem::take(&mut self.arguments);
		self.execute_template(&template, arguments)?;
		self.ctx.finalize()
	}

	fn resolve_main_template(&self) -> MotlResult<Template> {
		match &self.main_template {
			Some(name) => {
				self.module
					.template(name)
					.cloned()
					.ok_or_else(|| MotlError::TemplateNotFound(name.clone()))
			}
			None => {
				self.module.main_template().cloned().ok_or_else(|| {
					MotlError::InvalidOperation(format!(
						"module `{}` declares no templates",
						self.module.name
					))
				})
			}
		}
	}

	// ---- templates, queries, macros ---------------------------------------

	fn execute_template(&mut self, template: &Template, arguments: Vec<Value>) -> MotlResult<()> {
		if arguments.len() != template.parameters.len() {
			return Err(MotlError::InvalidOperation(format!(
				"template `{}` expects {} argument(s), got {}",
				template.name,
				template.parameters.len(),
				arguments.len()
			)));
		}

		tracing::debug!(template = %template.name, "enter template");
		self.ctx.push_scope();
		for (parameter, value) in template.parameters.iter().zip(arguments) {
			self.ctx.set(parameter.name.clone(), value);
		}

		let result = self.execute_template_body(template);
		self.ctx.pop_scope();
		tracing::debug!(template = %template.name, "exit template");

		if matches!(result, Ok(true)) {
			self.statistics.templates_executed += 1;
		}
		result.map(|_| ())
	}

	/// Returns whether the body actually ran; a failed guard skips it and
	/// does not count as an execution.
	fn execute_template_body(&mut self, template: &Template) -> MotlResult<bool> {
		if let Some(guard) = &template.guard {
			let value = self.ctx.evaluate(guard)?;
			if !value.is_true() {
				tracing::debug!(template = %template.name, "guard failed; skipping body");
				return Ok(false);
			}
		}

		self.execute_block(&template.body)?;

		if let Some(post_condition) = &template.post_condition {
			let value = self.ctx.evaluate(post_condition)?;
			if !value.is_true() {
				return Err(MotlError::PostConditionFailed(template.name.clone()));
			}
		}

		Ok(true)
	}

	fn execute_query(&mut self, query: &Query, arguments: Vec<Value>) -> MotlResult<Value> {
		if arguments.len() != query.parameters.len() {
			return Err(MotlError::InvalidOperation(format!(
				"query `{}` expects {} argument(s), got {}",
				query.name,
				query.parameters.len(),
				arguments.len()
			)));
		}

		self.ctx.push_scope();
		for (parameter, value) in query.parameters.iter().zip(arguments) {
			self.ctx.set(parameter.name.clone(), value);
		}
		let result = self.ctx.evaluate(&query.body);
		self.ctx.pop_scope();
		result
	}

	fn execute_macro(
		&mut self,
		r#macro: &Macro,
		argument_exprs: &[Expression],
		body: Option<&Block>,
	) -> MotlResult<()> {
		if argument_exprs.len() != r#macro.parameters.len() {
			return Err(MotlError::InvalidOperation(format!(
				"macro `{}` expects {} argument(s), got {}",
				r#macro.name,
				r#macro.parameters.len(),
				argument_exprs.len()
			)));
		}
		if r#macro.body_parameter.is_some() && body.is_none() {
			return Err(MotlError::InvalidOperation(format!(
				"macro `{}` requires an inline body",
				r#macro.name
			)));
		}
		if r#macro.body_parameter.is_none() && body.is_some() {
			return Err(MotlError::InvalidOperation(format!(
				"macro `{}` does not take an inline body",
				r#macro.name
			)));
		}

		// Arguments evaluate in the caller's scope, and the body parameter
		// captures the caller's bindings before the macro scope opens.
		let mut arguments = vec![];
		for expr in argument_exprs {
			arguments.push(self.ctx.evaluate(expr)?);
		}
		let thunk = match (&r#macro.body_parameter, body) {
			(Some(name), Some(block)) => {
				Some((
					name.clone(),
					Value::Block(BlockValue {
						block: Arc::new(block.clone()),
						scope: self.ctx.visible_bindings(),
					}),
				))
			}
			_ => None,
		};

		self.ctx.push_scope();
		for (parameter, value) in r#macro.parameters.iter().zip(arguments) {
			self.ctx.set(parameter.name.clone(), value);
		}
		if let Some((name, value)) = thunk {
			self.ctx.set(name, value);
		}
		let result = self.execute_block(&r#macro.body);
		self.ctx.pop_scope();
		result
	}

	/// Execute a captured block value: the snapshot scope is overlaid on the
	/// current scope, then the block runs in the current writer.
	fn execute_thunk(&mut self, thunk: &BlockValue) -> MotlResult<()> {
		self.ctx.push_scope();
		for (name, value) in &thunk.scope {
			self.ctx.set(name.clone(), value.clone());
		}
		let result = self.execute_block(&thunk.block);
		self.ctx.pop_scope();
		result
	}

	// ---- statements -------------------------------------------------------

	fn execute_block(&mut self, block: &Block) -> MotlResult<()> {
		if block.inlined {
			return self.execute_statements(block);
		}
		self.ctx.push_indentation();
		let result = self.execute_statements(block);
		self.ctx.pop_indentation();
		result
	}

	fn execute_statements(&mut self, block: &Block) -> MotlResult<()> {
		for statement in &block.statements {
			self.execute_statement(statement)?;
		}
		Ok(())
	}

	fn execute_statement(&mut self, statement: &Statement) -> MotlResult<()> {
		if self.cancellation.is_cancelled() {
			return Err(MotlError::Cancelled);
		}

		match statement {
			Statement::Text {
				value,
				new_line_needed,
				..
			} => {
				self.ctx.write(value, true);
				if *new_line_needed {
					self.ctx.write_line("", true);
				}
				Ok(())
			}
			Statement::Expression {
				expr,
				new_line_needed,
				..
			} => {
				let value = self.ctx.evaluate(expr)?;
				match value {
					Value::Block(thunk) => self.execute_thunk(&thunk)?,
					Value::Null => {}
					other => self.ctx.write(&other.canonical_string(), true),
				}
				if *new_line_needed {
					self.ctx.write_line("", true);
				}
				Ok(())
			}
			Statement::NewLine {
				indentation_needed, ..
			} => {
				self.ctx.write_line("", *indentation_needed);
				Ok(())
			}
			Statement::Comment { .. } => Ok(()),
			Statement::If {
				condition,
				then_block,
				else_if_clauses,
				else_block,
			} => {
				if self.ctx.evaluate(condition)?.is_true() {
					return self.execute_block(then_block);
				}
				for (clause_condition, clause_block) in else_if_clauses {
					if self.ctx.evaluate(clause_condition)?.is_true() {
						return self.execute_block(clause_block);
					}
				}
				if let Some(else_block) = else_block {
					return self.execute_block(else_block);
				}
				Ok(())
			}
			Statement::For {
				variable,
				collection,
				separator,
				body,
				..
			} => self.execute_for(variable, collection, separator.as_ref(), body),
			Statement::Let { bindings, body } => {
				self.ctx.push_scope();
				let result = (|| {
					for binding in bindings {
						let value = self.ctx.evaluate(&binding.init)?;
						self.ctx.set(binding.name.clone(), value);
					}
					self.execute_block(body)
				})();
				self.ctx.pop_scope();
				result
			}
			Statement::File {
				url,
				mode,
				charset,
				body,
			} => {
				let url = self.evaluate_string(url, "file url")?;
				let charset = match charset {
					Some(expr) => self.evaluate_string(expr, "file charset")?,
					None => self.default_charset.clone(),
				};
				self.ctx.open_file(&url, *mode, &charset)?;
				match self.execute_block(body) {
					Ok(()) => {
						self.ctx.close_file()?;
						self.statistics.files_generated += 1;
						Ok(())
					}
					Err(error) => {
						self.ctx.discard_file();
						Err(error)
					}
				}
			}
			Statement::ProtectedArea {
				id,
				start_prefix,
				end_prefix,
				body,
			} => {
				self.execute_protected_area(id, start_prefix.as_ref(), end_prefix.as_ref(), body)
			}
			Statement::Trace { source, body } => {
				let value = self.ctx.evaluate(source)?;
				if let Value::Object(object) = &value {
					self.ctx.add_trace(object.identity(), self.trace_target.clone());
				}
				self.execute_block(body)
			}
			Statement::MacroInvocation {
				name,
				arguments,
				body,
			} => self.execute_invocation(name, arguments, body.as_ref()),
		}
	}

	fn execute_for(
		&mut self,
		variable: &str,
		collection: &Expression,
		separator: Option<&Expression>,
		body: &Block,
	) -> MotlResult<()> {
		// The collection expression is evaluated exactly once.
		let items = self.ctx.evaluate(collection)?.into_sequence();

		for (index, item) in items.into_iter().enumerate() {
			if index > 0 {
				if let Some(separator) = separator {
					// The separator evaluates in the scope outside the
					// iteration, never after the last element.
					let value = self.ctx.evaluate(separator)?;
					if !value.is_null() {
						self.ctx.write(&value.canonical_string(), true);
					}
				}
			}

			self.ctx.push_scope();
			self.ctx.set(variable.to_string(), item);
			let result = self.execute_block(body);
			self.ctx.pop_scope();
			result?;
		}

		Ok(())
	}

	fn execute_protected_area(
		&mut self,
		id: &Expression,
		start_prefix: Option<&Expression>,
		end_prefix: Option<&Expression>,
		body: &Block,
	) -> MotlResult<()> {
		let id = self.evaluate_string(id, "protected area id")?;
		let start_prefix = match start_prefix {
			Some(expr) => self.evaluate_string(expr, "protected area start prefix")?,
			None => String::new(),
		};
		let end_prefix = match end_prefix {
			Some(expr) => self.evaluate_string(expr, "protected area end prefix")?,
			None => String::new(),
		};

		if !self.emitted_protected.insert(id.clone()) {
			return Err(MotlError::ProtectedAreaConflict(format!(
				"protected area id `{id}` emitted more than once in this generation"
			)));
		}

		let start_line = compose_marker(&start_prefix, START_MARKER, &id);
		let end_line = compose_marker(&end_prefix, END_MARKER, &id);

		// Markers always occupy their own lines.
		if !self.ctx.current_writer_at_line_start() {
			self.ctx.write_line("", false);
		}
		self.ctx.write_line(&start_line, true);

		match self.ctx.get_protected(&id) {
			Some(content) => {
				// Preserved content replaces the default body, emitted
				// without further indentation.
				if !content.is_empty() {
					self.ctx.write(&content, false);
					self.ctx.write_line("", false);
				}
				self.statistics.protected_areas_restored += 1;
			}
			None => {
				self.execute_block(body)?;
				if !self.ctx.current_writer_at_line_start() {
					self.ctx.write_line("", false);
				}
			}
		}

		self.ctx.write_line(&end_line, true);
		Ok(())
	}

	fn execute_invocation(
		&mut self,
		name: &str,
		arguments: &[Expression],
		body: Option<&Block>,
	) -> MotlResult<()> {
		if let Some(r#macro) = self.module.macro_by_name(name).cloned() {
			return self.execute_macro(&r#macro, arguments, body);
		}

		if let Some(template) = self.module.template(name).cloned() {
			if body.is_some() {
				return Err(MotlError::InvalidOperation(format!(
					"template `{name}` does not take an inline body"
				)));
			}
			let mut values = vec![];
			for expr in arguments {
				values.push(self.ctx.evaluate(expr)?);
			}
			return self.execute_template(&template, values);
		}

		if let Some(query) = self.module.query(name).cloned() {
			if body.is_some() {
				return Err(MotlError::InvalidOperation(format!(
					"query `{name}` does not take an inline body"
				)));
			}
			let mut values = vec![];
			for expr in arguments {
				values.push(self.ctx.evaluate(expr)?);
			}
			let result = self.execute_query(&query, values)?;
			if !result.is_null() {
				self.ctx.write(&result.canonical_string(), true);
			}
			return Ok(());
		}

		Err(MotlError::MacroNotFound(name.to_string()))
	}

	fn evaluate_string(&mut self, expr: &Expression, what: &str) -> MotlResult<String> {
		let value = self.ctx.evaluate(expr)?;
		match value {
			Value::String(text) => Ok(text),
			other => {
				Err(MotlError::TypeError(format!(
					"{what} must be a string, found {}",
					other.type_name()
				)))
			}
		}
	}
}

fn compose_marker(prefix: &str, marker: &str, id: &str) -> String {
	let sp = if prefix.is_empty() { "" } else { " " };
	format!("{prefix}{sp}{marker}{id}")
}
