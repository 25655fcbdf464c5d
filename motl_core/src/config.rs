use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::ast::DEFAULT_ENCODING;
use crate::model::ModelResource;
use crate::protected::ProtectedAreaManager;
use crate::value::Value;

/// Placeholder identity recorded as the target of every trace link. The
/// original engine never resolved targets beyond this marker; overriding it
/// is configuration, not behaviour.
pub const DEFAULT_TRACE_TARGET: &str = "generated-output";

/// A cooperative cancellation token checked at every statement boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

/// Options for a top-level `generate` call.
pub struct GenerateOptions {
	/// Overrides the main-template auto-detect policy; must name an existing
	/// template.
	pub main_template: Option<String>,
	/// Base path for the file-system strategy. Consumed by the CLI; the core
	/// only records it.
	pub output_directory: Option<PathBuf>,
	/// Model alias → loaded resource.
	pub models: BTreeMap<String, ModelResource>,
	/// Positional arguments passed to the main template.
	pub arguments: Vec<Value>,
	/// Extra global bindings visible to every expression.
	pub globals: BTreeMap<String, Value>,
	/// Default output encoding for file blocks without an explicit charset.
	pub charset: String,
	/// Target identity recorded on trace links.
	pub trace_target: String,
	/// Protected regions carried across regenerations. Shareable between
	/// concurrent generations.
	pub protected: Arc<ProtectedAreaManager>,
	pub cancellation: CancellationToken,
}

impl Default for GenerateOptions {
	fn default() -> Self {
		Self {
			main_template: None,
			output_directory: None,
			models: BTreeMap::new(),
			arguments: vec![],
			globals: BTreeMap::new(),
			charset: DEFAULT_ENCODING.to_string(),
			trace_target: DEFAULT_TRACE_TARGET.to_string(),
			protected: Arc::new(ProtectedAreaManager::new()),
			cancellation: CancellationToken::new(),
		}
	}
}

impl GenerateOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_main_template(mut self, name: impl Into<String>) -> Self {
		self.main_template = Some(name.into());
		self
	}

	pub fn with_model(mut self, alias: impl Into<String>, resource: ModelResource) -> Self {
		self.models.insert(alias.into(), resource);
		self
	}

	pub fn with_global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.globals.insert(name.into(), value.into());
		self
	}

	pub fn with_argument(mut self, value: impl Into<Value>) -> Self {
		self.arguments.push(value.into());
		self
	}

	pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
		self.charset = charset.into();
		self
	}
}
