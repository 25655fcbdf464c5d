use std::sync::Arc;

use crate::GenerateOptions;
use crate::GenerationResult;
use crate::InMemoryStrategy;
use crate::Module;
use crate::MotlResult;

/// Parse and generate against a fresh in-memory strategy with default
/// options, panicking on failure.
pub fn run(source: &str) -> (GenerationResult, Arc<InMemoryStrategy>) {
	run_with(source, GenerateOptions::new()).expect("generation succeeds")
}

/// Parse and generate against a fresh in-memory strategy.
pub fn run_with(
	source: &str,
	options: GenerateOptions,
) -> MotlResult<(GenerationResult, Arc<InMemoryStrategy>)> {
	let module = crate::parse(source)?;
	let strategy = Arc::new(InMemoryStrategy::new());
	let result = crate::generate(Arc::new(module), options, strategy.clone())?;
	Ok((result, strategy))
}

/// Parse and generate against a caller-provided strategy.
pub fn run_against(
	source: &str,
	options: GenerateOptions,
	strategy: Arc<InMemoryStrategy>,
) -> MotlResult<GenerationResult> {
	let module = crate::parse(source)?;
	crate::generate(Arc::new(module), options, strategy)
}

/// Parse a module, panicking on failure.
pub fn module(source: &str) -> Module {
	crate::parse(source).expect("module parses")
}

/// A template wrapped in a minimal module header.
pub fn wrap(body: &str) -> String {
	format!("[module fixture('demo')]{body}")
}
