use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use motl_cli::Commands;
use motl_cli::MotlCli;
use motl_cli::OutputFormat;
use motl_core::Block;
use motl_core::FileSystemStrategy;
use motl_core::GenerateOptions;
use motl_core::InMemoryStrategy;
use motl_core::Module;
use motl_core::MotlError;
use motl_core::OutputStrategy;
use motl_core::Statement;
use motl_core::Value;
use owo_colors::OwoColorize;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = MotlCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match args.command {
		Some(Commands::Generate {
			ref template,
			ref models,
			ref output_dir,
			ref main_template,
			ref charset,
			ref arguments,
			ref globals,
			debug,
			dry_run,
			watch,
		}) => {
			if debug {
				init_debug_logging();
			}
			let request = GenerateRequest {
				template: template.clone(),
				models: models.clone(),
				output_dir: output_dir.clone(),
				main_template: main_template.clone(),
				charset: charset.clone(),
				arguments: arguments.clone(),
				globals: globals.clone(),
				dry_run,
				verbose: args.verbose,
			};
			run_generate(&request, watch)
		}
		Some(Commands::Parse {
			ref template,
			format,
		}) => run_parse(template, format),
		Some(Commands::Validate {
			ref template,
			ref main_template,
		}) => run_validate(template, main_template.as_deref()),
		None => {
			eprintln!("No subcommand specified. Run `motl --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Render through miette for rich diagnostics with help text and
		// error codes where possible.
		match e.downcast::<MotlError>() {
			Ok(motl_err) => {
				let report: miette::Report = (*motl_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Route `motl_core` debug events to stderr. Enabled by `generate --debug`.
fn init_debug_logging() {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("motl_core=debug"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

fn load_module(template: &Path) -> Result<Module, Box<dyn std::error::Error>> {
	let source = std::fs::read_to_string(template)
		.map_err(|e| format!("failed to read `{}`: {e}", template.display()))?;
	let module = motl_core::parse(source)?;
	Ok(module)
}

/// Parse a CLI value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
	match serde_json::from_str::<serde_json::Value>(raw) {
		Ok(json) => Value::from_json(&json),
		Err(_) => Value::from(raw),
	}
}

fn split_pair<'a>(raw: &'a str, what: &str) -> Result<(&'a str, &'a str), String> {
	raw.split_once('=')
		.ok_or_else(|| format!("invalid {what} `{raw}`: expected `name=value`"))
}

struct GenerateRequest {
	template: PathBuf,
	models: Vec<String>,
	output_dir: PathBuf,
	main_template: Option<String>,
	charset: String,
	arguments: Vec<String>,
	globals: Vec<String>,
	dry_run: bool,
	verbose: bool,
}

fn run_generate(request: &GenerateRequest, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
	run_generate_once(request)?;

	if !watch {
		return Ok(());
	}

	// Watch mode
	println!("\nWatching for file changes... (press Ctrl+C to stop)");

	let (tx, rx) = mpsc::channel();
	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				if matches!(
					event.kind,
					notify::EventKind::Modify(_) | notify::EventKind::Create(_)
				) {
					let _ = tx.send(());
				}
			}
		})?;

	use notify::Watcher;
	let template_dir = request
		.template
		.parent()
		.filter(|parent| !parent.as_os_str().is_empty())
		.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
	watcher.watch(&template_dir, notify::RecursiveMode::Recursive)?;
	for model in &request.models {
		if let Ok((_, path)) = split_pair(model, "model binding") {
			let path = Path::new(path);
			if path.exists() {
				watcher.watch(path, notify::RecursiveMode::NonRecursive)?;
			}
		}
	}

	loop {
		rx.recv()?;
		// Debounce: drain additional events within 200ms.
		while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

		println!("\nFile change detected, regenerating...");
		if let Err(e) = run_generate_once(request) {
			eprintln!("{} {e}", colored!("error:", red));
		}
	}
}

fn run_generate_once(request: &GenerateRequest) -> Result<(), Box<dyn std::error::Error>> {
	let module = load_module(&request.template)?;

	let mut options = GenerateOptions::new().with_charset(request.charset.clone());
	options.main_template = request.main_template.clone();
	options.output_directory = Some(request.output_dir.clone());

	for binding in &request.models {
		let (alias, path) = split_pair(binding, "model binding")?;
		let resource = motl_core::ModelResource::from_path(path)?;
		options.models.insert(alias.to_string(), resource);
	}
	for global in &request.globals {
		let (name, raw) = split_pair(global, "global binding")?;
		options.globals.insert(name.to_string(), parse_value(raw));
	}
	for argument in &request.arguments {
		options.arguments.push(parse_value(argument));
	}

	let module = Arc::new(module);
	if request.dry_run {
		let strategy = Arc::new(InMemoryStrategy::new());
		let result = motl_core::generate(
			module,
			options,
			strategy.clone() as Arc<dyn OutputStrategy>,
		)?;
		report_generation(request, &result);

		let files = strategy.generated_files();
		if files.is_empty() {
			println!("Dry run: no files would be generated.");
		} else {
			println!("Dry run: would generate {} file(s):", files.len());
			for (url, content) in &files {
				println!("  {url} ({} bytes)", content.len());
			}
		}
	} else {
		let strategy = Arc::new(FileSystemStrategy::new(request.output_dir.clone()));
		let result = motl_core::generate(module, options, strategy as Arc<dyn OutputStrategy>)?;
		report_generation(request, &result);
	}

	Ok(())
}

fn report_generation(request: &GenerateRequest, result: &motl_core::GenerationResult) {
	if !result.stdout.is_empty() {
		print!("{}", result.stdout);
		if !result.stdout.ends_with('\n') {
			println!();
		}
	}

	if request.verbose {
		let stats = &result.statistics;
		eprintln!(
			"{} {} template(s), {} file(s), {} protected region(s) preserved in {:?}",
			colored!("generated:", bold),
			stats.templates_executed,
			stats.files_generated,
			stats.protected_areas_restored,
			stats.elapsed
		);
		for trace in &result.traces {
			eprintln!("  trace: {} -> {}", trace.source, trace.target);
		}
	}
}

fn run_parse(template: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
	let module = load_module(template)?;

	match format {
		OutputFormat::Json => {
			println!("{}", serde_json::to_string_pretty(&module)?);
		}
		OutputFormat::Text => {
			println!("{} {}", colored!("module", bold), module.name);
			for (alias, uri) in &module.metamodels {
				println!("  metamodel {alias} -> {uri}");
			}
			if let Some(parent) = &module.extends {
				println!("  extends {parent}");
			}
			for import in &module.imports {
				println!("  import {import}");
			}

			if !module.templates.is_empty() {
				println!("{}", colored!("Templates:", bold));
				for template in &module.templates {
					let mut flags = String::new();
					if template.is_main {
						flags.push_str(" [main]");
					}
					if template.guard.is_some() {
						flags.push_str(" [guard]");
					}
					if template.post_condition.is_some() {
						flags.push_str(" [post]");
					}
					if let Some(overridden) = &template.overrides {
						flags.push_str(&format!(" [overrides {overridden}]"));
					}
					println!(
						"  {} {}({}){flags}",
						template.visibility,
						template.name,
						signature(&template.parameters)
					);
				}
			}
			if !module.queries.is_empty() {
				println!("{}", colored!("Queries:", bold));
				for query in &module.queries {
					println!(
						"  {} {}({}) : {}",
						query.visibility,
						query.name,
						signature(&query.parameters),
						query.return_type
					);
				}
			}
			if !module.macros.is_empty() {
				println!("{}", colored!("Macros:", bold));
				for r#macro in &module.macros {
					let body = r#macro
						.body_parameter
						.as_ref()
						.map(|name| format!(" | {name}"))
						.unwrap_or_default();
					println!("  {}({}{body})", r#macro.name, signature(&r#macro.parameters));
				}
			}

			println!(
				"\n{} template(s), {} quer{}, {} macro(s)",
				module.templates.len(),
				module.queries.len(),
				if module.queries.len() == 1 { "y" } else { "ies" },
				module.macros.len()
			);
		}
	}

	Ok(())
}

fn signature(parameters: &[motl_core::Parameter]) -> String {
	parameters
		.iter()
		.map(|parameter| format!("{} : {}", parameter.name, parameter.type_name))
		.collect::<Vec<_>>()
		.join(", ")
}

struct Finding {
	severity: Severity,
	message: String,
}

#[derive(PartialEq, Eq)]
enum Severity {
	Error,
	Warning,
}

fn run_validate(
	template: &Path,
	main_template: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
	let module = load_module(template)?;
	let mut findings = vec![];

	// Main template resolution follows the generate-time policy.
	match main_template {
		Some(name) => {
			if module.template(name).is_none() {
				findings.push(Finding {
					severity: Severity::Error,
					message: format!("main template `{name}` is not declared in this module"),
				});
			}
		}
		None => {
			if module.main_template().is_none() {
				findings.push(Finding {
					severity: Severity::Error,
					message: "module declares no templates".to_string(),
				});
			}
		}
	}

	// Every invocation must resolve against the module's dictionaries.
	let mut invocations: Vec<(String, usize, bool)> = vec![];
	for t in &module.templates {
		collect_invocations(&t.body, &mut invocations);
	}
	for m in &module.macros {
		collect_invocations(&m.body, &mut invocations);
	}
	for (name, arity, has_body) in invocations {
		check_invocation(&module, &name, arity, has_body, &mut findings);
	}

	// Overridden templates should exist somewhere reachable; flag local
	// misses as warnings since parent modules resolve at link time.
	for t in &module.templates {
		if let Some(overridden) = &t.overrides {
			if module.template(overridden).is_none() {
				findings.push(Finding {
					severity: Severity::Warning,
					message: format!(
						"template `{}` overrides `{overridden}`, which is not declared locally",
						t.name
					),
				});
			}
		}
	}

	let errors = findings
		.iter()
		.filter(|finding| finding.severity == Severity::Error)
		.count();
	for finding in &findings {
		match finding.severity {
			Severity::Error => eprintln!("{} {}", colored!("error:", red), finding.message),
			Severity::Warning => {
				eprintln!("{} {}", colored!("warning:", yellow), finding.message);
			}
		}
	}

	if errors > 0 {
		eprintln!(
			"\nValidation failed: {errors} error(s), {} warning(s).",
			findings.len() - errors
		);
		process::exit(1);
	}

	println!(
		"Validation passed: {} template(s), {} quer{}, {} macro(s).",
		module.templates.len(),
		module.queries.len(),
		if module.queries.len() == 1 { "y" } else { "ies" },
		module.macros.len()
	);
	if !findings.is_empty() {
		println!("{} warning(s).", findings.len());
	}

	Ok(())
}

fn check_invocation(
	module: &Module,
	name: &str,
	arity: usize,
	has_body: bool,
	findings: &mut Vec<Finding>,
) {
	if let Some(m) = module.macro_by_name(name) {
		if m.parameters.len() != arity {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!(
					"macro `{name}` expects {} argument(s), invoked with {arity}",
					m.parameters.len()
				),
			});
		}
		if m.body_parameter.is_some() && !has_body {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!("macro `{name}` requires an inline body"),
			});
		}
		if m.body_parameter.is_none() && has_body {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!("macro `{name}` does not take an inline body"),
			});
		}
		return;
	}

	if let Some(t) = module.template(name) {
		if t.parameters.len() != arity {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!(
					"template `{name}` expects {} argument(s), invoked with {arity}",
					t.parameters.len()
				),
			});
		}
		if has_body {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!("template `{name}` does not take an inline body"),
			});
		}
		return;
	}

	if let Some(q) = module.query(name) {
		if q.parameters.len() != arity {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!(
					"query `{name}` expects {} argument(s), invoked with {arity}",
					q.parameters.len()
				),
			});
		}
		if has_body {
			findings.push(Finding {
				severity: Severity::Error,
				message: format!("query `{name}` does not take an inline body"),
			});
		}
		return;
	}

	findings.push(Finding {
		severity: Severity::Error,
		message: format!("invocation `{name}` matches no macro, template, or query"),
	});
}

/// Collect `(name, arity, has_body)` for every invocation in a block,
/// recursing through nested statement bodies.
fn collect_invocations(block: &Block, found: &mut Vec<(String, usize, bool)>) {
	for statement in &block.statements {
		match statement {
			Statement::MacroInvocation {
				name,
				arguments,
				body,
			} => {
				found.push((name.clone(), arguments.len(), body.is_some()));
				if let Some(body) = body {
					collect_invocations(body, found);
				}
			}
			Statement::If {
				then_block,
				else_if_clauses,
				else_block,
				..
			} => {
				collect_invocations(then_block, found);
				for (_, clause_block) in else_if_clauses {
					collect_invocations(clause_block, found);
				}
				if let Some(else_block) = else_block {
					collect_invocations(else_block, found);
				}
			}
			Statement::For { body, .. }
			| Statement::Let { body, .. }
			| Statement::File { body, .. }
			| Statement::ProtectedArea { body, .. }
			| Statement::Trace { body, .. } => collect_invocations(body, found),
			_ => {}
		}
	}
}
