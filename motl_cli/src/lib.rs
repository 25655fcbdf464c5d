use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Generate text artifacts from models using MTL templates.",
	long_about = "motl is a model-to-text transformation engine for the MTL template \
	              dialect.\n\nTemplates interleave literal text with [directives] drawn from an \
	              OCL-like expression language. Given a set of input models, motl produces one or \
	              more text artifacts and preserves hand-edited protected regions across \
	              regenerations.\n\nQuick start:\n  motl parse template.mtl      Inspect the parsed \
	              module\n  motl validate template.mtl   Check the module for problems\n  motl \
	              generate template.mtl    Run the main template"
)]
pub struct MotlCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Generate output from a template module.
	///
	/// Parses the template, loads the given models, and executes the main
	/// template. File blocks write through the file-system strategy rooted
	/// at the output directory; anything the template writes outside a file
	/// block is printed to stdout.
	///
	/// Existing outputs are scanned for protected regions before they are
	/// overwritten, so user-edited regions survive regeneration.
	Generate {
		/// Path to the template source file.
		template: PathBuf,

		/// Model to register, as `alias=path/to/model.json`. Repeatable.
		#[arg(long = "model", value_name = "ALIAS=PATH")]
		models: Vec<String>,

		/// Base directory for generated files.
		#[arg(long, default_value = ".")]
		output_dir: PathBuf,

		/// Main template name, overriding auto-detection.
		#[arg(long)]
		main_template: Option<String>,

		/// Default output encoding for file blocks.
		#[arg(long, default_value = "UTF-8")]
		charset: String,

		/// Positional argument for the main template, parsed as JSON with a
		/// plain-string fallback. Repeatable.
		#[arg(long = "arg", value_name = "VALUE")]
		arguments: Vec<String>,

		/// Global variable binding, as `name=value` with the value parsed as
		/// JSON (plain-string fallback). Repeatable.
		#[arg(long = "global", value_name = "NAME=VALUE")]
		globals: Vec<String>,

		/// Log statement and scope boundaries while generating.
		#[arg(long, default_value_t = false)]
		debug: bool,

		/// Collect generated files in memory and list them instead of
		/// writing to disk.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Watch the template and model files and regenerate on changes.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// Parse a template module and print its structure.
	Parse {
		/// Path to the template source file.
		template: PathBuf,

		/// Output format: `text` for a summary, `json` for the full AST.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Parse a template module and check it for problems.
	///
	/// Beyond syntax, this resolves every invocation against the module's
	/// templates, queries, and macros, and verifies that a main template can
	/// be determined. Exits non-zero when findings are reported.
	Validate {
		/// Path to the template source file.
		template: PathBuf,

		/// Main template name to resolve instead of auto-detection.
		#[arg(long)]
		main_template: Option<String>,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable summary.
	Text,
	/// JSON for programmatic consumption.
	Json,
}
