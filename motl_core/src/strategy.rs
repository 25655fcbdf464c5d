use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::MotlError;
use crate::MotlResult;
use crate::ast::DEFAULT_ENCODING;
use crate::ast::FileMode;
use crate::indent::Indentation;
use crate::writer::Writer;

/// A pluggable destination for completed writers.
///
/// Strategies may be shared across concurrent generations and must serialise
/// their internal mutations. `create_writer` honours the file mode: `append`
/// pre-loads the existing content (without indentation), `create` fails when
/// the target already exists.
pub trait OutputStrategy: Send + Sync {
	/// The current content of the target, when it exists. Used for `append`
	/// pre-loading and for protected-region scans before regeneration.
	fn existing_content(&self, url: &str) -> MotlResult<Option<String>>;

	/// Create a writer bound to `url`.
	fn create_writer(
		&self,
		url: &str,
		mode: FileMode,
		charset: &str,
		initial_indent: Indentation,
	) -> MotlResult<Writer>;

	/// Atomically commit the writer's accumulated content to the target.
	fn finalize_writer(&self, url: &str, writer: Writer, charset: &str) -> MotlResult<()>;

	/// Release a writer without committing it. Called while unwinding after
	/// an error or cancellation.
	fn discard_writer(&self, url: &str) {
		let _ = url;
	}
}

fn check_charset(charset: &str) {
	if !charset.eq_ignore_ascii_case(DEFAULT_ENCODING) && !charset.eq_ignore_ascii_case("utf8") {
		tracing::warn!(charset, "unsupported output charset; writing UTF-8");
	}
}

/// Records generated files in memory, keyed by url. The workhorse for tests
/// and `--dry-run`.
#[derive(Debug, Default)]
pub struct InMemoryStrategy {
	files: Mutex<BTreeMap<String, String>>,
}

impl InMemoryStrategy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seed a file, as though a previous generation had produced it.
	pub fn seed(&self, url: &str, content: &str) {
		self.files
			.lock()
			.expect("in-memory file lock poisoned")
			.insert(url.to_string(), content.to_string());
	}

	pub fn content_of(&self, url: &str) -> Option<String> {
		self.files
			.lock()
			.expect("in-memory file lock poisoned")
			.get(url)
			.cloned()
	}

	/// All generated files, url → content.
	pub fn generated_files(&self) -> BTreeMap<String, String> {
		self.files
			.lock()
			.expect("in-memory file lock poisoned")
			.clone()
	}
}

impl OutputStrategy for InMemoryStrategy {
	fn existing_content(&self, url: &str) -> MotlResult<Option<String>> {
		Ok(self.content_of(url))
	}

	fn create_writer(
		&self,
		url: &str,
		mode: FileMode,
		charset: &str,
		initial_indent: Indentation,
	) -> MotlResult<Writer> {
		check_charset(charset);
		let mut writer = Writer::new();
		writer.set_indentation(initial_indent);

		match mode {
			FileMode::Overwrite => {}
			FileMode::Append => {
				if let Some(existing) = self.content_of(url) {
					writer.write(&existing, false);
				}
			}
			FileMode::Create => {
				if self.content_of(url).is_some() {
					return Err(MotlError::FileError(format!(
						"target `{url}` already exists (mode create)"
					)));
				}
			}
		}

		Ok(writer)
	}

	fn finalize_writer(&self, url: &str, writer: Writer, _charset: &str) -> MotlResult<()> {
		self.files
			.lock()
			.expect("in-memory file lock poisoned")
			.insert(url.to_string(), writer.into_content());
		Ok(())
	}
}

/// Writes generated files beneath a base directory, creating parents as
/// needed and committing atomically via a temporary sibling file.
#[derive(Debug)]
pub struct FileSystemStrategy {
	root: PathBuf,
	/// Urls with an open writer; guards against two writers bound to the
	/// same target inside one or across generations.
	open: Mutex<BTreeSet<String>>,
}

impl FileSystemStrategy {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			open: Mutex::new(BTreeSet::new()),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn resolve(&self, url: &str) -> MotlResult<PathBuf> {
		let relative = Path::new(url);
		if relative.is_absolute()
			|| relative
				.components()
				.any(|component| matches!(component, std::path::Component::ParentDir))
		{
			return Err(MotlError::FileError(format!(
				"file url `{url}` must be relative and must not traverse upwards"
			)));
		}
		Ok(self.root.join(relative))
	}
}

impl OutputStrategy for FileSystemStrategy {
	fn existing_content(&self, url: &str) -> MotlResult<Option<String>> {
		let path = self.resolve(url)?;
		if !path.exists() {
			return Ok(None);
		}
		let content = std::fs::read_to_string(&path).map_err(|error| {
			MotlError::FileError(format!("failed to read `{}`: {error}", path.display()))
		})?;
		Ok(Some(content))
	}

	fn create_writer(
		&self,
		url: &str,
		mode: FileMode,
		charset: &str,
		initial_indent: Indentation,
	) -> MotlResult<Writer> {
		check_charset(charset);
		let path = self.resolve(url)?;

		{
			let mut open = self.open.lock().expect("open writer lock poisoned");
			if !open.insert(url.to_string()) {
				return Err(MotlError::FileError(format!(
					"target `{url}` already has an open writer"
				)));
			}
		}

		let mut writer = Writer::new();
		writer.set_indentation(initial_indent);

		match mode {
			FileMode::Overwrite => {}
			FileMode::Append => {
				if path.exists() {
					let existing = std::fs::read_to_string(&path).map_err(|error| {
						MotlError::FileError(format!(
							"failed to read `{}`: {error}",
							path.display()
						))
					})?;
					writer.write(&existing, false);
				}
			}
			FileMode::Create => {
				if path.exists() {
					self.open
						.lock()
						.expect("open writer lock poisoned")
						.remove(url);
					return Err(MotlError::FileError(format!(
						"target `{}` already exists (mode create)",
						path.display()
					)));
				}
			}
		}

		Ok(writer)
	}

	fn finalize_writer(&self, url: &str, writer: Writer, _charset: &str) -> MotlResult<()> {
		let path = self.resolve(url)?;

		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).map_err(|error| {
				MotlError::FileError(format!(
					"failed to create directory `{}`: {error}",
					parent.display()
				))
			})?;
		}

		// Write to a temporary sibling and rename so readers never observe a
		// half-written file.
		let temp = path.with_extension("motl.tmp");
		std::fs::write(&temp, writer.content()).map_err(|error| {
			MotlError::FileError(format!("failed to write `{}`: {error}", temp.display()))
		})?;
		std::fs::rename(&temp, &path).map_err(|error| {
			MotlError::FileError(format!(
				"failed to commit `{}`: {error}",
				path.display()
			))
		})?;

		self.open
			.lock()
			.expect("open writer lock poisoned")
			.remove(url);
		Ok(())
	}

	fn discard_writer(&self, url: &str) {
		self.open
			.lock()
			.expect("open writer lock poisoned")
			.remove(url);
	}
}
