use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use crate::MotlResult;

/// Marker fragment opening a protected region; the region id follows it.
pub const START_MARKER: &str = "START PROTECTED REGION ";
/// Marker fragment closing a protected region.
pub const END_MARKER: &str = "END PROTECTED REGION ";

/// A preserved region extracted from previously generated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
	pub id: String,
	/// The lines between the markers, joined with `\n`; the marker lines
	/// themselves are excluded.
	pub content: String,
	pub start_line: String,
	pub end_line: String,
}

/// Compose the start/end marker lines for an id. The prefix (a comment
/// leader such as `//`) is separated from the marker by a single space when
/// non-empty.
pub fn generate_markers(id: &str, prefix: Option<&str>) -> (String, String) {
	let prefix = prefix.unwrap_or("");
	let sp = if prefix.is_empty() { "" } else { " " };
	(
		format!("{prefix}{sp}{START_MARKER}{id}"),
		format!("{prefix}{sp}{END_MARKER}{id}"),
	)
}

/// Extracts hand-edited regions from existing outputs and hands them back to
/// the interpreter during regeneration.
///
/// The manager may be shared across concurrent generations; every operation
/// locks the region map, so scans and lookups never observe a half-applied
/// write.
#[derive(Debug, Default)]
pub struct ProtectedAreaManager {
	regions: Mutex<BTreeMap<String, ProtectedRegion>>,
}

impl ProtectedAreaManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Scan a file for protected regions. A missing file is not an error:
	/// first-time generation has nothing to preserve.
	pub fn scan_file(&self, path: impl AsRef<Path>) -> MotlResult<()> {
		let path = path.as_ref();
		if !path.exists() {
			return Ok(());
		}
		let content = std::fs::read_to_string(path)?;
		self.scan_content(&content);
		Ok(())
	}

	/// Line-based scan: a line containing the start marker opens a region,
	/// the matching end marker closes it, and everything between accumulates
	/// verbatim. Orphan or mismatched end markers are ignored; an unclosed
	/// region is abandoned when a new one opens or input ends.
	pub fn scan_content(&self, content: &str) {
		let mut open: Option<OpenRegion> = None;

		for line in content.lines() {
			let trimmed = line.trim();

			if let Some(id) = marker_id(trimmed, START_MARKER) {
				if let Some(abandoned) = open.take() {
					tracing::warn!(
						id = %abandoned.id,
						"abandoning unclosed protected region before a new start marker"
					);
				}
				open = Some(OpenRegion {
					id: id.to_string(),
					start_line: line.to_string(),
					lines: vec![],
				});
				continue;
			}

			if let Some(id) = marker_id(trimmed, END_MARKER) {
				match open.take() {
					Some(region) if region.id == id => {
						self.insert_scanned(region, line);
					}
					// A mismatched end marker stays inside the open region;
					// an orphan one is dropped.
					Some(mut region) => {
						region.lines.push(line.to_string());
						open = Some(region);
					}
					None => {}
				}
				continue;
			}

			if let Some(region) = open.as_mut() {
				region.lines.push(line.to_string());
			}
		}

		if let Some(abandoned) = open {
			tracing::warn!(id = %abandoned.id, "protected region left unclosed at end of input");
		}
	}

	fn insert_scanned(&self, region: OpenRegion, end_line: &str) {
		let record = ProtectedRegion {
			id: region.id,
			content: region.lines.join("\n"),
			start_line: region.start_line,
			end_line: end_line.to_string(),
		};

		let mut regions = self.regions.lock().expect("protected region lock poisoned");
		if regions.contains_key(&record.id) {
			tracing::warn!(id = %record.id, "duplicate protected region id; keeping latest");
		}
		regions.insert(record.id.clone(), record);
	}

	pub fn get(&self, id: &str) -> Option<ProtectedRegion> {
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.get(id)
			.cloned()
	}

	pub fn content(&self, id: &str) -> Option<String> {
		self.get(id).map(|region| region.content)
	}

	/// Store a region directly. When no marker lines are supplied the
	/// canonical markers are generated from the id.
	pub fn set(&self, id: &str, content: &str, markers: Option<(String, String)>) {
		let (start_line, end_line) = markers.unwrap_or_else(|| generate_markers(id, None));
		let record = ProtectedRegion {
			id: id.to_string(),
			content: content.to_string(),
			start_line,
			end_line,
		};
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.insert(id.to_string(), record);
	}

	pub fn remove(&self, id: &str) -> Option<ProtectedRegion> {
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.remove(id)
	}

	pub fn clear(&self) {
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.clear();
	}

	pub fn all(&self) -> BTreeMap<String, ProtectedRegion> {
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.clone()
	}

	pub fn len(&self) -> usize {
		self.regions
			.lock()
			.expect("protected region lock poisoned")
			.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

struct OpenRegion {
	id: String,
	start_line: String,
	lines: Vec<String>,
}

/// Extract the non-empty id following a marker fragment, if the line
/// contains one.
fn marker_id<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
	let index = line.find(marker)?;
	let id = line[index + marker.len()..].trim();
	if id.is_empty() { None } else { Some(id) }
}
