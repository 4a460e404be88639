//! Static registry of document formats understood by the editor.

// self
use crate::_prelude::*;

/// Editor family a document opens in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
	/// Text documents.
	Word,
	/// Spreadsheets.
	Cell,
	/// Presentations.
	Slide,
}
impl DocumentKind {
	/// Returns the label used in editor configs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Word => "word",
			Self::Cell => "cell",
			Self::Slide => "slide",
		}
	}
}
impl Display for DocumentKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Registry entry for one extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Format {
	/// Editor family.
	pub kind: DocumentKind,
	/// Whether the editor can save changes back in this format.
	pub editable: bool,
}

const WORD: &[&str] = &[
	"doc", "docx", "docm", "dot", "dotx", "dotm", "odt", "fodt", "ott", "rtf", "txt", "html", "htm",
	"mht", "pdf", "djvu", "fb2", "epub", "xps", "oxps", "xml",
];
const CELL: &[&str] =
	&["xls", "xlsx", "xlsm", "xlt", "xltx", "xltm", "ods", "fods", "ots", "csv"];
const SLIDE: &[&str] = &[
	"pps", "ppsx", "ppsm", "ppt", "pptx", "pptm", "pot", "potx", "potm", "odp", "fodp", "otp",
];
const EDITABLE: &[&str] = &["docx", "xlsx", "pptx"];

/// Extension lookup table; lookups are case-insensitive.
#[derive(Clone, Debug)]
pub struct FormatRegistry {
	formats: HashMap<String, Format>,
}
impl FormatRegistry {
	/// Finds the format for `extension`, with or without a leading dot.
	pub fn lookup(&self, extension: &str) -> Option<Format> {
		let normalized = extension.trim().trim_start_matches('.').to_ascii_lowercase();

		self.formats.get(&normalized).copied()
	}

	/// Finds the format for the extension of `filename`.
	pub fn lookup_filename(&self, filename: &str) -> Option<Format> {
		extension_of(filename).and_then(|ext| self.lookup(ext))
	}
}
impl Default for FormatRegistry {
	fn default() -> Self {
		let formats = [(WORD, DocumentKind::Word), (CELL, DocumentKind::Cell), (SLIDE, DocumentKind::Slide)]
			.into_iter()
			.flat_map(|(extensions, kind)| {
				extensions.iter().map(move |ext| {
					((*ext).to_owned(), Format { kind, editable: EDITABLE.contains(ext) })
				})
			})
			.collect();

		Self { formats }
	}
}

/// Returns the text after the last dot of `filename`, if any.
pub fn extension_of(filename: &str) -> Option<&str> {
	filename.rsplit_once('.').map(|(_, ext)| ext).filter(|ext| !ext.is_empty())
}
