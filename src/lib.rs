//! # pdfsearch
//!
//! PDF metadata extraction, full-text search and content comparison for
//! file-manager content plugins.
//!
//! ## What this crate does
//!
//! 1. **Extract fields**: metadata strings, page counts, permissions, dates,
//!    conformance and more, one field per call.
//! 2. **Stream text**: the whole document text (or the outline titles) is
//!    handed out in bounded chunks, so a host searching for a string can stop
//!    the scan as soon as it finds a match.
//! 3. **Compare documents**: the same field is extracted from two documents
//!    on two worker threads and reduced to an equality verdict.
//!
//! Every extraction runs on a dedicated worker thread that keeps the last
//! document open between calls and closes it once the host stops asking.
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdfsearch::{Field, FieldResult, LopdfBackend, PdfExtractor, PluginOptions};
//!
//! let mut extractor = PdfExtractor::new(Arc::new(LopdfBackend), Arc::new(PluginOptions::default()));
//! let mut buf = [0u16; 256];
//!
//! if let FieldResult::String(len) = extractor.extract("doc.pdf", Field::Title, 0, &mut buf, 0) {
//!     println!("Title: {}", String::from_utf16_lossy(&buf[..len]));
//! }
//! extractor.abort();
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod buffer;
mod channel;
mod compare;
mod date;
mod document;
mod extractor;
mod field;
mod lopdf_backend;
mod pdf_utils;
mod plugin;
mod signal;
mod status;
mod value;
mod worker;
mod xmp;

pub use buffer::{RequestBuffer, REQUEST_BUFFER_UNITS};
pub use date::{parse_pdf_date, to_filetime};
pub use document::{Permissions, PdfBackend, PdfDocument, TextOptions};
pub use extractor::PdfExtractor;
pub use field::{Field, FieldKind, FieldType, SizeUnit, FIELD_FLAG_SUBST_ATTRIBUTE_STR, FIELD_FLAG_SUBST_MASK};
pub use lopdf_backend::LopdfBackend;
pub use plugin::{ContentPlugin, FieldInfo, HostState, COMPARE_BASE_INDEX};
pub use status::RequestStatus;
pub use value::{CompareVerdict, FieldResult, ResultTag, Scalar, DELAY_IF_SLOW};

// ── Configuration ────────────────────────────────────────────────────────────

/// Text layout mode requested from the document backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOutputMode {
    #[default]
    ReadingOrder,
    PhysicalLayout,
    SimpleLayout,
    TableLayout,
    LinearPrinter,
    RawOrder,
}

/// Options read once when the plugin is loaded.
///
/// The file is a TOML key/value file with a single `[pdfsearch]` section:
///
/// ```toml
/// [pdfsearch]
/// no_cache = false
/// discard_invisible_text = true
/// margin_left = 10
/// attr_printable = "P"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Close the document after every request instead of keeping it open
    /// for the next call.
    pub no_cache: bool,

    /// Skip text rendered invisibly.
    pub discard_invisible_text: bool,

    /// Skip text that is not close to 0/90/180/270 degrees.
    pub discard_diagonal_text: bool,

    /// Skip clipped characters.
    pub discard_clipped_text: bool,

    /// Fold the Adobe extension level into the PDF version
    /// (1.7 extension level 3 becomes 1.73).
    pub append_extension_level: bool,

    /// Strip the `D:` prefix from raw date fields.
    pub remove_date_raw_d_colon: bool,

    pub text_output_mode: TextOutputMode,

    pub margin_left: i32,
    pub margin_right: i32,
    pub margin_top: i32,
    pub margin_bottom: i32,

    /// Page content streams shorter than this count as empty pages for the
    /// fontless / image page counters.
    pub page_contents_length_min: i64,

    /// Appended after every outline title when the outline is streamed.
    pub outline_separator: String,

    pub attr_copyable: Option<char>,
    pub attr_printable: Option<char>,
    pub attr_commentable: Option<char>,
    pub attr_changeable: Option<char>,
    pub attr_encrypted: Option<char>,
    pub attr_tagged: Option<char>,
    pub attr_linearized: Option<char>,
    pub attr_incremental: Option<char>,
    pub attr_signed: Option<char>,
    pub attr_outlined: Option<char>,
    pub attr_embedded_files: Option<char>,
    pub attr_protected: Option<char>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            no_cache: false,
            discard_invisible_text: true,
            discard_diagonal_text: true,
            discard_clipped_text: true,
            append_extension_level: true,
            remove_date_raw_d_colon: false,
            text_output_mode: TextOutputMode::default(),
            margin_left: 0,
            margin_right: 0,
            margin_top: 0,
            margin_bottom: 0,
            page_contents_length_min: 32,
            outline_separator: "\r\n".into(),
            attr_copyable: None,
            attr_printable: None,
            attr_commentable: None,
            attr_changeable: None,
            attr_encrypted: None,
            attr_tagged: None,
            attr_linearized: None,
            attr_incremental: None,
            attr_signed: None,
            attr_outlined: None,
            attr_embedded_files: None,
            attr_protected: None,
        }
    }
}

#[derive(Deserialize)]
struct OptionsFile {
    #[serde(default)]
    pdfsearch: PluginOptions,
}

impl PluginOptions {
    /// Parse options from the text of a TOML file.
    ///
    /// A missing `[pdfsearch]` section yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: OptionsFile = toml::from_str(content)?;
        Ok(file.pdfsearch)
    }

    /// Load options from the file system.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Layout settings handed to the backend's text extraction.
    pub fn text_options(&self) -> TextOptions {
        TextOptions {
            discard_invisible: self.discard_invisible_text,
            discard_diagonal: self.discard_diagonal_text,
            discard_clipped: self.discard_clipped_text,
            margin_left: self.margin_left,
            margin_right: self.margin_right,
            margin_top: self.margin_top,
            margin_bottom: self.margin_bottom,
            mode: self.text_output_mode,
        }
    }
}

/// Wait limits of the request pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long the worker waits for the next request before it closes the
    /// open document. Also bounds how long a streaming worker waits for the
    /// consumer to pick up a full buffer.
    pub producer: Duration,

    /// How long a caller waits for one scalar extraction.
    pub consumer: Duration,

    /// How long a caller polling a streaming field waits before it takes
    /// whatever has been produced so far.
    pub stream_poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            producer: Duration::from_millis(100),
            consumer: Duration::from_secs(10),
            stream_poll: Duration::from_millis(100),
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Every error that this crate can produce.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A filesystem I/O error occurred (e.g. when loading a document or the
    /// options file).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The input bytes do not form a structurally valid PDF document.
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// The document is encrypted and cannot be opened without a password.
    #[error("Document is password protected")]
    Protected,

    /// The underlying lopdf parser returned an error.
    #[error("PDF parse error: {0}")]
    ParseError(#[from] lopdf::Error),

    /// The options file is not valid TOML or has values of the wrong type.
    #[error("Invalid options file: {0}")]
    ConfigError(#[from] toml::de::Error),

    /// The extraction worker thread could not be started.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// A host field index outside the supported catalog.
    #[error("Unsupported field index {0}")]
    UnsupportedField(usize),

    /// A field name that matches nothing in the catalog.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// A text stream ended with something other than end of data.
    #[error("Text stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExtractError>;
