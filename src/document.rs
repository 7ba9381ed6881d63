use crate::{Result, TextOutputMode};
use std::ops::ControlFlow;
use std::path::Path;

// ── Backend seam ──────────────────────────────────────────────────────────────

/// Opens documents for the extraction worker.
///
/// A backend is shared between every pipeline of a plugin, so it must be
/// usable from several worker threads at once. The documents it returns are
/// owned and used by exactly one worker.
pub trait PdfBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>>;
}

/// Document permission flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub print: bool,
    pub copy: bool,
    pub change: bool,
    pub add_notes: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            print: true,
            copy: true,
            change: true,
            add_notes: true,
        }
    }
}

/// Layout settings for page text extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextOptions {
    pub discard_invisible: bool,
    pub discard_diagonal: bool,
    pub discard_clipped: bool,
    pub margin_left: i32,
    pub margin_right: i32,
    pub margin_top: i32,
    pub margin_bottom: i32,
    pub mode: TextOutputMode,
}

/// An open document as seen by the extraction worker.
///
/// Only [`page_count`](PdfDocument::page_count) and
/// [`extract_page_text`](PdfDocument::extract_page_text) are required; every
/// other query defaults to "absent".
pub trait PdfDocument: Send {
    fn page_count(&self) -> u32;

    /// Crop box width and height of a page (1-based) in points.
    fn page_crop_size(&self, _page: u32) -> Option<(f64, f64)> {
        None
    }

    /// Raw string of the document information dictionary entry `key`.
    fn info_string(&self, _key: &str) -> Option<String> {
        None
    }

    /// The XMP metadata packet.
    fn xmp_metadata(&self) -> Option<String> {
        None
    }

    /// Highest of the header version and the catalog `/Version`.
    fn pdf_version(&self) -> f64 {
        0.0
    }

    /// `/Extensions /ADBE /ExtensionLevel` of the catalog.
    fn adbe_extension_level(&self) -> Option<i64> {
        None
    }

    /// Developer extensions as `PREFIX BaseVersion.Level.Revision`, joined
    /// with `;`.
    fn extensions(&self) -> Option<String> {
        None
    }

    /// File identifier as hex strings joined with `-`.
    fn document_id(&self) -> Option<String> {
        None
    }

    /// Tail of the file before the last `startxref`, used to detect the
    /// PDF/raster marker.
    fn trailer_preamble(&self) -> Option<String> {
        None
    }

    fn permissions(&self) -> Permissions {
        Permissions::default()
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    /// Encrypted and not readable with an empty user password.
    fn is_protected(&self) -> bool {
        false
    }

    fn is_linearized(&self) -> bool {
        false
    }

    /// More than one cross-reference section.
    fn is_incremental(&self) -> bool {
        false
    }

    fn is_tagged(&self) -> bool {
        false
    }

    /// `/AcroForm /SigFlags` bit 1 is set.
    fn has_signature(&self) -> bool {
        false
    }

    fn has_outlines(&self) -> bool {
        false
    }

    /// Catalog `/Names /EmbeddedFiles` is present.
    fn has_embedded_files(&self) -> bool {
        false
    }

    /// Pages without a `/Font` resource. Pages whose content is shorter than
    /// `min_content_len` are not counted.
    fn fontless_page_count(&self, _min_content_len: i64) -> u32 {
        0
    }

    /// Pages with at least one image XObject. Pages whose content is shorter
    /// than `min_content_len` are not counted.
    fn pages_with_images_count(&self, _min_content_len: i64) -> u32 {
        0
    }

    /// Walk the outline depth-first and hand every non-empty title to
    /// `sink` until it returns `Break`.
    fn outline_titles(&self, _sink: &mut dyn FnMut(&str) -> ControlFlow<()>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Extract the text of one page (1-based) into `sink`.
    ///
    /// Implementations should poll `should_stop` between text runs and
    /// return early once it reports `true`. A `Break` from the sink ends the
    /// page as well and is passed back to the caller.
    fn extract_page_text(
        &mut self,
        page: u32,
        options: &TextOptions,
        sink: &mut dyn FnMut(&str) -> ControlFlow<()>,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<ControlFlow<()>>;

    /// Drop whatever per-page state the last extraction left behind.
    fn release_page(&mut self, _page: u32) {}
}
