use crate::channel::RequestChannel;
use crate::date::parse_pdf_date;
use crate::document::{PdfBackend, PdfDocument};
use crate::status::RequestStatus;
use crate::{xmp, ExtractError, Field, PluginOptions, ResultTag, Scalar, SizeUnit};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ── ExtractionWorker ──────────────────────────────────────────────────────────

/// Producer side of a pipeline. Runs on its own thread and owns the open
/// document; nothing else ever touches it.
pub(crate) struct ExtractionWorker {
    channel: Arc<RequestChannel>,
    backend: Arc<dyn PdfBackend>,
    options: Arc<PluginOptions>,
    document: Option<Box<dyn PdfDocument>>,
    open_path: Option<PathBuf>,
}

impl ExtractionWorker {
    pub(crate) fn new(
        channel: Arc<RequestChannel>,
        backend: Arc<dyn PdfBackend>,
        options: Arc<PluginOptions>,
    ) -> Self {
        Self {
            channel,
            backend,
            options,
            document: None,
            open_path: None,
        }
    }

    /// Thread body: serve requests until the run flag drops.
    ///
    /// Each wake-up processes one request and answers with the consumer
    /// signal. If no request arrives within the producer timeout the
    /// document is closed and the worker sleeps until the next one.
    pub(crate) fn run(mut self) {
        trace!("worker loop entered");
        let idle_timeout = self.channel.timeouts().producer;
        let mut timeout = Some(idle_timeout);

        while self.channel.is_active() {
            if self.channel.wait_for_producer(timeout) {
                if !self.channel.is_active() {
                    break;
                }
                let status = self.channel.status();
                if status != RequestStatus::Cancelled && status != RequestStatus::Complete && self.open() {
                    self.do_work();
                }

                self.channel
                    .transition(RequestStatus::Active, RequestStatus::Complete);
                let prev = self
                    .channel
                    .transition(RequestStatus::Cancelled, RequestStatus::Closed);
                if prev == RequestStatus::Cancelled || self.channel.no_cache() {
                    self.close();
                }

                trace!(status = ?self.channel.status(), "consumer notified");
                // a producer signal raised while we worked belongs to the
                // request we just answered
                self.channel.reset_producer();
                self.channel.notify_consumer();
                timeout = Some(idle_timeout);
            } else {
                if self.document.is_some() {
                    debug!("no request within {idle_timeout:?}, closing document");
                }
                self.close();
                timeout = None;
            }
        }

        self.close();
        self.channel.mark_exited();
        debug!("worker thread exiting");
    }

    // ── Document cache ───────────────────────────────────────────────────────

    /// Make sure the requested document is open. Reuses the open handle when
    /// the path is unchanged.
    fn open(&mut self) -> bool {
        let path = self.channel.lock().path.clone();
        let Some(path) = path else {
            self.close();
            return false;
        };
        if self.document.is_some() && self.open_path.as_ref() == Some(&path) {
            return true;
        }

        self.close();
        match self.backend.open(&path) {
            Ok(document) => {
                debug!(path = %path.display(), pages = document.page_count(), "document opened");
                self.document = Some(document);
                self.open_path = Some(path);
                self.channel.set_document_open(true);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open document");
                self.channel.set_error();
                false
            }
        }
    }

    fn close(&mut self) {
        if self.document.take().is_some() {
            debug!(path = ?self.open_path, "document closed");
        }
        self.open_path = None;
        self.channel.set_document_open(false);
    }

    // ── Field dispatch ───────────────────────────────────────────────────────

    fn do_work(&mut self) {
        let (field, unit) = {
            let request = self.channel.lock();
            (request.field, request.unit)
        };
        let Some(document) = self.document.as_deref_mut() else {
            return;
        };
        extract_field(document, &self.channel, &self.options, field, unit);
        trace!(?field, status = ?self.channel.status(), "field extracted");
    }
}

fn extract_field(
    doc: &mut dyn PdfDocument,
    channel: &RequestChannel,
    options: &PluginOptions,
    field: Field,
    unit: i32,
) {
    let set_bool = |value: bool| channel.set_value(Scalar::Bool(value), ResultTag::Boolean);
    let set_int = |value: u32| channel.set_value(Scalar::Int(value as i32), ResultTag::Int32);
    let set_double = |value: f64| channel.set_value(Scalar::Double(value), ResultTag::Double);
    let set_string = |value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            channel.set_text(&value);
        }
    };

    match field {
        Field::Title | Field::Subject | Field::Keywords | Field::Author | Field::Creator | Field::Producer => {
            set_string(metadata_string(doc, field))
        }
        Field::DocStart | Field::FirstRow | Field::Text => stream_text(doc, channel, options),
        Field::Outlines => stream_outlines(doc, channel, options),
        Field::Extensions => set_string(doc.extensions()),
        Field::NumberOfPages => set_int(doc.page_count()),
        Field::NumberOfFontlessPages => set_int(doc.fontless_page_count(options.page_contents_length_min)),
        Field::NumberOfPagesWithImages => {
            set_int(doc.pages_with_images_count(options.page_contents_length_min))
        }
        Field::PdfVersion => set_double(pdf_version(doc, options)),
        Field::PageWidth | Field::PageHeight => {
            if let Some((width, height)) = doc.page_crop_size(1) {
                let points = if field == Field::PageWidth { width } else { height };
                let factor = SizeUnit::from_index(unit).map(SizeUnit::per_point).unwrap_or(0.0);
                set_double(points * factor);
            }
        }
        Field::Copyable => set_bool(doc.permissions().copy),
        Field::Printable => set_bool(doc.permissions().print),
        Field::Commentable => set_bool(doc.permissions().add_notes),
        Field::Changeable => set_bool(doc.permissions().change),
        Field::Encrypted => set_bool(doc.is_encrypted()),
        Field::Tagged => set_bool(doc.is_tagged()),
        Field::Linearized => set_bool(doc.is_linearized()),
        Field::Incremental => set_bool(doc.is_incremental()),
        Field::Signed => set_bool(doc.has_signature()),
        Field::Outlined => set_bool(doc.has_outlines()),
        Field::EmbeddedFiles => set_bool(doc.has_embedded_files()),
        Field::Protected => set_bool(doc.is_protected()),
        Field::CreationDate | Field::ModifiedDate | Field::MetadataDate => {
            if let Some(date) = metadata_string(doc, field).as_deref().and_then(parse_pdf_date) {
                channel.set_value(Scalar::DateTime(date), ResultTag::DateTime);
            }
        }
        Field::CreationDateRaw | Field::ModifiedDateRaw | Field::MetadataDateRaw => {
            let raw = metadata_string(doc, field).map(|date| {
                match date.strip_prefix("D:") {
                    Some(rest) if options.remove_date_raw_d_colon => rest.to_string(),
                    _ => date,
                }
            });
            set_string(raw)
        }
        Field::Id => set_string(doc.document_id()),
        Field::AttributesString => set_string(Some(attributes_string(doc, options))),
        Field::Conformance => {
            let xmp = doc.xmp_metadata();
            set_string(xmp::conformance(xmp.as_deref(), doc.trailer_preamble().as_deref()))
        }
    }
}

/// Information dictionary entry of a metadata field, falling back to the
/// XMP packet when the dictionary has none.
fn metadata_string(doc: &dyn PdfDocument, field: Field) -> Option<String> {
    let key = field.info_key()?;
    doc.info_string(key)
        .filter(|v| !v.is_empty())
        .or_else(|| doc.xmp_metadata().and_then(|packet| xmp::info_fallback(&packet, key)))
}

/// PDF version, with the Adobe extension level folded in as hundredths
/// for 1.7 and later (1.7 extension level 3 is 1.73).
fn pdf_version(doc: &dyn PdfDocument, options: &PluginOptions) -> f64 {
    let version = doc.pdf_version();
    if version >= 1.7 && options.append_extension_level {
        if let Some(level) = doc.adbe_extension_level().filter(|l| (1..10).contains(l)) {
            return version + level as f64 / 100.0;
        }
    }
    version
}

/// One display symbol per configured attribute, `-` where the attribute
/// does not apply. Unconfigured attributes take no position.
fn attributes_string(doc: &dyn PdfDocument, options: &PluginOptions) -> String {
    let permissions = doc.permissions();
    let mut out = String::new();
    let mut push = |symbol: Option<char>, applies: &dyn Fn() -> bool| {
        if let Some(symbol) = symbol {
            out.push(if applies() { symbol } else { '-' });
        }
    };
    push(options.attr_printable, &|| permissions.print);
    push(options.attr_copyable, &|| permissions.copy);
    push(options.attr_changeable, &|| permissions.change);
    push(options.attr_commentable, &|| permissions.add_notes);
    push(options.attr_incremental, &|| doc.is_incremental());
    push(options.attr_tagged, &|| doc.is_tagged());
    push(options.attr_linearized, &|| doc.is_linearized());
    push(options.attr_encrypted, &|| doc.is_encrypted());
    push(options.attr_protected, &|| doc.is_protected());
    push(options.attr_signed, &|| doc.has_signature());
    push(options.attr_outlined, &|| doc.has_outlines());
    push(options.attr_embedded_files, &|| doc.has_embedded_files());
    out
}

// ── Text routines ─────────────────────────────────────────────────────────────

/// Page by page text extraction into the request buffer. Stops as soon as
/// the request is no longer active.
fn stream_text(doc: &mut dyn PdfDocument, channel: &RequestChannel, options: &PluginOptions) {
    let text_options = options.text_options();
    let should_stop = || channel.status() != RequestStatus::Active;
    let mut sink = |text: &str| channel.output(text);

    for page in 1..=doc.page_count() {
        if should_stop() {
            break;
        }
        let result = doc.extract_page_text(page, &text_options, &mut sink, &should_stop);
        doc.release_page(page);
        match result {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => break,
            Err(ExtractError::Protected) => {
                debug!("document is protected, no text");
                break;
            }
            Err(e) => warn!(page, error = %e, "page text extraction failed"),
        }
    }
}

/// Outline titles, depth first, separated by the configured separator.
fn stream_outlines(doc: &mut dyn PdfDocument, channel: &RequestChannel, options: &PluginOptions) {
    let separator = options.outline_separator.as_str();
    let mut first = true;
    let flow = doc.outline_titles(&mut |title: &str| {
        if !first && channel.output(separator).is_break() {
            return ControlFlow::Break(());
        }
        first = false;
        channel.output(title)
    });
    if flow.is_break() {
        trace!("outline walk interrupted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Permissions, TextOptions};
    use crate::Result;

    #[derive(Default)]
    struct Flags {
        encrypted: bool,
        tagged: bool,
        print: bool,
    }

    impl PdfDocument for Flags {
        fn page_count(&self) -> u32 {
            0
        }
        fn permissions(&self) -> Permissions {
            Permissions {
                print: self.print,
                copy: false,
                change: false,
                add_notes: false,
            }
        }
        fn is_encrypted(&self) -> bool {
            self.encrypted
        }
        fn is_tagged(&self) -> bool {
            self.tagged
        }
        fn pdf_version(&self) -> f64 {
            1.7
        }
        fn adbe_extension_level(&self) -> Option<i64> {
            Some(3)
        }
        fn extract_page_text(
            &mut self,
            _page: u32,
            _options: &TextOptions,
            _sink: &mut dyn FnMut(&str) -> ControlFlow<()>,
            _should_stop: &dyn Fn() -> bool,
        ) -> Result<ControlFlow<()>> {
            Ok(ControlFlow::Continue(()))
        }
    }

    #[test]
    fn attributes_follow_configured_symbols() {
        let doc = Flags {
            encrypted: true,
            tagged: false,
            print: true,
        };
        let options = PluginOptions {
            attr_printable: Some('P'),
            attr_copyable: Some('C'),
            attr_tagged: Some('T'),
            attr_encrypted: Some('E'),
            ..PluginOptions::default()
        };
        assert_eq!(attributes_string(&doc, &options), "P--E");
        assert_eq!(attributes_string(&doc, &PluginOptions::default()), "");
    }

    #[test]
    fn extension_level_is_folded_into_version() {
        let doc = Flags::default();
        let with = PluginOptions::default();
        assert!((pdf_version(&doc, &with) - 1.73).abs() < 1e-9);

        let without = PluginOptions {
            append_extension_level: false,
            ..PluginOptions::default()
        };
        assert!((pdf_version(&doc, &without) - 1.7).abs() < 1e-9);
    }
}
