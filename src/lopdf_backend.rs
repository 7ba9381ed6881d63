use crate::document::{Permissions, PdfBackend, PdfDocument, TextOptions};
use crate::pdf_utils::{as_number, decode_text_string, hex_encode, lookup, lookup_dict, resolve, text_from_dict};
use crate::{ExtractError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::debug;

/// Upper bound for `/Parent` chains when resolving inherited page attributes.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Bytes read before the last `startxref` when looking for file markers.
const PREAMBLE_LEN: usize = 32;

// ── LopdfBackend ──────────────────────────────────────────────────────────────

/// Production backend on top of [`lopdf`].
///
/// Text extraction uses lopdf's content stream decoder, which produces text
/// in content order; the layout settings of [`TextOptions`] are not applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl PdfBackend for LopdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>> {
        let bytes = std::fs::read(path)?;
        Ok(Box::new(LopdfDocument::from_bytes(&bytes)?))
    }
}

// ── LopdfDocument ─────────────────────────────────────────────────────────────

/// A parsed document plus the facts that can only be read from the raw
/// file bytes.
pub(crate) struct LopdfDocument {
    document: Document,
    encrypted: bool,
    protected: bool,
    incremental: bool,
    preamble: Option<String>,
}

impl LopdfDocument {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(bytes)?;

        let encrypted = document.is_encrypted() || find(bytes, b"/Encrypt").next().is_some();
        // documents readable with the empty user password are decrypted in
        // place; anything else stays opaque
        let protected = document.is_encrypted() && document.decrypt("").is_err();

        let startxrefs: Vec<usize> = find(bytes, b"startxref").collect();
        let preamble = startxrefs.last().map(|&end| {
            let start = end.saturating_sub(PREAMBLE_LEN);
            String::from_utf8_lossy(&bytes[start..end]).into_owned()
        });

        debug!(
            version = %document.version,
            pages = document.get_pages().len(),
            encrypted,
            protected,
            "document loaded"
        );

        Ok(Self {
            document,
            encrypted,
            protected,
            incremental: startxrefs.len() > 1,
            preamble,
        })
    }

    fn catalog(&self) -> Option<&Dictionary> {
        self.document.catalog().ok()
    }

    fn page_dict(&self, page: u32) -> Option<&Dictionary> {
        let id = *self.document.get_pages().get(&page)?;
        self.dict_object(id)
    }

    fn dict_object(&self, id: ObjectId) -> Option<&Dictionary> {
        self.document.get_object(id).ok()?.as_dict().ok()
    }

    /// A page attribute, looked up through the `/Parent` chain.
    fn inherited<'a>(&'a self, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let doc = &self.document;
        let mut node = page;
        for _ in 0..MAX_PAGE_TREE_DEPTH {
            if let Some(value) = lookup(doc, node, key) {
                return Some(value);
            }
            node = lookup_dict(doc, node, b"Parent")?;
        }
        None
    }

    fn resources<'a>(&'a self, page: &'a Dictionary) -> Option<&'a Dictionary> {
        self.inherited(page, b"Resources")?.as_dict().ok()
    }

    /// No content, or a single content stream shorter than `min_len`.
    fn content_is_empty(&self, page: &Dictionary, min_len: i64) -> bool {
        match lookup(&self.document, page, b"Contents") {
            Some(Object::Array(_)) => false,
            Some(Object::Stream(stream)) => {
                let len = lookup(&self.document, &stream.dict, b"Length")
                    .and_then(|v| v.as_i64().ok())
                    .unwrap_or(stream.content.len() as i64);
                len < min_len
            }
            _ => true,
        }
    }

    fn count_pages<F>(&self, min_content_len: i64, mut matches: F) -> u32
    where
        F: FnMut(&Dictionary) -> bool,
    {
        let mut count = 0;
        for id in self.document.get_pages().into_values() {
            let Some(dict) = self.dict_object(id) else {
                continue;
            };
            if !matches(dict) {
                continue;
            }
            // pages that draw (almost) nothing are not counted
            if min_content_len > 0 && self.content_is_empty(dict, min_content_len) {
                continue;
            }
            count += 1;
        }
        count
    }

    fn encrypt_dict(&self) -> Option<&Dictionary> {
        let doc = &self.document;
        if let Some(dict) = lookup_dict(doc, &doc.trailer, b"Encrypt") {
            return Some(dict);
        }
        // decrypting in place removes the trailer entry but leaves the
        // dictionary object behind
        doc.objects.values().find_map(|obj| {
            obj.as_dict()
                .ok()
                .filter(|d| d.has(b"Filter") && d.has(b"O") && d.has(b"U") && d.has(b"P"))
        })
    }

    fn walk_outline(
        &self,
        first: Option<ObjectId>,
        visited: &mut HashSet<ObjectId>,
        sink: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let doc = &self.document;
        let mut next = first;
        while let Some(id) = next {
            if !visited.insert(id) {
                break;
            }
            let Some(item) = self.dict_object(id) else {
                break;
            };
            if let Some(title) = text_from_dict(doc, item, b"Title") {
                if sink(&title).is_break() {
                    return ControlFlow::Break(());
                }
            }
            let kids = item.get(b"First").and_then(|o| o.as_reference()).ok();
            if kids.is_some() && self.walk_outline(kids, visited, sink).is_break() {
                return ControlFlow::Break(());
            }
            next = item.get(b"Next").and_then(|o| o.as_reference()).ok();
        }
        ControlFlow::Continue(())
    }
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    fn page_crop_size(&self, page: u32) -> Option<(f64, f64)> {
        let dict = self.page_dict(page)?;
        let rect = self
            .inherited(dict, b"CropBox")
            .or_else(|| self.inherited(dict, b"MediaBox"))?
            .as_array()
            .ok()?;
        let coords: Vec<f64> = rect
            .iter()
            .filter_map(|v| as_number(resolve(&self.document, v)))
            .collect();
        match coords.as_slice() {
            [x1, y1, x2, y2] => Some(((x2 - x1).abs(), (y2 - y1).abs())),
            _ => None,
        }
    }

    fn info_string(&self, key: &str) -> Option<String> {
        let doc = &self.document;
        let info = lookup_dict(doc, &doc.trailer, b"Info")?;
        text_from_dict(doc, info, key.as_bytes())
    }

    fn xmp_metadata(&self) -> Option<String> {
        let catalog = self.catalog()?;
        let stream = lookup(&self.document, catalog, b"Metadata")?.as_stream().ok()?;
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn pdf_version(&self) -> f64 {
        let header = self.document.version.trim().parse::<f64>().unwrap_or(0.0);
        let catalog = self
            .catalog()
            .and_then(|c| lookup(&self.document, c, b"Version"))
            .and_then(|v| v.as_name().ok())
            .and_then(|name| String::from_utf8_lossy(name).parse::<f64>().ok())
            .unwrap_or(0.0);
        header.max(catalog)
    }

    fn adbe_extension_level(&self) -> Option<i64> {
        let doc = &self.document;
        let extensions = lookup_dict(doc, self.catalog()?, b"Extensions")?;
        let adbe = lookup_dict(doc, extensions, b"ADBE")?;
        lookup(doc, adbe, b"ExtensionLevel")?.as_i64().ok()
    }

    fn extensions(&self) -> Option<String> {
        let doc = &self.document;
        let extensions = lookup_dict(doc, self.catalog()?, b"Extensions")?;

        let mut out = String::new();
        for (key, value) in extensions.iter() {
            let prefix = String::from_utf8_lossy(key);
            match resolve(doc, value) {
                Object::Dictionary(dict) => {
                    if !out.is_empty() {
                        out.push(';');
                    }
                    out.push_str(&prefix);
                    extension_values(doc, dict, &mut out);
                }
                Object::Array(items) => {
                    if !out.is_empty() {
                        out.push(';');
                    }
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            out.push(';');
                        }
                        if let Ok(dict) = resolve(doc, item).as_dict() {
                            out.push_str(&prefix);
                            extension_values(doc, dict, &mut out);
                        }
                    }
                }
                _ => {}
            }
        }
        Some(out).filter(|s| !s.is_empty())
    }

    fn document_id(&self) -> Option<String> {
        let doc = &self.document;
        let ids = lookup(doc, &doc.trailer, b"ID")?.as_array().ok()?;
        let parts: Vec<String> = ids
            .iter()
            .filter_map(|v| resolve(doc, v).as_str().ok())
            .map(hex_encode)
            .collect();
        Some(parts.join("-"))
    }

    fn trailer_preamble(&self) -> Option<String> {
        self.preamble.clone()
    }

    fn permissions(&self) -> Permissions {
        let Some(p) = self
            .encrypt_dict()
            .and_then(|d| lookup(&self.document, d, b"P"))
            .and_then(|v| v.as_i64().ok())
        else {
            return Permissions::default();
        };
        Permissions {
            print: p & 0x04 != 0,
            change: p & 0x08 != 0,
            copy: p & 0x10 != 0,
            add_notes: p & 0x20 != 0,
        }
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn is_protected(&self) -> bool {
        self.protected
    }

    fn is_linearized(&self) -> bool {
        self.document
            .objects
            .values()
            .any(|obj| obj.as_dict().map(|d| d.has(b"Linearized")).unwrap_or(false))
    }

    fn is_incremental(&self) -> bool {
        self.incremental
    }

    fn is_tagged(&self) -> bool {
        self.catalog()
            .and_then(|c| lookup_dict(&self.document, c, b"StructTreeRoot"))
            .is_some()
    }

    fn has_signature(&self) -> bool {
        self.catalog()
            .and_then(|c| lookup_dict(&self.document, c, b"AcroForm"))
            .and_then(|form| lookup(&self.document, form, b"SigFlags"))
            .and_then(|v| v.as_i64().ok())
            .map(|flags| flags & 0x01 != 0)
            .unwrap_or(false)
    }

    fn has_outlines(&self) -> bool {
        self.catalog()
            .and_then(|c| lookup_dict(&self.document, c, b"Outlines"))
            .map(|outlines| outlines.has(b"First"))
            .unwrap_or(false)
    }

    fn has_embedded_files(&self) -> bool {
        self.catalog()
            .and_then(|c| lookup_dict(&self.document, c, b"Names"))
            .and_then(|names| lookup_dict(&self.document, names, b"EmbeddedFiles"))
            .is_some()
    }

    fn fontless_page_count(&self, min_content_len: i64) -> u32 {
        let doc = &self.document;
        self.count_pages(min_content_len, |page| {
            self.resources(page)
                .and_then(|res| lookup_dict(doc, res, b"Font"))
                .is_none()
        })
    }

    fn pages_with_images_count(&self, min_content_len: i64) -> u32 {
        let doc = &self.document;
        self.count_pages(min_content_len, |page| {
            let Some(xobjects) = self.resources(page).and_then(|res| lookup_dict(doc, res, b"XObject")) else {
                return false;
            };
            xobjects.iter().any(|(_, value)| match resolve(doc, value) {
                Object::Stream(stream) => stream
                    .dict
                    .get(b"Subtype")
                    .and_then(|v| v.as_name())
                    .map(|name| name == b"Image")
                    .unwrap_or(false),
                _ => false,
            })
        })
    }

    fn outline_titles(&self, sink: &mut dyn FnMut(&str) -> ControlFlow<()>) -> ControlFlow<()> {
        let first = self
            .catalog()
            .and_then(|c| lookup_dict(&self.document, c, b"Outlines"))
            .and_then(|outlines| outlines.get(b"First").and_then(|o| o.as_reference()).ok());
        let mut visited = HashSet::new();
        self.walk_outline(first, &mut visited, sink)
    }

    fn extract_page_text(
        &mut self,
        page: u32,
        _options: &TextOptions,
        sink: &mut dyn FnMut(&str) -> ControlFlow<()>,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<ControlFlow<()>> {
        if self.protected {
            return Err(ExtractError::Protected);
        }
        let text = self.document.extract_text(&[page])?;
        for line in text.split_inclusive('\n') {
            if should_stop() || sink(line).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Append ` BaseVersion.ExtensionLevel.ExtensionRevision` of one developer
/// extension dictionary.
fn extension_values(doc: &Document, ext: &Dictionary, out: &mut String) {
    if let Some(base) = lookup(doc, ext, b"BaseVersion").and_then(|v| v.as_name().ok()) {
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(base));
    }
    if let Some(level) = lookup(doc, ext, b"ExtensionLevel").and_then(|v| v.as_i64().ok()) {
        out.push('.');
        out.push_str(&level.to_string());
    }
    if let Some(revision) = lookup(doc, ext, b"ExtensionRevision").and_then(|v| v.as_str().ok()) {
        out.push('.');
        out.push_str(&decode_text_string(revision));
    }
}

/// Start offsets of every occurrence of `needle`.
fn find<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(move |(_, window)| *window == needle)
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream, StringFormat};

    fn sample(with_outline: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let content = b"BT /F1 12 Tf 72 720 Td (Hello PDF) Tj ET".to_vec();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );

        let mut catalog = dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Extensions" => dictionary! {
                "ADBE" => dictionary! { "BaseVersion" => "1.7", "ExtensionLevel" => 3 },
            },
        };
        if with_outline {
            let outlines_id = doc.new_object_id();
            let second_id = doc.add_object(dictionary! {
                "Title" => Object::string_literal("Second"),
                "Parent" => outlines_id,
            });
            let first_id = doc.add_object(dictionary! {
                "Title" => Object::String(vec![0xFE, 0xFF, 0x00, 0x46, 0x00, 0x69], StringFormat::Hexadecimal),
                "Parent" => outlines_id,
                "Next" => second_id,
            });
            doc.objects.insert(
                outlines_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Outlines",
                    "First" => first_id,
                    "Last" => second_id,
                }),
            );
            catalog.set("Outlines", outlines_id);
        }
        let catalog_id = doc.add_object(catalog);
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Sample"),
            "CreationDate" => Object::string_literal("D:20240102030405Z"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn reads_info_and_page_geometry() {
        let doc = LopdfDocument::from_bytes(&sample(false)).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.info_string("Title").as_deref(), Some("Sample"));
        assert_eq!(doc.info_string("Author"), None);
        assert_eq!(doc.page_crop_size(1), Some((595.0, 842.0)));
        assert_eq!(doc.page_crop_size(2), None);
    }

    #[test]
    fn reads_version_and_extensions() {
        let doc = LopdfDocument::from_bytes(&sample(false)).unwrap();
        assert!((doc.pdf_version() - 1.7).abs() < 1e-9);
        assert_eq!(doc.adbe_extension_level(), Some(3));
        assert_eq!(doc.extensions().as_deref(), Some("ADBE 1.7.3"));
    }

    #[test]
    fn plain_document_flags() {
        let doc = LopdfDocument::from_bytes(&sample(false)).unwrap();
        assert!(!doc.is_encrypted());
        assert!(!doc.is_protected());
        assert!(!doc.is_tagged());
        assert!(!doc.has_outlines());
        assert!(!doc.has_embedded_files());
        assert_eq!(doc.permissions(), Permissions::default());
        assert_eq!(doc.fontless_page_count(0), 0);
        assert_eq!(doc.pages_with_images_count(0), 0);
    }

    #[test]
    fn outline_titles_are_walked_in_order() {
        let doc = LopdfDocument::from_bytes(&sample(true)).unwrap();
        assert!(doc.has_outlines());
        let mut titles = Vec::new();
        let flow = doc.outline_titles(&mut |t: &str| {
            titles.push(t.to_string());
            ControlFlow::Continue(())
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(titles, ["Fi", "Second"]);
    }

    #[test]
    fn outline_walk_stops_on_break() {
        let doc = LopdfDocument::from_bytes(&sample(true)).unwrap();
        let mut seen = 0;
        let flow = doc.outline_titles(&mut |_: &str| {
            seen += 1;
            ControlFlow::Break(())
        });
        assert!(flow.is_break());
        assert_eq!(seen, 1);
    }

    #[test]
    fn page_text_goes_through_the_sink() {
        let mut doc = LopdfDocument::from_bytes(&sample(false)).unwrap();
        let mut text = String::new();
        let flow = doc
            .extract_page_text(
                1,
                &TextOptions::default(),
                &mut |chunk: &str| {
                    text.push_str(chunk);
                    ControlFlow::Continue(())
                },
                &|| false,
            )
            .unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(text.contains("Hello PDF"));
    }

    #[test]
    fn protected_document_refuses_page_text() {
        let mut doc = LopdfDocument::from_bytes(&sample(false)).unwrap();
        doc.protected = true;
        let mut called = false;
        let result = doc.extract_page_text(
            1,
            &TextOptions::default(),
            &mut |_: &str| {
                called = true;
                ControlFlow::Continue(())
            },
            &|| false,
        );
        assert!(matches!(result, Err(ExtractError::Protected)));
        assert!(!called);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(LopdfDocument::from_bytes(b"not a pdf").is_err());
    }
}
