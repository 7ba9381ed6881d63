//! XMP metadata lookups.
//!
//! The packet is scanned as text rather than parsed into a tree. Properties
//! may appear in either serialisation form:
//! - attribute syntax : `pdfaid:part="3"`
//! - element syntax   : `<pdfaid:part>3</pdfaid:part>`
//!
//! and text properties may be wrapped in an `rdf:Alt`, `rdf:Seq` or
//! `rdf:Bag` array, in which case the first `rdf:li` item is used.

const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_PDF: &str = "http://ns.adobe.com/pdf/1.3/";
const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";
const NS_PDFA: &str = "http://www.aiim.org/pdfa/ns/id/";
const NS_PDFX: &str = "http://www.npes.org/pdfx/ns/id/";
const NS_PDFX_ADOBE: &str = "http://ns.adobe.com/pdfx/1.3/";
const NS_PDFE: &str = "http://www.aiim.org/pdfe/ns/id/";
const NS_PDFUA: &str = "http://www.aiim.org/pdfua/ns/id/";

const RASTER_MARKER: &str = "%PDF-raster-";

// ── Information dictionary fallback ───────────────────────────────────────────

/// XMP property standing in for a document information dictionary entry.
pub(crate) fn info_fallback(xmp: &str, info_key: &str) -> Option<String> {
    let (ns, local) = match info_key {
        "Title" => (NS_DC, "title"),
        "Subject" => (NS_DC, "description"),
        "Keywords" => (NS_PDF, "Keywords"),
        "Author" => (NS_DC, "creator"),
        "Creator" => (NS_XMP, "CreatorTool"),
        "Producer" => (NS_PDF, "Producer"),
        "CreationDate" => (NS_XMP, "CreateDate"),
        "ModDate" => (NS_XMP, "ModifyDate"),
        "MetadataDate" => (NS_XMP, "MetadataDate"),
        _ => return None,
    };
    property(xmp, ns, local)
}

// ── Conformance ───────────────────────────────────────────────────────────────

/// Conformance claims of a document, joined with `;`.
///
/// PDF/A (`PDF/A-<part><level>[:<rev>]`), PDF/X, PDF/E and PDF/UA come from
/// the XMP packet; PDF/raster is detected from the `%PDF-raster-` marker in
/// `preamble`, the bytes just before the last `startxref`.
pub(crate) fn conformance(xmp: Option<&str>, preamble: Option<&str>) -> Option<String> {
    let mut claims: Vec<String> = Vec::new();

    if let Some(xmp) = xmp {
        if let Some(prefix) = find_prefix(xmp, NS_PDFA) {
            let mut pdfa = String::new();
            if let Some(part) = value(xmp, &format!("{prefix}:part")) {
                pdfa.push_str("PDF/A-");
                pdfa.push_str(&part);
            }
            if let Some(level) = value(xmp, &format!("{prefix}:conformance")) {
                pdfa.push_str(&level);
            }
            if let Some(rev) = value(xmp, &format!("{prefix}:rev")) {
                pdfa.push(':');
                pdfa.push_str(&rev);
            }
            if !pdfa.is_empty() {
                claims.push(pdfa);
            }
        }
        for (ns, local) in [
            (NS_PDFX, "GTS_PDFXVersion"),
            (NS_PDFX_ADOBE, "GTS_PDFXVersion"),
            (NS_PDFE, "ISO_PDFEVersion"),
        ] {
            if let Some(v) = property(xmp, ns, local) {
                claims.push(v);
            }
        }
        if let Some(part) = property(xmp, NS_PDFUA, "part") {
            claims.push(format!("PDF/UA-{part}"));
        }
    }

    if let Some(preamble) = preamble {
        if let Some(pos) = preamble.find(RASTER_MARKER) {
            let version: String = preamble[pos + RASTER_MARKER.len()..].chars().take(3).collect();
            claims.push(format!("PDF/R-{version}"));
        }
    }

    if claims.is_empty() {
        None
    } else {
        Some(claims.join(";"))
    }
}

// ── Scanning ──────────────────────────────────────────────────────────────────

fn property(xmp: &str, ns_uri: &str, local: &str) -> Option<String> {
    let prefix = find_prefix(xmp, ns_uri)?;
    value(xmp, &format!("{prefix}:{local}"))
}

/// Prefix bound to `ns_uri` by an `xmlns:` declaration. Producers do not
/// agree on prefixes (`xmp:` and `xap:` both name the XMP basic schema).
fn find_prefix<'a>(xmp: &'a str, ns_uri: &str) -> Option<&'a str> {
    let mut rest = xmp;
    while let Some(pos) = rest.find("xmlns:") {
        rest = &rest[pos + "xmlns:".len()..];
        let Some(eq) = rest.find('=') else {
            break;
        };
        let prefix = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let body = &after[1..];
        if let Some(end) = body.find(quote) {
            if &body[..end] == ns_uri {
                return Some(prefix);
            }
        }
    }
    None
}

/// Attribute or element value of the qualified name `name`.
fn value(xmp: &str, name: &str) -> Option<String> {
    attribute(xmp, name).or_else(|| element(xmp, name))
}

fn attribute(xmp: &str, name: &str) -> Option<String> {
    let mut from = 0;
    while let Some(pos) = xmp[from..].find(name) {
        let start = from + pos;
        from = start + name.len();
        let preceded_by_space = xmp[..start].ends_with(|c: char| c.is_whitespace());
        let rest = xmp[from..].trim_start();
        if !preceded_by_space || !rest.starts_with('=') {
            continue;
        }
        let rest = rest[1..].trim_start();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let body = &rest[1..];
        let end = body.find(quote)?;
        let v = unescape(body[..end].trim());
        if !v.is_empty() {
            return Some(v);
        }
    }
    None
}

fn element(xmp: &str, name: &str) -> Option<String> {
    let body = element_body(xmp, name)?;
    let trimmed = body.trim();
    if trimmed.starts_with('<') {
        // rdf:Alt / rdf:Seq / rdf:Bag
        return element_body(trimmed, "rdf:li")
            .map(|li| unescape(li.trim()))
            .filter(|v| !v.is_empty());
    }
    Some(unescape(trimmed)).filter(|v| !v.is_empty())
}

/// Text between `<name ...>` and `</name>`; self-closing elements are
/// skipped.
fn element_body<'a>(xml: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let close = format!("</{name}>");
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&open) {
        let start = from + pos + open.len();
        from = start;
        let rest = &xml[start..];
        let boundary = rest.chars().next()?;
        if boundary != '>' && !boundary.is_whitespace() {
            continue;
        }
        let gt = rest.find('>')?;
        if rest[..gt].ends_with('/') {
            continue;
        }
        let body_start = start + gt + 1;
        let end = xml[body_start..].find(&close)?;
        return Some(&xml[body_start..body_start + end]);
    }
    None
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
