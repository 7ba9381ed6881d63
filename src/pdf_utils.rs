//! Shared lopdf helpers used by the document backend.

use lopdf::{Dictionary, Document, Object};

/// Follow an indirect reference; anything else is returned as is.
///
/// A dangling reference resolves to the reference object itself, which
/// fails every subsequent `as_*` conversion.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Look `key` up in `dict` and resolve the value.
pub(crate) fn lookup<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|v| resolve(doc, v))
}

/// Look `key` up in `dict` and resolve it to a dictionary.
///
/// Stream values yield their stream dictionary.
pub(crate) fn lookup_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    match lookup(doc, dict, key)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

/// Integer or real value as `f64`.
pub(crate) fn as_number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Extract a text string value from a PDF dictionary for a given key.
///
/// Returns `Some(String)` if the key exists and contains a non-empty string,
/// `None` otherwise.
pub(crate) fn text_from_dict(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    lookup(doc, dict, key)
        .and_then(|v| v.as_str().ok())
        .map(decode_text_string)
        .filter(|s| !s.is_empty())
}

/// Decode a PDF text string.
///
/// Strings starting with a UTF-16BE or UTF-8 byte order mark are decoded
/// accordingly; everything else is treated as PDFDocEncoding, which agrees
/// with Latin-1 for the printable range.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode raw bytes as a lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
