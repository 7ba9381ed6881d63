use chrono::{DateTime, Utc};

/// Request flag: the host calls from its foreground thread and wants an
/// immediate answer instead of waiting for a slow extraction.
pub const DELAY_IF_SLOW: u32 = 1;

/// What kind of payload the request currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultTag {
    /// Nothing has been produced (yet), or the value is absent.
    #[default]
    Empty,
    /// The document could not be opened or read.
    Error,
    /// UTF-16 text in the buffer, delivered in one response.
    String,
    /// UTF-16 text in the buffer, one chunk of a streaming field.
    FullText,
    Int32,
    Boolean,
    Double,
    DateTime,
}

/// Non-text payload of a request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Scalar {
    #[default]
    None,
    Int(i32),
    Bool(bool),
    Double(f64),
    DateTime(DateTime<Utc>),
}

/// Outcome of one [`crate::PdfExtractor::extract`] call.
///
/// Text results carry the number of UTF-16 units written to the caller's
/// buffer; the buffer is always NUL-terminated after them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldResult {
    /// Field index beyond the catalog.
    NoMoreFields,
    /// The field exists but cannot be served this way (e.g. a streaming
    /// field without an output buffer).
    NoSuchField,
    /// The document could not be opened or parsed.
    FileError,
    /// The value is absent, or a streaming field has no more data.
    FieldEmpty,
    /// The caller asked not to block and the extraction would.
    Delayed,
    /// The worker did not answer in time. Nothing was torn down, a later
    /// call may still pick the value up.
    Timeout,
    /// The in-flight extraction was deliberately stopped.
    Cancelled,
    Int32(i32),
    Boolean(bool),
    Double(f64),
    DateTime(DateTime<Utc>),
    String(usize),
    FullText(usize),
}

impl FieldResult {
    /// Host result code.
    pub fn code(&self) -> i32 {
        match self {
            FieldResult::NoMoreFields => 0,
            FieldResult::Delayed => 0,
            FieldResult::NoSuchField => -1,
            FieldResult::FileError => -2,
            // the host has no separate code for these, an empty field makes
            // it ask again later
            FieldResult::FieldEmpty | FieldResult::Timeout | FieldResult::Cancelled => -3,
            FieldResult::Int32(_) => 1,
            FieldResult::Double(_) => 3,
            FieldResult::Boolean(_) => 6,
            FieldResult::DateTime(_) => 10,
            FieldResult::String(_) => 11,
            FieldResult::FullText(_) => 12,
        }
    }
}

/// Outcome of comparing one field of two documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareVerdict {
    NotEqual,
    /// Binary identical.
    Equal,
    /// Equal only after whitespace removal and case folding.
    EqualAsText,
    /// At least one document could not be read.
    Error,
    /// Stopped by the progress callback or a timeout.
    Aborted,
    /// This field cannot be compared, the host should try something else.
    Unsupported,
}

impl CompareVerdict {
    /// Host compare code.
    pub fn code(self) -> i32 {
        match self {
            CompareVerdict::EqualAsText => 2,
            CompareVerdict::Equal => 1,
            CompareVerdict::NotEqual => 0,
            CompareVerdict::Error => -1,
            CompareVerdict::Aborted => -2,
            CompareVerdict::Unsupported => -3,
        }
    }

    pub fn is_equal(self) -> bool {
        matches!(self, CompareVerdict::Equal | CompareVerdict::EqualAsText)
    }
}
