// ── Field catalog ─────────────────────────────────────────────────────────────

/// Host flag: the field can stand in for the file attribute string.
pub const FIELD_FLAG_SUBST_ATTRIBUTE_STR: i32 = 12;

/// Host flag mask covering every substitution flag.
pub const FIELD_FLAG_SUBST_MASK: i32 = 14;

/// Every attribute the extractor can read from a document, in host index
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Subject,
    Keywords,
    Author,
    Creator,
    Producer,
    DocStart,
    FirstRow,
    Extensions,
    NumberOfPages,
    NumberOfFontlessPages,
    NumberOfPagesWithImages,
    PdfVersion,
    PageWidth,
    PageHeight,
    Copyable,
    Printable,
    Commentable,
    Changeable,
    Encrypted,
    Tagged,
    Linearized,
    Incremental,
    Signed,
    Outlined,
    EmbeddedFiles,
    Protected,
    CreationDate,
    ModifiedDate,
    MetadataDate,
    Id,
    AttributesString,
    Conformance,
    CreationDateRaw,
    ModifiedDateRaw,
    MetadataDateRaw,
    Outlines,
    Text,
}

/// How a field's value travels from the worker to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Computed once, always fits in one response.
    Scalar,
    /// Text collected until the buffer is full (or the first line ends),
    /// then the request completes.
    OneShotText,
    /// Text handed out chunk by chunk across continuation requests.
    Streaming,
}

/// Value type announced to the host for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Numeric32,
    NumericFloating,
    Boolean,
    StringW,
    FullText,
    DateTime,
}

impl FieldType {
    /// Host type tag.
    pub fn code(self) -> i32 {
        match self {
            FieldType::Numeric32 => 1,
            FieldType::NumericFloating => 3,
            FieldType::Boolean => 6,
            FieldType::FullText => 9,
            FieldType::DateTime => 10,
            FieldType::StringW => 11,
        }
    }
}

/// Units for the page size fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Millimeters,
    Centimeters,
    Inches,
    Points,
}

impl SizeUnit {
    /// Host unit choices, `|` separated, in unit index order.
    pub const CHOICES: &'static str = "mm|cm|in|pt";

    pub fn from_index(unit: i32) -> Option<Self> {
        match unit {
            0 => Some(SizeUnit::Millimeters),
            1 => Some(SizeUnit::Centimeters),
            2 => Some(SizeUnit::Inches),
            3 => Some(SizeUnit::Points),
            _ => None,
        }
    }

    /// Factor converting PDF points to this unit.
    pub fn per_point(self) -> f64 {
        match self {
            SizeUnit::Millimeters => 0.3528,
            SizeUnit::Centimeters => 0.03528,
            SizeUnit::Inches => 0.0139,
            SizeUnit::Points => 1.0,
        }
    }
}

const ALL_FIELDS: [Field; 38] = [
    Field::Title,
    Field::Subject,
    Field::Keywords,
    Field::Author,
    Field::Creator,
    Field::Producer,
    Field::DocStart,
    Field::FirstRow,
    Field::Extensions,
    Field::NumberOfPages,
    Field::NumberOfFontlessPages,
    Field::NumberOfPagesWithImages,
    Field::PdfVersion,
    Field::PageWidth,
    Field::PageHeight,
    Field::Copyable,
    Field::Printable,
    Field::Commentable,
    Field::Changeable,
    Field::Encrypted,
    Field::Tagged,
    Field::Linearized,
    Field::Incremental,
    Field::Signed,
    Field::Outlined,
    Field::EmbeddedFiles,
    Field::Protected,
    Field::CreationDate,
    Field::ModifiedDate,
    Field::MetadataDate,
    Field::Id,
    Field::AttributesString,
    Field::Conformance,
    Field::CreationDateRaw,
    Field::ModifiedDateRaw,
    Field::MetadataDateRaw,
    Field::Outlines,
    Field::Text,
];

impl Field {
    /// Number of fields in the catalog.
    pub const COUNT: usize = ALL_FIELDS.len();

    /// All fields in host index order.
    pub fn all() -> &'static [Field] {
        &ALL_FIELDS
    }

    pub fn from_index(index: usize) -> Option<Self> {
        ALL_FIELDS.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Look a field up by its display name or its variant name,
    /// ignoring case and spaces.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect();
        ALL_FIELDS.iter().copied().find(|f| {
            let display: String = f.name().chars().filter(|c| !c.is_whitespace()).collect();
            display.eq_ignore_ascii_case(&wanted) || format!("{f:?}").eq_ignore_ascii_case(&wanted)
        })
    }

    /// Display name announced to the host.
    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Subject => "Subject",
            Field::Keywords => "Keywords",
            Field::Author => "Author",
            Field::Creator => "Application",
            Field::Producer => "PDF Producer",
            Field::DocStart => "Document Start",
            Field::FirstRow => "First Row",
            Field::Extensions => "Extensions",
            Field::NumberOfPages => "Number Of Pages",
            Field::NumberOfFontlessPages => "Number Of Fontless Pages",
            Field::NumberOfPagesWithImages => "Number Of Pages With Images",
            Field::PdfVersion => "PDF Version",
            Field::PageWidth => "Page Width",
            Field::PageHeight => "Page Height",
            Field::Copyable => "Copying Allowed",
            Field::Printable => "Printing Allowed",
            Field::Commentable => "Adding Comments Allowed",
            Field::Changeable => "Changing Allowed",
            Field::Encrypted => "Encrypted",
            Field::Tagged => "Tagged",
            Field::Linearized => "Linearized",
            Field::Incremental => "Incremental",
            Field::Signed => "Signature Field",
            Field::Outlined => "Outlined",
            Field::EmbeddedFiles => "Embedded Files",
            Field::Protected => "Protected",
            Field::CreationDate => "Created",
            Field::ModifiedDate => "Modified",
            Field::MetadataDate => "Metadata Date",
            Field::Id => "ID",
            Field::AttributesString => "PDF Attributes",
            Field::Conformance => "Conformance",
            Field::CreationDateRaw => "Created Raw",
            Field::ModifiedDateRaw => "Modified Raw",
            Field::MetadataDateRaw => "Metadata Date Raw",
            Field::Outlines => "Outlines",
            Field::Text => "Text",
        }
    }

    pub fn field_type(self) -> FieldType {
        match self {
            Field::NumberOfPages | Field::NumberOfFontlessPages | Field::NumberOfPagesWithImages => {
                FieldType::Numeric32
            }
            Field::PdfVersion | Field::PageWidth | Field::PageHeight => FieldType::NumericFloating,
            Field::Copyable
            | Field::Printable
            | Field::Commentable
            | Field::Changeable
            | Field::Encrypted
            | Field::Tagged
            | Field::Linearized
            | Field::Incremental
            | Field::Signed
            | Field::Outlined
            | Field::EmbeddedFiles
            | Field::Protected => FieldType::Boolean,
            Field::CreationDate | Field::ModifiedDate | Field::MetadataDate => FieldType::DateTime,
            Field::Outlines | Field::Text => FieldType::FullText,
            _ => FieldType::StringW,
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Text | Field::Outlines => FieldKind::Streaming,
            Field::DocStart | Field::FirstRow => FieldKind::OneShotText,
            _ => FieldKind::Scalar,
        }
    }

    pub fn is_streaming(self) -> bool {
        self.kind() == FieldKind::Streaming
    }

    /// Unit choices for the host, if the field has any.
    pub fn units(self) -> Option<&'static str> {
        match self {
            Field::PageWidth | Field::PageHeight => Some(SizeUnit::CHOICES),
            _ => None,
        }
    }

    /// Host field flags. The attributes string is offered to the host as a
    /// substitute for its own attribute column.
    pub fn flags(self) -> i32 {
        match self {
            Field::AttributesString => FIELD_FLAG_SUBST_ATTRIBUTE_STR,
            _ => 0,
        }
    }

    /// Document information dictionary key read by the metadata string
    /// and date fields.
    pub(crate) fn info_key(self) -> Option<&'static str> {
        match self {
            Field::Title => Some("Title"),
            Field::Subject => Some("Subject"),
            Field::Keywords => Some("Keywords"),
            Field::Author => Some("Author"),
            Field::Creator => Some("Creator"),
            Field::Producer => Some("Producer"),
            Field::CreationDate | Field::CreationDateRaw => Some("CreationDate"),
            Field::ModifiedDate | Field::ModifiedDateRaw => Some("ModDate"),
            Field::MetadataDate | Field::MetadataDateRaw => Some("MetadataDate"),
            _ => None,
        }
    }
}
