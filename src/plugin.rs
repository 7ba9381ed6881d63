use crate::document::PdfBackend;
use crate::{
    CompareVerdict, ExtractError, Field, FieldResult, FieldType, PdfExtractor, PluginOptions, Result,
    FIELD_FLAG_SUBST_MASK,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Field indexes at and above this value name comparisons instead of fields.
pub const COMPARE_BASE_INDEX: usize = 10000;

/// Host type tag announcing a compare-by-content index.
const COMPARE_CONTENT_TYPE: i32 = 100;

/// Description of one host field index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Host type tag, see [`FieldType::code`].
    pub type_code: i32,
    /// `|` separated unit names, empty when the field has none.
    pub units: String,
}

/// Notifications the host sends about what it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// A directory is being (re)read.
    ReadNewDir,
    /// The host finished refreshing its views.
    RefreshPressed,
    /// The host shows a tooltip.
    ShowHint,
}

// ── ContentPlugin ─────────────────────────────────────────────────────────────

/// Host-facing entry points: field catalog, value requests, comparisons and
/// lifecycle notifications, all served by one [`PdfExtractor`].
pub struct ContentPlugin {
    options: Arc<PluginOptions>,
    extractor: PdfExtractor,
    date_fields: bool,
    compare_fields: bool,
}

impl ContentPlugin {
    pub fn new(backend: Arc<dyn PdfBackend>, options: PluginOptions) -> Self {
        let options = Arc::new(options);
        let extractor = PdfExtractor::new(backend, Arc::clone(&options));
        Self {
            options,
            extractor,
            date_fields: true,
            compare_fields: true,
        }
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn extractor(&self) -> &PdfExtractor {
        &self.extractor
    }

    /// Adapt to the host's plugin interface version. Date fields need 1.2,
    /// compare indexes need 2.10.
    pub fn set_interface_version(&mut self, major: u32, minor: u32) {
        self.date_fields = (major, minor) >= (1, 2);
        self.compare_fields = (major, minor) >= (2, 10);
        debug!(
            major,
            minor,
            date_fields = self.date_fields,
            compare_fields = self.compare_fields,
            "host interface version"
        );
    }

    /// Detection string telling the host which files to hand over.
    pub fn detect_string(&self) -> &'static str {
        "EXT=\"PDF\""
    }

    /// Name, type and units of the host field `index`, or `None` once the
    /// catalog is exhausted.
    pub fn supported_field(&self, index: usize) -> Option<FieldInfo> {
        if index >= COMPARE_BASE_INDEX {
            let field = Field::from_index(index - COMPARE_BASE_INDEX)?;
            return self.compare_fields.then(|| FieldInfo {
                name: format!("Compare {}", field.name()),
                type_code: COMPARE_CONTENT_TYPE,
                units: String::new(),
            });
        }
        let field = Field::from_index(index)?;
        if !self.date_fields && field.field_type() == FieldType::DateTime {
            return None;
        }
        Some(FieldInfo {
            name: field.name().to_string(),
            type_code: field.field_type().code(),
            units: field.units().unwrap_or_default().to_string(),
        })
    }

    /// Host flags of field `index`. Index `-1` asks for the mask of every
    /// substitution flag the plugin uses.
    pub fn supported_field_flags(&self, index: i64) -> i32 {
        if index == -1 {
            return FIELD_FLAG_SUBST_MASK;
        }
        usize::try_from(index)
            .ok()
            .and_then(Field::from_index)
            .map_or(0, Field::flags)
    }

    /// Resolve a host index to a catalog field.
    pub fn field(&self, index: usize) -> Result<Field> {
        Field::from_index(index).ok_or(ExtractError::UnsupportedField(index))
    }

    /// Value of field `index` of the document at `path`.
    ///
    /// An index outside the catalog stops the running extraction and answers
    /// [`FieldResult::NoMoreFields`].
    pub fn get_value<P: AsRef<Path>>(
        &mut self,
        path: P,
        index: usize,
        unit: i32,
        dest: &mut [u16],
        flags: u32,
    ) -> FieldResult {
        match self.field(index) {
            Ok(field) => self.extractor.extract(path, field, unit, dest, flags),
            Err(e) => {
                debug!(error = %e, "stopping extraction");
                self.extractor.stop();
                FieldResult::NoMoreFields
            }
        }
    }

    /// Compare field `compare_index` (counted from [`COMPARE_BASE_INDEX`])
    /// of two documents.
    pub fn compare_files<F>(&mut self, progress: F, compare_index: usize, path1: &Path, path2: &Path) -> CompareVerdict
    where
        F: FnMut(usize) -> bool,
    {
        if !self.compare_fields {
            return CompareVerdict::Unsupported;
        }
        let Some(field) = compare_index
            .checked_sub(COMPARE_BASE_INDEX)
            .and_then(Field::from_index)
        else {
            return CompareVerdict::Unsupported;
        };
        self.extractor.compare(progress, path1, path2, field)
    }

    pub fn state_changed(&self, state: HostState) {
        if state == HostState::ReadNewDir {
            self.extractor.stop();
        }
    }

    /// The host gave up waiting for a value.
    pub fn stop_get_value(&self) {
        self.extractor.stop();
    }

    /// The host is about to unload the plugin.
    pub fn unloading(&self) {
        self.extractor.abort();
    }
}

impl std::fmt::Debug for ContentPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentPlugin")
            .field("extractor", &self.extractor)
            .field("date_fields", &self.date_fields)
            .field("compare_fields", &self.compare_fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LopdfBackend;

    fn plugin() -> ContentPlugin {
        ContentPlugin::new(Arc::new(LopdfBackend), PluginOptions::default())
    }

    #[test]
    fn catalog_ends_after_last_field() {
        let plugin = plugin();
        let first = plugin.supported_field(0).unwrap();
        assert_eq!(first.name, "Title");
        assert_eq!(first.type_code, FieldType::StringW.code());
        assert!(plugin.supported_field(Field::COUNT - 1).is_some());
        assert!(plugin.supported_field(Field::COUNT).is_none());
    }

    #[test]
    fn page_sizes_announce_units() {
        let plugin = plugin();
        let width = plugin.supported_field(Field::PageWidth.index()).unwrap();
        assert_eq!(width.units, "mm|cm|in|pt");
    }

    #[test]
    fn compare_indexes_follow_host_version() {
        let mut plugin = plugin();
        let info = plugin.supported_field(COMPARE_BASE_INDEX + 1).unwrap();
        assert_eq!(info.name, "Compare Subject");
        assert!(plugin.supported_field(COMPARE_BASE_INDEX + Field::COUNT).is_none());

        plugin.set_interface_version(2, 0);
        assert!(plugin.supported_field(COMPARE_BASE_INDEX).is_none());
        assert_eq!(
            plugin.compare_files(|_| false, COMPARE_BASE_INDEX, Path::new("a.pdf"), Path::new("b.pdf")),
            CompareVerdict::Unsupported
        );
    }

    #[test]
    fn old_hosts_get_no_date_fields() {
        let mut plugin = plugin();
        plugin.set_interface_version(1, 1);
        assert!(plugin.supported_field(Field::CreationDate.index()).is_none());
        assert!(plugin.supported_field(Field::CreationDateRaw.index()).is_some());
    }

    #[test]
    fn out_of_range_index_reports_no_more_fields() {
        let mut plugin = plugin();
        let mut buf = [0u16; 16];
        assert_eq!(
            plugin.get_value("missing.pdf", Field::COUNT + 3, 0, &mut buf, 0),
            FieldResult::NoMoreFields
        );
        assert_eq!(
            plugin.get_value("missing.pdf", 0, 0, &mut buf, crate::DELAY_IF_SLOW),
            FieldResult::Delayed
        );
    }

    #[test]
    fn attributes_string_substitutes_host_attributes() {
        let plugin = plugin();
        assert_eq!(plugin.supported_field_flags(-1), FIELD_FLAG_SUBST_MASK);
        assert_eq!(
            plugin.supported_field_flags(Field::AttributesString.index() as i64),
            crate::FIELD_FLAG_SUBST_ATTRIBUTE_STR
        );
        assert_eq!(plugin.supported_field_flags(Field::Title.index() as i64), 0);
        assert_eq!(plugin.supported_field_flags(Field::COUNT as i64), 0);
        assert_eq!(plugin.supported_field_flags(-7), 0);
        assert_eq!(plugin.detect_string(), "EXT=\"PDF\"");
    }

    #[test]
    fn invalid_compare_index_is_unsupported() {
        let mut plugin = plugin();
        assert_eq!(
            plugin.compare_files(|_| false, 5, Path::new("a.pdf"), Path::new("b.pdf")),
            CompareVerdict::Unsupported
        );
    }
}
