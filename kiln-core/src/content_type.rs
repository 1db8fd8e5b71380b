//! Extension to content-type resolution for uploaded artifacts.

use std::collections::BTreeMap;
use std::path::Path;

/// Content type used for extensions missing from the table.
pub const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

const DEFAULT_TABLE: &[(&str, &str)] = &[
    ("js", "application/javascript"),
    ("css", "text/css"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("jpg", "image/jpg"),
    ("png", "image/png"),
    ("json", "application/javascript"),
    ("map", "application/javascript"),
    ("html", "text/html"),
    ("zip", "application/zip"),
];

/// Fixed extension → MIME type mapping.
///
/// Lookup is case-insensitive on the extension. Files without an extension
/// or with an unknown one resolve to [`GENERIC_CONTENT_TYPE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeTable {
    types: BTreeMap<String, String>,
}

impl Default for ContentTypeTable {
    fn default() -> Self {
        Self {
            types: DEFAULT_TABLE
                .iter()
                .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
                .collect(),
        }
    }
}

impl ContentTypeTable {
    /// Creates a table from the defaults with `overrides` applied on top.
    pub fn with_overrides<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = Self::default();
        for (ext, mime) in overrides {
            let ext = ext.as_ref().trim_start_matches('.').to_lowercase();
            table.types.insert(ext, mime.into());
        }
        table
    }

    /// Resolves the content type for a file path.
    pub fn resolve(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.types.get(&ext.to_lowercase()))
            .map(String::as_str)
            .unwrap_or(GENERIC_CONTENT_TYPE)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
