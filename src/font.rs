use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

#[cfg(target_os = "macos")]
fn fallback_families() -> &'static [&'static str] {
    &["Geeza Pro", "Arial Unicode MS"]
}

#[cfg(target_os = "windows")]
fn fallback_families() -> &'static [&'static str] {
    &["Segoe UI", "Arial"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn fallback_families() -> &'static [&'static str] {
    &["Noto Sans Arabic", "Noto Sans", "DejaVu Sans"]
}

/// The font database used for every card of a renderer, plus the family names
/// written into the SVG.
#[derive(Clone)]
pub struct FontBook {
    db: Arc<fontdb::Database>,
    family: String,
}

impl FontBook {
    /// Loads system fonts and, when given, one font file.
    ///
    /// The family comes from the font file if present, otherwise from the
    /// configured name, otherwise the first installed fallback. When nothing
    /// matches the configured name is still used and `sans-serif` follows it
    /// in the SVG.
    pub fn load(font_path: Option<&Path>, family: &str) -> Result<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let family = if let Some(path) = font_path {
            let data = std::fs::read(path)
                .with_context(|| format!("failed to read font: {}", path.display()))?;
            let found = family_from_data(&data)
                .with_context(|| format!("failed to parse font: {}", path.display()))?;
            db.load_font_data(data);
            debug!("loaded card font '{}' from {}", found, path.display());
            found
        } else {
            resolve_installed_family(&db, family)
        };

        Ok(Self {
            db: Arc::new(db),
            family,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn face_count(&self) -> usize {
        self.db.len()
    }

    /// Value for an SVG `font-family` attribute.
    pub(crate) fn font_family_attr(&self) -> String {
        format!("'{}', sans-serif", self.family.replace('\'', ""))
    }

    pub(crate) fn database(&self) -> Arc<fontdb::Database> {
        Arc::clone(&self.db)
    }

    #[cfg(test)]
    pub(crate) fn with_family(family: &str) -> Self {
        Self {
            db: Arc::new(fontdb::Database::new()),
            family: family.to_string(),
        }
    }
}

fn resolve_installed_family(db: &fontdb::Database, family: &str) -> String {
    if has_family(db, fontdb::Family::Name(family)) {
        return family.to_string();
    }
    for &candidate in fallback_families() {
        if has_family(db, fontdb::Family::Name(candidate)) {
            warn!("font '{}' not installed; using '{}'", family, candidate);
            return candidate.to_string();
        }
    }
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    if let Some(name) = db
        .query(&query)
        .and_then(|id| db.face(id))
        .and_then(|face| face.families.first())
        .map(|(name, _)| name.clone())
    {
        warn!("font '{}' not installed; using '{}'", family, name);
        return name;
    }
    warn!("no fonts available; card text will not be visible");
    family.to_string()
}

fn has_family(db: &fontdb::Database, family: fontdb::Family<'_>) -> bool {
    let query = fontdb::Query {
        families: &[family],
        weight: fontdb::Weight::BOLD,
        ..Default::default()
    };
    db.query(&query).is_some()
}

fn family_from_data(data: &[u8]) -> Result<String> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            if let Some(family) = extract_family_name(&face) {
                return Ok(family);
            }
        }
    }
    anyhow::bail!("no named font face found")
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.ttf");
        let err = FontBook::load(Some(&path), "Cairo").err().expect("error");
        assert!(err.to_string().contains("failed to read font"));
    }

    #[test]
    fn corrupt_font_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").expect("write");
        let err = FontBook::load(Some(&path), "Cairo").err().expect("error");
        assert!(err.to_string().contains("failed to parse font"));
    }

    #[test]
    fn system_lookup_always_yields_a_family() {
        let book = FontBook::load(None, "Cairo").expect("font book");
        assert!(!book.family().is_empty());
        assert!(book.font_family_attr().ends_with(", sans-serif"));
    }

    #[test]
    fn quotes_are_stripped_from_svg_family() {
        let book = FontBook::with_family("O'Brien Sans");
        assert_eq!(book.font_family_attr(), "'OBrien Sans', sans-serif");
        assert_eq!(book.face_count(), 0);
    }
}
