//! Catalog configuration: parsing, normalization, and loading.
//!
//! The TOML catalog describes what teachers have published:
//! - Courses keyed by slug (`[courses.<slug>]`) with title, teacher, and a
//!   `published` flag
//! - Ordered chapters per course (`[[courses.<slug>.chapters]]`)
//! - Ordered lessons per chapter with an optional nominal duration
//!
//! Positions are implicit: the n-th chapter of a course is position n, and
//! likewise for lessons inside a chapter. Reordering the TOML therefore moves
//! titles between stored positions rather than renumbering rows.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_catalog_str`]
//! - Parse + normalize from a file path: [`load_catalog_path`]
//! - Normalization of an already parsed catalog: [`normalize_catalog`]

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use toml::from_str;
use tracing::debug;

/// Top-level catalog mapping course slugs to their configuration.
///
/// Keys are normalized to trimmed lowercase (e.g., " Rust-101" -> "rust-101").
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Map of course slug -> configuration, in file order.
    pub courses: IndexMap<String, CourseCfg>,
}

/// One course.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourseCfg {
    /// Display title.
    pub title: String,
    /// Teacher display name.
    pub teacher: String,
    /// Visible in the marketplace; defaults to false.
    #[serde(default)]
    pub published: bool,
    /// Chapters in presentation order.
    #[serde(default)]
    pub chapters: Vec<ChapterCfg>,
}

/// One chapter; its position is its index in [`CourseCfg::chapters`] plus one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChapterCfg {
    /// Display title.
    pub title: String,
    /// Lessons in presentation order.
    #[serde(default)]
    pub lessons: Vec<LessonCfg>,
}

/// One lesson; its position is its index in [`ChapterCfg::lessons`] plus one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LessonCfg {
    /// Display title.
    pub title: String,
    /// Nominal length in seconds; 0 when omitted.
    pub duration_seconds: Option<i64>,
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Number of course slugs that changed when lowercasing/trimming.
    pub slugs_renamed: usize,
    /// Number of titles (course, chapter, lesson) that had surrounding whitespace.
    pub titles_trimmed: usize,
}

fn trim_title(
    title: &mut String,
    what: &str,
    report: &mut NormalizationReport,
) -> anyhow::Result<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        bail!("{what} title cannot be empty after trimming");
    }
    if trimmed.len() != title.len() {
        report.titles_trimmed += 1;
        *title = trimmed.to_string();
    }
    Ok(())
}

/// Normalize a catalog in place.
///
/// - Lowercase + trim course slugs; reject empty slugs and duplicates after
///   normalization
/// - Trim course, chapter, and lesson titles; reject empty ones
/// - Trim teacher names
/// - Reject negative lesson durations
///
/// Errors carry the position of the offending entry in the file.
pub fn normalize_catalog(cat: &mut Catalog) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();
    let mut rebuilt: IndexMap<String, CourseCfg> = IndexMap::with_capacity(cat.courses.len());

    for (raw_slug, mut cfg) in std::mem::take(&mut cat.courses) {
        let slug = raw_slug.trim().to_lowercase();
        if slug.is_empty() {
            bail!("course slug cannot be empty after trimming");
        }
        if slug != raw_slug {
            report.slugs_renamed += 1;
        }
        if rebuilt.contains_key(&slug) {
            bail!("duplicate course slug after normalization: {slug}");
        }

        trim_title(&mut cfg.title, "course", &mut report)
            .with_context(|| format!("course {slug}"))?;
        cfg.teacher = cfg.teacher.trim().to_string();

        for (ci, chapter) in cfg.chapters.iter_mut().enumerate() {
            trim_title(&mut chapter.title, "chapter", &mut report)
                .with_context(|| format!("course {slug}, chapter {}", ci + 1))?;
            for (li, lesson) in chapter.lessons.iter_mut().enumerate() {
                trim_title(&mut lesson.title, "lesson", &mut report).with_context(|| {
                    format!("course {slug}, chapter {}, lesson {}", ci + 1, li + 1)
                })?;
                if let Some(d) = lesson.duration_seconds.filter(|d| *d < 0) {
                    bail!(
                        "course {slug}, chapter {}, lesson {}: duration_seconds must be non-negative, got {d}",
                        ci + 1,
                        li + 1
                    );
                }
            }
        }

        rebuilt.insert(slug, cfg);
    }

    cat.courses = rebuilt;
    Ok(report)
}

/// Parse and normalize a catalog from a TOML string.
///
/// Errors:
/// - TOML parse failures (including unknown keys)
/// - Normalization errors (see [`normalize_catalog`])
pub fn load_catalog_str(toml_str: &str) -> anyhow::Result<Catalog> {
    let mut cat: Catalog = from_str(toml_str).context("failed to parse catalog TOML")?;
    let report = normalize_catalog(&mut cat).context("normalize_catalog failed")?;
    debug!(?report, courses = cat.courses.len(), "catalog normalized");
    Ok(cat)
}

/// Read a catalog TOML file from disk, parse, and normalize it.
pub fn load_catalog_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Catalog> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read catalog file {}", path.as_ref().display()))?;
    load_catalog_str(&text)
}
