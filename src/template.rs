//! Gitignore templates and the filter that recognizes them

use serde::Serialize;

use crate::provider::TreeEntry;

/// File suffix that marks a template
pub const SUFFIX: &str = ".gitignore";

/// A gitignore template discovered in the repository tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    /// File name with the suffix stripped (`Python` for `Python.gitignore`)
    pub name: String,
    pub size: u64,
    /// Path from the crawl root
    pub path: String,
    /// Ancestor directories, innermost first
    pub tags: Vec<String>,
    pub sha: String,
}

/// Display name for `path`, or `None` if it is not a template
///
/// Only the last path segment is considered. A bare suffix with no stem is
/// not a template.
pub fn template_name<'a>(path: &'a str, suffix: &str) -> Option<&'a str> {
    let basename = path.rsplit('/').next().unwrap_or(path);
    match basename.strip_suffix(suffix) {
        Some(name) if !name.is_empty() => Some(name),
        _ => None,
    }
}

impl Template {
    /// Build a template from a leaf entry, if it qualifies
    pub fn from_entry(entry: &TreeEntry) -> Option<Self> {
        let name = template_name(&entry.path, SUFFIX)?;
        Some(Self {
            name: name.to_string(),
            size: entry.size.unwrap_or(0),
            path: entry.path.clone(),
            tags: Vec::new(),
            sha: entry.sha.clone(),
        })
    }

    /// Re-root this template under directory `segment`
    pub fn nest_under(mut self, segment: &str) -> Self {
        self.path = format!("{}/{}", segment, self.path);
        self.tags.push(segment.to_string());
        self
    }

    /// Case-insensitive substring match on name or path
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query) || self.path.to_lowercase().contains(&query)
    }

    /// Case-insensitive equality with the name or with the path
    ///
    /// A path may be given with or without the suffix, so `Global/macOS`
    /// selects `Global/macOS.gitignore`.
    pub fn is_named(&self, name: &str) -> bool {
        if self.name.eq_ignore_ascii_case(name) || self.path.eq_ignore_ascii_case(name) {
            return true;
        }
        self.path
            .strip_suffix(SUFFIX)
            .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
    }
}
