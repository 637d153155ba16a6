//! Manifest-based narrowing of the object set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::ObjectInfo;

/// One manifest row: a data file and its optional index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub file_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file_uuid: Option<String>,
}

impl ManifestEntry {
    pub fn new(file_uuid: impl Into<String>) -> Self {
        Self {
            file_uuid: file_uuid.into(),
            index_file_uuid: None,
        }
    }

    /// Attach an index file.
    pub fn with_index(mut self, index_file_uuid: impl Into<String>) -> Self {
        self.index_file_uuid = Some(index_file_uuid.into());
        self
    }

    /// Object ids referenced by this entry.
    pub fn object_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.file_uuid.as_str())
            .chain(self.index_file_uuid.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// A user-supplied list of files of interest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }
}

/// Retains only the objects a manifest references.
///
/// Without a manifest the filter is the identity.
#[derive(Debug, Clone)]
pub struct ManifestFilter {
    ids: Option<HashSet<String>>,
}

impl ManifestFilter {
    pub fn new(manifest: Option<&Manifest>) -> Self {
        let ids: Option<HashSet<String>> = manifest.map(|m| {
            m.entries
                .iter()
                .flat_map(ManifestEntry::object_ids)
                .map(str::to_string)
                .collect()
        });
        Self { ids }
    }

    /// True when no manifest was supplied.
    pub fn is_identity(&self) -> bool {
        self.ids.is_none()
    }

    /// Keep the referenced objects, in their original order.
    pub fn apply(&self, objects: Vec<ObjectInfo>) -> Vec<ObjectInfo> {
        let Some(ids) = &self.ids else {
            return objects;
        };

        let before: usize = objects.len();
        let kept: Vec<ObjectInfo> = objects
            .into_iter()
            .filter(|o| ids.contains(&o.id))
            .collect();

        let missing: usize = ids.len().saturating_sub(kept.len());
        debug!(
            "Manifest kept {} of {} objects ({} referenced ids not indexed)",
            kept.len(),
            before,
            missing
        );
        kept
    }

    /// Referenced ids absent from `objects`, sorted.
    pub fn missing_ids(&self, objects: &[ObjectInfo]) -> Vec<String> {
        let Some(ids) = &self.ids else {
            return Vec::new();
        };
        let present: HashSet<&str> = objects.iter().map(|o| o.id.as_str()).collect();
        let mut missing: Vec<String> = ids
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

/// Filter `objects` by an optional manifest.
pub fn filter_objects(objects: Vec<ObjectInfo>, manifest: Option<&Manifest>) -> Vec<ObjectInfo> {
    ManifestFilter::new(manifest).apply(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(ids: &[&str]) -> Vec<ObjectInfo> {
        ids.iter().map(|id| ObjectInfo::new(*id, 10, 0)).collect()
    }

    fn ids(objects: &[ObjectInfo]) -> Vec<&str> {
        objects.iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_manifest_narrows_objects() {
        let manifest = Manifest::new(vec![ManifestEntry::new("A"), ManifestEntry::new("B")]);
        let filtered = filter_objects(objects(&["A", "B", "C"]), Some(&manifest));
        assert_eq!(ids(&filtered), vec!["A", "B"]);
    }

    #[test]
    fn test_no_manifest_is_identity() {
        let filter = ManifestFilter::new(None);
        assert!(filter.is_identity());
        let filtered = filter.apply(objects(&["C", "A"]));
        assert_eq!(ids(&filtered), vec!["C", "A"]);
    }

    #[test]
    fn test_index_files_are_included() {
        let manifest = Manifest::new(vec![ManifestEntry::new("bam").with_index("bai")]);
        let filtered = filter_objects(objects(&["bai", "bam", "vcf"]), Some(&manifest));
        assert_eq!(ids(&filtered), vec!["bai", "bam"]);
    }

    #[test]
    fn test_unknown_ids_are_ignored_but_reported() {
        let manifest = Manifest::new(vec![ManifestEntry::new("A"), ManifestEntry::new("Z")]);
        let filter = ManifestFilter::new(Some(&manifest));
        let all = objects(&["A", "B"]);

        assert_eq!(ids(&filter.apply(all.clone())), vec!["A"]);
        assert_eq!(filter.missing_ids(&all), vec!["Z".to_string()]);
    }

    #[test]
    fn test_empty_ids_are_skipped() {
        let manifest = Manifest::new(vec![ManifestEntry::new("A").with_index("")]);
        let filter = ManifestFilter::new(Some(&manifest));
        assert!(filter.missing_ids(&objects(&["A"])).is_empty());
    }

    #[test]
    fn test_filter_is_idempotent_subset() {
        let manifest = Manifest::new(vec![
            ManifestEntry::new("B").with_index("D"),
            ManifestEntry::new("Q"),
        ]);
        let all = objects(&["A", "B", "C", "D", "E"]);

        let once = filter_objects(all.clone(), Some(&manifest));
        let twice = filter_objects(once.clone(), Some(&manifest));

        assert_eq!(once, twice);
        assert!(once.iter().all(|o| all.contains(o)));
    }

    #[test]
    fn test_manifest_entry_json() {
        let json: &str = r#"{"fileUuid":"A","indexFileUuid":"B"}"#;
        let entry: ManifestEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry, ManifestEntry::new("A").with_index("B"));
    }
}
