use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of a remote entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    File,
    Collection,
}

/// One remote entry discovered by a PROPFIND listing.
///
/// Collections always carry `size == 0` and the sentinel modification date;
/// build values through [`Resource::file`] and [`Resource::collection`] so
/// that holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    /// Absolute URL, host prefix included
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub size: u64,
    #[serde(rename = "lastmodified")]
    pub modified: NaiveDate,
}

impl Resource {
    pub fn file(path: impl Into<String>, size: u64, modified: NaiveDate) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::File,
            size,
            modified,
        }
    }

    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ResourceKind::Collection,
            size: 0,
            modified: collection_sentinel_date(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_collection(&self) -> bool {
        self.kind == ResourceKind::Collection
    }
}

/// Modification date recorded for every collection
pub fn collection_sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_invariant() {
        let dir = Resource::collection("https://cloud.example.com/dav/docs/");
        assert!(dir.is_collection());
        assert_eq!(dir.size, 0);
        assert_eq!(dir.modified, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }

    #[test]
    fn test_serialized_field_names() {
        let file = Resource::file(
            "https://cloud.example.com/dav/docs/a.txt",
            500,
            NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
        );
        let value = serde_json::to_value(&file).unwrap();

        assert_eq!(value["path"], "https://cloud.example.com/dav/docs/a.txt");
        assert_eq!(value["type"], "file");
        assert_eq!(value["size"], 500);
        assert_eq!(value["lastmodified"], "2021-01-01");
    }

    #[test]
    fn test_deserializes_collection_type() {
        let json = r#"{"path":"https://h/dav/x/","type":"collection","size":0,"lastmodified":"2000-01-01"}"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.kind, ResourceKind::Collection);
        assert_eq!(resource, Resource::collection("https://h/dav/x/"));
    }
}
