//! Catalog wire records: init and track patches
//!
//! Each record is one JSON document; the transport delimits records. Record
//! one of a stream is a [`CatalogInit`], every later record a patch batch
//! (`Vec<TrackPatch>`). Patch paths address tracks as `/tracks/{name}`.

use serde::{Deserialize, Serialize};

use super::descriptor::TrackDescriptor;

/// Catalog version written when none is configured
pub const DEFAULT_CATALOG_VERSION: &str = "v1";

const TRACKS_PATH_PREFIX: &str = "/tracks/";

/// First record of every catalog stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInit {
    /// Version string; readers compare for exact equality
    pub version: String,

    /// Human-readable description of the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One change to the catalog's track set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TrackPatch {
    /// A track joined the catalog
    Add {
        path: String,
        value: TrackDescriptor,
    },
    /// A track left the catalog
    Remove { path: String },
    /// A track's descriptor changed
    Replace {
        path: String,
        value: TrackDescriptor,
    },
}

impl TrackPatch {
    /// Add patch for a descriptor
    pub fn add(value: TrackDescriptor) -> Self {
        TrackPatch::Add {
            path: track_path(&value.name),
            value,
        }
    }

    /// Remove patch for a track name
    pub fn remove(name: &str) -> Self {
        TrackPatch::Remove {
            path: track_path(name),
        }
    }

    /// Replace patch for a descriptor
    pub fn replace(value: TrackDescriptor) -> Self {
        TrackPatch::Replace {
            path: track_path(&value.name),
            value,
        }
    }

    /// The patch path
    pub fn path(&self) -> &str {
        match self {
            TrackPatch::Add { path, .. }
            | TrackPatch::Remove { path }
            | TrackPatch::Replace { path, .. } => path,
        }
    }

    /// The addressed track name, or `None` for a path outside `/tracks/`
    pub fn track_name(&self) -> Option<&str> {
        self.path()
            .strip_prefix(TRACKS_PATH_PREFIX)
            .filter(|name| !name.is_empty())
    }
}

fn track_path(name: &str) -> String {
    format!("{}{}", TRACKS_PATH_PREFIX, name)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_patch_serialization_tags_op() {
        let patch = TrackPatch::add(TrackDescriptor::new("video", 0, "h264", json!({})));
        let encoded = serde_json::to_value(&patch).unwrap();

        assert_eq!(encoded["op"], "add");
        assert_eq!(encoded["path"], "/tracks/video");
        assert_eq!(encoded["value"]["name"], "video");

        let decoded: TrackPatch = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, patch);
    }

    #[test]
    fn test_remove_has_no_value() {
        let encoded = serde_json::to_value(TrackPatch::remove("audio")).unwrap();

        assert_eq!(encoded["op"], "remove");
        assert_eq!(encoded["path"], "/tracks/audio");
        assert!(encoded.get("value").is_none());
    }

    #[test]
    fn test_track_name_extraction() {
        assert_eq!(TrackPatch::remove("audio").track_name(), Some("audio"));

        let outside: TrackPatch = serde_json::from_value(json!({
            "op": "remove",
            "path": "/version"
        }))
        .unwrap();
        assert_eq!(outside.track_name(), None);

        let empty: TrackPatch = serde_json::from_value(json!({
            "op": "remove",
            "path": "/tracks/"
        }))
        .unwrap();
        assert_eq!(empty.track_name(), None);
    }

    #[test]
    fn test_init_version_is_required() {
        assert!(serde_json::from_str::<CatalogInit>(r#"{"description":"x"}"#).is_err());

        let init: CatalogInit = serde_json::from_str(r#"{"version":"v1"}"#).unwrap();
        assert_eq!(init.version, "v1");
        assert_eq!(init.description, None);
    }
}
