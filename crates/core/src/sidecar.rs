//! Metadata sidecar written next to every exported file under
//! `metadata/<basename>.json`

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RemoteFile;

/// A timestamp in seconds plus a human-readable rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarTime {
    /// Seconds since the epoch
    pub timestamp: i64,
    /// Short UTC rendering of the same instant
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoData {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// The sidecar document. Live photos get one per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    /// The on-disk export name, not the remote title
    pub title: String,
    pub caption: Option<String>,
    pub creation_time: SidecarTime,
    pub modification_time: SidecarTime,
    pub geo_data: GeoData,
}

fn sidecar_time(time_us: i64) -> SidecarTime {
    let timestamp = time_us.div_euclid(1_000_000);
    let millis = time_us.div_euclid(1_000);
    let formatted = Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%b %-d, %Y, %-I:%M:%S %p UTC").to_string())
        .unwrap_or_else(|| millis.to_string());
    SidecarTime {
        timestamp,
        formatted,
    }
}

impl Sidecar {
    /// Build the sidecar for `file` as exported under `export_name`.
    ///
    /// Modification time falls back to creation time when the remote
    /// metadata does not carry one.
    #[must_use]
    pub fn for_file(file: &RemoteFile, export_name: &str) -> Self {
        let creation = sidecar_time(file.metadata.creation_time_us);
        let modification = sidecar_time(
            file.metadata
                .modification_time_us
                .unwrap_or(file.metadata.creation_time_us),
        );
        Self {
            title: export_name.to_string(),
            caption: file.public_caption.clone(),
            creation_time: creation,
            modification_time: modification,
            geo_data: GeoData {
                latitude: file.metadata.latitude,
                longitude: file.metadata.longitude,
            },
        }
    }

    /// Pretty JSON as written to disk.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileKind, FileMetadata};

    fn file_with_times(creation_us: i64, modification_us: Option<i64>) -> RemoteFile {
        RemoteFile {
            id: 1,
            collection_id: 100,
            updation_time: 1,
            owner_id: 1,
            kind: FileKind::Image,
            metadata: FileMetadata {
                title: "IMG_1.jpg".into(),
                creation_time_us: creation_us,
                modification_time_us: modification_us,
                latitude: Some(47.37),
                longitude: Some(8.54),
            },
            public_caption: Some("lakeside".into()),
        }
    }

    #[test]
    fn test_microseconds_floor_to_seconds() {
        let file = file_with_times(1_700_000_000_999_999, None);
        let sidecar = Sidecar::for_file(&file, "IMG_1.jpg");
        assert_eq!(sidecar.creation_time.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_modification_defaults_to_creation() {
        let file = file_with_times(1_700_000_000_000_000, None);
        let sidecar = Sidecar::for_file(&file, "IMG_1.jpg");
        assert_eq!(sidecar.modification_time, sidecar.creation_time);

        let file = file_with_times(1_700_000_000_000_000, Some(1_800_000_000_000_000));
        let sidecar = Sidecar::for_file(&file, "IMG_1.jpg");
        assert_eq!(sidecar.modification_time.timestamp, 1_800_000_000);
    }

    #[test]
    fn test_title_is_export_name() {
        let file = file_with_times(0, None);
        let sidecar = Sidecar::for_file(&file, "IMG_1(1).jpg");
        assert_eq!(sidecar.title, "IMG_1(1).jpg");
    }

    #[test]
    fn test_json_shape() {
        let file = file_with_times(1_700_000_000_000_000, None);
        let json = Sidecar::for_file(&file, "IMG_1.jpg").to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["title"], "IMG_1.jpg");
        assert_eq!(value["caption"], "lakeside");
        assert_eq!(value["creationTime"]["timestamp"], 1_700_000_000_i64);
        assert!(value["creationTime"]["formatted"].as_str().unwrap().contains("2023"));
        assert_eq!(value["geoData"]["latitude"], 47.37);
        assert!(value["modificationTime"].is_object());
    }
}
