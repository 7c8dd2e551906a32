//! Remote inventory types: files, collections, and the export UID

use serde::{Deserialize, Serialize};

/// Server-assigned file identifier
pub type FileId = i64;
/// Server-assigned collection identifier
pub type CollectionId = i64;
/// Server-assigned user identifier
pub type UserId = i64;

/// What a remote file materializes as on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// A single image file
    Image,
    /// A single video file
    Video,
    /// An image + video pair written and trashed as a unit
    LivePhoto,
}

/// Descriptive metadata attached to a remote file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Original file title, used as the basename candidate on export
    pub title: String,
    /// Capture time in microseconds since the epoch
    pub creation_time_us: i64,
    /// Last modification time in microseconds, if known
    pub modification_time_us: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A file as reported by the remote inventory.
///
/// Immutable within a reconciliation run: any remote mutation shows up as a
/// new `updation_time` and therefore a new export UID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: FileId,
    /// The collection this instance of the file lives in
    pub collection_id: CollectionId,
    /// Monotonic version counter bumped on every remote mutation
    pub updation_time: i64,
    pub owner_id: UserId,
    pub kind: FileKind,
    pub metadata: FileMetadata,
    /// Caption shown on public links, carried into the sidecar
    pub public_caption: Option<String>,
}

/// A collection as reported by the remote inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub owner_id: UserId,
    /// User-facing name; may change across snapshots
    pub name: String,
}

impl RemoteFile {
    /// Stable cross-run identity of this (file, collection, version) triple.
    ///
    /// A changed UID is treated by the mirror as a new file, and the old UID
    /// as a deleted one.
    #[must_use]
    pub fn export_uid(&self) -> String {
        format!("{}_{}_{}", self.id, self.collection_id, self.updation_time)
    }
}

/// Parse the collection id back out of an export UID.
///
/// Returns `None` if the UID is not of the `"{id}_{collection}_{updation}"`
/// shape.
#[must_use]
pub fn collection_id_from_uid(uid: &str) -> Option<CollectionId> {
    uid.split('_').nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_file(id: FileId, collection_id: CollectionId, updation_time: i64) -> RemoteFile {
        RemoteFile {
            id,
            collection_id,
            updation_time,
            owner_id: 1,
            kind: FileKind::Image,
            metadata: FileMetadata {
                title: format!("IMG_{id}.jpg"),
                creation_time_us: 1_700_000_000_000_000,
                modification_time_us: None,
                latitude: None,
                longitude: None,
            },
            public_caption: None,
        }
    }

    #[test]
    fn test_uid_roundtrip() {
        let file = make_file(42, 100, 7);
        let uid = file.export_uid();
        assert_eq!(uid, "42_100_7");
        assert_eq!(collection_id_from_uid(&uid), Some(100));
    }

    #[test]
    fn test_uid_changes_with_version() {
        let mut file = make_file(1, 100, 1);
        let before = file.export_uid();
        file.updation_time = 2;
        assert_ne!(before, file.export_uid());
    }

    #[test]
    fn test_collection_id_from_malformed_uid() {
        assert_eq!(collection_id_from_uid("garbage"), None);
        assert_eq!(collection_id_from_uid("1_x_3"), None);
        assert_eq!(collection_id_from_uid(""), None);
    }

    #[test]
    fn test_file_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&FileKind::LivePhoto).unwrap(),
            "\"live_photo\""
        );
        let kind: FileKind = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(kind, FileKind::Image);
    }
}
