//! Reconciliation planner: diffs a fresh inventory snapshot against the
//! journal.
//!
//! Pure set arithmetic, no I/O. All four lists come from the same snapshot
//! so a run never mixes generations.

use std::collections::{BTreeMap, HashSet};

use crate::journal::ExportRecord;
use crate::model::{Collection, CollectionId, RemoteFile, UserId};
use crate::names::{sanitize_name, strip_copy_suffix};

/// The work set for one export run, in phase execution order
#[derive(Debug, Clone, Default)]
pub struct ExportPlan {
    /// Collections whose on-disk directory no longer matches their name
    pub renamed_collections: Vec<Collection>,
    /// Journal UIDs that are gone from the remote inventory
    pub removed_file_uids: Vec<String>,
    /// Personal files not yet in the journal, ordered by
    /// `(collection_id, id)`
    pub files_to_export: Vec<RemoteFile>,
    /// Journal collections with no remaining personal files remotely
    pub deleted_collections: Vec<CollectionId>,
}

impl ExportPlan {
    /// Whether a run over this plan would mutate anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.renamed_collections.is_empty()
            && self.removed_file_uids.is_empty()
            && self.files_to_export.is_empty()
            && self.deleted_collections.is_empty()
    }
}

/// Files owned by the user inside collections the user owns.
fn personal_files<'a>(
    user: UserId,
    files: &'a [RemoteFile],
    collections: &BTreeMap<CollectionId, &'a Collection>,
) -> Vec<&'a RemoteFile> {
    files
        .iter()
        .filter(|f| {
            f.owner_id == user
                && collections
                    .get(&f.collection_id)
                    .is_some_and(|c| c.owner_id == user)
        })
        .collect()
}

/// Compute the four work lists from one inventory snapshot and the loaded
/// journal.
#[must_use]
pub fn plan_export(
    user: UserId,
    files: &[RemoteFile],
    collections: &[Collection],
    record: &ExportRecord,
) -> ExportPlan {
    let by_id: BTreeMap<CollectionId, &Collection> =
        collections.iter().map(|c| (c.id, c)).collect();
    let personal = personal_files(user, files, &by_id);

    let current_uids: HashSet<String> = personal.iter().map(|f| f.export_uid()).collect();

    let mut files_to_export: Vec<RemoteFile> = personal
        .iter()
        .filter(|f| !record.file_export_names.contains_key(&f.export_uid()))
        .map(|f| (*f).clone())
        .collect();
    files_to_export.sort_by_key(|f| (f.collection_id, f.id));

    let removed_file_uids: Vec<String> = record
        .file_export_names
        .keys()
        .filter(|uid| !current_uids.contains(*uid))
        .cloned()
        .collect();

    let renamed_collections: Vec<Collection> = record
        .collection_export_names
        .iter()
        .filter_map(|(id, recorded)| {
            let collection = by_id.get(id)?;
            let wanted = sanitize_name(&collection.name);
            // A recorded name matches either exactly or modulo a trailing
            // collision suffix; only then is no rename due.
            if recorded == &wanted || strip_copy_suffix(recorded) == wanted {
                None
            } else {
                Some((*collection).clone())
            }
        })
        .collect();

    // A collection is kept only while it still holds at least one personal
    // file in the current snapshot.
    let populated: HashSet<CollectionId> = personal.iter().map(|f| f.collection_id).collect();
    let deleted_collections: Vec<CollectionId> = record
        .collection_export_names
        .keys()
        .filter(|id| !populated.contains(id))
        .copied()
        .collect();

    ExportPlan {
        renamed_collections,
        removed_file_uids,
        files_to_export,
        deleted_collections,
    }
}
