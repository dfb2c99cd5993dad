use std::collections::HashSet;

use crate::kind::PlaylistKind;
use crate::services::reconciler::Reconciled;
use crate::services::storage::{ManagedFile, ManagedStorage, StorageError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub kept: usize,
}

/// Deletes managed files the committed playlist no longer references.
pub struct CleanupManager<'a> {
    storage: &'a ManagedStorage,
}

impl<'a> CleanupManager<'a> {
    pub fn new(storage: &'a ManagedStorage) -> Self {
        Self { storage }
    }

    /// Only callable with a [`Reconciled`], so it can't run before the playlist is written.
    pub fn cleanup(
        &self,
        committed: &Reconciled,
        kind: PlaylistKind,
        retained: &HashSet<ManagedFile>,
    ) -> Result<CleanupReport, StorageError> {
        let removed = self.storage.retain(kind, retained)?;
        for file in &removed {
            tracing::info!(%kind, file = %file.relative.display(), "Removed stale download");
        }

        let report = CleanupReport {
            removed: removed.len(),
            kept: self.storage.list_all(kind)?.len(),
        };
        tracing::debug!(
            %kind,
            playlist_id = %committed.playlist_id,
            removed = report.removed,
            kept = report.kept,
            "Cleanup finished"
        );
        Ok(report)
    }
}
