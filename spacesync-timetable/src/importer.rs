use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use spacesync_core::{LabWindow, Store};

use crate::extract::TextExtractor;
use crate::parser::TimetableParser;
use crate::registry::{RoomRegistry, SyncReport};
use crate::schema::{validate_entries, TimetableEntry};
use crate::TimetableError;

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub count: usize,
    pub data: Vec<TimetableEntry>,
    pub rooms_synced: SyncReport,
}

/// PDF in, lab windows and rooms out.
pub struct TimetableImporter {
    store: Arc<dyn Store>,
    extractor: Arc<dyn TextExtractor>,
    parser: Arc<dyn TimetableParser>,
}

impl TimetableImporter {
    pub fn new(
        store: Arc<dyn Store>,
        extractor: Arc<dyn TextExtractor>,
        parser: Arc<dyn TimetableParser>,
    ) -> Self {
        Self { store, extractor, parser }
    }

    pub async fn import(&self, document: Vec<u8>) -> Result<ImportReport, TimetableError> {
        let text = self.extractor.extract(document).await?;
        if text.trim().is_empty() {
            return Err(TimetableError::EmptyDocument);
        }

        let raw = self.parser.parse(&text).await?;
        let entries = validate_entries(&raw);
        if entries.is_empty() {
            return Err(TimetableError::NoLabSessions);
        }

        let now = Utc::now();
        let windows: Vec<LabWindow> = entries.iter().map(|e| e.to_lab_window(now)).collect();
        self.store.upsert_lab_windows(&windows).await?;
        info!(
            "Imported {} lab session(s) out of {} parsed",
            entries.len(),
            raw.len()
        );

        let rooms_synced = RoomRegistry::new(self.store.clone())
            .sync_from_lab_windows()
            .await?;

        Ok(ImportReport {
            count: entries.len(),
            data: entries,
            rooms_synced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use spacesync_core::repository::{LabWindowRepository, RoomRepository};
    use spacesync_store::MemoryStore;

    struct FixedText(&'static str);

    #[async_trait]
    impl TextExtractor for FixedText {
        async fn extract(&self, _document: Vec<u8>) -> Result<String, TimetableError> {
            Ok(self.0.to_string())
        }
    }

    struct FixedEntries(Vec<Value>);

    #[async_trait]
    impl TimetableParser for FixedEntries {
        async fn parse(&self, _text: &str) -> Result<Vec<Value>, TimetableError> {
            Ok(self.0.clone())
        }
    }

    fn importer(store: &MemoryStore, text: &'static str, entries: Vec<Value>) -> TimetableImporter {
        TimetableImporter::new(
            Arc::new(store.clone()),
            Arc::new(FixedText(text)),
            Arc::new(FixedEntries(entries)),
        )
    }

    #[tokio::test]
    async fn test_import_upserts_windows_and_syncs_rooms() {
        let store = MemoryStore::new();
        let entries = vec![
            json!({"batch": "C2A", "day": "Monday", "time": "11:30 to 1:30", "classroom": "B201", "lab_location": "LAB"}),
            json!({"batch": "C2B", "day": "Tuesday", "time": "2:30 to 4:30", "classroom": "B202", "lab_location": "ITLAB"}),
            json!({"batch": "C2C", "day": "Tuesday"}),
        ];

        let report = importer(&store, "Mon B201 B201 LAB LAB", entries)
            .import(b"%PDF".to_vec())
            .await
            .unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(report.rooms_synced.stats.new_rooms_created, 2);
        assert_eq!(store.list_lab_windows().await.unwrap().len(), 2);
        assert!(store.find_room("B202").await.unwrap().unwrap().synced_from_timetable);
    }

    #[tokio::test]
    async fn test_reimport_replaces_windows() {
        let store = MemoryStore::new();
        let entry = |lab: &str| {
            json!({"batch": "C2A", "day": "Monday", "time": "11:30 to 1:30", "classroom": "B201", "lab_location": lab})
        };

        importer(&store, "v1", vec![entry("CCF Lab")]).import(Vec::new()).await.unwrap();
        let report = importer(&store, "v2", vec![entry("IT Lab")]).import(Vec::new()).await.unwrap();

        let windows = store.list_lab_windows().await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].lab_location, "IT Lab");
        assert_eq!(report.rooms_synced.stats.existing_rooms, 1);
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let store = MemoryStore::new();
        let err = importer(&store, "   ", vec![]).import(Vec::new()).await.unwrap_err();
        assert!(matches!(err, TimetableError::EmptyDocument));
    }

    #[tokio::test]
    async fn test_no_valid_entries() {
        let store = MemoryStore::new();
        let err = importer(&store, "Mon B201", vec![json!({"batch": 1})])
            .import(Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TimetableError::NoLabSessions));
        assert_eq!(store.writes(), 0);
    }
}
