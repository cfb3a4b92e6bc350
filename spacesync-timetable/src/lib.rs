pub mod extract;
pub mod importer;
pub mod parser;
pub mod registry;
pub mod schema;

pub use extract::{PdfTextExtractor, TextExtractor};
pub use importer::{ImportReport, TimetableImporter};
pub use parser::{GeminiParser, TimetableParser};
pub use registry::{RoomRegistry, SyncReport, SyncStats};
pub use schema::TimetableEntry;

use spacesync_core::{CoreError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    #[error("Could not read PDF: {0}")]
    Extraction(String),
    #[error("No valid timetable data found")]
    EmptyDocument,
    #[error("Timetable parser failed: {0}")]
    Parser(String),
    #[error("No lab sessions detected")]
    NoLabSessions,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rooms(#[from] CoreError),
}
