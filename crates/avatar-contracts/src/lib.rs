pub mod artifacts;
pub mod events;
pub mod history;
pub mod models;
pub mod storage;
pub mod svg;

pub use artifacts::{Artifact, ErrorEnvelope, GenerateResponse, SavedAvatar};
pub use events::{EventKind, EventWriter};
pub use history::{HistoryCache, HISTORY_KEY, MAX_HISTORY};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use svg::{extract_svg, ExtractionError};
