//! Tagging — selection, resolution, tag merging and the bulk tagging loop.
//!
//! Handles the UI-agent half of the pipeline: tracking which gallery items
//! are selected, mapping their display names to remote file records, and
//! applying one tag to all of them through the relay.

pub mod encode;
pub mod merge;
pub mod orchestrator;
pub mod resolver;
pub mod schema;
pub mod selection;

pub use merge::{build_tag, merge_tags};
pub use orchestrator::{
    BatchReport, BulkTagger, GalleryRefresher, ItemOutcome, ItemStatus, Phase, ProgressEvent,
    ProgressSink, TracingProgress,
};
pub use resolver::{best_match, job_folder_number, FileResolver};
pub use schema::{FileRecord, Tag, TagValue, TagValueType, JOB_FOLDER_KEY};
pub use selection::{SelectionItem, SelectionRegistry};
