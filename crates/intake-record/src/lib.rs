//! Record schema, extraction, merging, and completeness for the intake
//! orchestrator.

pub mod completeness;
pub mod error;
pub mod extract;
pub mod merge;
pub mod patterns;
pub mod schema;
pub mod window;

pub use completeness::{check_completeness, Completeness};
pub use error::ExtractionError;
pub use extract::{Extraction, Extractor, FieldUpdate, RuleExtractor};
pub use merge::{apply_extraction, MergeOutcome, RecordMerger};
pub use patterns::PatternSet;
pub use schema::{FieldKind, FieldSpec, RecordSchema};
pub use window::ExtractionWindow;
