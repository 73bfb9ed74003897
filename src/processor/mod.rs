/// Batch ingestion: decoding, normalization and validation of client events
pub mod dispatcher;
pub mod enricher;
pub mod validator;

pub use dispatcher::{EventBatch, EventDispatcher, IngestResponse};
pub use enricher::Enricher;
pub use validator::Validator;
