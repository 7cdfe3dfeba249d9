mod auth;
pub mod catalog;
mod extract;
mod orchestrator;
mod query;
pub mod records;

pub use auth::{AuthState, AuthenticationStateMachine, Credentials, LoginOutcome};
pub use extract::{ExtractionPipeline, DOCUMENT_LOAD_ERROR};
pub use orchestrator::{Operation, SessionOrchestrator};
pub use query::{SearchQuery, DEFAULT_ROWS, DEFAULT_SORT, MAX_ROWS, SORT_KEYS};
pub use records::{
    AlertRecord, DocumentRecord, OperationOutput, SearchResultRecord,
};
