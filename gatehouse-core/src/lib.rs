pub mod browser;
pub mod config;
pub mod error;
pub mod portal;

pub use browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession, ConsentBannerHandler,
    LiveSession, LiveSessionFactory, PortalPage, PortalSession, PortalSessionFactory, Selector,
    SelectorChain, SelectorKind,
};
pub use config::{load_portal_config, PortalConfig};
pub use error::{ConfigError, Result};
pub use portal::{
    AuthState, AuthenticationStateMachine, Credentials, DocumentRecord, ExtractionPipeline,
    LoginOutcome, Operation, OperationOutput, SearchQuery, SearchResultRecord,
    SessionOrchestrator,
};
