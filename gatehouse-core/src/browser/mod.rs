mod consent;
mod error;
mod page;
mod selectors;
mod session;

pub use consent::ConsentBannerHandler;
pub use error::{BrowserError, BrowserResult};
pub(crate) use page::js_string;
pub use page::{
    ConsentCookie, LiveSession, LiveSessionFactory, PortalPage, PortalSession,
    PortalSessionFactory,
};
pub use selectors::{Selector, SelectorChain, SelectorKind};
pub use session::{BrowserLauncher, BrowserSession};
