//! Browser automation layer
//!
//! Workers drive pages through the [`BrowserSession`] trait and obtain
//! sessions from a [`SessionFactory`]. The production implementation talks to
//! Chrome over the DevTools protocol; tests substitute in-process fakes.

mod chrome;
mod session;

pub use chrome::{ChromeSession, ChromeSessionFactory};
pub use session::{BrowserSession, SessionError, SessionFactory, SessionResult};
