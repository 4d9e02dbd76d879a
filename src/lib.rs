//! Weaverbird - feature development conversations
//!
//! A conversation moves from a written approach to generated code through a
//! closed set of states. Remote planning and code-generation jobs are driven
//! through the traits in [`traits`], so the core runs unchanged against the
//! HTTP adapters in [`remote`] or the mocks used in tests.

pub mod config;
pub mod error;
pub mod messenger;
pub mod remote;
pub mod session;
pub mod traits;
pub mod vfs;

pub use config::{ConfigError, SessionConfig};
pub use error::{ServerErrorCode, SessionError};
pub use messenger::{ChannelMessenger, MessengerEvent};
pub use session::{Phase, Session, SessionState};
