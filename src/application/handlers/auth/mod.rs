//! Session token handlers: issue, rotate, revoke.

mod issue_session;
mod logout;
mod refresh_session;

pub use issue_session::IssueSessionHandler;
pub use logout::{LogoutCommand, LogoutHandler};
pub use refresh_session::{RefreshSessionCommand, RefreshSessionHandler};
