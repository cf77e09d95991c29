//! Socket endpoints and the protocol session built on them.

pub mod endpoint;
pub mod session;

pub use endpoint::{EndpointSpec, Role};
pub use session::{HandlerError, MessageHandler, Session, SessionConfig};
