pub mod limits;
pub mod registry;
pub mod session;

pub use limits::Limits;
pub use registry::SessionRegistry;
pub use session::{Removal, Session, SessionError};
