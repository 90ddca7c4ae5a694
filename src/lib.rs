pub mod admin;
pub mod code;
pub mod config;
pub mod connection;
pub mod errors;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::Config;
pub use server::AppState;
pub use session::{Limits, SessionRegistry};
