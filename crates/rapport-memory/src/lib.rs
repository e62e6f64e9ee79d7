pub mod session;

pub use session::{InMemorySessionStore, SessionStore, DEFAULT_MAX_TURNS};
