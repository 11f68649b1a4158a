pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod net;
pub mod services;
pub mod state;
pub mod username;

// Convenient re-exports (so call sites can do `canvas_accounts::Registry`, etc.)
pub use state::registry::Registry;
pub use username::{UsernameAllocator, UsernameLookup, normalize};
