//! Session-level coordinators
//!
//! Constructed once per server process and handed to sessions and the
//! dispatcher at construction time, so tests can swap them out and no
//! state hides in globals.

pub mod bypass;
pub mod registry;

pub use bypass::LoginBypassRegistry;
pub use registry::{RegistryError, SessionRegistry, TransitionToken};
