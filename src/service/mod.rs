//! Orchestration services
//!
//! Small transactions over the persistence ports. The session never writes
//! account state directly; everything funnels through here.

pub mod account;

pub use account::AccountService;
