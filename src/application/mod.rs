//! Application services: the post store, its change bridge, and the session observer.

pub mod error;
pub mod notify;
pub mod repos;
pub mod session;
pub mod store;
