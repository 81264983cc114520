//! Adapters for the hosted backend plus process-level plumbing.

pub mod error;
pub mod session_file;
pub mod supabase;
pub mod telemetry;
