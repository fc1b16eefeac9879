pub mod common;
pub mod config;
pub mod conflicts;
pub mod queue;
pub mod records;
pub mod status;
pub mod sync;
