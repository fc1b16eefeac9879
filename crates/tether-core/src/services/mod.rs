//! Cross-client service wrappers.

mod store;

pub use store::LocalStore;
