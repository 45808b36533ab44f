//! Tiered cache store spanning transient and persistent backends

mod store;

pub use store::{StoreConfig, TieredStore};
