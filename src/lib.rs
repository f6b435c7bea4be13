pub mod config;
pub mod core;
pub mod mirror;
pub mod store;
pub mod sync;
