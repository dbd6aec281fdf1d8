pub mod config;
pub mod logging;

// Core modules
pub mod checksum;
pub mod engine;
pub mod store;
pub mod transfer;
