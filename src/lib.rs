pub mod access;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod name;
pub mod notify;
pub mod pool;
pub mod receipt;
pub mod render;
pub mod search;
pub mod store;
pub mod utils;
