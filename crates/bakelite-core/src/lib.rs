pub mod catalog;
pub mod config;
pub mod platform;
pub mod settings;
pub mod state;
pub mod store;
