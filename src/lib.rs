// Library exports for testing and modular access

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
