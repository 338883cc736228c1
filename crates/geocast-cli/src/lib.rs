pub mod cache;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod model;
pub mod providers;
pub mod service;
pub mod summary;
