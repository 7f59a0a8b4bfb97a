pub mod api;
pub mod batch;
pub mod config;
pub mod convert;
