pub mod batch;
pub mod config;
pub mod error;
pub mod models;
pub mod verifier;
