pub mod anki;
pub mod config;
pub mod core;
pub mod engine;
pub mod generator;
pub mod ingest;
pub mod server;
