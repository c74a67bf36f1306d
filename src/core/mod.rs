//! Configuration and message models shared by both halves of the pipeline

pub mod config;
pub mod models;
