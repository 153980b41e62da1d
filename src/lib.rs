//! Epitope prediction task service.
//!
//! Stores task configurations submitted by authenticated users, hands them
//! to an external prediction/analysis pipeline, and keeps the epitopes that
//! pipeline produces as results owned by the task.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;
pub mod worker;
