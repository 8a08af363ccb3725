//! Virtual Try-On Fitting Orchestration Service
//!
//! This library provides the core functionality for the vto-fitting system,
//! which orchestrates multi-step try-on, background-edit and video workflows
//! against external generation vendors, with results persisted to S3-backed
//! storage and PostgreSQL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
