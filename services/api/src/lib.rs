//! Explainer API Library Crate
//!
//! This library contains the web service behind narrated lessons and their
//! voice tutor: configuration, application state, data access, service
//! clients, WebSocket logic and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod db;
pub mod jobs;
pub mod router;
pub mod speech;
pub mod state;
pub mod ws;
