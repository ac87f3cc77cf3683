//! Spiral - a headless social client
//!
//! This library provides the view-model layer of the Spiral client (sync
//! units, session context, toasts) together with the local platform it
//! talks to: SQLite-backed services, a realtime change hub and an object
//! store.

pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod realtime;
pub mod services;
pub mod session;
pub mod storage;
pub mod sync;
pub mod toast;

pub use client::SpiralClient;
