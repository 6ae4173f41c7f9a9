//! EventDesk Server - Conference ticketing and scheduling API.
//!
//! This crate provides the HTTP contract layer of EventDesk:
//! - A uniform `{data, error}` response envelope
//! - Strict request decoding and validation
//! - Bearer-token authentication
//! - Controllers for users, event organizers and attendees
//!
//! # Architecture
//!
//! Controllers depend only on the capability traits in [`service`], held in
//! [`routes::AppState`]. The default wiring uses the in-memory
//! [`store::MemoryStore`], Ed25519-signed tokens from [`auth`], the logging
//! mailer from [`mailer`] and the Sessionize importer from [`sessionize`].

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod login_code;
pub mod mailer;
pub mod middleware;
pub mod password;
pub mod rate_limit;
pub mod routes;
pub mod service;
pub mod sessionize;
pub mod store;
pub mod types;
pub mod validation;
