//! Data Transfer Objects
//!
//! Request payloads and query filters exchanged between the HTTP API, the
//! services and the record store.

pub mod project;
pub mod run;
pub mod task;
pub mod webhook;
