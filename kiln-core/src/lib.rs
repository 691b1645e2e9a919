//! Kiln Core
//!
//! Core types shared by the Kiln build service.
//!
//! This crate contains:
//! - Domain types: Project, Task, Run and the run state machine
//! - DTOs: request and filter types passed between the API, services and store

pub mod domain;
pub mod dto;
