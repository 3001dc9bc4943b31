// src/lib.rs
//! PBX extension directory backend.
//!
//! Serves the extension directory with live presence taken from an Asterisk
//! Manager Interface. Status polling is best-effort: an unreachable or
//! misconfigured PBX degrades every entry to `unknown` instead of failing
//! the request.

pub mod ami;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
