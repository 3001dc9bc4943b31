// src/services/mod.rs
pub mod directory;

pub use directory::{DirectoryService, MAX_EXTENSIONS_PER_REQUEST};
