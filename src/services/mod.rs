//! Upload pipeline and lookup services.

pub mod assembler;
pub mod blob_store;
pub mod entity_service;
pub mod gateway;
pub mod grouper;
pub mod registry;
