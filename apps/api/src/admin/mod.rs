//! Administrator surface: provider configuration CRUD, credential tests,
//! usage statistics and the provider catalog.

pub mod handlers;
pub mod stats;
