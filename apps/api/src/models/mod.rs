pub mod provider;
pub mod usage;
pub mod user;
