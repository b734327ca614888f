//! Generation orchestration: credential vault, config resolution, model routing,
//! quota admission, usage accounting and the `Orchestrator` that composes them.

pub mod handlers;
pub mod orchestrator;
pub mod pricing;
pub mod quota;
pub mod resolver;
pub mod router;
pub mod sanitize;
pub mod usage;
pub mod vault;
