pub mod email;
pub mod handlers;
pub mod orchestrator;
