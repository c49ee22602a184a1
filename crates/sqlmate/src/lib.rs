pub mod agent;
pub mod configuration;
pub mod detector;
pub mod errors;
pub mod executor;
pub mod memory;
pub mod models;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod session;
pub mod systems;
