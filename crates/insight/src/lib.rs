pub mod activity;
pub mod ai;
pub mod narrative;
pub mod persona;
pub mod prompts;
pub mod session;
