pub mod models;
pub mod reflow;
