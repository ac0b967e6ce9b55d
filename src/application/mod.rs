pub mod auth;
pub mod bootstrap;
pub mod commands;
pub mod planner;
pub mod schedule_store;
pub mod settings_store;

#[cfg(test)]
pub(crate) mod test_support;
