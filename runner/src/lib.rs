pub mod case;
pub mod config;
pub mod executors;
pub mod manager;
pub mod repository;

#[cfg(test)]
pub(crate) mod fixtures;
