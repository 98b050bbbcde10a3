#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod entities;
pub mod fanout;
pub mod framework;
pub mod ingestion;
pub mod onboarding;
pub mod redemption;
pub mod store;
pub mod twitch;

#[cfg(test)]
pub mod testing;
