//! Application services.

pub mod access;
pub mod error;
pub mod feed;
pub mod identity;
pub mod posts;
pub mod profile;
pub mod rate_limit;
pub mod repos;

#[cfg(test)]
pub(crate) mod testing;
