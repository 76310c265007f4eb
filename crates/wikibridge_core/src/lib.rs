pub mod batch;
pub mod config;
pub mod deletion;
pub mod error;
pub mod graphql;
pub mod hierarchy;
pub mod ledger;
pub mod logging;
pub mod mapping;
pub mod migrate;
pub mod pages;
pub mod reconcile;
pub mod report;
pub mod runtime;
pub mod slug;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
