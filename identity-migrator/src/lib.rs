pub mod account;
pub mod account_ref;
pub mod checkpoint;
pub mod config;
pub mod emit;
pub mod error;
pub mod links;
pub mod migrate;
pub mod pool;
pub mod report;
pub mod source;
pub mod unify;
