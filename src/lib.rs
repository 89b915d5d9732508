pub mod aggregators;
pub mod config;
pub mod db;
pub mod errors;
pub mod evm;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod pricing;
pub mod solana;
