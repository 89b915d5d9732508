pub mod balances;
pub mod executor;
pub mod rpc;
pub mod watcher;
