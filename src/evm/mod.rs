pub mod abi;
pub mod executor;
pub mod planner;
pub mod reconcile;
pub mod rpc;
pub mod wallet;
pub mod watcher;
