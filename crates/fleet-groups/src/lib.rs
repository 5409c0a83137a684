//! Group Executor (C6).6: group CRUD, `all-devices` resolution,
//! bounded concurrent fan-out, and the destructive-verb safety interlock.

pub mod executor;
pub mod manager;

pub use executor::{GroupExecutor, GroupExecutorConfig, GroupRequest};
pub use manager::{GroupManager, GroupUpdate};
