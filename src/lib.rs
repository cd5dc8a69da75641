pub mod backup;
pub mod config;
pub mod gateway;
pub mod merge;
pub mod prescriptions;
pub mod sanitize;
pub mod storage;
pub mod users;

pub use gateway::Gateway;
