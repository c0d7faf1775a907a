pub mod absence;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod notify;
pub mod remote;
pub mod schedule;
pub mod shutdown;
