//! Command implementations

pub mod cache;
pub mod employee;
pub mod init;
pub mod report;
pub mod status;
pub mod sync;
pub mod tool;
