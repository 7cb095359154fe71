pub mod config;
pub mod control;
pub mod file;
pub mod helpers;
pub mod install;
pub mod oplog;
pub mod panel;
pub mod process;
pub mod telegram;
