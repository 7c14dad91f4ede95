//! CLI 命令处理模块

pub mod config;
pub mod console;
pub mod run;
