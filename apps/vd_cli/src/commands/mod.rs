// apps/vd_cli/src/commands/mod.rs

//! 子命令实现

pub mod generate;
pub mod info;
pub mod run;
pub mod validate;
