//! # 套索局部编辑 — 命令行入口
//!
//! 本文件仅负责日志初始化与参数解析，流程见 `cli.rs`。

mod cli;

use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    cli::run(cli::CliArgs::parse()).await
}
