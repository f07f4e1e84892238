//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，汇总各子系统的错误，
//! 供命令行入口与任何 JSON / IPC 外壳统一返回。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `SelectionError` / `EditError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串。

use serde::Serialize;

use crate::edit::EditError;
use crate::selection::SelectionError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 选区捕获或蒙版生成失败
    #[error("{0}")]
    Selection(#[from] SelectionError),

    /// 编辑流水线错误（取图 / 蒙版 / 提交）
    #[error("{0}")]
    Edit(#[from] EditError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件读写或解析失败
    #[error("配置错误: {0}")]
    Settings(String),

    /// 命令行输入无效
    #[error("参数无效: {0}")]
    Input(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
