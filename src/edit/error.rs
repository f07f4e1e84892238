//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载编辑流水线中的所有失败，按来源分为四类：
//!
//! | 分类 | 含义 | 是否发生过 I/O |
//! |------|------|----------------|
//! | `Precondition` | 没有原图 / 选区未闭合 / 选区退化 | 否 |
//! | `Transport` | 取图失败、编辑服务失败或响应异常 | 是 |
//! | `Contract` | 蒙版尺寸与原图不一致等内部不变量被破坏 | 视情况 |
//! | `Busy` | 上一次编辑尚未结束 | 否 |
//!
//! 任何一类失败都不会修改当前图片、选区与历史，用户可原样重试。

use serde::Serialize;

use crate::selection::{ImageSize, SelectionError};

/// 错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Precondition,
    Transport,
    Contract,
    Busy,
}

/// 编辑流水线统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("没有可编辑的图片")]
    NoSourceImage,

    #[error("请先闭合套索选区")]
    SelectionNotClosed,

    #[error("{0}")]
    Selection(#[from] SelectionError),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("编辑服务返回失败：{0}")]
    Endpoint(String),

    #[error("编辑服务响应异常：{0}")]
    MalformedResponse(String),

    #[error("蒙版尺寸 {mask} 与原图尺寸 {image} 不一致")]
    DimensionMismatch { mask: ImageSize, image: ImageSize },

    #[error("上一次编辑仍在进行中，请稍候")]
    Busy,

    #[error("内部状态异常：{0}")]
    State(String),
}

impl EditError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoSourceImage | Self::SelectionNotClosed => ErrorClass::Precondition,
            Self::Selection(SelectionError::Encode(_)) => ErrorClass::Contract,
            Self::Selection(_) => ErrorClass::Precondition,
            Self::Network(_)
            | Self::Timeout(_)
            | Self::InvalidFormat(_)
            | Self::Decode(_)
            | Self::ResourceLimit(_)
            | Self::Endpoint(_)
            | Self::MalformedResponse(_) => ErrorClass::Transport,
            Self::DimensionMismatch { .. } | Self::State(_) => ErrorClass::Contract,
            Self::Busy => ErrorClass::Busy,
        }
    }

    /// 稳定的机器可读错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSourceImage => "E_NO_SOURCE",
            Self::SelectionNotClosed => "E_NOT_CLOSED",
            Self::Selection(_) => "E_SELECTION",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidFormat(_) => "E_FORMAT",
            Self::Decode(_) => "E_DECODE",
            Self::ResourceLimit(_) => "E_LIMIT",
            Self::Endpoint(_) => "E_ENDPOINT",
            Self::MalformedResponse(_) => "E_MALFORMED",
            Self::DimensionMismatch { .. } => "E_DIMENSION",
            Self::Busy => "E_BUSY",
            Self::State(_) => "E_STATE",
        }
    }

    /// 出错的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoSourceImage | Self::SelectionNotClosed | Self::Busy => "precondition",
            Self::Network(_)
            | Self::Timeout(_)
            | Self::InvalidFormat(_)
            | Self::Decode(_)
            | Self::ResourceLimit(_) => "resolve",
            Self::Selection(_) | Self::DimensionMismatch { .. } => "mask",
            Self::Endpoint(_) | Self::MalformedResponse(_) => "submit",
            Self::State(_) => "commit",
        }
    }
}

/// 面向界面的失败描述。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditFailure {
    pub code: &'static str,
    pub stage: &'static str,
    pub class: ErrorClass,
    pub message: String,
}

impl From<&EditError> for EditFailure {
    fn from(error: &EditError) -> Self {
        Self {
            code: error.code(),
            stage: error.stage(),
            class: error.class(),
            message: error.to_string(),
        }
    }
}

impl From<EditError> for EditFailure {
    fn from(error: EditError) -> Self {
        Self::from(&error)
    }
}
