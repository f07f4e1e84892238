//! # 选区错误模型
//!
//! 选区阶段只有两类失败：多边形不满足闭合条件，或蒙版无法生成/编码。
//! 均为调用方可恢复的错误，不涉及任何 I/O。

use super::ImageSize;

/// 选区与蒙版阶段错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("选区点数不足：至少需要 {required} 个点，当前 {actual} 个，请画一个更大的区域")]
    TooFewPoints { required: usize, actual: usize },

    #[error("选区尚未闭合")]
    NotClosed,

    #[error("蒙版尺寸无效：{0}")]
    EmptyRaster(ImageSize),

    #[error("蒙版编码失败：{0}")]
    Encode(String),
}
