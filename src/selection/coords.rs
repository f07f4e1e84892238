//! # 坐标映射模块
//!
//! ## 设计思路
//!
//! 指针事件给出的是显示坐标（CSS 像素，受布局缩放与高 DPI 影响），
//! 而多边形与蒙版只认图片自然分辨率下的像素坐标。
//! 两种坐标使用不同类型，唯一的转换入口是 [`Surface::to_image`]，
//! 从类型层面杜绝“屏幕像素当图片像素用”的缩放错误。
//!
//! ## 实现思路
//!
//! - 缩放比例按轴独立计算：`scale = natural / displayed`。
//!   受约束布局下显示宽高比可能与原图略有差异，不能共用一个比例。
//! - 纯函数，无副作用，无错误分支。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 显示坐标：与绘制表面包围盒处于同一坐标系（CSS 像素）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

impl DisplayPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 图片坐标：图片自然分辨率下的像素位置（实数）。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 图片自然尺寸（像素）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 像素总数。
    pub fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 绘制表面在显示坐标系中的包围盒（left/top/width/height）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl DisplayRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// 绘制表面：显示包围盒 + 其背后图片的自然尺寸。
///
/// # 示例
/// ```rust
/// use lasso_edit::selection::{DisplayPoint, DisplayRect, ImageSize, Surface};
///
/// // 1600x1200 的图片被缩放显示为 800x600
/// let surface = Surface::new(DisplayRect::new(0.0, 0.0, 800.0, 600.0), ImageSize::new(1600, 1200));
/// let p = surface.to_image(DisplayPoint::new(100.0, 50.0));
/// assert_eq!((p.x, p.y), (200.0, 100.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub rect: DisplayRect,
    pub natural: ImageSize,
}

impl Surface {
    pub fn new(rect: DisplayRect, natural: ImageSize) -> Self {
        Self { rect, natural }
    }

    /// 显示尺寸与自然尺寸一致、原点在 (0, 0) 的表面。
    ///
    /// 此时显示坐标与图片坐标数值相同，常用于无界面场景直接回放图片坐标。
    pub fn unscaled(natural: ImageSize) -> Self {
        Self {
            rect: DisplayRect::new(0.0, 0.0, natural.width as f64, natural.height as f64),
            natural,
        }
    }

    /// 每个轴的缩放比例 `(natural / displayed)`。
    pub fn scale(&self) -> (f64, f64) {
        (
            axis_scale(self.natural.width, self.rect.width),
            axis_scale(self.natural.height, self.rect.height),
        )
    }

    /// 显示坐标 → 图片坐标。
    pub fn to_image(&self, at: DisplayPoint) -> ImagePoint {
        let (sx, sy) = self.scale();
        ImagePoint {
            x: (at.x - self.rect.left) * sx,
            y: (at.y - self.rect.top) * sy,
        }
    }
}

// 显示尺寸为零或非有限值（元素尚未布局）时按 1:1 处理
fn axis_scale(natural: u32, displayed: f64) -> f64 {
    if displayed.is_finite() && displayed > 0.0 {
        natural as f64 / displayed
    } else {
        1.0
    }
}
