//! # 套索选区模块（selection）
//!
//! ## 设计思路
//!
//! 把“指针输入 → 图片坐标 → 多边形 → 二值蒙版”这条纯计算链路独立出来，
//! 不依赖任何渲染环境与网络，所有状态都是普通值，可直接在单元测试中构造。
//!
//! - `coords`：显示坐标与图片坐标两种独立类型，以及两者之间的映射
//! - `polygon`：套索多边形状态机（Empty → Drawing → Closed，可随时 Reset）
//! - `mask`：扫描线光栅化，输出与原图同尺寸的二值蒙版
//! - `error`：选区阶段错误
//!
//! ## 调用链
//!
//! ```text
//! 指针事件 (DisplayPoint)
//!    ↓ Surface::to_image
//! ImagePoint
//!    ↓ SelectionPolygon::pointer_down / pointer_move / close
//! 闭合多边形
//!    ↓ mask::rasterize_polygon
//! BinaryMask（白 = 可编辑，黑 = 保留）
//! ```

mod coords;
mod error;
mod mask;
mod polygon;

pub use coords::{DisplayPoint, DisplayRect, ImagePoint, ImageSize, Surface};
pub use error::SelectionError;
pub use mask::{BinaryMask, EDITABLE, PRESERVED, rasterize, rasterize_polygon};
pub use polygon::{CaptureState, CloseRejected, MIN_POLYGON_POINTS, SelectionPolygon};
