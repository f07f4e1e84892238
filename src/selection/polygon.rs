//! # 套索多边形状态机
//!
//! ## 设计思路
//!
//! 多边形是一个普通的值对象：每个状态转换都消费旧值并返回新值，
//! 不绑定任何 UI 框架的状态容器，脱离渲染环境即可测试。
//!
//! ```text
//!            pointer_down            close (>= 3 点)
//!   Empty ─────────────────▶ Drawing ─────────────────▶ Closed
//!     ▲                       │  ▲                        │
//!     │                       └──┘ pointer_move（按住时）  │
//!     └──────────────── reset（任意状态） ◀────────────────┘
//! ```
//!
//! ## 不变量
//!
//! - 未闭合时只能追加点，不能删除或重排单个点（只允许整体重置）。
//! - 闭合至少需要 [`MIN_POLYGON_POINTS`] 个点。
//! - 闭合后忽略所有指针事件，直到重置。
//! - 原始路径按输入分辨率完整保留，不去重、不简化。
//! - 所有点都处于同一图片坐标系（记录为 `frame`）；
//!   若指针事件来自不同自然尺寸的图片，说明原图已更换，先隐式重置再开始新路径。

use serde::Serialize;

use super::{DisplayPoint, ImagePoint, ImageSize, SelectionError, Surface};

/// 闭合多边形所需的最少点数。
pub const MIN_POLYGON_POINTS: usize = 3;

/// 套索捕获状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Empty,
    Drawing,
    Closed,
}

/// 套索多边形（图片坐标点序列 + 闭合标志）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPolygon {
    points: Vec<ImagePoint>,
    closed: bool,
    pointer_held: bool,
    frame: Option<ImageSize>,
}

/// 闭合被拒绝：原样交还多边形，并附带原因。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct CloseRejected {
    pub polygon: SelectionPolygon,
    pub error: SelectionError,
}

impl SelectionPolygon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CaptureState {
        if self.closed {
            CaptureState::Closed
        } else if self.points.is_empty() {
            CaptureState::Empty
        } else {
            CaptureState::Drawing
        }
    }

    pub fn points(&self) -> &[ImagePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 当前是否处于按住指针的拖动中。
    pub fn is_pointer_held(&self) -> bool {
        self.pointer_held
    }

    /// 点所在图片的自然尺寸（首个点落下时记录）。
    pub fn frame(&self) -> Option<ImageSize> {
        self.frame
    }

    /// 已闭合时返回点序列，否则返回 `None`。
    pub fn closed_points(&self) -> Option<&[ImagePoint]> {
        self.closed.then_some(self.points.as_slice())
    }

    /// 点集的轴对齐包围盒 `(min, max)`。
    pub fn bounds(&self) -> Option<(ImagePoint, ImagePoint)> {
        let first = self.points.first()?;
        let init = (*first, *first);
        Some(self.points.iter().fold(init, |(min, max), p| {
            (
                ImagePoint::new(min.x.min(p.x), min.y.min(p.y)),
                ImagePoint::new(max.x.max(p.x), max.y.max(p.y)),
            )
        }))
    }

    /// 指针按下：开始（或继续）一段路径并追加首个点。
    pub fn pointer_down(self, surface: &Surface, at: DisplayPoint) -> Self {
        if self.closed {
            log::debug!("🔒 选区已闭合，忽略 pointer_down");
            return self;
        }

        let mut next = self.rebase(surface.natural);
        next.points.push(surface.to_image(at));
        next.pointer_held = true;
        next
    }

    /// 指针移动：仅在按住时追加点。
    pub fn pointer_move(mut self, surface: &Surface, at: DisplayPoint) -> Self {
        if self.closed || !self.pointer_held {
            return self;
        }

        if self.frame != Some(surface.natural) {
            log::debug!("⚠️ 指针移动来自不同尺寸的图片，已忽略");
            return self;
        }

        self.points.push(surface.to_image(at));
        self
    }

    /// 指针抬起：结束当前拖动，但不闭合。
    pub fn pointer_up(mut self) -> Self {
        self.pointer_held = false;
        self
    }

    /// 显式闭合。点数不足时拒绝，并原样交还多边形。
    pub fn close(mut self) -> Result<Self, CloseRejected> {
        if self.closed {
            return Ok(self);
        }

        if self.points.len() < MIN_POLYGON_POINTS {
            let actual = self.points.len();
            return Err(CloseRejected {
                polygon: self,
                error: SelectionError::TooFewPoints {
                    required: MIN_POLYGON_POINTS,
                    actual,
                },
            });
        }

        self.closed = true;
        self.pointer_held = false;
        log::debug!("✅ 选区已闭合 - {} 个点", self.points.len());
        Ok(self)
    }

    /// 无条件重置为空。
    pub fn reset(self) -> Self {
        Self::default()
    }

    // 新的自然尺寸意味着换了图，旧路径作废
    fn rebase(self, natural: ImageSize) -> Self {
        match self.frame {
            Some(frame) if frame != natural => {
                log::debug!("🔄 图片尺寸由 {} 变为 {}，重置选区", frame, natural);
                Self {
                    frame: Some(natural),
                    ..Self::default()
                }
            }
            _ => Self {
                frame: Some(natural),
                ..self
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::DisplayRect;

    fn surface() -> Surface {
        Surface::unscaled(ImageSize::new(800, 600))
    }

    fn drag(points: &[(f64, f64)]) -> SelectionPolygon {
        let surface = surface();
        let mut polygon = SelectionPolygon::new();
        for (i, (x, y)) in points.iter().enumerate() {
            let at = DisplayPoint::new(*x, *y);
            polygon = if i == 0 {
                polygon.pointer_down(&surface, at)
            } else {
                polygon.pointer_move(&surface, at)
            };
        }
        polygon.pointer_up()
    }

    #[test]
    fn starts_empty() {
        let polygon = SelectionPolygon::new();

        assert_eq!(polygon.state(), CaptureState::Empty);
        assert!(polygon.is_empty());
        assert!(polygon.frame().is_none());
    }

    #[test]
    fn first_pointer_down_enters_drawing() {
        let polygon = SelectionPolygon::new().pointer_down(&surface(), DisplayPoint::new(10.0, 20.0));

        assert_eq!(polygon.state(), CaptureState::Drawing);
        assert_eq!(polygon.points(), &[ImagePoint::new(10.0, 20.0)]);
        assert_eq!(polygon.frame(), Some(ImageSize::new(800, 600)));
        assert!(polygon.is_pointer_held());
    }

    #[test]
    fn moves_only_append_while_pointer_is_held() {
        let surface = surface();
        let polygon = SelectionPolygon::new()
            .pointer_move(&surface, DisplayPoint::new(1.0, 1.0))
            .pointer_down(&surface, DisplayPoint::new(10.0, 10.0))
            .pointer_move(&surface, DisplayPoint::new(20.0, 10.0))
            .pointer_up()
            .pointer_move(&surface, DisplayPoint::new(30.0, 30.0));

        assert_eq!(polygon.len(), 2);
    }

    #[test]
    fn keeps_duplicate_points_at_full_resolution() {
        let polygon = drag(&[(5.0, 5.0), (5.0, 5.0), (5.0, 5.0), (6.0, 5.0)]);

        assert_eq!(polygon.len(), 4);
    }

    #[test]
    fn pointer_down_after_up_continues_the_same_path() {
        let surface = surface();
        let polygon = drag(&[(0.0, 0.0), (10.0, 0.0)])
            .pointer_down(&surface, DisplayPoint::new(10.0, 10.0))
            .pointer_up();

        assert_eq!(polygon.len(), 3);
        assert_eq!(polygon.state(), CaptureState::Drawing);
    }

    #[test]
    fn close_with_three_points_succeeds() {
        let polygon = drag(&[(100.0, 100.0), (300.0, 100.0), (200.0, 300.0)])
            .close()
            .expect("three points should close");

        assert!(polygon.is_closed());
        assert_eq!(polygon.state(), CaptureState::Closed);
        assert_eq!(polygon.closed_points().map(<[ImagePoint]>::len), Some(3));
    }

    #[test]
    fn close_with_too_few_points_is_rejected_and_returns_polygon() {
        let original = drag(&[(0.0, 0.0), (10.0, 10.0)]);

        let rejected = original.clone().close().expect_err("two points must be rejected");

        assert_eq!(rejected.polygon, original);
        assert!(!rejected.polygon.is_closed());
        assert_eq!(
            rejected.error,
            SelectionError::TooFewPoints {
                required: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn closed_polygon_ignores_pointer_events() {
        let surface = surface();
        let closed = drag(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
            .close()
            .expect("close should succeed");

        let after = closed
            .clone()
            .pointer_down(&surface, DisplayPoint::new(50.0, 50.0))
            .pointer_move(&surface, DisplayPoint::new(60.0, 60.0));

        assert_eq!(after, closed);
    }

    #[test]
    fn close_is_idempotent() {
        let closed = drag(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
            .close()
            .expect("close should succeed");

        let again = closed.clone().close().expect("closing twice is allowed");
        assert_eq!(again, closed);
    }

    #[test]
    fn reset_returns_to_empty_from_any_state() {
        let empty = SelectionPolygon::new().reset();
        let drawing = drag(&[(0.0, 0.0), (1.0, 1.0)]).reset();
        let closed = drag(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)])
            .close()
            .expect("close should succeed")
            .reset();

        for polygon in [empty, drawing, closed] {
            assert_eq!(polygon.state(), CaptureState::Empty);
            assert_eq!(polygon.len(), 0);
            assert!(!polygon.is_closed());
        }
    }

    #[test]
    fn scaled_surface_stores_image_space_points() {
        let surface = Surface::new(
            DisplayRect::new(0.0, 0.0, 400.0, 300.0),
            ImageSize::new(800, 600),
        );

        let polygon = SelectionPolygon::new().pointer_down(&surface, DisplayPoint::new(100.0, 100.0));

        assert_eq!(polygon.points(), &[ImagePoint::new(200.0, 200.0)]);
    }

    #[test]
    fn pointer_down_on_a_different_image_restarts_the_path() {
        let other = Surface::unscaled(ImageSize::new(1024, 1024));
        let polygon = drag(&[(0.0, 0.0), (10.0, 0.0)]).pointer_down(&other, DisplayPoint::new(5.0, 5.0));

        assert_eq!(polygon.points(), &[ImagePoint::new(5.0, 5.0)]);
        assert_eq!(polygon.frame(), Some(ImageSize::new(1024, 1024)));
    }

    #[test]
    fn bounds_cover_all_points() {
        let polygon = drag(&[(100.0, 100.0), (300.0, 100.0), (200.0, 300.0)]);

        let (min, max) = polygon.bounds().expect("non-empty polygon has bounds");
        assert_eq!(min, ImagePoint::new(100.0, 100.0));
        assert_eq!(max, ImagePoint::new(300.0, 300.0));
        assert!(SelectionPolygon::new().bounds().is_none());
    }
}
