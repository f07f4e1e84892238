//! # 蒙版光栅化模块
//!
//! ## 设计思路
//!
//! 蒙版尺寸必须与原图自然尺寸完全一致，否则编辑服务会拒绝或错位。
//! 因此光栅化的输入永远是“闭合多边形 + 原图自然尺寸”，输出同尺寸的单通道图。
//!
//! - 可编辑区域 = [`EDITABLE`]（白，255）
//! - 保留区域 = [`PRESERVED`]（黑，0）
//!
//! 边缘保持硬边，不做抗锯齿或羽化，柔化由编辑服务自己负责。
//!
//! ## 实现思路
//!
//! 1. 以保留值填满整张图
//! 2. 对每一行取像素中心 `y + 0.5` 作为扫描线，求与各边（含末点→首点的闭合边）的交点
//! 3. 交点排序后按奇偶规则两两配对，像素中心落在区间内的列写入可编辑值
//! 4. 超出图片范围的部分直接裁剪，不报错

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose};
use fast_image_resize as fr;
use image::{GrayImage, ImageFormat, Luma};

use super::{ImagePoint, ImageSize, MIN_POLYGON_POINTS, SelectionError, SelectionPolygon};

/// 可编辑像素值（白）。
pub const EDITABLE: u8 = 255;
/// 保留像素值（黑）。
pub const PRESERVED: u8 = 0;

/// 二值蒙版：每个像素只可能是 [`EDITABLE`] 或 [`PRESERVED`]。
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    raster: GrayImage,
}

impl BinaryMask {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.raster.width(), self.raster.height())
    }

    /// 坐标越界时视为保留像素。
    pub fn is_editable(&self, x: u32, y: u32) -> bool {
        self.raster
            .get_pixel_checked(x, y)
            .map(|p| p.0[0] == EDITABLE)
            .unwrap_or(false)
    }

    pub fn editable_pixels(&self) -> u64 {
        self.raster.as_raw().iter().filter(|v| **v == EDITABLE).count() as u64
    }

    pub fn total_pixels(&self) -> u64 {
        self.size().pixel_count()
    }

    pub fn as_raster(&self) -> &GrayImage {
        &self.raster
    }

    /// 编码为单通道 PNG。
    pub fn encode_png(&self) -> Result<Vec<u8>, SelectionError> {
        encode_gray_png(&self.raster)
    }

    /// 编码为 PNG 后再做 Base64（不带 `data:` 前缀），即编辑服务的传输格式。
    pub fn encode_base64(&self) -> Result<String, SelectionError> {
        Ok(general_purpose::STANDARD.encode(self.encode_png()?))
    }

    /// 生成用于界面展示的缩略预览（最长边不超过 `max_dimension`）。
    ///
    /// 预览只用于展示，尺寸与原图不同，不能提交给编辑服务。
    pub fn preview(&self, max_dimension: u32) -> Result<GrayImage, SelectionError> {
        let (width, height) = self.raster.dimensions();
        let longest = width.max(height);
        if max_dimension == 0 || longest <= max_dimension {
            return Ok(self.raster.clone());
        }

        let scale = max_dimension as f64 / longest as f64;
        let target_width = ((width as f64 * scale).floor() as u32).max(1);
        let target_height = ((height as f64 * scale).floor() as u32).max(1);

        let resized = match resize_with_fast_image_resize(&self.raster, target_width, target_height) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩放蒙版失败，回退 image::imageops：{}", err);
                image::imageops::resize(
                    &self.raster,
                    target_width,
                    target_height,
                    image::imageops::FilterType::Nearest,
                )
            }
        };

        Ok(binarize(resized))
    }
}

/// 将点序列按闭合多边形光栅化为 `size` 尺寸的蒙版。
///
/// 点数少于 [`MIN_POLYGON_POINTS`] 属于调用方违约，返回错误。
pub fn rasterize(points: &[ImagePoint], size: ImageSize) -> Result<BinaryMask, SelectionError> {
    if points.len() < MIN_POLYGON_POINTS {
        return Err(SelectionError::TooFewPoints {
            required: MIN_POLYGON_POINTS,
            actual: points.len(),
        });
    }
    if size.is_empty() {
        return Err(SelectionError::EmptyRaster(size));
    }

    let mut raster = GrayImage::from_pixel(size.width, size.height, Luma([PRESERVED]));

    let (min_y, max_y) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
    if !min_y.is_finite() || !max_y.is_finite() {
        return Ok(BinaryMask { raster });
    }

    let first_row = (min_y - 0.5).ceil().max(0.0) as u32;
    let end_row = ((max_y - 0.5).floor() + 1.0).clamp(0.0, size.height as f64) as u32;

    let n = points.len();
    let mut crossings: Vec<f64> = Vec::with_capacity(n);

    for row in first_row..end_row {
        let yc = row as f64 + 0.5;
        crossings.clear();

        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            // 半开区间：顶点恰好落在扫描线上时只计一次
            if (a.y <= yc) != (b.y <= yc) {
                let x = a.x + (yc - a.y) * (b.x - a.x) / (b.y - a.y);
                if x.is_finite() {
                    crossings.push(x);
                }
            }
        }

        crossings.sort_by(|l, r| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal));

        for span in crossings.chunks_exact(2) {
            // 像素中心 x + 0.5 ∈ [span[0], span[1])
            let start = (span[0] - 0.5).ceil().clamp(0.0, size.width as f64) as u32;
            let end = (span[1] - 0.5).ceil().clamp(0.0, size.width as f64) as u32;
            for col in start..end {
                raster.put_pixel(col, row, Luma([EDITABLE]));
            }
        }
    }

    Ok(BinaryMask { raster })
}

/// 对闭合多边形做光栅化；未闭合时拒绝。
pub fn rasterize_polygon(
    polygon: &SelectionPolygon,
    size: ImageSize,
) -> Result<BinaryMask, SelectionError> {
    let points = polygon.closed_points().ok_or(SelectionError::NotClosed)?;
    rasterize(points, size)
}

fn encode_gray_png(raster: &GrayImage) -> Result<Vec<u8>, SelectionError> {
    let mut cursor = Cursor::new(Vec::new());
    raster
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| SelectionError::Encode(format!("PNG 编码失败：{}", e)))?;
    Ok(cursor.into_inner())
}

fn resize_with_fast_image_resize(
    raster: &GrayImage,
    target_width: u32,
    target_height: u32,
) -> Result<GrayImage, SelectionError> {
    let src_image = fr::images::Image::from_vec_u8(
        raster.width(),
        raster.height(),
        raster.as_raw().clone(),
        fr::PixelType::U8,
    )
    .map_err(|e| SelectionError::Encode(format!("构建蒙版缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Nearest);

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| SelectionError::Encode(format!("fast_image_resize 执行失败：{}", e)))?;

    GrayImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| SelectionError::Encode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn binarize(mut raster: GrayImage) -> GrayImage {
    for pixel in raster.pixels_mut() {
        pixel.0[0] = if pixel.0[0] >= 128 { EDITABLE } else { PRESERVED };
    }
    raster
}
