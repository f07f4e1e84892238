//! # 蒙版与原图准备流水线
//!
//! ## 设计思路
//!
//! 编辑请求需要两份字节：原图本身与同尺寸蒙版。
//! 原图字节原样提交，不重新编码；这里只读取图片头获取自然尺寸并做像素上限检查，
//! 避免为了拿尺寸而完整解码大图。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限快速拒绝
//! 3. 选区坐标系（`frame`）必须与原图实际尺寸一致，否则属于内部不变量被破坏
//! 4. 按原图尺寸光栅化蒙版，再次核对尺寸后编码

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose};

use super::{EditConfig, EditError};
use crate::selection::{BinaryMask, ImageSize, SelectionPolygon, rasterize_polygon};

/// 已编码、可直接提交的蒙版。
#[derive(Debug, Clone)]
pub struct MaskPayload {
    pub mask: BinaryMask,
    pub mask_b64: String,
}

impl MaskPayload {
    pub fn size(&self) -> ImageSize {
        self.mask.size()
    }

    pub fn editable_pixels(&self) -> u64 {
        self.mask.editable_pixels()
    }
}

/// 读取原图自然尺寸并校验像素上限。
pub fn inspect_source(bytes: &[u8], config: &EditConfig) -> Result<ImageSize, EditError> {
    let (width, height) = inspect_dimensions_from_memory(bytes)?;
    validate_pixel_limits(config, width, height)?;

    let size = ImageSize::new(width, height);
    if size.is_empty() {
        return Err(EditError::Decode("图片尺寸为 0".to_string()));
    }

    Ok(size)
}

/// 原图字节编码为传输格式（Base64，无前缀）。
pub fn encode_source(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// 按原图实际尺寸生成并编码蒙版。
pub fn build_mask_payload(polygon: &SelectionPolygon, source: ImageSize) -> Result<MaskPayload, EditError> {
    if !polygon.is_closed() {
        return Err(EditError::SelectionNotClosed);
    }

    if let Some(frame) = polygon.frame() {
        if frame != source {
            return Err(EditError::DimensionMismatch {
                mask: frame,
                image: source,
            });
        }
    }

    let mask = rasterize_polygon(polygon, source)?;
    if mask.size() != source {
        return Err(EditError::DimensionMismatch {
            mask: mask.size(),
            image: source,
        });
    }

    let mask_b64 = mask.encode_base64()?;
    Ok(MaskPayload { mask, mask_b64 })
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), EditError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EditError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    if reader.format().is_none() {
        return Err(EditError::InvalidFormat("不支持的图片格式".to_string()));
    }

    reader
        .into_dimensions()
        .map_err(|e| EditError::Decode(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &EditConfig, width: u32, height: u32) -> Result<(), EditError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| EditError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(EditError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}
