//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `EditSession` 持有一次交互会话的全部状态：当前图片、套索选区、蒙版预览缓存与结果历史。
//! 编辑流程拆成三段，只有首尾两段触碰会话状态：
//!
//! ```text
//! prepare（同步，校验前置条件并取快照）
//!    │
//!    ▼
//! execute（异步，无会话借用）: resolve → mask → submit → version → 读取结果尺寸
//!    │
//!    ▼
//! commit（同步，一次性替换当前图片 + 重置选区 + 写入历史）
//! ```
//!
//! 失败只可能发生在前两段，而它们不修改会话，因此失败后当前图片、选区与历史保持原样，
//! 用户可原样重试；不存在“部分成功”。
//!
//! ## 实现思路
//!
//! - 指针事件先经坐标映射转为图片坐标，再交给多边形状态机。
//! - 会话记录当前图片的自然尺寸；来自其他尺寸表面的指针事件直接忽略，
//!   预览蒙版也按该尺寸光栅化，保证蒙版与原图同尺寸。
//! - 编辑成功后读取一次结果图片的尺寸，作为下一轮的自然尺寸（同时预热取图缓存）。
//! - 记录 `resolve/mask/submit/total` 阶段耗时，便于性能诊断。

use std::io::Cursor;
use std::time::Instant;

use chrono::Utc;

use super::pipeline::{build_mask_payload, encode_source, inspect_source};
use super::{
    EditConfig, EditEndpoint, EditError, EditRecord, EditRequest, ImageFetcher, ImageRef, ResultHistory,
    SizeHint, VersionToken,
};
use crate::selection::{
    BinaryMask, CaptureState, DisplayPoint, ImageSize, SelectionError, SelectionPolygon, Surface,
    rasterize_polygon,
};

/// 蒙版预览。
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPreview {
    /// 全尺寸蒙版（与原图一致）。
    pub mask: BinaryMask,
    /// 缩略图尺寸。
    pub preview_size: ImageSize,
    /// 缩略图 PNG 字节。
    pub png: Vec<u8>,
}

/// 已通过前置校验、可以执行的编辑。
#[derive(Debug, Clone)]
pub struct PreparedEdit {
    pub source: ImageRef,
    pub polygon: SelectionPolygon,
    pub instruction: String,
    pub size: SizeHint,
}

/// 单个编辑会话。
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    current: Option<ImageRef>,
    natural: Option<ImageSize>,
    polygon: SelectionPolygon,
    preview: Option<MaskPreview>,
    history: ResultHistory,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ImageRef> {
        self.current.as_ref()
    }

    /// 当前图片的自然尺寸；结果图片尺寸读取失败时为 `None`。
    pub fn natural_size(&self) -> Option<ImageSize> {
        self.natural
    }

    pub fn polygon(&self) -> &SelectionPolygon {
        &self.polygon
    }

    pub fn capture_state(&self) -> CaptureState {
        self.polygon.state()
    }

    pub fn history(&self) -> &ResultHistory {
        &self.history
    }

    /// 挂载新原图，选区随之作废。
    pub fn load_image(&mut self, reference: ImageRef, natural: ImageSize) {
        log::info!("🖼️ 载入原图 - {} 尺寸: {}", reference.describe(), natural);
        self.current = Some(reference);
        self.natural = Some(natural);
        self.reset_selection();
    }

    pub fn pointer_down(&mut self, surface: &Surface, at: DisplayPoint) {
        if self.current.is_none() {
            log::debug!("⚠️ 尚未载入原图，忽略 pointer_down");
            return;
        }
        if !self.accepts_surface(surface) {
            return;
        }

        let before = self.polygon.len();
        self.polygon = std::mem::take(&mut self.polygon).pointer_down(surface, at);
        self.invalidate_preview_if_changed(before);
    }

    pub fn pointer_move(&mut self, surface: &Surface, at: DisplayPoint) {
        if !self.accepts_surface(surface) {
            return;
        }

        let before = self.polygon.len();
        self.polygon = std::mem::take(&mut self.polygon).pointer_move(surface, at);
        self.invalidate_preview_if_changed(before);
    }

    pub fn pointer_up(&mut self) {
        self.polygon = std::mem::take(&mut self.polygon).pointer_up();
    }

    /// 显式闭合选区；点数不足时选区保持原样。
    pub fn close_selection(&mut self) -> Result<(), EditError> {
        match std::mem::take(&mut self.polygon).close() {
            Ok(closed) => {
                self.polygon = closed;
                Ok(())
            }
            Err(rejected) => {
                self.polygon = rejected.polygon;
                Err(EditError::Selection(rejected.error))
            }
        }
    }

    pub fn reset_selection(&mut self) {
        self.polygon = std::mem::take(&mut self.polygon).reset();
        self.preview = None;
    }

    /// 生成（或复用）蒙版预览。未闭合但点数足够时自动闭合。
    pub fn preview_mask(&mut self, config: &EditConfig) -> Result<&MaskPreview, EditError> {
        if self.current.is_none() {
            return Err(EditError::NoSourceImage);
        }

        if !self.polygon.is_closed() {
            self.close_selection()?;
        }

        let frame = self
            .polygon
            .frame()
            .ok_or_else(|| EditError::State("选区缺少坐标系".to_string()))?;
        let size = self.natural.unwrap_or(frame);
        if frame != size {
            return Err(EditError::DimensionMismatch {
                mask: frame,
                image: size,
            });
        }

        let preview = match self.preview.take() {
            Some(cached) if cached.mask.size() == size => cached,
            _ => {
                let mask = rasterize_polygon(&self.polygon, size)?;
                let thumbnail = mask.preview(config.preview_max_dimension)?;
                let preview_size = ImageSize::new(thumbnail.width(), thumbnail.height());
                let mut png = Cursor::new(Vec::new());
                thumbnail
                    .write_to(&mut png, image::ImageFormat::Png)
                    .map_err(|e| SelectionError::Encode(format!("预览 PNG 编码失败：{}", e)))?;
                let png = png.into_inner();

                log::debug!(
                    "🎭 生成蒙版预览 - 原尺寸: {} 预览: {} 可编辑像素: {}",
                    size,
                    preview_size,
                    mask.editable_pixels()
                );

                MaskPreview {
                    mask,
                    preview_size,
                    png,
                }
            }
        };

        Ok(self.preview.insert(preview))
    }

    /// 将历史中的某个结果设为当前图片。历史本身不变。
    pub fn promote(&mut self, index: usize) -> Result<&ImageRef, EditError> {
        let (reference, natural) = self
            .history
            .get(index)
            .map(|record| (record.result.clone(), record.result_size))
            .ok_or_else(|| EditError::State(format!("历史记录不存在：#{}", index)))?;

        log::info!("⬆️ 使用历史结果作为原图 - #{}", index);
        self.current = Some(reference);
        self.natural = natural;
        self.reset_selection();

        self.current
            .as_ref()
            .ok_or_else(|| EditError::State("当前图片丢失".to_string()))
    }

    /// 校验前置条件并取快照。不发生任何 I/O，也不修改会话。
    pub fn prepare(&self, instruction: impl Into<String>, size: SizeHint) -> Result<PreparedEdit, EditError> {
        let source = self.current.clone().ok_or(EditError::NoSourceImage)?;

        if !self.polygon.is_closed() {
            return Err(EditError::SelectionNotClosed);
        }

        Ok(PreparedEdit {
            source,
            polygon: self.polygon.clone(),
            instruction: instruction.into(),
            size,
        })
    }

    /// 提交成功结果：替换当前图片、重置选区、写入历史。
    pub fn commit(&mut self, record: EditRecord) -> Result<&EditRecord, EditError> {
        if self.current.as_ref() != Some(&record.source) {
            return Err(EditError::State("编辑期间原图已被替换，结果已丢弃".to_string()));
        }

        self.current = Some(record.result.clone());
        self.natural = record.result_size;
        self.reset_selection();
        self.history.push_front(record);

        self.history
            .latest()
            .ok_or_else(|| EditError::State("历史记录写入失败".to_string()))
    }

    /// 完整执行一次编辑（单一所有者场景）。
    pub async fn apply_edit<F, E>(
        &mut self,
        instruction: impl Into<String>,
        size: SizeHint,
        fetcher: &F,
        endpoint: &E,
        config: &EditConfig,
    ) -> Result<&EditRecord, EditError>
    where
        F: ImageFetcher,
        E: EditEndpoint,
    {
        let prepared = self.prepare(instruction, size)?;
        let record = execute(prepared, fetcher, endpoint, config).await?;
        self.commit(record)
    }

    // 尺寸未知（结果图片读取失败）时退回表面给出的尺寸，由 execute 的尺寸校验兜底
    fn accepts_surface(&self, surface: &Surface) -> bool {
        match self.natural {
            Some(natural) if natural != surface.natural => {
                log::debug!("⚠️ 指针事件来自 {} 的表面，当前图片为 {}，已忽略", surface.natural, natural);
                false
            }
            _ => true,
        }
    }

    fn invalidate_preview_if_changed(&mut self, before: usize) {
        if self.polygon.len() != before {
            self.preview = None;
        }
    }
}

/// 执行编辑：取图 → 生成蒙版 → 提交 → 附加版本号。
///
/// 严格顺序执行，任一步失败立即返回，不触碰任何会话状态。
pub async fn execute<F, E>(
    prepared: PreparedEdit,
    fetcher: &F,
    endpoint: &E,
    config: &EditConfig,
) -> Result<EditRecord, EditError>
where
    F: ImageFetcher,
    E: EditEndpoint,
{
    let total_start = Instant::now();

    let resolve_start = Instant::now();
    let source_bytes = fetcher.fetch(&prepared.source, config).await?;
    let source_size = inspect_source(&source_bytes, config)?;
    let resolve_elapsed = resolve_start.elapsed();

    let mask_start = Instant::now();
    let payload = build_mask_payload(&prepared.polygon, source_size)?;
    let mask_elapsed = mask_start.elapsed();

    let submit_start = Instant::now();
    let request = EditRequest {
        image_b64: encode_source(&source_bytes),
        mask_b64: payload.mask_b64.clone(),
        prompt: prepared.instruction.clone(),
        size: prepared.size,
    };
    let response = endpoint.submit(&request, config).await?;
    let result = response.into_result()?;
    let submit_elapsed = submit_start.elapsed();

    let result = result.versioned(VersionToken::next());

    let publish_start = Instant::now();
    let result_size = match fetcher.fetch(&result, config).await {
        Ok(bytes) => inspect_source(&bytes, config),
        Err(err) => Err(err),
    };
    let result_size = match result_size {
        Ok(size) => Some(size),
        Err(err) => {
            log::warn!("⚠️ 无法读取结果图片尺寸 - {}: {}", result.describe(), err);
            None
        }
    };
    let publish_elapsed = publish_start.elapsed();

    let total_elapsed = total_start.elapsed();
    log::info!(
        "✅ 局部编辑完成 - resolve={}ms mask={}ms submit={}ms publish={}ms total={}ms 原图尺寸: {} 可编辑像素: {}",
        resolve_elapsed.as_millis(),
        mask_elapsed.as_millis(),
        submit_elapsed.as_millis(),
        publish_elapsed.as_millis(),
        total_elapsed.as_millis(),
        source_size,
        payload.editable_pixels()
    );

    Ok(EditRecord {
        source: prepared.source,
        selection: prepared.polygon.points().to_vec(),
        mask_size: payload.size(),
        editable_pixels: payload.editable_pixels(),
        instruction: prepared.instruction,
        result,
        result_size,
        timestamp: Utc::now(),
    })
}
