//! # 结果历史
//!
//! 只追加、不删除、不修改；最新的记录在最前。
//! 历史仅用于展示，不会自动回流为下一次编辑的原图。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ImageRef;
use crate::selection::{ImagePoint, ImageSize};

/// 一次成功编辑的记录。
///
/// 蒙版本身不持久化，只保留生成它的选区点与统计信息，需要时可重新光栅化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditRecord {
    pub source: ImageRef,
    pub selection: Vec<ImagePoint>,
    pub mask_size: ImageSize,
    pub editable_pixels: u64,
    pub instruction: String,
    pub result: ImageRef,
    /// 结果图片的自然尺寸；结果无法读取时为 `None`。
    pub result_size: Option<ImageSize>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultHistory {
    records: VecDeque<EditRecord>,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_front(&mut self, record: EditRecord) {
        self.records.push_front(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EditRecord> {
        self.records.get(index)
    }

    pub fn latest(&self) -> Option<&EditRecord> {
        self.records.front()
    }

    /// 从新到旧遍历。
    pub fn iter(&self) -> impl Iterator<Item = &EditRecord> {
        self.records.iter()
    }

    /// 从新到旧的结果引用。
    pub fn results(&self) -> Vec<ImageRef> {
        self.records.iter().map(|record| record.result.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(result: &str) -> EditRecord {
        EditRecord {
            source: ImageRef::locator("/src.png"),
            selection: vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(1.0, 0.0), ImagePoint::new(0.0, 1.0)],
            mask_size: ImageSize::new(2, 2),
            editable_pixels: 1,
            instruction: String::new(),
            result: ImageRef::locator(result),
            result_size: Some(ImageSize::new(2, 2)),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn most_recent_entry_comes_first() {
        let mut history = ResultHistory::new();
        history.push_front(record("/r/1.png"));
        history.push_front(record("/r/2.png"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().map(|r| r.result.to_src()), Some("/r/2.png".to_string()));
        assert_eq!(
            history.results(),
            vec![ImageRef::locator("/r/2.png"), ImageRef::locator("/r/1.png")]
        );
    }

    #[test]
    fn record_serializes_with_timestamp() {
        let json = serde_json::to_value(record("/r/1.png")).expect("serialize failed");

        assert_eq!(json["result"]["kind"], "locator");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["mask_size"]["width"], 2);
    }
}
