//! # 图片引用与版本令牌
//!
//! ## 设计思路
//!
//! 图片引用有两种等价表示：可远程获取的地址（locator）与内存中的编码字节（Base64 / Data URL）。
//! 引用只读，从不修改，只会被新引用取代。
//!
//! 编辑服务往往对同一路径覆盖写入结果，而地址又被各级缓存视为稳定资源。
//! 因此“版本”是引用自身的属性：每次编辑成功时生成一次 [`VersionToken`]，
//! 渲染地址时以 `?v=<token>` 追加，任何消费者都不会读到旧缓存。

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::EditError;

/// 版本令牌在地址中使用的查询参数名。
pub const VERSION_PARAM: &str = "v";

/// 允许上传的图片类型。
const UPLOAD_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

static LAST_VERSION_TOKEN: AtomicU64 = AtomicU64::new(0);

/// 缓存区分令牌：基于毫秒时间戳，并保证进程内严格单调递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(u64);

impl VersionToken {
    pub fn next() -> Self {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut prev = LAST_VERSION_TOKEN.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(prev.saturating_add(1));
            match LAST_VERSION_TOKEN.compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Self(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 远程地址（可为绝对 URL，也可为相对路径），可附带版本令牌。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    base: String,
    version: Option<VersionToken>,
}

impl Locator {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            version: None,
        }
    }

    /// 附加（或替换）版本令牌。
    pub fn with_version(self, token: VersionToken) -> Self {
        Self {
            version: Some(token),
            ..self
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn version(&self) -> Option<VersionToken> {
        self.version
    }

    /// 渲染为最终使用的地址字符串；片段（`#...`）保持在末尾。
    pub fn render(&self) -> String {
        let Some(token) = self.version else {
            return self.base.clone();
        };

        let (head, fragment) = match self.base.find('#') {
            Some(idx) => self.base.split_at(idx),
            None => (self.base.as_str(), ""),
        };
        let separator = if head.contains('?') { '&' } else { '?' };

        format!("{}{}{}={}{}", head, separator, VERSION_PARAM, token, fragment)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// 图片引用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// 远程地址，使用前必须先解析为原始字节。
    Locator(Locator),
    /// 内存中的编码图片（Data URL 或纯 Base64）。
    Encoded(String),
}

impl ImageRef {
    pub fn locator(base: impl Into<String>) -> Self {
        Self::Locator(Locator::new(base))
    }

    pub fn encoded(data: impl Into<String>) -> Self {
        Self::Encoded(data.into())
    }

    /// 接收用户上传的图片字节，仅允许 PNG / JPEG / WebP。
    pub fn from_upload(bytes: &[u8]) -> Result<Self, EditError> {
        let kind = infer::get(bytes)
            .ok_or_else(|| EditError::InvalidFormat("无法识别上传文件类型".to_string()))?;

        if !UPLOAD_MIME_TYPES.contains(&kind.mime_type()) {
            return Err(EditError::InvalidFormat(format!(
                "请选择 PNG / JPG / WebP 图片（当前：{}）",
                kind.mime_type()
            )));
        }

        Ok(Self::Encoded(format!(
            "data:{};base64,{}",
            kind.mime_type(),
            general_purpose::STANDARD.encode(bytes)
        )))
    }

    /// 读取本地文件并按上传规则编码。
    pub fn from_file(path: &Path) -> Result<Self, EditError> {
        log::info!("📁 读取本地图片 - 路径: {}", path.display());

        let bytes = std::fs::read(path)
            .map_err(|e| EditError::InvalidFormat(format!("无法读取图片文件 {}：{}", path.display(), e)))?;
        Self::from_upload(&bytes)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Locator(_))
    }

    /// 远程地址附加版本令牌；编码字节本身即唯一，原样返回。
    pub fn versioned(self, token: VersionToken) -> Self {
        match self {
            Self::Locator(locator) => Self::Locator(locator.with_version(token)),
            encoded => encoded,
        }
    }

    /// 显示层使用的 `src` 字符串。
    pub fn to_src(&self) -> String {
        match self {
            Self::Locator(locator) => locator.render(),
            Self::Encoded(data) => data.clone(),
        }
    }

    /// 日志用简短描述，不输出完整 Base64。
    pub fn describe(&self) -> String {
        match self {
            Self::Locator(locator) => locator.render(),
            Self::Encoded(data) => format!("<encoded {} chars>", data.len()),
        }
    }
}
