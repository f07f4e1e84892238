//! # 编辑服务接口
//!
//! ## 设计思路
//!
//! 编辑服务是外部的 AI 图像编辑 HTTP 服务，一次请求只等待一次响应：
//!
//! ```text
//! POST {endpoint_url}
//! {"image_b64": "...", "mask_b64": "...", "prompt": "add a bench", "size": "natural"}
//!
//! 200 {"ok": true,  "resultPath": "/r/42.png"}
//! 200 {"ok": false, "detail": "model overloaded"}
//! 5xx {"detail": "..."}
//! ```
//!
//! 接口以 trait 暴露，编排层不关心传输细节，测试中可直接替换为内存实现。
//! 失败不自动重试，原样上报。

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{EditConfig, EditError, ImageRef};

static SIZE_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,5})\s*[xX×]\s*(\d{1,5})$").expect("size hint regex must compile")
});

/// 输出尺寸提示。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeHint {
    /// 与原图自然尺寸一致。
    #[default]
    Natural,
    Exact { width: u32, height: u32 },
}

impl fmt::Display for SizeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Natural => f.write_str("natural"),
            Self::Exact { width, height } => write!(f, "{}x{}", width, height),
        }
    }
}

impl FromStr for SizeHint {
    type Err = EditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim();
        if normalized.eq_ignore_ascii_case("natural") {
            return Ok(Self::Natural);
        }

        let invalid = || EditError::InvalidFormat(format!("未知尺寸提示：{}（可选：natural / 宽x高）", normalized));
        let caps = SIZE_HINT_RE.captures(normalized).ok_or_else(invalid)?;
        let width: u32 = caps[1].parse().map_err(|_| invalid())?;
        let height: u32 = caps[2].parse().map_err(|_| invalid())?;

        if width == 0 || height == 0 {
            return Err(invalid());
        }

        Ok(Self::Exact { width, height })
    }
}

impl Serialize for SizeHint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SizeHint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 提交给编辑服务的请求体。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditRequest {
    /// 原图字节（Base64，无 Data URL 前缀）。
    pub image_b64: String,
    /// 蒙版 PNG（Base64，无前缀）；白色可编辑，黑色保留。
    pub mask_b64: String,
    /// 编辑指令，允许为空。
    pub prompt: String,
    pub size: SizeHint,
}

/// 编辑服务响应体。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, rename = "resultPath", alias = "result_path", skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_b64: Option<String>,
    /// 错误详情；可能是字符串，也可能是结构化对象。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl EditResponse {
    pub fn success(result_path: impl Into<String>) -> Self {
        Self {
            ok: true,
            result_path: Some(result_path.into()),
            ..Self::default()
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            detail: Some(serde_json::Value::String(detail.into())),
            ..Self::default()
        }
    }

    /// 错误详情的可读文本；缺失时退回整个响应体。
    pub fn detail_message(&self) -> String {
        match &self.detail {
            Some(serde_json::Value::String(text)) if !text.trim().is_empty() => text.clone(),
            Some(serde_json::Value::Null) | None => {
                serde_json::to_string(self).unwrap_or_else(|_| "未知错误".to_string())
            }
            Some(other) => other.to_string(),
        }
    }

    /// 解析为新的图片引用。
    pub fn into_result(self) -> Result<ImageRef, EditError> {
        if !self.ok {
            return Err(EditError::Endpoint(self.detail_message()));
        }

        if let Some(path) = self.result_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(ImageRef::locator(path));
        }

        if let Some(data) = self.result_b64.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            return Ok(ImageRef::encoded(data));
        }

        Err(EditError::MalformedResponse("响应 ok=true 但缺少结果图片".to_string()))
    }
}

/// 外部编辑服务。
pub trait EditEndpoint: Send + Sync {
    fn submit(
        &self,
        request: &EditRequest,
        config: &EditConfig,
    ) -> impl Future<Output = Result<EditResponse, EditError>> + Send;
}

/// 基于 reqwest 的编辑服务客户端。
#[derive(Debug, Clone)]
pub struct HttpEditEndpoint {
    client: reqwest::Client,
}

impl HttpEditEndpoint {
    pub fn new(config: &EditConfig) -> Result<Self, EditError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.endpoint_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| EditError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client })
    }

    fn map_reqwest_error(e: reqwest::Error, config: &EditConfig) -> EditError {
        if e.is_timeout() {
            EditError::Timeout(format!("编辑服务超时（{}秒）", config.endpoint_timeout))
        } else if e.is_connect() {
            EditError::Network(format!("无法连接编辑服务：{}", e.without_url()))
        } else {
            EditError::Network(format!("编辑请求失败：{}", e.without_url()))
        }
    }
}

impl EditEndpoint for HttpEditEndpoint {
    async fn submit(&self, request: &EditRequest, config: &EditConfig) -> Result<EditResponse, EditError> {
        log::info!(
            "🚀 提交编辑请求 - 指令长度: {}, 尺寸: {}, 图片: {} chars, 蒙版: {} chars",
            request.prompt.chars().count(),
            request.size,
            request.image_b64.len(),
            request.mask_b64.len()
        );

        let response = self
            .client
            .post(&config.endpoint_url)
            .timeout(Duration::from_secs(config.endpoint_timeout))
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_reqwest_error(e, config))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::map_reqwest_error(e, config))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<EditResponse>(&body)
                .ok()
                .and_then(|parsed| parsed.detail.is_some().then(|| parsed.detail_message()))
                .unwrap_or_else(|| body.trim().to_string());

            log::warn!("⚠️ 编辑服务返回 HTTP {}", status.as_u16());
            return Err(EditError::Endpoint(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        serde_json::from_str(&body)
            .map_err(|e| EditError::MalformedResponse(format!("无法解析响应 JSON：{}", e)))
    }
}
