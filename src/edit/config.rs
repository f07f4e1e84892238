//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `EditConfig`：编辑服务地址、取图阶段的超时与安全策略、
//! 资源上限以及蒙版预览尺寸。每次编辑开始时取一份快照，运行中修改配置不影响进行中的编辑。
//!
//! ## 实现思路
//!
//! - `Default` 提供可直接使用的本地开发配置。
//! - `#[serde(default)]` 允许配置文件只写需要覆盖的字段。
//! - `validate` 在加载与更新时统一做范围校验。

use serde::{Deserialize, Serialize};

use super::{EditError, SizeHint};

/// 编辑流水线配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// 编辑服务地址（POST JSON）。
    pub endpoint_url: String,
    /// 相对地址（如 `/r/42.png`）的解析基准；为空时使用编辑服务地址。
    pub asset_base_url: Option<String>,
    /// 编辑服务整体超时（秒）。生成模型往往较慢，默认值较宽松。
    pub endpoint_timeout: u64,
    /// 取图下载超时（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 是否对域名执行 DNS 解析后再做内网 IP 拦截。
    pub resolve_dns_for_url_safety: bool,
    /// 原图字节上限。
    pub max_file_size: u64,
    /// 原图像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 蒙版预览单边最大值。
    pub preview_max_dimension: u32,
    /// 已解析远程图片的缓存条数（仅缓存带版本号的地址）。
    pub resolved_cache_entries: usize,
    /// 默认输出尺寸提示。
    pub default_size_hint: SizeHint,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:8000/api/edit_lasso".to_string(),
            asset_base_url: None,
            endpoint_timeout: 300,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            resolve_dns_for_url_safety: true,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            preview_max_dimension: 512,
            resolved_cache_entries: 8,
            default_size_hint: SizeHint::Natural,
        }
    }
}

impl EditConfig {
    /// 校验配置取值范围。
    pub fn validate(&self) -> Result<(), EditError> {
        let endpoint = reqwest::Url::parse(&self.endpoint_url)
            .map_err(|e| EditError::InvalidFormat(format!("编辑服务地址无效：{}", e)))?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            return Err(EditError::InvalidFormat("编辑服务仅支持 HTTP/HTTPS".to_string()));
        }

        if let Some(base) = &self.asset_base_url {
            reqwest::Url::parse(base)
                .map_err(|e| EditError::InvalidFormat(format!("资源基准地址无效：{}", e)))?;
        }

        if !(1..=3600).contains(&self.endpoint_timeout) {
            return Err(EditError::InvalidFormat("编辑服务超时需在 1~3600 秒之间".to_string()));
        }

        if !(1..=300).contains(&self.download_timeout) {
            return Err(EditError::InvalidFormat("下载超时需在 1~300 秒之间".to_string()));
        }

        if !(1..=60).contains(&self.connect_timeout) || self.connect_timeout > self.download_timeout {
            return Err(EditError::InvalidFormat(
                "连接超时需在 1~60 秒之间且不大于下载超时".to_string(),
            ));
        }

        if self.stream_first_byte_timeout_ms == 0 || self.stream_chunk_timeout_ms == 0 {
            return Err(EditError::InvalidFormat("流式读取超时必须大于 0".to_string()));
        }

        if self.max_redirects > 20 {
            return Err(EditError::InvalidFormat("最大重定向次数不能超过 20".to_string()));
        }

        if self.max_file_size == 0 || self.max_decoded_pixels == 0 {
            return Err(EditError::InvalidFormat("资源上限必须大于 0".to_string()));
        }

        if !(16..=4096).contains(&self.preview_max_dimension) {
            return Err(EditError::InvalidFormat("蒙版预览尺寸需在 16~4096 之间".to_string()));
        }

        Ok(())
    }

    /// 相对地址的解析基准。
    pub fn asset_base(&self) -> &str {
        self.asset_base_url.as_deref().unwrap_or(&self.endpoint_url)
    }
}
