//! # 取图与校验模块
//!
//! ## 设计思路
//!
//! 把“当前图片引用”解析为原始字节，并在尽可能早的阶段执行输入校验，尽快失败。
//!
//! ## 实现思路
//!
//! - 远程地址：相对路径按 `asset_base` 拼接 → 协议 + 主机安全 → 手动跟随重定向（逐跳复检）
//!   → 状态码 / 内容类型 / 体积校验 → 流式下载 + 首包/分块超时 → 文件签名校验。
//! - 编码字节：Data URL / 纯 Base64 解析，解码前先估算体积。
//! - 带版本号的地址内容不可变，下载结果进入 LRU 缓存；无版本号的地址每次都重新获取。
//! - 失败不自动重试，统一映射为 `EditError` 交给上层。

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use lru::LruCache;
use tokio::net::lookup_host;

use super::{EditConfig, EditError, ImageRef, Locator};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;
const USER_AGENT: &str = concat!("lasso-edit/", env!("CARGO_PKG_VERSION"));

/// 图片字节来源。
pub trait ImageFetcher: Send + Sync {
    fn fetch(
        &self,
        reference: &ImageRef,
        config: &EditConfig,
    ) -> impl Future<Output = Result<Vec<u8>, EditError>> + Send;
}

/// 基于 reqwest 的取图实现。
pub struct HttpFetcher {
    resolved_cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl HttpFetcher {
    pub fn new(config: &EditConfig) -> Self {
        let capacity = NonZeroUsize::new(config.resolved_cache_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            resolved_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 从远程地址加载图片原始字节。
    async fn load_from_locator(&self, locator: &Locator, config: &EditConfig) -> Result<Vec<u8>, EditError> {
        let url = Self::resolve_locator_url(locator, config)?;
        let cacheable = locator.version().is_some();

        if cacheable {
            if let Some(cached) = self.get_cached(url.as_str()) {
                log::debug!("♻️ 命中取图缓存 - URL: {}", Self::redact_url_for_log(url.as_str()));
                return Ok(cached);
            }
        }

        log::info!("🌐 开始下载图片 - URL: {}", Self::redact_url_for_log(url.as_str()));

        Self::validate_url_safety(url.as_str(), config).await?;
        let bytes = Self::download_with_validation(url.clone(), config).await?;
        Self::validate_image_signature(&bytes)?;

        if cacheable {
            self.store_cached(url.as_str(), &bytes);
        }

        Ok(bytes)
    }

    /// 从 Base64 / Data URL 加载图片原始字节。
    fn load_from_encoded(data: &str, config: &EditConfig) -> Result<Vec<u8>, EditError> {
        log::debug!("📝 开始处理 base64 图片");

        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(EditError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(bytes)
    }

    /// 相对地址按资源基准拼接为绝对地址。
    fn resolve_locator_url(locator: &Locator, config: &EditConfig) -> Result<reqwest::Url, EditError> {
        let rendered = locator.render();

        if rendered.contains("://") {
            return reqwest::Url::parse(&rendered)
                .map_err(|e| EditError::InvalidFormat(format!("URL 格式错误：{}", e)));
        }

        let base = reqwest::Url::parse(config.asset_base())
            .map_err(|e| EditError::InvalidFormat(format!("资源基准地址无效：{}", e)))?;
        base.join(&rendered)
            .map_err(|e| EditError::InvalidFormat(format!("URL 拼接失败：{}", e)))
    }

    /// 执行带校验的网络下载。
    ///
    /// 使用流式读取，避免一次性读入导致内存峰值过高。
    async fn download_with_validation(url: reqwest::Url, config: &EditConfig) -> Result<Vec<u8>, EditError> {
        let mut current_url = url;

        for redirect_count in 0..=config.max_redirects {
            let client = Self::build_client_for_url(&current_url, config).await?;

            log::debug!("📡 发送 HTTP 请求...");
            let response = client
                .get(current_url.clone())
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/png,image/*,*/*;q=0.8")
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await
                .map_err(|e| Self::map_reqwest_error(e, current_url.as_str(), config))?;

            if response.status().is_redirection() {
                if redirect_count >= config.max_redirects {
                    return Err(EditError::Network(format!(
                        "重定向次数超过限制（{}）",
                        config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| EditError::Network("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| EditError::InvalidFormat(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| EditError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(next_url.as_str(), config).await?;

                log::debug!("↪️ 跳转到: {}", Self::redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(EditError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    Self::status_message(response.status().as_u16())
                )));
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !Self::is_image_content_type(ct_str) {
                        return Err(EditError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                    }
                }
            }

            let total_len = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|cl| cl.to_str().ok())
                .and_then(|cl| cl.parse::<u64>().ok());

            if let Some(size) = total_len {
                if size > config.max_file_size {
                    return Err(EditError::ResourceLimit(format!(
                        "文件过大：{:.2} MB（限制：{:.2} MB）",
                        size as f64 / 1024.0 / 1024.0,
                        config.max_file_size as f64 / 1024.0 / 1024.0
                    )));
                }
            }

            return Self::read_body_with_limits(response, total_len, config).await;
        }

        Err(EditError::Network("下载流程异常结束".to_string()))
    }

    async fn read_body_with_limits(
        mut response: reqwest::Response,
        total_len: Option<u64>,
        config: &EditConfig,
    ) -> Result<Vec<u8>, EditError> {
        let initial_capacity = total_len
            .map(|len| len.min(config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(config.stream_first_byte_timeout_ms)
            };

            let next_chunk_result = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        EditError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        EditError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk_result
                .map_err(|e| EditError::Network(format!("下载失败：{}", e.without_url())))?
            else {
                break;
            };

            received_first_chunk = true;

            total = total.saturating_add(chunk.len() as u64);
            if total > config.max_file_size {
                return Err(EditError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated = Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    /// 构建 HTTP 客户端；开启 DNS 校验时把域名钉到已校验的公网地址，防止二次解析绕过。
    async fn build_client_for_url(url: &reqwest::Url, config: &EditConfig) -> Result<reqwest::Client, EditError> {
        let builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none());

        let pinned = match url.host_str() {
            Some(host)
                if !config.allow_private_network
                    && !Self::is_trusted_origin(url, config)
                    && config.resolve_dns_for_url_safety
                    && host.parse::<IpAddr>().is_err() =>
            {
                let port = url
                    .port_or_known_default()
                    .ok_or_else(|| EditError::InvalidFormat("URL 缺少端口信息".to_string()))?;
                let addrs = Self::resolve_public_socket_addrs(host, port).await?;
                let addr = addrs
                    .first()
                    .copied()
                    .ok_or_else(|| EditError::InvalidFormat("URL 未解析到有效公网地址".to_string()))?;
                Some((host.to_string(), addr))
            }
            _ => None,
        };

        let builder = match pinned {
            Some((host, addr)) => builder.resolve(&host, addr),
            None => builder,
        };

        builder
            .build()
            .map_err(|e| EditError::Network(format!("无法创建 HTTP 客户端：{}", e)))
    }

    async fn resolve_public_socket_addrs(host: &str, port: u16) -> Result<Vec<SocketAddr>, EditError> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| EditError::InvalidFormat(format!("URL 主机解析失败：{}", e)))?;

        let mut result = Vec::new();
        for addr in addrs {
            if Self::is_private_or_local_ip(addr.ip()) {
                return Err(EditError::InvalidFormat(format!(
                    "URL 解析结果命中内网地址：{}",
                    addr.ip()
                )));
            }

            result.push(addr);
        }

        Ok(result)
    }

    fn is_image_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// 日志用地址：去掉查询串与片段（版本号、签名令牌都在其中）。
    pub(crate) fn redact_url_for_log(url: &str) -> String {
        let Ok(parsed) = reqwest::Url::parse(url) else {
            return if url.starts_with('/') {
                url.split(['?', '#']).next().unwrap_or(url).to_string()
            } else {
                "<invalid-url>".to_string()
            };
        };

        let host = parsed.host_str().unwrap_or("<unknown-host>");
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = parsed.path();

        format!("{}://{}{}{}", parsed.scheme(), host, port, path)
    }

    fn get_cached(&self, url: &str) -> Option<Vec<u8>> {
        let mut cache = self.resolved_cache.lock().ok()?;
        cache.get(url).cloned()
    }

    fn store_cached(&self, url: &str, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        if let Ok(mut cache) = self.resolved_cache.lock() {
            cache.put(url.to_string(), bytes.to_vec());
        }
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标，防止 SSRF 风险。
    async fn validate_url_safety(url: &str, config: &EditConfig) -> Result<(), EditError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| EditError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(EditError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network || Self::is_trusted_origin(&parsed, config) {
            return Ok(());
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| EditError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if Self::is_local_hostname(host) {
            return Err(EditError::InvalidFormat(format!("禁止访问本地网络地址：{}", host)));
        }

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            if Self::is_private_or_local_ip(ip) {
                return Err(EditError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }

            return Ok(());
        }

        if config.resolve_dns_for_url_safety {
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| EditError::InvalidFormat("URL 缺少端口信息".to_string()))?;

            if Self::resolve_public_socket_addrs(host, port).await?.is_empty() {
                return Err(EditError::InvalidFormat("URL 未解析到有效地址".to_string()));
            }
        }

        Ok(())
    }

    /// 目标是否与编辑服务或资源基准同源（协议 + 主机 + 端口）。
    ///
    /// 这两个地址来自配置，结果地址也由编辑服务签发，不属于不可信输入，
    /// 即使位于本机或内网也放行；重定向到其他主机仍逐跳校验。
    fn is_trusted_origin(url: &reqwest::Url, config: &EditConfig) -> bool {
        [config.endpoint_url.as_str(), config.asset_base()]
            .into_iter()
            .filter_map(|raw| reqwest::Url::parse(raw).ok())
            .any(|trusted| {
                trusted.scheme() == url.scheme()
                    && trusted.port_or_known_default() == url.port_or_known_default()
                    && match (trusted.host_str(), url.host_str()) {
                        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                        _ => false,
                    }
            })
    }

    fn is_local_hostname(host: &str) -> bool {
        host.eq_ignore_ascii_case("localhost") || host.eq_ignore_ascii_case("localhost.") || host.ends_with(".local")
    }

    /// 判断 IP 是否属于本地/内网/链路本地等受限范围。
    fn is_private_or_local_ip(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_private()
                    || v4.is_loopback()
                    || v4.is_link_local()
                    || v4.is_broadcast()
                    || v4.is_documentation()
                    || v4.is_unspecified()
                    || v4.is_multicast()
                {
                    return true;
                }

                let octets = v4.octets();
                octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
            }
            IpAddr::V6(v6) => {
                v6.is_loopback()
                    || v6.is_unspecified()
                    || v6.is_unique_local()
                    || v6.is_unicast_link_local()
                    || v6.is_multicast()
            }
        }
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, EditError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| EditError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| EditError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 Base64 输入（支持 Data URL / 纯 Base64），解码前先按上限估算体积。
    fn parse_base64_with_limit(data: &str, max_file_size: u64) -> Result<Vec<u8>, EditError> {
        let normalized = data.trim();

        let payload = if normalized.starts_with("data:") {
            let base64_start = normalized
                .find(";base64,")
                .ok_or_else(|| EditError::InvalidFormat("缺少 base64 标记".to_string()))?;
            &normalized[base64_start + 8..]
        } else {
            normalized
        };

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(EditError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| EditError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error, url: &str, config: &EditConfig) -> EditError {
        let err_msg = Self::sanitize_error_message_with_redacted_url(&e.to_string(), url);

        if e.is_timeout() {
            EditError::Timeout(format!("下载超时（{}秒）", config.download_timeout))
        } else if e.is_connect() {
            EditError::Network(format!("无法连接：{}", err_msg))
        } else {
            EditError::Network(format!("请求失败：{}", err_msg))
        }
    }

    fn sanitize_error_message_with_redacted_url(error_msg: &str, url: &str) -> String {
        let redacted = Self::redact_url_for_log(url);
        error_msg.replace(url, &redacted)
    }

    /// 常见 HTTP 状态码本地化文案。
    fn status_message(code: u16) -> &'static str {
        match code {
            404 => "未找到",
            403 => "访问被拒绝",
            500..=599 => "服务器错误",
            _ => "请求失败",
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), EditError> {
        if bytes.is_empty() {
            return Err(EditError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| EditError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(EditError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, EditError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(EditError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(EditError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}

impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, reference: &ImageRef, config: &EditConfig) -> Result<Vec<u8>, EditError> {
        match reference {
            ImageRef::Locator(locator) => self.load_from_locator(locator, config).await,
            ImageRef::Encoded(data) => Self::load_from_encoded(data, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::VersionToken;
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).expect("encode png failed");
        out.into_inner()
    }

    // 单连接 HTTP 测试服务：接受 `accepts` 次连接，每次返回同样的响应
    fn serve(accepts: usize, head: String, body: Vec<u8>) -> (u16, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let server = thread::spawn(move || {
            let mut requests = Vec::new();
            for _ in 0..accepts {
                let (mut stream, _) = listener.accept().expect("accept failed");

                let mut req_buf = [0u8; 2048];
                let n = stream.read(&mut req_buf).unwrap_or(0);
                requests.push(String::from_utf8_lossy(&req_buf[..n]).to_string());

                stream.write_all(head.as_bytes()).expect("write headers failed");
                stream.write_all(&body).expect("write body failed");
                stream.flush().expect("flush failed");
            }
            requests
        });

        (port, server)
    }

    fn ok_head(content_type: &str, len: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type, len
        )
    }

    fn local_config() -> EditConfig {
        EditConfig {
            allow_private_network: true,
            ..EditConfig::default()
        }
    }

    #[tokio::test]
    async fn url_safety_blocks_private_targets_by_default() {
        let config = EditConfig::default();

        assert!(matches!(
            HttpFetcher::validate_url_safety("http://127.0.0.1/image.png", &config).await,
            Err(EditError::InvalidFormat(_))
        ));

        assert!(matches!(
            HttpFetcher::validate_url_safety("https://localhost/image.png", &config).await,
            Err(EditError::InvalidFormat(_))
        ));

        assert!(matches!(
            HttpFetcher::validate_url_safety("file:///etc/passwd", &config).await,
            Err(EditError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn url_safety_allows_private_targets_when_enabled() {
        assert!(HttpFetcher::validate_url_safety("http://127.0.0.1/image.png", &local_config())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn default_policy_trusts_the_edit_service_origin() {
        let config = EditConfig::default();

        assert!(HttpFetcher::validate_url_safety("http://localhost:8000/r/42.png?v=1", &config)
            .await
            .is_ok());
        assert!(HttpFetcher::validate_url_safety("http://localhost:9000/r/42.png", &config)
            .await
            .is_err());
        assert!(HttpFetcher::validate_url_safety("https://localhost:8000/r/42.png", &config)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn results_from_loopback_endpoint_are_fetched_with_default_policy() {
        let body = png_bytes();
        let (port, server) = serve(2, ok_head("image/png", body.len()), body.clone());

        let config = EditConfig {
            endpoint_url: format!("http://127.0.0.1:{}/api/edit_lasso", port),
            ..EditConfig::default()
        };
        assert!(!config.allow_private_network);
        let fetcher = HttpFetcher::new(&config);

        for _ in 0..2 {
            let result = crate::edit::EditResponse::success("/r/42.png")
                .into_result()
                .expect("result expected")
                .versioned(VersionToken::next());

            let bytes = fetcher.fetch(&result, &config).await.expect("fetch failed");
            assert_eq!(bytes, body);
        }

        let requests = server.join().expect("server thread failed");
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.starts_with("GET /r/42.png?v=")));
    }

    #[test]
    fn relative_locator_joins_asset_base() {
        let config = EditConfig {
            asset_base_url: Some("https://cdn.example.com/app/".to_string()),
            ..EditConfig::default()
        };
        let token = VersionToken::next();
        let locator = Locator::new("/r/42.png").with_version(token);

        let url = HttpFetcher::resolve_locator_url(&locator, &config).expect("join failed");

        assert_eq!(url.as_str(), format!("https://cdn.example.com/r/42.png?v={}", token));
    }

    #[test]
    fn encoded_reference_rejects_non_image_payload() {
        let result = HttpFetcher::load_from_encoded("SGVsbG8=", &EditConfig::default());

        assert!(matches!(result, Err(EditError::InvalidFormat(_))));
    }

    #[test]
    fn encoded_reference_accepts_data_url_and_bare_base64() {
        let png = png_bytes();
        let bare = general_purpose::STANDARD.encode(&png);
        let data_url = format!("data:image/png;base64,{}", bare);

        let config = EditConfig::default();
        assert_eq!(HttpFetcher::load_from_encoded(&bare, &config).ok(), Some(png.clone()));
        assert_eq!(HttpFetcher::load_from_encoded(&data_url, &config).ok(), Some(png));
    }

    #[test]
    fn parse_base64_with_limit_rejects_large_payload_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = HttpFetcher::parse_base64_with_limit(&huge, 32);

        assert!(matches!(result, Err(EditError::ResourceLimit(_))));
    }

    #[test]
    fn content_type_parser_accepts_image_with_params() {
        assert!(HttpFetcher::is_image_content_type("image/png; charset=utf-8"));
        assert!(HttpFetcher::is_image_content_type("IMAGE/JPEG"));
        assert!(!HttpFetcher::is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        assert_eq!(
            HttpFetcher::redact_url_for_log("https://example.com:8443/path/img.png?v=123#hash"),
            "https://example.com:8443/path/img.png"
        );
        assert_eq!(HttpFetcher::redact_url_for_log("/r/42.png?v=1"), "/r/42.png");
    }

    #[test]
    fn stream_signature_probe_recognizes_png_header() {
        let png_signature = [137_u8, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

        assert!(matches!(
            HttpFetcher::validate_stream_signature_probe(&png_signature, 64),
            Ok(true)
        ));
    }

    #[test]
    fn stream_signature_probe_rejects_non_image_payload() {
        let payload = b"<html><body>not an image</body></html>";

        assert!(matches!(
            HttpFetcher::validate_stream_signature_probe(payload, 16),
            Err(EditError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn fetch_downloads_image_and_sends_no_cache() {
        let body = png_bytes();
        let (port, server) = serve(1, ok_head("image/png", body.len()), body.clone());

        let config = local_config();
        let fetcher = HttpFetcher::new(&config);
        let reference = ImageRef::locator(format!("http://127.0.0.1:{}/source.png", port));

        let bytes = fetcher.fetch(&reference, &config).await.expect("fetch failed");
        let requests = server.join().expect("server thread failed");

        assert_eq!(bytes, body);
        assert!(requests[0].to_ascii_lowercase().contains("cache-control: no-cache"));
    }

    #[tokio::test]
    async fn fetch_rejects_non_image_body_even_when_content_type_is_image() {
        let body = b"hello world".to_vec();
        let (port, server) = serve(1, ok_head("image/png", body.len()), body);

        let config = local_config();
        let fetcher = HttpFetcher::new(&config);
        let reference = ImageRef::locator(format!("http://127.0.0.1:{}/fake.png", port));

        let result = fetcher.fetch(&reference, &config).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(EditError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn fetch_maps_error_status_to_network_error() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let (port, server) = serve(1, head, Vec::new());

        let config = local_config();
        let fetcher = HttpFetcher::new(&config);
        let reference = ImageRef::locator(format!("http://127.0.0.1:{}/missing.png", port));

        let result = fetcher.fetch(&reference, &config).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(EditError::Network(ref msg)) if msg.contains("404")));
    }

    #[tokio::test]
    async fn fetch_blocks_redirect_to_localhost() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: http://localhost:{}/final.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                addr.port()
            );

            stream
                .write_all(response.as_bytes())
                .expect("write redirect response failed");
            stream.flush().expect("flush failed");
        });

        let config = EditConfig::default();
        let url = reqwest::Url::parse(&format!("http://127.0.0.1:{}/start.png", addr.port())).expect("url");

        let result = HttpFetcher::download_with_validation(url, &config).await;

        server.join().expect("server thread failed");

        assert!(matches!(result, Err(EditError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn versioned_locator_is_served_from_cache() {
        let body = png_bytes();
        let (port, server) = serve(1, ok_head("image/png", body.len()), body.clone());

        let config = local_config();
        let fetcher = HttpFetcher::new(&config);
        let reference = ImageRef::locator(format!("http://127.0.0.1:{}/r/42.png", port)).versioned(VersionToken::next());

        let first = fetcher.fetch(&reference, &config).await.expect("first fetch failed");
        server.join().expect("server thread failed");
        let second = fetcher.fetch(&reference, &config).await.expect("cached fetch failed");

        assert_eq!(first, body);
        assert_eq!(second, body);
    }

    #[tokio::test]
    async fn unversioned_locator_is_always_refetched() {
        let body = png_bytes();
        let (port, server) = serve(2, ok_head("image/png", body.len()), body);

        let config = local_config();
        let fetcher = HttpFetcher::new(&config);
        let reference = ImageRef::locator(format!("http://127.0.0.1:{}/r/42.png", port));

        fetcher.fetch(&reference, &config).await.expect("first fetch failed");
        fetcher.fetch(&reference, &config).await.expect("second fetch failed");

        let requests = server.join().expect("server thread failed");
        assert_eq!(requests.len(), 2);
    }
}
