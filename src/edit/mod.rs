//! # 局部编辑模块
//!
//! ## 设计思路
//!
//! 把“当前图片 + 闭合选区 + 指令”变成一张新图片，并把它发布为新的当前图片。
//!
//! ```text
//! EditService::apply_edit
//!   ├─ BusyGuard（同一时刻只允许一次编辑）
//!   ├─ EditSession::prepare        前置条件：有原图、选区已闭合
//!   ├─ execute
//!   │    ├─ ImageFetcher::fetch    引用 → 原始字节
//!   │    ├─ pipeline               读取尺寸 → 光栅化蒙版 → 编码
//!   │    ├─ EditEndpoint::submit   一次请求，一次响应，不重试
//!   │    └─ VersionToken           结果地址附加 `?v=<token>`
//!   └─ EditSession::commit         替换当前图片、重置选区、写入历史
//! ```
//!
//! ## 子模块
//!
//! - `error`：统一错误类型与分类
//! - `reference`：图片引用与版本令牌
//! - `config`：可调策略
//! - `loader`：取图与输入校验
//! - `pipeline`：尺寸检查与蒙版编码
//! - `endpoint`：编辑服务协议与 HTTP 实现
//! - `history`：结果历史
//! - `handler`：会话状态与编排
//! - `service`：可注入的服务状态

mod config;
mod endpoint;
mod error;
mod handler;
mod history;
mod loader;
mod pipeline;
mod reference;
mod service;

pub use config::EditConfig;
pub use endpoint::{EditEndpoint, EditRequest, EditResponse, HttpEditEndpoint, SizeHint};
pub use error::{EditError, EditFailure, ErrorClass};
pub use handler::{EditSession, MaskPreview, PreparedEdit, execute};
pub use history::{EditRecord, ResultHistory};
pub use loader::{HttpFetcher, ImageFetcher};
pub use pipeline::{MaskPayload, build_mask_payload, encode_source, inspect_source};
pub use reference::{ImageRef, Locator, VERSION_PARAM, VersionToken};
pub use service::EditService;
