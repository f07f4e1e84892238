//! # 套索局部编辑 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              显示层 (画布 / 命令行 / 任意外壳)            │
//! │   pointer down/move/up ── close ── preview ── apply      │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓ Result<T, EditError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↓            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ selection ── 坐标映射 · 多边形状态机 · 蒙版光栅化    │
//! │  │                                                       │
//! │  ├─ edit ─────── EditService (BusyGuard)                 │
//! │  │   ├─ handler    会话状态 + prepare/execute/commit     │
//! │  │   ├─ loader     引用 → 字节 (reqwest, SSRF 防护)      │
//! │  │   ├─ pipeline   尺寸检查 + 蒙版编码                   │
//! │  │   ├─ endpoint   编辑服务协议 (JSON over HTTP)         │
//! │  │   └─ reference  图片引用 + 版本令牌                   │
//! │  │                                                       │
//! │  ├─ settings ──── 配置文件 (JSON)                        │
//! │  └─ error ─────── AppError (统一错误类型)                │
//! └──────────────────────────────────────────────────────────┘
//!                          ↕ HTTP
//!                 外部 AI 图像编辑服务
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`selection`] | 屏幕坐标 → 图片坐标、套索多边形捕获、二值蒙版生成 |
//! | [`edit`] | 取图、提交编辑、版本化结果、历史记录与忙碌控制 |
//! | [`settings`] | `EditConfig` 的加载与保存 |

pub mod error;
pub mod edit;
pub mod selection;
pub mod settings;
