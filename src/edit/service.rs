//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! `EditService` 把会话、配置与“忙碌”标志打包成一个可共享的状态对象，替代全局单例：
//! 1. 生命周期清晰（由调用方统一管理）
//! 2. 测试可注入内存版取图器与编辑服务，互不干扰
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<EditConfig>>` 支持运行时修改；单次编辑使用同一份快照。
//! - 忙碌标志使用 `AtomicBool` + RAII `BusyGuard`：编辑进行中再次触发直接返回 `Busy`，
//!   不依赖传输层排队；无论成功、失败还是 panic，`Drop` 都会清除标志。
//! - 会话锁从不跨越 `.await` 持有：prepare（加锁）→ execute（无锁 I/O）→ commit（加锁）。
//! - 编辑进行中忽略指针输入，拒绝换图与历史提升。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::handler::{EditSession, MaskPreview, execute};
use super::{
    EditConfig, EditEndpoint, EditError, EditFailure, EditRecord, HttpEditEndpoint, HttpFetcher, ImageFetcher,
    ImageRef, SizeHint,
};
use crate::selection::{CaptureState, DisplayPoint, ImageSize, SelectionPolygon, Surface};

/// 忙碌标志的 RAII 守卫。
///
/// 构造时抢占标志（已被占用则返回 `Busy`），`Drop` 时释放。
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, EditError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| EditError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 编辑服务状态。
pub struct EditService<F = HttpFetcher, E = HttpEditEndpoint> {
    config: Arc<RwLock<EditConfig>>,
    session: Mutex<EditSession>,
    busy: AtomicBool,
    fetcher: F,
    endpoint: E,
}

impl EditService<HttpFetcher, HttpEditEndpoint> {
    /// 使用默认配置与 HTTP 实现创建服务。
    pub fn new() -> Result<Self, EditError> {
        Self::with_config(EditConfig::default())
    }

    pub fn with_config(config: EditConfig) -> Result<Self, EditError> {
        config.validate()?;
        let fetcher = HttpFetcher::new(&config);
        let endpoint = HttpEditEndpoint::new(&config)?;
        Ok(Self::with_collaborators(config, fetcher, endpoint))
    }
}

impl<F, E> EditService<F, E>
where
    F: ImageFetcher,
    E: EditEndpoint,
{
    pub fn with_collaborators(config: EditConfig, fetcher: F, endpoint: E) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            session: Mutex::new(EditSession::new()),
            busy: AtomicBool::new(false),
            fetcher,
            endpoint,
        }
    }

    /// 获取配置快照。
    pub fn config_snapshot(&self) -> Result<EditConfig, EditError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| EditError::State("配置读取锁已中毒".to_string()))
    }

    /// 校验后替换配置；进行中的编辑继续使用旧快照。
    pub fn update_config(&self, config: EditConfig) -> Result<(), EditError> {
        config.validate()?;

        let mut guard = self
            .config
            .write()
            .map_err(|_| EditError::State("配置写入锁已中毒".to_string()))?;
        *guard = config;

        log::info!(
            "⚙️ 已更新编辑配置（endpoint={}, allow_private_network={}, preview_max_dimension={}）",
            HttpFetcher::redact_url_for_log(&guard.endpoint_url),
            guard.allow_private_network,
            guard.preview_max_dimension
        );

        Ok(())
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, EditSession>, EditError> {
        self.session
            .lock()
            .map_err(|_| EditError::State("会话锁已中毒".to_string()))
    }

    fn ensure_idle(&self) -> Result<(), EditError> {
        if self.is_busy() {
            return Err(EditError::Busy);
        }
        Ok(())
    }

    /// 解析并挂载原图，返回其自然尺寸。
    pub async fn mount_image(&self, reference: ImageRef) -> Result<ImageSize, EditError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let config = self.config_snapshot()?;

        let bytes = self.fetcher.fetch(&reference, &config).await?;
        let size = super::inspect_source(&bytes, &config)?;

        self.lock_session()?.load_image(reference, size);
        log::info!("✅ 原图已挂载 - 尺寸: {}", size);
        Ok(size)
    }

    pub fn pointer_down(&self, surface: &Surface, at: DisplayPoint) -> Result<CaptureState, EditError> {
        let mut session = self.lock_session()?;
        if !self.is_busy() {
            session.pointer_down(surface, at);
        }
        Ok(session.capture_state())
    }

    pub fn pointer_move(&self, surface: &Surface, at: DisplayPoint) -> Result<CaptureState, EditError> {
        let mut session = self.lock_session()?;
        if !self.is_busy() {
            session.pointer_move(surface, at);
        }
        Ok(session.capture_state())
    }

    pub fn pointer_up(&self) -> Result<CaptureState, EditError> {
        let mut session = self.lock_session()?;
        session.pointer_up();
        Ok(session.capture_state())
    }

    pub fn close_selection(&self) -> Result<(), EditError> {
        self.ensure_idle()?;
        self.lock_session()?.close_selection()
    }

    pub fn reset_selection(&self) -> Result<(), EditError> {
        self.ensure_idle()?;
        self.lock_session()?.reset_selection();
        Ok(())
    }

    pub fn preview_mask(&self) -> Result<MaskPreview, EditError> {
        self.ensure_idle()?;
        let config = self.config_snapshot()?;
        let mut session = self.lock_session()?;
        session.preview_mask(&config).cloned()
    }

    /// 将历史结果提升为当前图片。
    pub fn promote(&self, index: usize) -> Result<ImageRef, EditError> {
        self.ensure_idle()?;
        self.lock_session()?.promote(index).cloned()
    }

    /// 执行一次局部编辑。`size` 为空时使用配置中的默认尺寸提示。
    pub async fn apply_edit(
        &self,
        instruction: impl Into<String>,
        size: Option<SizeHint>,
    ) -> Result<EditRecord, EditError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let config = self.config_snapshot()?;
        let size = size.unwrap_or(config.default_size_hint);

        let prepared = self.lock_session()?.prepare(instruction, size)?;

        let record = match execute(prepared, &self.fetcher, &self.endpoint, &config).await {
            Ok(record) => record,
            Err(err) => {
                let failure = EditFailure::from(&err);
                log::warn!(
                    "❌ 局部编辑失败 - code={} stage={}: {}",
                    failure.code,
                    failure.stage,
                    failure.message
                );
                return Err(err);
            }
        };

        let mut session = self.lock_session()?;
        session.commit(record).cloned()
    }

    pub fn current(&self) -> Result<Option<ImageRef>, EditError> {
        Ok(self.lock_session()?.current().cloned())
    }

    pub fn natural_size(&self) -> Result<Option<ImageSize>, EditError> {
        Ok(self.lock_session()?.natural_size())
    }

    pub fn polygon(&self) -> Result<SelectionPolygon, EditError> {
        Ok(self.lock_session()?.polygon().clone())
    }

    /// 历史记录（从新到旧）。
    pub fn history(&self) -> Result<Vec<EditRecord>, EditError> {
        Ok(self.lock_session()?.history().iter().cloned().collect())
    }
}
