//! 配置文件读写
//!
//! 配置以格式化 JSON 保存；文件不存在时返回默认配置。读写两端都会做范围校验。

use std::fs;
use std::path::Path;

use crate::edit::EditConfig;
use crate::error::AppError;

pub fn load_config(path: &Path) -> Result<EditConfig, AppError> {
    if !path.exists() {
        log::debug!("⚙️ 配置文件不存在，使用默认配置 - {}", path.display());
        return Ok(EditConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str::<EditConfig>(&content)
        .map_err(|e| AppError::Settings(format!("解析配置文件失败: {}", e)))?;
    config.validate()?;

    log::info!("⚙️ 已加载配置 - {}", path.display());
    Ok(config)
}

pub fn save_config(path: &Path, config: &EditConfig) -> Result<(), AppError> {
    config.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化配置失败: {}", e)))?;

    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::SizeHint;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("lasso-edit-test-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = unique_temp_dir();

        let config = load_config(&dir.join("absent.json")).expect("load failed");

        assert_eq!(config, EditConfig::default());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = unique_temp_dir();
        let path = dir.join("nested").join("config.json");
        let config = EditConfig {
            endpoint_url: "https://edit.example.com/api/edit_lasso".to_string(),
            default_size_hint: SizeHint::Exact { width: 1024, height: 1024 },
            ..EditConfig::default()
        };

        save_config(&path, &config).expect("save failed");
        let loaded = load_config(&path).expect("load failed");

        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_file_is_reported() {
        let dir = unique_temp_dir();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").expect("write file");

        assert!(matches!(load_config(&path), Err(AppError::Settings(_))));

        std::fs::write(&path, r#"{"preview_max_dimension": 1}"#).expect("write file");
        assert!(matches!(load_config(&path), Err(AppError::Edit(_))));

        let _ = std::fs::remove_dir_all(dir);
    }
}
