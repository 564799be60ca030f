//! 설정 파일 관리.
//!
//! 플랫폼별 설정 디렉토리에 JSON 파일로 설정을 저장/로드한다.

use crate::config::AppConfig;
use crate::error::CoreError;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.json";

/// 설정 관리자
///
/// 시작 시 설정 파일을 한 번 로드하고, 없으면 기본 설정으로 만든다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 로드된 설정
    config: AppConfig,
    /// 설정 파일 경로
    config_path: PathBuf,
}

impl ConfigManager {
    /// 새 설정 관리자 생성 및 설정 로드
    ///
    /// 설정 파일이 없으면 기본 설정을 생성하고 저장한다.
    pub fn new() -> Result<Self, CoreError> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE_NAME);
        Self::with_path(config_path)
    }

    /// 지정된 경로로 설정 관리자 생성
    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Config(format!(
                        "설정 디렉토리 생성 실패: {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
                info!("설정 디렉토리 생성: {}", parent.display());
            }
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = AppConfig::default_config();
            Self::save_to_file(&config_path, &default_config)?;
            info!("기본 설정 파일 생성: {}", config_path.display());
            default_config
        };

        config.validate()?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// 현재 설정 반환 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.clone()
    }

    /// 설정 파일 경로
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 플랫폼별 설정 디렉토리 경로
    ///
    /// - macOS: `~/Library/Application Support/app.chirp.client/`
    /// - Windows: `%APPDATA%\chirp\client\config\`
    /// - Linux: `~/.config/chirp/`
    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|p| p.config_dir().to_path_buf())
    }

    /// 데이터 디렉토리 경로 (체크포인트, 알림 설정)
    pub fn data_dir() -> Result<PathBuf, CoreError> {
        Self::project_dirs().map(|p| p.data_dir().to_path_buf())
    }

    fn project_dirs() -> Result<ProjectDirs, CoreError> {
        ProjectDirs::from("app", "chirp", "client")
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
    }

    /// 파일에서 설정 로드
    fn load_from_file(path: &Path) -> Result<AppConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("설정 파일 읽기 실패: {}: {}", path.display(), e))
        })?;

        let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
            CoreError::Config(format!("설정 파일 파싱 실패: {}: {}", path.display(), e))
        })?;

        debug!("설정 파일 로드 완료: {}", path.display());
        Ok(config)
    }

    /// 파일에 설정 저장
    fn save_to_file(path: &Path, config: &AppConfig) -> Result<(), CoreError> {
        let content = serde_json::to_string_pretty(config)
            .map_err(|e| CoreError::Config(format!("설정 직렬화 실패: {}", e)))?;

        fs::write(path, content).map_err(|e| {
            CoreError::Config(format!("설정 파일 저장 실패: {}: {}", path.display(), e))
        })?;

        Ok(())
    }
}
