//! 設定モジュール

use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// トークンを上書きする環境変数
pub const TOKEN_ENV: &str = "TMLR_TOKEN";

const CONFIG_FILE_NAME: &str = ".tmlr.toml";

/// アプリケーション設定
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Timeularのアクセストークン
    pub token: Option<String>,
}

/// TOML設定ファイル用構造体
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    token: Option<String>,
}

/// CLI引数
#[derive(Debug, Default)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub token: Option<String>,
}

impl Config {
    /// 設定を読み込む
    ///
    /// 優先順位: CLI引数 > 環境変数 > 設定ファイル
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        Self::load_from(cli_args, &default_config_path(), env::var(TOKEN_ENV).ok())
    }

    fn load_from(
        cli_args: &CliArgs,
        default_path: &Path,
        env_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(file_config) = read_file_config(cli_args.config.as_deref(), default_path)? {
            config.merge_file_config(&file_config);
        }

        // 環境変数・CLI引数で上書き
        config.merge_token(env_token);
        config.merge_token(cli_args.token.clone());

        Ok(config)
    }

    /// ファイル設定をマージ
    fn merge_file_config(&mut self, file_config: &FileConfig) {
        self.merge_token(file_config.token.clone());
    }

    /// 空でないトークンのみ採用
    fn merge_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.token = Some(token);
        }
    }
}

/// デフォルトの設定ファイルパス
pub fn default_config_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(CONFIG_FILE_NAME)
}

/// 設定ファイルを読み込む
///
/// 明示されたファイルは必須、デフォルトのファイルは存在する場合のみ読む。
fn read_file_config(
    explicit: Option<&Path>,
    default_path: &Path,
) -> Result<Option<FileConfig>, ConfigError> {
    let path = match explicit {
        Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.to_path_buf())),
        Some(path) => path,
        None if default_path.exists() => default_path,
        None => {
            debug!("設定ファイルなし: {}", default_path.display());
            return Ok(None);
        }
    };

    debug!("設定ファイルを読み込みます: {}", path.display());
    let content = fs::read_to_string(path)?;
    let file_config: FileConfig = toml::from_str(&content)?;
    Ok(Some(file_config))
}
