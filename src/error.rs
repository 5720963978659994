//! エラー型定義モジュール

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 設定エラー
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IOエラー: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML解析エラー: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("設定ファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// 通信エラー
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("リクエスト構築エラー: {0}")]
    RequestConstruction(String),

    #[error("JSONエンコードエラー: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("ネットワークエラー: {0}")]
    Network(#[source] Box<dyn StdError + Send + Sync>),

    #[error("タイムアウト: {0}")]
    Timeout(#[source] Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// タイムアウトによる失敗かどうか
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return TransportError::RequestConstruction(err.to_string());
        }
        if err.is_timeout() {
            TransportError::Timeout(Box::new(err))
        } else {
            TransportError::Network(Box::new(err))
        }
    }
}

/// レスポンス解析エラー
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON解析エラー: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
