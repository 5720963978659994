//! Timeular APIモジュール
//!
//! サインインとログアウトを行い、結果を表示用の値として返す。
//! 通信手段は呼び出し側から注入される。

use crate::error::{DecodeError, TransportError};
use crate::transport::{send_json, RawResponse, Transport};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Write};
use tracing::{info, warn};

/// APIのベースURL
pub const BASE_URL: &str = "https://api.timeular.com/api/v2";

const SIGN_IN_PATH: &str = "/developer/sign-in";
const LOGOUT_PATH: &str = "/developer/logout";
const STATUS_OK: u16 = 200;

/// APIキーとシークレットの組
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    api_key: &'a str,
    api_secret: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
}

/// 失敗の内訳
#[derive(Debug)]
pub enum Failure {
    /// リクエストを送信できなかった
    Transport(TransportError),
    /// 200応答のボディを解析できなかった
    Decode(DecodeError),
    /// 200以外の応答
    Rejected(RawResponse),
}

impl Failure {
    fn render(&self, out: &mut dyn Write, action: &str) -> io::Result<()> {
        match self {
            Failure::Transport(err) => write!(out, "Unable to {}: {}", action, describe(err)),
            Failure::Decode(err) => write!(out, "error: {}", err),
            Failure::Rejected(response) => {
                write!(out, "Status {} - ", response.status_line)?;
                out.write_all(&response.body)
            }
        }
    }
}

/// サインインの結果
#[derive(Debug)]
pub enum LoginOutcome {
    Success { token: String },
    Failure(Failure),
}

impl LoginOutcome {
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        match self {
            LoginOutcome::Success { token } => write!(out, "JWT Token: {}", token),
            LoginOutcome::Failure(failure) => failure.render(out, "retrieve token"),
        }
    }
}

/// ログアウトの結果
#[derive(Debug)]
pub enum LogoutOutcome {
    Success,
    /// トークンが設定されていないため送信しなかった
    NoToken,
    Failure(Failure),
}

impl LogoutOutcome {
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        match self {
            LogoutOutcome::Success => write!(out, "Logged out"),
            LogoutOutcome::NoToken => write!(out, "No token configured"),
            LogoutOutcome::Failure(failure) => failure.render(out, "log out"),
        }
    }
}

/// Timeular APIクライアント
pub struct Api<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Api<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// APIキーとシークレットでサインインする
    ///
    /// サインイン自体は認証なしで送信する。
    pub fn login(&self, credentials: &Credentials) -> LoginOutcome {
        let url = format!("{}{}", BASE_URL, SIGN_IN_PATH);
        let request = SignInRequest {
            api_key: &credentials.api_key,
            api_secret: &credentials.api_secret,
        };

        info!("サインインします");
        let response = match send_json(self.transport, &url, None, &request) {
            Ok(response) => response,
            Err(e) => {
                warn!(timed_out = e.is_timeout(), "サインインリクエスト失敗: {}", e);
                return LoginOutcome::Failure(Failure::Transport(e));
            }
        };

        if response.status != STATUS_OK {
            warn!("サインインが拒否されました: {}", response.status_line);
            return LoginOutcome::Failure(Failure::Rejected(response));
        }

        match decode_token(&response.body) {
            Ok(token) => LoginOutcome::Success { token },
            Err(e) => {
                warn!("サインイン応答の解析失敗: {}", e);
                LoginOutcome::Failure(Failure::Decode(e))
            }
        }
    }

    /// トークンを無効化する
    pub fn logout(&self, token: Option<&str>) -> LogoutOutcome {
        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return LogoutOutcome::NoToken,
        };
        let url = format!("{}{}", BASE_URL, LOGOUT_PATH);

        info!("ログアウトします");
        let response = match send_json(self.transport, &url, Some(token), &serde_json::json!({})) {
            Ok(response) => response,
            Err(e) => {
                warn!(timed_out = e.is_timeout(), "ログアウトリクエスト失敗: {}", e);
                return LogoutOutcome::Failure(Failure::Transport(e));
            }
        };

        if response.status == STATUS_OK {
            LogoutOutcome::Success
        } else {
            LogoutOutcome::Failure(Failure::Rejected(response))
        }
    }
}

/// 200応答のボディからトークンを取り出す
///
/// tokenが文字列でない、または存在しない場合はエラー。
fn decode_token(body: &[u8]) -> Result<String, DecodeError> {
    let response: SignInResponse = serde_json::from_slice(body)?;
    Ok(response.token)
}

/// エラーとその原因を1行にまとめる
///
/// 直接の原因はTransportErrorの表示に含まれるため、その先から連結する。
fn describe(err: &TransportError) -> String {
    let mut message = err.to_string();
    let mut cause = err.source().and_then(StdError::source);
    while let Some(e) = cause {
        message.push_str(": ");
        message.push_str(&e.to_string());
        cause = e.source();
    }
    message
}
