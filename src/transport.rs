//! HTTP通信モジュール
//!
//! JSONボディのPOSTを1回だけ送信し、ステータスとボディを解釈せずに返す。

use crate::error::TransportError;
use hyper::ext::ReasonPhrase;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// リクエスト全体のタイムアウト
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("tmlr/", env!("CARGO_PKG_VERSION"));

/// 送信前のJSONリクエスト
#[derive(Clone)]
pub struct JsonRequest {
    pub url: Url,
    pub bearer_token: Option<String>,
    pub body: Vec<u8>,
}

impl JsonRequest {
    /// URLを検証し、ペイロードをJSONにエンコードする
    ///
    /// 空のトークンはAuthorizationヘッダーなしとして扱う。
    pub fn new<P>(url: &str, bearer_token: Option<&str>, payload: &P) -> Result<Self, TransportError>
    where
        P: Serialize + ?Sized,
    {
        let url = Url::parse(url)
            .map_err(|e| TransportError::RequestConstruction(format!("{}: {}", url, e)))?;
        let body = serde_json::to_vec(payload)?;
        let bearer_token = bearer_token
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Ok(Self {
            url,
            bearer_token,
            body,
        })
    }
}

impl fmt::Debug for JsonRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRequest")
            .field("url", &self.url.as_str())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// 解釈前のレスポンス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// "200 OK" 形式のステータス行
    pub status_line: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// 標準の理由句でステータス行を作る
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::with_reason(status, None, body)
    }

    /// サーバーが返した理由句があればそれを使う
    pub fn with_reason(status: u16, reason: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        let reason = reason.or_else(|| {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
        });
        let status_line = match reason {
            Some(reason) => format!("{} {}", status, reason),
            None => status.to_string(),
        };

        Self {
            status,
            status_line,
            body: body.into(),
        }
    }
}

/// JSON POSTの送信手段
pub trait Transport {
    fn send(&self, request: &JsonRequest) -> Result<RawResponse, TransportError>;
}

/// ペイロードをエンコードして1回だけ送信する
pub fn send_json<P>(
    transport: &dyn Transport,
    url: &str,
    bearer_token: Option<&str>,
    payload: &P,
) -> Result<RawResponse, TransportError>
where
    P: Serialize + ?Sized,
{
    let request = JsonRequest::new(url, bearer_token, payload)?;
    transport.send(&request)
}

/// reqwestによるブロッキングHTTP通信
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// デフォルトのタイムアウトで作成
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// タイムアウトを指定して作成
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .https_only(true)
            .build()?;
        Ok(Self { client })
    }

    /// ループバック接続のテスト用（プロキシ設定を無視する）
    #[cfg(test)]
    fn for_loopback(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .unwrap();
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &JsonRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .post(request.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        if let Some(ref token) = request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            url = %request.url,
            authenticated = request.bearer_token.is_some(),
            "POSTリクエストを送信します"
        );

        // bytes()がレスポンスを消費するため、どの経路でも接続はここで解放される
        let response = builder.send()?;
        let status = response.status().as_u16();
        // hyperは標準と異なる理由句のときだけReasonPhraseを付ける
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
        let body = response.bytes()?;

        debug!(status, body_len = body.len(), "レスポンスを受信しました");
        Ok(RawResponse::with_reason(status, reason.as_deref(), body.to_vec()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    /// ヘッダーとContent-Length分のボディを読み込む
    fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                let content_length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|v| v.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8(buf).unwrap()
    }

    /// 1リクエストだけ応答するローカルサーバー
    fn serve_once(response: String) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            tx.send(request).unwrap();
            stream.write_all(response.as_bytes()).unwrap();
        });

        (format!("http://{}/developer/sign-in", addr), rx)
    }

    fn transport() -> HttpTransport {
        HttpTransport::for_loopback(Duration::from_secs(5))
    }

    #[test]
    fn test_json_request_encodes_payload() {
        let mut payload = HashMap::new();
        payload.insert("apiKey", "abc");
        let request = JsonRequest::new("https://example.com/x", None, &payload).unwrap();

        assert_eq!(request.url.as_str(), "https://example.com/x");
        assert_eq!(request.body, br#"{"apiKey":"abc"}"#.to_vec());
        assert!(request.bearer_token.is_none());
    }

    #[test]
    fn test_json_request_empty_token_is_omitted() {
        let request = JsonRequest::new("https://example.com/x", Some(""), &()).unwrap();
        assert!(request.bearer_token.is_none());

        let request = JsonRequest::new("https://example.com/x", Some("t0k"), &()).unwrap();
        assert_eq!(request.bearer_token.as_deref(), Some("t0k"));
    }

    #[test]
    fn test_json_request_malformed_url() {
        let err = JsonRequest::new("not a url", None, &()).unwrap_err();
        assert!(matches!(err, TransportError::RequestConstruction(_)));
    }

    #[test]
    fn test_json_request_encoding_failure() {
        // 文字列以外のキーを持つマップはJSONにできない
        let mut payload = HashMap::new();
        payload.insert((1, 2), "value");
        let err = JsonRequest::new("https://example.com/x", None, &payload).unwrap_err();
        assert!(matches!(err, TransportError::Encoding(_)));
    }

    #[test]
    fn test_json_request_debug_redacts_token() {
        let request = JsonRequest::new("https://example.com/x", Some("secret-token"), &()).unwrap();
        let debug = format!("{:?}", request);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_raw_response_status_line() {
        assert_eq!(RawResponse::new(200, "").status_line, "200 OK");
        assert_eq!(RawResponse::new(401, "").status_line, "401 Unauthorized");
        assert_eq!(RawResponse::new(599, "").status_line, "599");
    }

    #[test]
    fn test_send_returns_status_and_body() {
        let (url, rx) = serve_once(http_response("200 OK", r#"{"token":"jwt123"}"#));

        let response = send_json(&transport(), &url, None, &serde_json::json!({"a": 1})).unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_line, "200 OK");
        assert_eq!(response.body, br#"{"token":"jwt123"}"#.to_vec());

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /developer/sign-in HTTP/1.1"));
        assert!(request.ends_with(r#"{"a":1}"#));
    }

    #[test]
    fn test_send_sets_json_headers_without_authorization() {
        let (url, rx) = serve_once(http_response("200 OK", "{}"));

        send_json(&transport(), &url, None, &serde_json::json!({})).unwrap();

        let request = rx.recv().unwrap().to_lowercase();
        assert!(request.contains("content-type: application/json"));
        assert!(request.contains("user-agent: tmlr/"));
        assert!(!request.contains("authorization:"));
    }

    #[test]
    fn test_send_sets_bearer_authorization() {
        let (url, rx) = serve_once(http_response("200 OK", "{}"));

        send_json(&transport(), &url, Some("secret-token"), &serde_json::json!({})).unwrap();

        let request = rx.recv().unwrap().to_lowercase();
        assert!(request.contains("authorization: bearer secret-token"));
    }

    #[test]
    fn test_send_keeps_error_body_verbatim() {
        let body = r#"{"error":"invalid credentials"}"#;
        let (url, _rx) = serve_once(http_response("401 Unauthorized", body));

        let response = send_json(&transport(), &url, None, &()).unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.status_line, "401 Unauthorized");
        assert_eq!(response.body, body.as_bytes().to_vec());
    }

    #[test]
    fn test_send_keeps_server_reason_phrase() {
        let (url, _rx) = serve_once(http_response("401 Invalid API Key", "denied"));

        let response = send_json(&transport(), &url, None, &()).unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.status_line, "401 Invalid API Key");
    }

    #[test]
    fn test_send_keeps_reason_for_unknown_status() {
        let (url, _rx) = serve_once(http_response("599 Network Connect Timeout", ""));

        let response = send_json(&transport(), &url, None, &()).unwrap();

        assert_eq!(response.status_line, "599 Network Connect Timeout");
    }

    #[test]
    fn test_raw_response_with_reason() {
        let response = RawResponse::with_reason(401, Some("Invalid API Key"), "");
        assert_eq!(response.status_line, "401 Invalid API Key");

        let response = RawResponse::with_reason(401, None, "");
        assert_eq!(response.status_line, "401 Unauthorized");
    }

    #[test]
    fn test_send_unsupported_scheme_is_request_construction_error() {
        // URLとしては正しいがHTTPでは送れない
        let err = send_json(&transport(), "mailto:someone@example.com", None, &()).unwrap_err();
        assert!(matches!(err, TransportError::RequestConstruction(_)));
    }

    #[test]
    fn test_default_transport_rejects_plain_http() {
        let transport = HttpTransport::new().unwrap();
        let err = send_json(&transport, "http://127.0.0.1:9/developer/sign-in", None, &())
            .unwrap_err();
        assert!(matches!(err, TransportError::RequestConstruction(_)));
    }

    #[test]
    fn test_send_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/developer/sign-in", addr);
        let err = send_json(&transport(), &url, None, &()).unwrap_err();

        assert!(matches!(err, TransportError::Network(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_send_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            // 受信だけして応答しない
            let (mut stream, _) = listener.accept().unwrap();
            let _ = read_request(&mut stream);
            thread::sleep(Duration::from_secs(5));
        });

        let transport = HttpTransport::for_loopback(Duration::from_millis(300));
        let url = format!("http://{}/developer/sign-in", addr);
        let started = Instant::now();
        let err = send_json(&transport, &url, None, &()).unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_http_transport_default_construction() {
        assert!(HttpTransport::new().is_ok());
    }
}
