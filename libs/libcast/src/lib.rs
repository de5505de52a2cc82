use std::time::Duration;

use api::path;
use api::request::{SendChat, StartLive};
use api::response::{ChatHistory, ChatMessage, ChatSent, LiveStarted, LiveStopped, UploadResult};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

mod auth;
mod error;

pub use auth::AuthContext;
pub use error::ClientError;

pub type Result<T> = std::result::Result<T, ClientError>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);
const UPLOAD_PIECE: usize = 64 * 1024;

/// Recording handed to [`Client::upload_video`].
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub data: Bytes,
    pub file_name: String,
    /// Container mime type without codec parameters, e.g. `video/webm`.
    pub mime: String,
}

#[derive(Clone)]
pub struct Client {
    base_url: String,
    auth: AuthContext,
    http: reqwest::Client,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl Client {
    pub fn new(base_url: String, auth: AuthContext) -> Self {
        Client {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            http: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, request: Duration, upload: Duration) -> Self {
        self.request_timeout = request;
        self.upload_timeout = upload;
        self
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub async fn start_live(&self, req: &StartLive) -> Result<LiveStarted> {
        let builder = self.request(Method::POST, path::LIVE_START).json(req);
        self.send_json(builder).await
    }

    pub async fn stop_live(&self, live_id: &str) -> Result<LiveStopped> {
        let builder = self.request(Method::PUT, &path::live_stop(live_id));
        let response = self.send(builder).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(LiveStopped::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Multipart upload of an assembled recording. `on_progress` receives the
    /// fraction of the body handed to the transport, ending with `1.0` once the
    /// server answered.
    pub async fn upload_video<F>(
        &self,
        live_id: &str,
        video: VideoFile,
        on_progress: F,
    ) -> Result<UploadResult>
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        let total = video.data.len();
        let on_progress = std::sync::Arc::new(on_progress);
        let progress = on_progress.clone();
        let data = video.data;
        let stream = async_stream::stream! {
            let mut offset = 0;
            while offset < total {
                let end = (offset + UPLOAD_PIECE).min(total);
                let piece = data.slice(offset..end);
                offset = end;
                progress(offset as f32 / total as f32);
                yield Ok::<Bytes, std::io::Error>(piece);
            }
        };

        let part = Part::stream_with_length(Body::wrap_stream(stream), total as u64)
            .file_name(video.file_name)
            .mime_str(&video.mime)?;
        let form = Form::new()
            .text("live_id", live_id.to_string())
            .part("video", part);

        debug!("[client] uploading {} bytes for live {}", total, live_id);
        let builder = self
            .request(Method::POST, &path::live_upload_video(live_id))
            .timeout(self.upload_timeout)
            .multipart(form);
        let result: UploadResult = self.send_json(builder).await?;
        on_progress(1.0);
        Ok(result)
    }

    pub async fn send_chat(&self, post_id: &str, req: &SendChat) -> Result<ChatMessage> {
        let builder = self.request(Method::POST, &path::live_chat(post_id)).json(req);
        let sent: ChatSent = self.send_json(builder).await?;
        Ok(sent.into())
    }

    pub async fn chat_messages(&self, post_id: &str) -> Result<Vec<ChatMessage>> {
        let builder = self.request(Method::GET, &path::live_chat_messages(post_id));
        let history: ChatHistory = self.send_json(builder).await?;
        Ok(history.into_messages())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .timeout(self.request_timeout);
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!("[client] token rejected by server");
            self.auth.evict();
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            message: get_response_error(response).await,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

async fn get_response_error(response: Response) -> String {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED => "identity authentication failed".to_owned(),
        _ => {
            let text = response.text().await.unwrap_or_default();
            serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| {
                    ["error", "detail", "message"]
                        .iter()
                        .find_map(|k| v.get(k).and_then(|m| m.as_str()).map(str::to_owned))
                })
                .or_else(|| (!text.trim().is_empty()).then_some(text))
                .unwrap_or_else(|| format!("{}", status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn client(server: &MockServer, token: Option<&str>) -> Client {
        Client::new(
            server.url("/api"),
            AuthContext::new(token.map(str::to_string)),
        )
    }

    #[tokio::test]
    async fn test_start_live_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/posts/live/start/")
                    .header("Authorization", "Bearer secret")
                    .json_body(json!({"title": "t", "description": "d", "content": "c"}));
                then.status(201)
                    .json_body(json!({"live_id": 5, "post_id": 9}));
            })
            .await;

        let started = client(&server, Some("secret"))
            .start_live(&StartLive {
                title: "t".to_string(),
                description: "d".to_string(),
                content: "c".to_string(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(started.live_id, "5");
        assert_eq!(started.post_id, "9");
    }

    #[tokio::test]
    async fn test_unauthorized_evicts_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/posts/live/L1/stop/");
                then.status(401).body("nope");
            })
            .await;

        let client = client(&server, Some("stale"));
        let err = client.stop_live("L1").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!client.auth().is_authenticated());
    }

    #[tokio::test]
    async fn test_stop_live_accepts_empty_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/posts/live/L1/stop/");
                then.status(204);
            })
            .await;

        assert!(client(&server, None).stop_live("L1").await.is_ok());
    }

    #[tokio::test]
    async fn test_api_error_message_extracted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/posts/live/9/chat/");
                then.status(400).json_body(json!({"error": "message vide"}));
            })
            .await;

        let err = client(&server, None)
            .send_chat("9", &SendChat::text(""))
            .await
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "message vide");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_reports_progress() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/posts/live/L1/upload-video/")
                    .body_contains("live_id");
                then.status(200)
                    .json_body(json!({"media_id": 3, "file_url": "/media/l1.webm"}));
            })
            .await;

        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let result = client(&server, Some("secret"))
            .upload_video(
                "L1",
                VideoFile {
                    data: Bytes::from(vec![7u8; UPLOAD_PIECE * 2 + 10]),
                    file_name: "l1.webm".to_string(),
                    mime: "video/webm".to_string(),
                },
                move |p| sink.lock().unwrap().push(p),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(result.is_saved());
        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = Client::new("http://127.0.0.1:1/api".to_string(), AuthContext::default());
        let err = client.chat_messages("1").await.unwrap_err();
        assert!(err.is_network());
    }
}
