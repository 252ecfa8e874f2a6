use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ApiError;
use crate::imports::{ImportKind, ImportSummary};
use crate::integrations::IntegrationKind;
use crate::model::{IntegrationStatus, StatsSnapshot};
use crate::utils::{find_char_boundary, preview};

// ── Request / Response types ────────────────────────────────────────────

#[derive(Serialize)]
struct ChannelBody<'a> {
    channel: &'a str,
}

#[derive(Serialize)]
struct UsernameBody<'a> {
    username: &'a str,
}

#[derive(Serialize)]
struct SendBody<'a> {
    channel: &'a str,
    message: &'a str,
}

#[derive(Serialize)]
struct AutoResponseBody<'a> {
    trigger: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<&'a str>,
}

/// Generic acknowledgement (`{"status": ..., "message": ...}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Reply {
    pub status: Option<String>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct AutoResponseList {
    #[serde(default)]
    responses: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

// ── Client ──────────────────────────────────────────────────────────────

/// Thin JSON client for the panel backend's `/api` routes.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(self.url(path))
            .timeout(self.timeout)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await?;
        read_json(resp).await
    }

    // ── Stats / bot control ─────────────────────────────────────────────

    pub async fn stats(&self) -> Result<StatsSnapshot, ApiError> {
        self.get_json("/api/stats").await
    }

    pub async fn start_bot(&self, channel: &str) -> Result<Reply, ApiError> {
        self.post_json("/api/bot/start", &ChannelBody { channel }).await
    }

    pub async fn stop_bot(&self, channel: &str) -> Result<Reply, ApiError> {
        self.post_json("/api/bot/stop", &ChannelBody { channel }).await
    }

    pub async fn send_message(&self, channel: &str, message: &str) -> Result<Reply, ApiError> {
        self.post_json("/api/bot/send", &SendBody { channel, message })
            .await
    }

    // ── Streamers ───────────────────────────────────────────────────────

    pub async fn add_streamer(&self, username: &str) -> Result<Reply, ApiError> {
        self.post_json("/api/streamers/add", &UsernameBody { username })
            .await
    }

    pub async fn remove_streamer(&self, username: &str) -> Result<Reply, ApiError> {
        self.post_json("/api/streamers/remove", &UsernameBody { username })
            .await
    }

    // ── Auto-responses ──────────────────────────────────────────────────

    pub async fn auto_responses(&self) -> Result<BTreeMap<String, String>, ApiError> {
        let list: AutoResponseList = self.get_json("/api/auto-response/list").await?;
        Ok(list.responses)
    }

    pub async fn add_auto_response(
        &self,
        trigger: &str,
        response: &str,
    ) -> Result<Reply, ApiError> {
        let body = AutoResponseBody {
            trigger,
            response: Some(response),
        };
        self.post_json("/api/auto-response/add", &body).await
    }

    pub async fn remove_auto_response(&self, trigger: &str) -> Result<Reply, ApiError> {
        let body = AutoResponseBody {
            trigger,
            response: None,
        };
        self.post_json("/api/auto-response/remove", &body).await
    }

    // ── Integrations ────────────────────────────────────────────────────

    pub async fn integrations_status(
        &self,
    ) -> Result<BTreeMap<String, IntegrationStatus>, ApiError> {
        self.get_json("/api/integrations/status").await
    }

    pub async fn setup_integration(
        &self,
        kind: IntegrationKind,
        payload: &Value,
    ) -> Result<Reply, ApiError> {
        let path = format!("/api/integrations/{}/setup", kind.slug());
        self.post_json(&path, payload).await
    }

    pub async fn test_integration(
        &self,
        kind: IntegrationKind,
        payload: &Value,
    ) -> Result<Reply, ApiError> {
        let path = format!("/api/integrations/{}/test", kind.slug());
        self.post_json(&path, payload).await
    }

    pub async fn disable_integration(&self, kind: IntegrationKind) -> Result<Reply, ApiError> {
        let path = format!("/api/integrations/{}/disable", kind.slug());
        self.post_json(&path, &serde_json::json!({})).await
    }

    // ── Imports ─────────────────────────────────────────────────────────

    /// Upload an export file as the multipart field `file`.
    pub async fn import_file(
        &self,
        kind: ImportKind,
        path: &Path,
    ) -> Result<ImportSummary, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("export.{}", kind.expected_extension()));
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));

        let resp = self
            .http
            .post(self.url(kind.endpoint()))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?;
        read_json(resp).await
    }
}

/// Decode a JSON body, turning non-OK responses into `ApiError::Backend`
/// with the backend's `{error}` message when it sent one.
async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(ApiError::Backend {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        ApiError::Decode(format!(
            "{} (body: {})",
            e,
            &body[..find_char_boundary(&body, 200)]
        ))
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        format!("{} {}", status.as_u16(), preview(trimmed, 200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::ServerGuard) -> BackendClient {
        BackendClient::new(&server.url(), Duration::from_secs(5))
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"Token inválido"}"#),
            "Token inválido"
        );
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "502 upstream down"
        );
    }

    #[test]
    fn test_auto_response_body_omits_response_on_remove() {
        let body = AutoResponseBody {
            trigger: "!discord",
            response: None,
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"trigger": "!discord"}));
    }

    #[tokio::test]
    async fn test_stats_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"connected_channels":["alpha"],"total_users":10,"total_messages":100,"total_points":50}"#,
            )
            .create_async()
            .await;

        let stats = client(&server).stats().await.unwrap();
        assert_eq!(stats.connected_channels, vec!["alpha"]);
        assert_eq!(stats.total_points, 50);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_backend_error_is_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/bot/start")
            .match_body(Matcher::Json(json!({"channel": "alpha"})))
            .with_status(400)
            .with_body(r#"{"error":"Token OAuth não configurado"}"#)
            .create_async()
            .await;

        let err = client(&server).start_bot("alpha").await.unwrap_err();
        match err {
            ApiError::Backend { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Token OAuth não configurado");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_ok_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/auto-response/list")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = client(&server).auto_responses().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            BackendClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2));
        let err = client.stats().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.user_message(), "Connection error");
    }

    #[tokio::test]
    async fn test_import_uploads_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        std::fs::write(&path, "username,points\nviewer,10\n").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/import/streamelements")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex(r#"filename="points.csv""#.to_string()))
            .with_status(200)
            .with_body(r#"{"status":"success","imported":1,"users":[{"username":"viewer","points":10}]}"#)
            .create_async()
            .await;

        let summary = client(&server)
            .import_file(ImportKind::StreamElements, &path)
            .await
            .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.users[0].points, 10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_integration_routes() {
        let mut server = mockito::Server::new_async().await;
        let setup = server
            .mock("POST", "/api/integrations/twitch-api/setup")
            .match_body(Matcher::Json(json!({"client_id": "id", "client_secret": "s"})))
            .with_status(200)
            .with_body(r#"{"status":"success","message":"ok"}"#)
            .create_async()
            .await;
        let status = server
            .mock("GET", "/api/integrations/status")
            .with_status(200)
            .with_body(
                r#"{"discord":{"enabled":true,"configured":true,"available":false},"twitch_api":{"enabled":false}}"#,
            )
            .create_async()
            .await;

        let client = client(&server);
        let reply = client
            .setup_integration(
                IntegrationKind::TwitchApi,
                &json!({"client_id": "id", "client_secret": "s"}),
            )
            .await
            .unwrap();
        assert_eq!(reply.message.as_deref(), Some("ok"));

        let statuses = client.integrations_status().await.unwrap();
        assert!(statuses["discord"].enabled);
        assert!(!statuses["discord"].available);
        assert!(!statuses["twitch_api"].configured);

        setup.assert_async().await;
        status.assert_async().await;
    }
}
