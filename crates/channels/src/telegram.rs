//! Telegram Bot API client.
//!
//! Plain JSON-over-HTTPS calls to `https://api.telegram.org/bot<token>/<method>`.
//! Implements [`ChatTransport`] for outbound messages and [`UpdateSource`] for
//! long polling, plus the webhook management calls used at startup.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lmgram_core::error::TransportError;
use lmgram_core::message::ChatId;
use lmgram_core::transport::{ChatTransport, InboundUpdate, MessageId, ParseMode, UpdateSource};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::update::Update;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Timeout for ordinary (non-polling) calls.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time allowed on top of the long-poll timeout before the HTTP
/// request itself gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram Bot API client.
pub struct TelegramClient {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// `getMe` result.
#[derive(Debug, Clone, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// `getWebhookInfo` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: i64,
    #[serde(default)]
    pub last_error_message: Option<String>,
}

/// Every Bot API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API host (local Bot API server, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// POST a JSON body to a Bot API method and unwrap the envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // The URL carries the bot token; keep it out of error messages.
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        Self::unwrap_envelope(method, response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let envelope: ApiEnvelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
            TransportError::InvalidPayload(format!("{method} (HTTP {status}): {e}"))
        })?;

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or(i64::from(status));
            let description = envelope.description.unwrap_or_default();
            debug!(method, code, description = %description, "Bot API call rejected");
            return Err(TransportError::Api { code, description });
        }

        envelope
            .result
            .ok_or_else(|| TransportError::InvalidPayload(format!("{method}: missing result")))
    }

    /// Identity of the bot behind the token.
    pub async fn get_me(&self) -> Result<BotInfo, TransportError> {
        self.call("getMe", &serde_json::json!({}), CALL_TIMEOUT).await
    }

    /// Fetch raw updates starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call(
            "getUpdates",
            &body,
            Duration::from_secs(timeout_secs) + POLL_GRACE,
        )
        .await
    }

    pub async fn get_webhook_info(&self) -> Result<WebhookInfo, TransportError> {
        self.call("getWebhookInfo", &serde_json::json!({}), CALL_TIMEOUT)
            .await
    }

    /// Register `url` as the webhook. When `certificate` points at an existing
    /// file it is uploaded so Telegram accepts a self-signed certificate.
    pub async fn set_webhook(
        &self,
        url: &str,
        certificate: Option<&Path>,
    ) -> Result<(), TransportError> {
        let certificate = certificate.filter(|p| p.is_file());

        let _: bool = match certificate {
            None => {
                self.call("setWebhook", &serde_json::json!({ "url": url }), CALL_TIMEOUT)
                    .await?
            }
            Some(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    TransportError::NotConfigured(format!(
                        "cannot read certificate {}: {e}",
                        path.display()
                    ))
                })?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "cert.pem".into());
                let form = reqwest::multipart::Form::new().text("url", url.to_string()).part(
                    "certificate",
                    reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                );

                info!(certificate = %path.display(), "Uploading webhook certificate");
                let response = self
                    .client
                    .post(self.method_url("setWebhook"))
                    .timeout(CALL_TIMEOUT)
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| TransportError::Network(e.without_url().to_string()))?;
                Self::unwrap_envelope("setWebhook", response).await?
            }
        };
        Ok(())
    }

    /// Remove any webhook so `getUpdates` is accepted.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({}), CALL_TIMEOUT)
            .await?;
        Ok(())
    }

    /// Set the webhook to `url` unless Telegram already reports that URL.
    /// Returns `true` when the webhook was (re)registered.
    pub async fn ensure_webhook(
        &self,
        url: &str,
        certificate: Option<&Path>,
    ) -> Result<bool, TransportError> {
        let current = match self.get_webhook_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Could not read current webhook; setting it anyway");
                WebhookInfo::default()
            }
        };

        if current.url == url {
            info!(url, "Webhook already set");
            return Ok(false);
        }

        info!(url, previous = %current.url, "Setting webhook");
        self.set_webhook(url, certificate).await?;
        Ok(true)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<MessageId, TransportError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::json!(mode.as_str());
        }
        let sent: SentMessage = self.call("sendMessage", &body, CALL_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::json!(mode.as_str());
        }
        // Result is the edited Message (or `true` for inline messages).
        let _: serde_json::Value = self.call("editMessageText", &body, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": chat_id, "message_id": message_id });
        let _: bool = self.call("deleteMessage", &body, CALL_TIMEOUT).await?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: bool = self.call("sendChatAction", &body, CALL_TIMEOUT).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<InboundUpdate>, TransportError> {
        let updates = self.get_updates(offset, timeout_secs).await?;
        Ok(updates.into_iter().map(Update::into_inbound).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123:ABC";

    async fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(TOKEN).with_api_base(server.uri())
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "result": result}))
    }

    async fn last_body(server: &MockServer) -> serde_json::Value {
        let requests = server.received_requests().await.unwrap();
        serde_json::from_slice(&requests.last().unwrap().body).unwrap()
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", TelegramClient::new("secret-token"));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("REDACTED"));
    }

    #[tokio::test]
    async fn send_message_returns_id_and_sets_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ok(serde_json::json!({"message_id": 321, "chat": {"id": 9}})))
            .expect(1)
            .mount(&server)
            .await;

        let tg = client(&server).await;
        let id = tg
            .send_message(9, "*hi*", Some(ParseMode::Markdown))
            .await
            .unwrap();
        assert_eq!(id, 321);

        let body = last_body(&server).await;
        assert_eq!(body["chat_id"], 9);
        assert_eq!(body["text"], "*hi*");
        assert_eq!(body["parse_mode"], "Markdown");
    }

    #[tokio::test]
    async fn plain_send_omits_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ok(serde_json::json!({"message_id": 1, "chat": {"id": 9}})))
            .mount(&server)
            .await;

        client(&server).await.send_message(9, "...", None).await.unwrap();
        assert!(last_body(&server).await.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn api_rejection_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .edit_message(1, 2, "same", None)
            .await
            .unwrap_err();
        match err {
            TransportError::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("not modified"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/deleteMessage")))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = client(&server).await.delete_message(1, 2).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn network_error_does_not_leak_token() {
        let tg = TelegramClient::new("999:SECRET").with_api_base("http://127.0.0.1:1");
        let err = tg.send_typing(1).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(!err.to_string().contains("SECRET"));
    }

    #[tokio::test]
    async fn typing_sends_chat_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendChatAction")))
            .respond_with(ok(serde_json::json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.send_typing(44).await.unwrap();
        let body = last_body(&server).await;
        assert_eq!(body["action"], "typing");
        assert_eq!(body["chat_id"], 44);
    }

    #[tokio::test]
    async fn poll_converts_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getUpdates")))
            .respond_with(ok(serde_json::json!([
                {
                    "update_id": 100,
                    "message": {
                        "message_id": 1,
                        "chat": {"id": 7},
                        "from": {"id": 8, "first_name": "Kim"},
                        "text": "/start",
                        "entities": [{"type": "bot_command", "offset": 0, "length": 6}]
                    }
                },
                {"update_id": 101, "channel_post": {"message_id": 2, "chat": {"id": -1}}}
            ])))
            .mount(&server)
            .await;

        let updates = client(&server).await.poll(100, 30).await.unwrap();
        assert_eq!(updates.len(), 2);
        let event = updates[0].event.as_ref().unwrap();
        assert_eq!(event.command.as_deref(), Some("start"));
        assert_eq!(event.sender.display_name, "Kim");
        assert!(updates[1].event.is_none());

        let body = last_body(&server).await;
        assert_eq!(body["offset"], 100);
        assert_eq!(body["timeout"], 30);
    }

    #[tokio::test]
    async fn ensure_webhook_skips_when_already_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getWebhookInfo")))
            .respond_with(ok(serde_json::json!({
                "url": "https://bot.example.com:8443/webhook",
                "pending_update_count": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/setWebhook")))
            .respond_with(ok(serde_json::json!(true)))
            .expect(0)
            .mount(&server)
            .await;

        let changed = client(&server)
            .await
            .ensure_webhook("https://bot.example.com:8443/webhook", None)
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn ensure_webhook_sets_new_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/getWebhookInfo")))
            .respond_with(ok(serde_json::json!({"url": ""})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/setWebhook")))
            .respond_with(ok(serde_json::json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let changed = client(&server)
            .await
            .ensure_webhook("https://bot.example.com/webhook", Some(Path::new("/nonexistent/cert.pem")))
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(last_body(&server).await["url"], "https://bot.example.com/webhook");
    }

    #[tokio::test]
    async fn set_webhook_uploads_existing_certificate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/setWebhook")))
            .respond_with(ok(serde_json::json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n")
            .unwrap();

        client(&server)
            .await
            .set_webhook("https://bot.example.com/webhook", Some(&cert))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"certificate\""));
        assert!(body.contains("BEGIN CERTIFICATE"));
        assert!(body.contains("https://bot.example.com/webhook"));
    }

    #[tokio::test]
    async fn delete_webhook_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/deleteWebhook")))
            .respond_with(ok(serde_json::json!(true)))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.delete_webhook().await.unwrap();
    }
}
