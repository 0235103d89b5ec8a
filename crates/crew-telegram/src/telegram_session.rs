use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crew_core::current_unix_timestamp_ms;

use crate::telegram_contract::{
    TelegramInboundMessage, TelegramSendError, TelegramSendReceipt, TelegramSessionConfig,
};
use crate::telegram_peer::PeerAddress;

/// Seam for the one-time login code entered during interactive bootstrap.
pub trait LoginCodePrompt: Send + Sync {
    fn prompt_login_code(&self) -> Result<String>;
}

/// Reads the login code from the operator's terminal.
pub struct StdinLoginCodePrompt;

impl LoginCodePrompt for StdinLoginCodePrompt {
    fn prompt_login_code(&self) -> Result<String> {
        print!("Enter telegram login code: ");
        std::io::stdout()
            .flush()
            .context("failed to flush login code prompt")?;
        let mut buffer = String::new();
        std::io::stdin()
            .read_line(&mut buffer)
            .context("failed to read login code")?;
        Ok(buffer.trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SendCodeResponse {
    code_ref: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    session_token: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    message_id: Option<String>,
}

/// An authenticated, connected platform session. Cheap to share behind an
/// `Arc`; every outbound send and the inbound poller go through one value.
#[derive(Debug)]
pub struct TelegramSession {
    client: Client,
    api_base: String,
    session_token: String,
    poll_interval_ms: u64,
}

impl TelegramSession {
    /// Builds a session handle from an already-minted token. The token is
    /// not verified here; `TelegramSessionManager::bootstrap` is the path
    /// that proves it against the platform.
    pub fn open(api_base: &str, session_token: &str, config: &TelegramSessionConfig) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/');
        if api_base.is_empty() {
            bail!("telegram api base cannot be empty");
        }
        let session_token = session_token.trim();
        if session_token.is_empty() {
            bail!("telegram session token cannot be empty");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms.max(1)))
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self {
            client,
            api_base: api_base.to_string(),
            session_token: session_token.to_string(),
            poll_interval_ms: config.poll_interval_ms,
        })
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub(crate) fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    /// Sends one text message to a resolved peer. Never retried here: a
    /// duplicate notification is worse than a missed one, so failures are
    /// surfaced to the caller for logging only.
    pub async fn send_text(
        &self,
        peer: &PeerAddress,
        text: &str,
    ) -> Result<TelegramSendReceipt, TelegramSendError> {
        let url = format!("{}/messages/send", self.api_base);
        let body = json!({
            "peer": peer.as_wire_value(),
            "text": text,
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.session_token)
            .json(&body)
            .send()
            .await
            .map_err(|error| TelegramSendError::NotConnected(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TelegramSendError::PeerUnreachable {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TelegramSendError::Rejected {
                status: status.as_u16(),
                detail: truncate_detail(&detail),
            });
        }
        let parsed = response
            .json::<SendMessageResponse>()
            .await
            .map_err(|error| TelegramSendError::Rejected {
                status: status.as_u16(),
                detail: format!("unparseable send response: {error}"),
            })?;
        Ok(TelegramSendReceipt {
            peer: peer.to_string(),
            provider_message_id: parsed.message_id,
            sent_unix_ms: current_unix_timestamp_ms(),
        })
    }

    /// Directory lookup for a human-readable sender label. Failure is
    /// ordinary; callers fall back to the stringified account id.
    pub async fn lookup_display_name(&self, user_id: i64) -> Result<String> {
        let url = format!("{}/users/{user_id}", self.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.session_token)
            .send()
            .await
            .with_context(|| format!("directory lookup transport failure for {user_id}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("directory lookup for {user_id} returned status {status}");
        }
        let value = response
            .json::<Value>()
            .await
            .context("directory lookup returned unparseable body")?;
        let first = value
            .get("first_name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        let last = value
            .get("last_name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        let label = format!("{first} {last}").trim().to_string();
        if label.is_empty() {
            bail!("directory record for {user_id} has no printable name");
        }
        Ok(label)
    }

    pub(crate) async fn fetch_updates(&self, offset: u64) -> Result<Vec<TelegramInboundMessage>> {
        let url = format!("{}/updates", self.api_base);
        let response = self
            .client
            .get(&url)
            .query(&[("offset", offset.to_string().as_str())])
            .bearer_auth(&self.session_token)
            .send()
            .await
            .context("updates long-poll transport failure")?;
        let status = response.status();
        if !status.is_success() {
            bail!("updates long-poll returned status {status}");
        }
        let value = response
            .json::<Value>()
            .await
            .context("updates long-poll returned unparseable body")?;
        let updates = value
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("updates response missing result[]"))?;
        let mut messages = Vec::with_capacity(updates.len());
        for update in updates {
            let message = serde_json::from_value::<TelegramInboundMessage>(update.clone())
                .context("malformed update in long-poll result")?;
            messages.push(message);
        }
        Ok(messages)
    }
}

/// Owns the process-wide session singleton. `bootstrap` is safe to call
/// from any number of tasks; the gate guarantees one login sequence.
pub struct TelegramSessionManager {
    config: TelegramSessionConfig,
    prompt: Arc<dyn LoginCodePrompt>,
    gate: OnceCell<Arc<TelegramSession>>,
}

impl TelegramSessionManager {
    pub fn new(config: TelegramSessionConfig, prompt: Arc<dyn LoginCodePrompt>) -> Result<Self> {
        if config.api_base.trim().is_empty() {
            bail!("telegram api base cannot be empty");
        }
        if config.api_id <= 0 {
            bail!("telegram api id must be a positive application identifier");
        }
        if config.api_hash.trim().is_empty() {
            bail!("telegram api hash cannot be empty");
        }
        Ok(Self {
            config,
            prompt,
            gate: OnceCell::new(),
        })
    }

    /// Returns the connected session, establishing it on first call. A
    /// failed attempt leaves the gate empty so a later call can retry.
    pub async fn bootstrap(&self) -> Result<Arc<TelegramSession>> {
        self.gate
            .get_or_try_init(|| async { self.establish().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn establish(&self) -> Result<TelegramSession> {
        let stored_token = self
            .config
            .session_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty());
        match stored_token {
            Some(token) => self.resume_headless(token).await,
            None => self.login_interactive().await,
        }
    }

    async fn resume_headless(&self, token: &str) -> Result<TelegramSession> {
        let session = TelegramSession::open(&self.config.api_base, token, &self.config)?;
        let url = format!("{}/session/resume", session.api_base);
        let body = json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "session_token": token,
        });
        post_json_with_retry(
            &session.client,
            &url,
            &body,
            self.config.connect_retry_max_attempts,
            self.config.connect_retry_base_delay_ms,
        )
        .await
        .context("failed to resume telegram session from stored token")?;
        tracing::info!("telegram session ready (resumed)");
        Ok(session)
    }

    async fn login_interactive(&self) -> Result<TelegramSession> {
        let phone_number = self
            .config
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty())
            .ok_or_else(|| anyhow!("interactive telegram bootstrap requires a phone number"))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(self.config.http_timeout_ms.max(1)))
            .build()
            .context("failed to build telegram bootstrap http client")?;
        let api_base = self.config.api_base.trim().trim_end_matches('/');

        let send_code_url = format!("{api_base}/auth/send-code");
        let send_code_body = json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "phone_number": phone_number,
        });
        let code_ref = post_json_with_retry(
            &client,
            &send_code_url,
            &send_code_body,
            self.config.connect_retry_max_attempts,
            self.config.connect_retry_base_delay_ms,
        )
        .await
        .and_then(|value| {
            serde_json::from_value::<SendCodeResponse>(value)
                .context("send-code response missing code_ref")
        })?
        .code_ref;

        let code = self.prompt.prompt_login_code()?;
        if code.trim().is_empty() {
            bail!("telegram login code cannot be empty");
        }

        // The code is single-use, so sign-in is one attempt with no retry.
        let sign_in_url = format!("{api_base}/auth/sign-in");
        let mut sign_in_body = json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "phone_number": phone_number,
            "code_ref": code_ref,
            "code": code.trim(),
        });
        if let Some(secret) = self
            .config
            .two_factor_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
        {
            if let Value::Object(map) = &mut sign_in_body {
                map.insert("password".to_string(), Value::String(secret.to_string()));
            }
        }
        let response = client
            .post(&sign_in_url)
            .json(&sign_in_body)
            .send()
            .await
            .context("telegram sign-in transport failure")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!(
                "telegram sign-in failed with status {}: {}",
                status.as_u16(),
                truncate_detail(&detail)
            );
        }
        let token = response
            .json::<SignInResponse>()
            .await
            .context("sign-in response missing session_token")?
            .session_token;

        // Deliberate manual handoff: the operator persists the token for
        // headless restarts; this process never writes it anywhere.
        println!("telegram session ready (first login)");
        println!("store this token as CREW_TELEGRAM_SESSION for headless restarts:");
        println!("{token}");

        TelegramSession::open(api_base, &token, &self.config)
    }
}

async fn post_json_with_retry(
    client: &Client,
    url: &str,
    body: &Value,
    max_attempts: usize,
    base_delay_ms: u64,
) -> Result<Value> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        attempt = attempt.saturating_add(1);
        let response = client.post(url).json(body).send().await;
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                if attempt < max_attempts {
                    tracing::warn!(attempt, url, "telegram connect attempt failed: {error}");
                    sleep_retry_backoff(base_delay_ms, attempt).await;
                    continue;
                }
                return Err(error).with_context(|| {
                    format!("telegram request to {url} failed after {attempt} attempts")
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .with_context(|| format!("telegram response from {url} was not JSON"));
        }
        let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if retryable && attempt < max_attempts {
            tracing::warn!(
                attempt,
                url,
                status = status.as_u16(),
                "telegram connect attempt returned retryable status"
            );
            sleep_retry_backoff(base_delay_ms, attempt).await;
            continue;
        }
        let detail = response.text().await.unwrap_or_default();
        bail!(
            "telegram request to {url} failed with status {}: {}",
            status.as_u16(),
            truncate_detail(&detail)
        );
    }
}

async fn sleep_retry_backoff(base_delay_ms: u64, attempt: usize) {
    if base_delay_ms == 0 {
        return;
    }
    let delay_ms = base_delay_ms.saturating_mul(u64::try_from(attempt).unwrap_or(1));
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

fn truncate_detail(raw: &str) -> String {
    const MAX_DETAIL_CHARS: usize = 200;
    let trimmed = raw.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        return trimmed.to_string();
    }
    let prefix: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
    format!("{prefix}...")
}
