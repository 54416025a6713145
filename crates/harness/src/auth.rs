//! Session authentication
//!
//! Two flows are supported: a direct username/password login and a phone
//! OTP challenge followed by a confirm call. Both yield an immutable
//! [`Credential`] made of the session cookies (and a bearer token when the
//! service hands one out), created once per run and shared read-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Longest response body quoted in an auth error
const ERROR_BODY_LIMIT: usize = 200;

/// Authenticated session material
#[derive(Debug, Clone, Default, Serialize)]
pub struct Credential {
    pub identity: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cookies: Vec<(String, String)>,
    #[serde(skip)]
    token: Option<String>,
}

impl Credential {
    /// Credential that adds nothing to requests
    pub fn anonymous() -> Self {
        Self {
            issued_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn new(identity: impl Into<String>, cookies: Vec<(String, String)>, token: Option<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            issued_at: Utc::now(),
            expires_at: None,
            cookies,
            token,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.cookies.is_empty() && self.token.is_none()
    }

    pub fn cookie_names(&self) -> Vec<&str> {
        self.cookies.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// `name=value; name=value` as sent in a `Cookie` header
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Attach the session to a request
    pub fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(cookie) = self.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

/// Something that can produce a [`Credential`]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, client: &reqwest::Client) -> Result<Credential, AuthError>;
}

/// No credential
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn authenticate(&self, _client: &reqwest::Client) -> Result<Credential, AuthError> {
        Ok(Credential::anonymous())
    }
}

/// Single POST of username and password
pub struct PasswordLogin {
    pub url: Url,
    pub username: String,
    pub password: String,
}

#[async_trait]
impl AuthProvider for PasswordLogin {
    async fn authenticate(&self, client: &reqwest::Client) -> Result<Credential, AuthError> {
        info!("Logging in as {}", self.username);
        let body = json!({ "username": self.username, "password": self.password });
        let reply = post_json(client, "login", &self.url, &body).await?;
        // A login body without a success flag is accepted on HTTP 200
        if reply.body.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(unsuccessful("login", &reply.body));
        }
        Ok(reply.into_credential(&self.username))
    }
}

/// Phone OTP: request a secret code, then confirm it with the OTP
pub struct OtpLogin {
    pub login_url: Url,
    pub confirm_url: Url,
    pub phone: String,
    pub otp: String,
}

#[async_trait]
impl AuthProvider for OtpLogin {
    async fn authenticate(&self, client: &reqwest::Client) -> Result<Credential, AuthError> {
        info!("Requesting OTP challenge for {}", self.phone);
        let challenge = post_json(client, "login", &self.login_url, &json!({ "phone": self.phone })).await?;
        require_success("login", &challenge.body)?;

        // Sent back exactly as issued, whatever its JSON type
        let secret_code = challenge
            .body
            .pointer("/result/secret_code")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or(AuthError::MissingSecretCode)?;

        debug!("Confirming OTP for {}", self.phone);
        let confirm_body = json!({
            "phone": self.phone,
            "otp": self.otp,
            "secret_code": secret_code,
        });
        let confirm = post_json(client, "confirm", &self.confirm_url, &confirm_body).await?;
        require_success("confirm", &confirm.body)?;

        Ok(confirm.into_credential(&self.phone))
    }
}

/// Build the provider described by a config profile
pub fn provider_for(
    profile: &str,
    config: &AuthConfig,
    base_url: &Url,
) -> Result<Box<dyn AuthProvider>, AuthError> {
    let join = |path: &str| {
        base_url.join(path).map_err(|e| AuthError::Transport {
            step: "login",
            url: path.to_string(),
            reason: e.to_string(),
        })
    };

    match config {
        AuthConfig::None => Ok(Box::new(NoAuth)),
        AuthConfig::Password {
            login_path,
            username,
            ..
        } => Ok(Box::new(PasswordLogin {
            url: join(login_path)?,
            username: username.clone(),
            password: config.password(profile)?,
        })),
        AuthConfig::Otp {
            login_path,
            confirm_path,
            phone,
            ..
        } => Ok(Box::new(OtpLogin {
            login_url: join(login_path)?,
            confirm_url: join(confirm_path)?,
            phone: phone.clone(),
            otp: config.otp(profile)?,
        })),
    }
}

/// Successful JSON reply of an auth step, with the cookies it set
struct AuthReply {
    body: Value,
    cookies: Vec<(String, String)>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthReply {
    fn into_credential(self, identity: &str) -> Credential {
        let token = ["/result/access", "/result/token", "/result/access_token", "/access", "/token"]
            .iter()
            .find_map(|p| self.body.pointer(p).and_then(Value::as_str))
            .map(str::to_string);
        if self.cookies.is_empty() && token.is_none() {
            warn!("Authentication for {} succeeded but issued no cookie or token", identity);
        }
        Credential::new(identity, self.cookies, token).with_expiry(self.expires_at)
    }
}

async fn post_json(
    client: &reqwest::Client,
    step: &'static str,
    url: &Url,
    body: &Value,
) -> Result<AuthReply, AuthError> {
    let response = client
        .post(url.clone())
        .json(body)
        .send()
        .await
        .map_err(|e| AuthError::Transport {
            step,
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    let now = Utc::now();
    let mut cookies = Vec::new();
    let mut expires_at: Option<DateTime<Utc>> = None;
    for header in response.headers().get_all(SET_COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        if let Some((pair, expiry)) = parse_set_cookie(raw, now) {
            cookies.push(pair);
            expires_at = match (expires_at, expiry) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
    }

    let text = response.text().await.map_err(|e| AuthError::Transport {
        step,
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if status != StatusCode::OK {
        return Err(AuthError::Rejected {
            step,
            status: status.as_u16(),
            body: truncate(&text),
        });
    }

    let body = serde_json::from_str(&text).map_err(|e| AuthError::Malformed {
        step,
        reason: e.to_string(),
    })?;

    Ok(AuthReply {
        body,
        cookies,
        expires_at,
    })
}

fn require_success(step: &'static str, body: &Value) -> Result<(), AuthError> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        Ok(())
    } else {
        Err(unsuccessful(step, body))
    }
}

fn unsuccessful(step: &'static str, body: &Value) -> AuthError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| truncate(&body.to_string()));
    AuthError::Unsuccessful { step, message }
}

/// Split a `Set-Cookie` header into its pair and expiry
fn parse_set_cookie(raw: &str, now: DateTime<Utc>) -> Option<((String, String), Option<DateTime<Utc>>)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    if name.is_empty() {
        return None;
    }

    let mut expires = None;
    for attr in parts {
        let (key, val) = attr.trim().split_once('=').unwrap_or((attr.trim(), ""));
        if key.eq_ignore_ascii_case("max-age") {
            if let Ok(secs) = val.trim().parse::<i64>() {
                expires = Some(now + chrono::Duration::seconds(secs));
                break;
            }
        } else if key.eq_ignore_ascii_case("expires") {
            if let Ok(at) = DateTime::parse_from_rfc2822(val.trim()) {
                expires = Some(at.with_timezone(&Utc));
            }
        }
    }

    Some(((name.trim().to_string(), value.trim().to_string()), expires))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= ERROR_BODY_LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(ERROR_BODY_LIMIT).collect();
        format!("{}...", head)
    }
}
