use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::*;
use crate::redact::{self, Masked};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const USER_AGENT: &str = "ufanet/0.1";
const AUTH_PATH: &str = "api/v1/auth/auth_by_contract/";
const VERIFY_PATH: &str = "api-token-verify/";
const INTERCOMS_PATH: &str = "api/v0/skud/shared/";
const CALL_HISTORY_PATH: &str = "api/v1/skuds/call-history/";
const CALL_HISTORY_LINKS_PATH: &str = "api/v1/cctv/history/";

/// Position of a call in the single-retry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
enum Attempt {
    FirstAttempt,
    Refreshing,
    SecondAttempt,
}

struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    /// Body keys hidden from logs on top of the fixed sensitive set.
    secret_keys: &'static [&'static str],
}

impl ApiRequest {
    fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
            secret_keys: &[],
        }
    }

    fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self> {
        let body = serde_json::to_value(body)
            .map_err(|err| Error::InvalidConfig(format!("unserializable request body: {err}")))?;
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            secret_keys: &[],
        })
    }

    fn with_query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn with_secret_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.secret_keys = keys;
        self
    }

    fn logged_body(&self) -> Value {
        self.body
            .as_ref()
            .map(|body| redact::mask_with(body, self.secret_keys))
            .unwrap_or(Value::Null)
    }
}

/// Client for the Ufanet intercom API.
///
/// Owns one HTTP session and the bearer token. Every operation takes
/// `&mut self` because a 401 may replace the token; callers sharing one
/// instance must serialize access themselves.
pub struct UfanetClient {
    http: Option<Client>,
    base_url: Url,
    timeout: Duration,
    contract: String,
    password: String,
    token: Option<String>,
}

impl fmt::Debug for UfanetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UfanetClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("contract", &self.contract)
            .field("password", &redact::MASK)
            .field("token", &self.token.as_ref().map(|_| redact::MASK))
            .field("closed", &self.http.is_none())
            .finish()
    }
}

impl UfanetClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut base = config
            .base_url
            .parse::<Url>()
            .map_err(|err| Error::InvalidConfig(format!("invalid base url: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::InvalidConfig(format!("failed to build client: {err}")))?;

        Ok(Self {
            http: Some(http),
            base_url: base,
            timeout: config.timeout,
            contract: config.contract,
            password: config.password,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.http.is_none()
    }

    /// Releases the HTTP session. Safe to call more than once.
    pub fn close(&mut self) {
        if self.http.take().is_some() {
            debug!(base_url = %self.base_url, "session closed");
        }
    }

    pub async fn list_intercoms(&mut self) -> Result<Vec<Intercom>> {
        let value = self.send(&ApiRequest::get(INTERCOMS_PATH)).await?;
        decode(&value)
    }

    /// Triggers the door of one intercom. Returns the server's verdict.
    pub async fn open_intercom(&mut self, intercom_id: i64) -> Result<bool> {
        let path = format!("{INTERCOMS_PATH}{intercom_id}/open/");
        let value = self.send(&ApiRequest::get(path)).await?;
        let opened: OpenResult = decode(&value)?;
        opened.result.ok_or_else(|| {
            Error::unknown(
                StatusCode::OK,
                Some(redact::mask(&value)),
                "response has no `result` field",
            )
        })
    }

    pub async fn call_history(&mut self, query: HistoryQuery) -> Result<History> {
        let request = ApiRequest::get(CALL_HISTORY_PATH)
            .with_query("page", query.page)
            .with_query("page_size", query.page_size);
        let value = self.send(&request).await?;
        decode(&value)
    }

    /// Media links for one call; accepts a [`Uuid`] or its string form.
    pub async fn call_history_links(&mut self, uuid: impl fmt::Display) -> Result<HistoryData> {
        let body = HistoryLinksRequest {
            uuid: uuid.to_string(),
        };
        let request = ApiRequest::post(CALL_HISTORY_LINKS_PATH, &body)?;
        let value = self.send(&request).await?;
        decode(&value)
    }

    /// Asks the server whether the held token is still valid. A client
    /// without a token gets [`Error::Unauthorized`] without a round trip.
    pub async fn token_verify(&self) -> Result<()> {
        let Some(token) = &self.token else {
            return Err(Error::Unauthorized);
        };
        let body = VerifyRequest {
            token: token.clone(),
        };
        let request = ApiRequest::post(VERIFY_PATH, &body)?.with_secret_keys(&["token"]);
        self.execute(&request).await?;
        Ok(())
    }

    /// Runs a request with at most one token refresh in between.
    async fn send(&mut self, request: &ApiRequest) -> Result<Value> {
        let mut state = Attempt::FirstAttempt;
        loop {
            debug!(state = %state, path = %request.path, "request state");
            state = match state {
                Attempt::FirstAttempt => match self.execute(request).await {
                    Err(Error::Unauthorized) => Attempt::Refreshing,
                    outcome => return outcome,
                },
                Attempt::Refreshing => {
                    self.prepare_token().await?;
                    Attempt::SecondAttempt
                }
                Attempt::SecondAttempt => return self.execute(request).await,
            };
        }
    }

    async fn prepare_token(&mut self) -> Result<()> {
        if self.token.is_some() {
            match self.token_verify().await {
                Ok(()) => return Ok(()),
                Err(Error::Unauthorized) => {
                    warn!("held token rejected by verify, authenticating by contract");
                    self.token = None;
                }
                Err(err) => return Err(err),
            }
        }
        self.set_token().await
    }

    async fn set_token(&mut self) -> Result<()> {
        let body = AuthRequest {
            contract: self.contract.clone(),
            password: self.password.clone(),
        };
        let value = self.execute(&ApiRequest::post(AUTH_PATH, &body)?).await?;
        let auth: AuthResponse = decode(&value)?;
        // The vendor authorizes subsequent calls with the refresh value.
        self.token = Some(auth.token.refresh);
        info!(exp = auth.token.exp, "authenticated by contract");
        Ok(())
    }

    /// One HTTP round trip with the current token; no refresh.
    async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let http = self.http.as_ref().ok_or(Error::Closed)?;
        let request_id = Uuid::new_v4().simple().to_string();

        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|err| Error::InvalidConfig(format!("invalid url: {err}")))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        let authorization = format!("JWT {}", self.token.as_deref().unwrap_or_default());
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization)
                .map_err(|_| Error::InvalidConfig("invalid characters in token".into()))?,
        );

        let logged_headers = json!({ "Authorization": authorization });
        let params: BTreeMap<&str, &str> = request
            .query
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect();
        info!(
            request_id = %request_id,
            method = %request.method,
            url = %url,
            headers = %Masked(&logged_headers),
            params = %Masked(&params),
            json = %request.logged_body(),
            "request"
        );

        let mut builder = http
            .request(request.method.clone(), url)
            .headers(headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.transport_failure(&request_id, err, None)),
        };
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            error!(request_id = %request_id, error = Error::Unauthorized.kind(), "response unauthorized");
            return Err(Error::Unauthorized);
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Err(self.transport_failure(&request_id, err, Some(status))),
        };
        let parsed = if text.trim().is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(&text)
        };

        match (status, parsed) {
            (StatusCode::OK, Ok(json)) => {
                info!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    json = %redact::mask_with(&json, request.secret_keys),
                    "response"
                );
                Ok(json)
            }
            (StatusCode::OK, Err(err)) => {
                let err = Error::unknown(status, None, format!("invalid JSON body: {err}"));
                error!(request_id = %request_id, error = err.kind(), "{err}");
                Err(err)
            }
            (_, parsed) => {
                let body = parsed
                    .ok()
                    .map(|json| redact::mask_with(&json, request.secret_keys));
                error!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    json = %Masked(&body),
                    "unsuccessful request"
                );
                Err(Error::unknown(status, body, "unsuccessful request"))
            }
        }
    }

    fn transport_failure(
        &self,
        request_id: &str,
        err: reqwest::Error,
        status: Option<StatusCode>,
    ) -> Error {
        let err = Error::from_transport(err, self.timeout, status);
        error!(request_id = %request_id, error = err.kind(), "{err}");
        err
    }
}

/// Maps a JSON payload onto a model. Shape mismatches surface as
/// [`Error::Unknown`] carrying the serde message.
fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|err| {
        Error::unknown(
            StatusCode::OK,
            Some(redact::mask(value)),
            format!("unexpected response shape: {err}"),
        )
    })
}
