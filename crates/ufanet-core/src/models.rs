use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_with::skip_serializing_none;
use std::fmt;

/// Token envelope returned by `api/v1/auth/auth_by_contract/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access: String,
    pub refresh: String,
    /// Expiry as unix epoch seconds.
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: Token,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub contract: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryLinksRequest {
    pub uuid: String,
}

/// Contract reference on an intercom. The vendor sends it either as a
/// string or as a bare number depending on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractId::Number(n) => write!(f, "{n}"),
            ContractId::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
}

/// A shared door-access device (SKUD) on the contract's premises.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intercom {
    pub id: i64,
    pub contract: Option<ContractId>,
    pub role: Role,
    pub camera: Option<String>,
    pub cctv_number: String,
    pub string_view: String,
    pub timeout: i64,
    pub disable_button: bool,
    pub no_sound: bool,
    pub open_in_talk: String,
    pub open_type: String,
    pub dtmf_code: String,
    pub inactivity_reason: Option<String>,
    pub house: i64,
    pub frsi: bool,
    pub is_fav: bool,
    pub model: i64,
    pub custom_name: Option<String>,
    pub is_blocked: bool,
    pub supports_key_recording: bool,
    pub ble_support: bool,
    pub scope: String,
}

impl Intercom {
    /// Name to show a person: the user-assigned name when set.
    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.string_view)
    }
}

impl PartialEq for Intercom {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Intercom {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraServers {
    pub server: bool,
    pub domain: String,
    pub screenshot_domain: String,
    pub vendor_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub number: String,
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    pub address: String,
    pub token_l: String,
    pub token_r: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub servers: CameraServers,
}

impl Camera {
    pub fn rtsp_url(&self) -> String {
        format!(
            "rtsp://{}/{}?token={}",
            self.servers.domain, self.number, self.token_l
        )
    }
}

/// One entry of the call log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResult {
    pub uuid: String,
    pub house_id: i64,
    pub address: String,
    pub porch: String,
    pub flat: String,
    /// Accepts RFC 3339, offset-less ISO 8601 (read as UTC) or epoch seconds.
    #[serde(deserialize_with = "flexible_timestamp")]
    pub called_at: DateTime<FixedOffset>,
    pub camera_number: String,
    pub skud_mac: String,
    pub timezone: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(i64),
    Text(String),
}

fn flexible_timestamp<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Seconds(secs) => DateTime::from_timestamp(secs, 0)
            .map(|utc| utc.fixed_offset())
            .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range"))),
        RawTimestamp::Text(text) => parse_timestamp(&text).ok_or_else(|| {
            de::Error::custom(format!("invalid timestamp `{text}`"))
        }),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Paginated call log page.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<HistoryResult>,
}

/// Media links for a recorded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryData {
    pub url: String,
    pub preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub page: u32,
    pub page_size: u32,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 25,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenResult {
    pub result: Option<bool>,
}
