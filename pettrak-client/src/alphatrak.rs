//! AlphaTRAK client using the mobile app's HTTP API.
//!
//! All calls are JSON `POST`s against a single base URL. Data calls carry the
//! session token as a bearer header.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use pettrak_client::alphatrak::AlphaTrakClient;
//! use pettrak_client::{CloudClient, Credential};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AlphaTrakClient::builder().build()?;
//!
//!     let session = client
//!         .login(&Credential::new("owner@example.com", "secret"))
//!         .await?;
//!
//!     for pet in client.list_pets(&session).await? {
//!         let since = Utc::now() - Duration::days(7);
//!         let readings = client.fetch_readings(&session, &pet, since).await?;
//!         println!("{}: {} readings", pet, readings.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use pettrak_types::{
    EventCategory, EventPayload, GlucoseFlags, GlucoseRange, Pet, PetId, RawEvent, RawReading,
};

use crate::{ClientError, CloudClient, Credential, Records, Session};

/// Default API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://alphatrakapi.zoetis.com/api";

/// User agent of the iOS app the API is built for.
pub const DEFAULT_USER_AGENT: &str =
    "AlphaTRAK/1.40.3 (com.zoetis.alphatrak; build:39; iOS 18.6.2) Alamofire/4.9.1";

const LOGIN_PATH: &str = "Login";
const PET_LIST_PATH: &str = "GetPetList";
const ACTIVITY_PATH: &str = "GetPetActivityByDateWiseList";

const WIRE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Activity lists that map to event categories.
const EVENT_LISTS: [(&str, EventCategory); 8] = [
    ("Feeding", EventCategory::Feeding),
    ("Insulin", EventCategory::Insulin),
    ("Exercise", EventCategory::Exercise),
    ("Urination", EventCategory::Urination),
    ("Vomiting", EventCategory::Vomiting),
    ("WaterIntake", EventCategory::WaterIntake),
    ("SignsOfillness", EventCategory::IllnessSign),
    ("Weight", EventCategory::Weight),
];

/// Client for the AlphaTRAK cloud API.
#[derive(Debug, Clone)]
pub struct AlphaTrakClient {
    client: Client,
    endpoint: String,
    language_id: String,
}

/// Which kind of call a response belongs to. Decides how a 401 and a 404
/// are classified.
#[derive(Debug, Clone, Copy)]
enum Call {
    Login,
    PetList,
    Activity(PetId),
}

impl AlphaTrakClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> AlphaTrakClientBuilder {
        AlphaTrakClientBuilder::default()
    }

    /// The base URL requests are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(
        &self,
        call: Call,
        path: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Result<Option<T>, ClientError> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!(?call, url = %url, "Sending request");

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(match call {
                Call::Login => ClientError::Auth("Invalid username or password".to_string()),
                Call::PetList | Call::Activity(_) => ClientError::AuthExpired,
            });
        }

        if status == StatusCode::NOT_FOUND {
            if let Call::Activity(pet_id) = call {
                return Err(ClientError::PetRemoved(pet_id));
            }
        }

        if !status.is_success() {
            return Err(ClientError::Server(format!("API returned status {}", status)));
        }

        let envelope: Envelope<T> = response.json().await?;

        if !envelope.is_success {
            let detail = envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(match call {
                Call::Login => ClientError::Auth(detail),
                Call::PetList | Call::Activity(_) => ClientError::Server(detail),
            });
        }

        Ok(envelope.response_data)
    }

    async fn fetch_activity(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<ActivityData, ClientError> {
        let body = json!({
            "PetId": pet.id.get(),
            "FromDate": since.format(WIRE_DATE_FORMAT).to_string(),
            "Todate": Utc::now().format(WIRE_DATE_FORMAT).to_string(),
            "LanguageId": self.language_id,
        });

        let data = self
            .post::<ActivityData>(
                Call::Activity(pet.id),
                ACTIVITY_PATH,
                Some(session.token()),
                &body,
            )
            .await?;

        Ok(data.unwrap_or_default())
    }
}

#[async_trait]
impl CloudClient for AlphaTrakClient {
    async fn login(&self, credential: &Credential) -> Result<Session, ClientError> {
        let body = json!({
            "UserName": credential.username,
            "Password": credential.password,
            "LanguageId": self.language_id,
        });

        let data = self
            .post::<LoginData>(Call::Login, LOGIN_PATH, None, &body)
            .await?
            .ok_or_else(|| ClientError::Schema("login response carried no token".to_string()))?;

        if data.token.is_empty() {
            return Err(ClientError::Schema("login response carried an empty token".to_string()));
        }

        let now = Utc::now();
        let session = Session::new(data.token, now);
        Ok(match data.expires_in.filter(|secs| *secs > 0) {
            Some(secs) => session.with_expiry(now + chrono::Duration::seconds(secs)),
            None => session,
        })
    }

    async fn list_pets(&self, session: &Session) -> Result<Vec<Pet>, ClientError> {
        let body = json!({ "LanguageId": self.language_id });

        let entries = self
            .post::<Vec<Map<String, Value>>>(
                Call::PetList,
                PET_LIST_PATH,
                Some(session.token()),
                &body,
            )
            .await?
            .unwrap_or_default();

        Ok(entries.iter().filter_map(parse_pet).collect())
    }

    async fn fetch_readings(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ClientError> {
        let activity = self.fetch_activity(session, pet, since).await?;
        activity.readings()
    }

    async fn fetch_events(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ClientError> {
        let activity = self.fetch_activity(session, pet, since).await?;
        activity.events()
    }

    async fn fetch_records(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Records, ClientError> {
        let activity = self.fetch_activity(session, pet, since).await?;
        Ok(Records {
            readings: activity.readings()?,
            events: activity.events()?,
        })
    }
}

/// Builder for AlphaTrakClient.
#[derive(Debug, Default)]
pub struct AlphaTrakClientBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    language_id: Option<String>,
    user_agent: Option<String>,
}

impl AlphaTrakClientBuilder {
    /// Set the API base URL (default: [`DEFAULT_ENDPOINT`]).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the language id sent with every request (default: "1").
    pub fn language_id(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = Some(language_id.into());
        self
    }

    /// Override the user agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<AlphaTrakClient, ClientError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(30));

        let mut headers = reqwest::header::HeaderMap::new();
        let agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        headers.insert(
            USER_AGENT,
            agent
                .parse::<reqwest::header::HeaderValue>()
                .map_err(|_| ClientError::Config(format!("invalid user agent: {}", agent)))?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(AlphaTrakClient {
            client,
            endpoint,
            language_id: self.language_id.unwrap_or_else(|| "1".to_string()),
        })
    }
}

/// Response wrapper shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "IsSuccess", default)]
    is_success: bool,
    #[serde(rename = "ResponseData")]
    response_data: Option<T>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    #[serde(rename = "Token")]
    token: String,
    #[serde(rename = "ExpiresIn", default)]
    expires_in: Option<i64>,
}

/// Payload of the activity endpoint.
///
/// Lists are kept as raw JSON so unknown lists and fields never fail the
/// decode; only the ones read below are validated.
#[derive(Debug, Default, Deserialize)]
struct ActivityData {
    #[serde(rename = "MinRange", default)]
    min_range: Option<Value>,
    #[serde(rename = "MaxRange", default)]
    max_range: Option<Value>,
    #[serde(rename = "PetActivity", default)]
    pet_activity: BTreeMap<String, Value>,
}

impl ActivityData {
    fn range(&self) -> Option<GlucoseRange> {
        let range = GlucoseRange {
            min: self.min_range.as_ref().and_then(number),
            max: self.max_range.as_ref().and_then(number),
        };
        (!range.is_empty()).then_some(range)
    }

    fn list(&self, name: &str) -> Result<&[Value], ClientError> {
        match self.pet_activity.get(name) {
            None | Some(Value::Null) => Ok(&[] as &[Value]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(ClientError::Schema(format!("{} is not a list", name))),
        }
    }

    fn readings(&self) -> Result<Vec<RawReading>, ClientError> {
        let range = self.range();
        let mut readings = Vec::new();

        for (index, item) in self.list("BloodGlucose")?.iter().enumerate() {
            let entry = as_entry(item, "BloodGlucose", index)?;

            let timestamp = entry
                .get("GlucoseEntryDateTime")
                .and_then(Value::as_str)
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    ClientError::Schema(format!(
                        "BloodGlucose[{}] has no valid GlucoseEntryDateTime",
                        index
                    ))
                })?;
            let value = entry.get("GlucoseLevel").and_then(number).ok_or_else(|| {
                ClientError::Schema(format!("BloodGlucose[{}] has no valid GlucoseLevel", index))
            })?;

            let mut reading = RawReading::new(timestamp, value).with_flags(GlucoseFlags {
                after_meal: flag(entry.get("AfterMeal")),
                after_insulin: flag(entry.get("AfterInsulinInjection")),
                control_test: flag(entry.get("ControlTest")),
            });
            reading.unit = text(entry.get("UnitType"));
            reading.device_name = text(entry.get("GlucoseDeviceName"));
            reading.note = text(entry.get("GlucoseNote"));
            reading.range = range;

            readings.push(reading);
        }

        Ok(readings)
    }

    fn events(&self) -> Result<Vec<RawEvent>, ClientError> {
        let mut events = Vec::new();

        for (list, category) in EVENT_LISTS {
            for (index, item) in self.list(list)?.iter().enumerate() {
                let entry = as_entry(item, list, index)?;

                let timestamp = event_timestamp(entry).ok_or_else(|| {
                    ClientError::Schema(format!("{}[{}] has no valid entry date", list, index))
                })?;

                let payload = match category {
                    EventCategory::Insulin => entry
                        .get("InsulinDose")
                        .and_then(number)
                        .map(EventPayload::InsulinDose),
                    EventCategory::Weight => entry
                        .get("PetWeight")
                        .and_then(number)
                        .map(EventPayload::Weight),
                    _ => None,
                };

                let mut event = RawEvent::new(timestamp, category);
                event.payload = payload;
                events.push(event);
            }
        }

        Ok(events)
    }
}

fn as_entry<'a>(
    item: &'a Value,
    list: &str,
    index: usize,
) -> Result<&'a Map<String, Value>, ClientError> {
    item.as_object()
        .ok_or_else(|| ClientError::Schema(format!("{}[{}] is not an object", list, index)))
}

fn parse_pet(entry: &Map<String, Value>) -> Option<Pet> {
    let id = ["PetId", "Id", "id"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .find_map(|raw| match raw {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

    let Some(id) = id else {
        debug!("Skipping pet entry without a usable id");
        return None;
    };

    Some(match text(entry.get("PetName")) {
        Some(name) => Pet::new(id, name),
        None => Pet::unnamed(id),
    })
}

/// Timestamp of an activity entry. Each list names its own date field, so
/// look for one ending in `EntryDateTime` first, then anything with
/// `EntryDate` in it.
fn event_timestamp(entry: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let by_key = |wanted: fn(&str) -> bool| {
        entry
            .iter()
            .filter(|(key, _)| wanted(key.as_str()))
            .filter_map(|(_, value)| value.as_str())
            .find_map(parse_timestamp)
    };

    by_key(|key| key.ends_with("EntryDateTime")).or_else(|| by_key(|key| key.contains("EntryDate")))
}

/// Parse an RFC 3339 timestamp, or a naive one read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Numbers arrive as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
