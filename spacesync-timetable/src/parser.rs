use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::schema::REQUIRED_FIELDS;
use crate::TimetableError;

/// Turns timetable text into raw lab-session entries. Entries are validated by
/// the caller, so implementations return whatever the upstream produced.
#[async_trait]
pub trait TimetableParser: Send + Sync {
    async fn parse(&self, text: &str) -> Result<Vec<Value>, TimetableError>;
}

const INSTRUCTIONS: &str = "\
Extract every lab session from the college timetable below.
Return a JSON array with one object per session and these string fields:
batch (as written in the timetable), day (full weekday name), time (\"H:MM to H:MM\"),
classroom (the batch's regular classroom on that day, which stands empty during the lab)
and lab_location (the lab's name as written).
Period columns map to times: P1 9:30 to 10:30, P2 10:30 to 11:30, P3 11:30 to 12:30,
P4 12:30 to 1:30, P5 1:30 to 2:30, P6 2:30 to 3:30, P7 3:30 to 4:30, P8 4:30 to 5:30.
Skip a session when its day cannot be read. Return [] when there are no lab sessions.

Timetable:
";

/// Client for the Gemini `generateContent` endpoint with a JSON response schema.
pub struct GeminiParser {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiParser {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    fn request_body(text: &str) -> Value {
        let properties: serde_json::Map<String, Value> = REQUIRED_FIELDS
            .iter()
            .map(|f| (f.to_string(), json!({ "type": "STRING" })))
            .collect();

        json!({
            "contents": [{ "parts": [{ "text": format!("{}{}", INSTRUCTIONS, text) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": properties,
                        "required": REQUIRED_FIELDS,
                    }
                }
            }
        })
    }
}

#[async_trait]
impl TimetableParser for GeminiParser {
    async fn parse(&self, text: &str) -> Result<Vec<Value>, TimetableError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TimetableError::Parser("Gemini API key is not configured".to_string()))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );

        let response: GenerateResponse = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(text))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TimetableError::Parser(e.to_string()))?
            .json()
            .await
            .map_err(|e| TimetableError::Parser(e.to_string()))?;

        let Some(output) = first_text(&response) else {
            warn!("Parser response carried no text");
            return Ok(Vec::new());
        };
        debug!("Parser returned {} chars", output.len());

        Ok(entries_from_output(output))
    }
}

fn first_text(response: &GenerateResponse) -> Option<&str> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .first()?
        .text
        .as_deref()
}

/// The model's text should be a JSON array. Anything else counts as no entries.
pub(crate) fn entries_from_output(output: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(output) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!("Parser output is not an array: {}", other);
            Vec::new()
        }
        Err(e) => {
            warn!("Parser output is not JSON: {}", e);
            Vec::new()
        }
    }
}
