//! The inbound ECG request and the prompt payload built from it

use crate::interpret::truthy;
use crate::server::RelayError;
use anyhow::anyhow;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::Debug;

pub const DEFAULT_PAPER_SPEED: &str = "25";
pub const DEFAULT_PAPER_GAIN: &str = "10";

pub const SYSTEM_PROMPT: &str = "You are an ECG assistant for clinicians. Return STRICT JSON with \
{interpretation:{summary, structured:{rate_bpm,rhythm,axis,intervals:{PR_ms,QRS_ms,QTc_ms},\
st_changes,t_wave,blocks,hypertrophy}, red_flags:[]}}. Be clear about uncertainty. Not a diagnosis.";

/// The systematic reading steps, in order
const READING_STEPS: [&str; 5] = [
    "Read the ECG systematically:",
    "1) Rate & rhythm. 2) Axis. 3) PR/QRS/QTc.",
    "4) P/QRS/T morphology & R-wave progression.",
    "5) ST elevation/depression & reciprocal changes.",
    "6) Blocks. 7) Hypertrophy/strain. 8) Acute ischemia patterns.",
];

/// A request to interpret an ECG image. Only the image is required; the
/// paper settings accept strings or numbers.
#[derive(Default, Deserialize)]
pub struct EcgRequest {
    #[serde(default)]
    pub image_base64: Option<Value>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub paper_speed: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub paper_gain: Option<String>,

    #[serde(default, deserialize_with = "truthy_text")]
    pub reference_notes: Option<String>,
}

impl Debug for EcgRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EcgRequest {{ image_base64: <data>, paper_speed: {:?}, paper_gain: {:?}, reference_notes: {:?} }}",
            self.paper_speed, self.paper_gain, self.reference_notes
        )
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Like `lenient_text`, but falsy values (`0`, `false`, `""`) count as absent
fn truthy_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(v) if truthy(&v) => Some(v.to_string()),
        _ => None,
    })
}

impl EcgRequest {
    /// Parse a raw request body. An empty body counts as `{}` and a JSON
    /// value that is not an object carries no fields; `null` and malformed
    /// JSON (including a whitespace-only body) are errors.
    pub fn from_body(body: &[u8]) -> Result<Self, RelayError> {
        if body.is_empty() {
            return Ok(Self::default());
        }

        match serde_json::from_slice::<Value>(body)? {
            obj @ Value::Object(_) => Ok(serde_json::from_value(obj)?),
            Value::Null => Err(anyhow!("request body must not be null").into()),
            _ => Ok(Self::default()),
        }
    }

    /// The image field, or `MissingImage` when it is absent or empty
    pub fn image(&self) -> Result<String, RelayError> {
        match &self.image_base64 {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(v) if truthy(v) => Ok(v.to_string()),
            _ => Err(RelayError::MissingImage),
        }
    }

    pub fn paper_speed(&self) -> &str {
        self.paper_speed.as_deref().unwrap_or(DEFAULT_PAPER_SPEED)
    }

    pub fn paper_gain(&self) -> &str {
        self.paper_gain.as_deref().unwrap_or(DEFAULT_PAPER_GAIN)
    }

    pub fn reference_notes(&self) -> &str {
        self.reference_notes.as_deref().unwrap_or("")
    }

    /// The user instruction. Empty notes still contribute a separator, so
    /// the text ends in a single space.
    pub fn user_text(&self) -> String {
        let notes = match self.reference_notes() {
            "" => String::new(),
            notes => format!("Reference notes: {notes}"),
        };

        let mut parts: Vec<String> = READING_STEPS.iter().map(|s| s.to_string()).collect();
        parts.push(format!(
            "Paper speed: {} mm/s; Gain: {} mm/mV.",
            self.paper_speed(),
            self.paper_gain()
        ));
        parts.push(notes);
        parts.join(" ")
    }
}

/// Base64 characters decoded to sniff the MIME type; covers the 12-byte
/// WebP signature
const SNIFF_CHARS: usize = 16;

/// Turn the caller's image into something the upstream accepts as an image
/// URL. Anything with a scheme passes through; bare base64 gets wrapped in
/// a data URI when it is made of base64 characters and its head decodes.
pub fn image_reference(image: &str) -> String {
    let trimmed = image.trim();
    if ["data:", "http://", "https://"]
        .iter()
        .any(|scheme| trimmed.starts_with(scheme))
    {
        return image.to_string();
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let is_base64 = compact
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    if !is_base64 {
        return image.to_string();
    }

    let head = &compact[..compact.len().min(SNIFF_CHARS)];
    match general_purpose::STANDARD.decode(head) {
        Ok(bytes) => format!("data:{};base64,{compact}", sniff_mime(&bytes)),
        Err(_) => image.to_string(),
    }
}

fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xff, 0xd8, 0xff, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/png",
    }
}

/// Body of the outbound call
#[derive(Debug, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub input: Vec<Message>,
    pub response_format: ResponseFormat,
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    InputImage { image_url: String },
}

impl Debug for ContentPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentPart::InputText { text } => write!(f, "InputText {{ text: {text:?} }}"),
            ContentPart::InputImage { image_url } => {
                write!(f, "InputImage {{ image_url: <{} bytes> }}", image_url.len())
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl UpstreamPayload {
    /// Build the two-message conversation for `request`. Fails with
    /// `MissingImage` before anything else is assembled.
    pub fn new(model: &str, max_output_tokens: u32, request: &EcgRequest) -> Result<Self, RelayError> {
        let image = request.image()?;

        Ok(UpstreamPayload {
            model: model.to_string(),
            input: vec![
                Message {
                    role: Role::System,
                    content: vec![ContentPart::InputText {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                Message {
                    role: Role::User,
                    content: vec![
                        ContentPart::InputText {
                            text: request.user_text(),
                        },
                        ContentPart::InputImage {
                            image_url: image_reference(&image),
                        },
                    ],
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_output_tokens,
        })
    }
}
