//! Uniform decoding of backend responses.
//!
//! Every call site goes through [`decode`], which tags the response as a
//! success payload, a structured JSON error or an unstructured text error.

use crate::error::ApiError;
use serde::{de::DeserializeOwned, Deserialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.contains("application/json"))
    }

    /// Parses the body as JSON regardless of the declared content type.
    pub fn json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LocSegment {
    Field(String),
    Index(i64),
}

impl fmt::Display for LocSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocSegment::Field(field) => write!(f, "{field}"),
            LocSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationIssue {
    #[serde(default)]
    pub loc: Vec<LocSegment>,
    pub msg: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self
            .loc
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "• {path}: {}", self.msg)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Detail {
    Message(String),
    Validation(Vec<ValidationIssue>),
    Other(serde_json::Value),
}

impl Detail {
    /// User-facing text, one bullet per line for validation errors.
    pub fn render(&self) -> Option<String> {
        match self {
            Detail::Message(message) if !message.is_empty() => Some(message.clone()),
            Detail::Validation(issues) if !issues.is_empty() => Some(
                issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Detail>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn detail_message(&self) -> Option<String> {
        self.detail.as_ref().and_then(Detail::render)
    }

    pub fn user_message(&self) -> Option<String> {
        self.detail_message().or_else(|| {
            self.message
                .as_ref()
                .filter(|message| !message.is_empty())
                .cloned()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Success(T),
    Structured {
        status: u16,
        body: ErrorBody,
        raw: String,
    },
    Unstructured {
        status: u16,
        text: String,
    },
}

impl<T> Decoded<T> {
    /// Server message when there is one, `fallback` otherwise.
    pub fn into_result(self, fallback: &str) -> Result<T, ApiError> {
        match self {
            Decoded::Success(value) => Ok(value),
            Decoded::Structured { status, body, .. } => Err(ApiError::Http {
                status,
                message: body.user_message().unwrap_or_else(|| fallback.into()),
            }),
            Decoded::Unstructured { status, text } => Err(ApiError::Http {
                status,
                message: if text.is_empty() { fallback.into() } else { text },
            }),
        }
    }

    /// Any failure carries the raw response text.
    pub fn into_raw_result(self) -> Result<T, ApiError> {
        match self {
            Decoded::Success(value) => Ok(value),
            Decoded::Structured { status, raw, .. } => Err(ApiError::Http {
                status,
                message: raw,
            }),
            Decoded::Unstructured { status, text } => Err(ApiError::Http {
                status,
                message: text,
            }),
        }
    }
}

pub fn decode<T: DeserializeOwned>(raw: RawResponse) -> Result<Decoded<T>, ApiError> {
    if raw.is_success() {
        let body = if raw.body.trim().is_empty() {
            "null"
        } else {
            raw.body.as_str()
        };
        return serde_json::from_str(body)
            .map(Decoded::Success)
            .map_err(|err| ApiError::Decode(format!("Invalid server response: {err}")));
    }

    if raw.is_json() {
        if let Ok(value) = raw.json_value() {
            // Valid JSON that is not an error object carries no message.
            let body = serde_json::from_value::<ErrorBody>(value).unwrap_or_default();
            return Ok(Decoded::Structured {
                status: raw.status,
                body,
                raw: raw.body,
            });
        }
    }

    Ok(Decoded::Unstructured {
        status: raw.status,
        text: raw.body,
    })
}
