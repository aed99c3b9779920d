use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde_json::Value;

use super::ImageApiError;

/// Where the image payload was found in a generation response.
///
/// Providers (and versions of the same provider) disagree on the response
/// layout, so every known shape gets its own variant and anything else is
/// kept as `Unrecognized` with a short summary for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageResponse {
    /// `candidates[].content.parts[].inlineData.data`
    InlineData { data: String, mime_type: Option<String> },
    /// Base64 or a data URL inside a `text` part
    NestedText { data: String, mime_type: Option<String> },
    /// `image: {data}`, `data: [{b64_json}]` or `predictions: [{bytesBase64Encoded}]`
    ImageObject { data: String, mime_type: Option<String> },
    /// A JSON array whose element carries one of the shapes above
    TopLevelArray(Box<ImageResponse>),
    Unrecognized { summary: String },
}

const BASE64_KEYS: [&str; 5] = ["data", "b64_json", "base64", "bytesBase64Encoded", "image_base64"];

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn mime_of(value: &Value) -> Option<String> {
    str_field(value, &["mimeType", "mime_type", "media_type"]).map(str::to_string)
}

fn parts(value: &Value) -> Vec<&Value> {
    value
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| c.get("content"))
        .chain(value.get("content"))
        .filter_map(|content| content.get("parts").and_then(Value::as_array))
        .flatten()
        .collect()
}

fn inline_data(value: &Value) -> Option<ImageResponse> {
    let inline = value.get("inlineData").or_else(|| value.get("inline_data"))?;
    let data = str_field(inline, &["data"])?;
    Some(ImageResponse::InlineData {
        data: data.to_string(),
        mime_type: mime_of(inline),
    })
}

/// Text that is an image data URL or one long base64 run
fn text_payload(text: &str) -> Option<(String, Option<String>)> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("data:") {
        let (header, data) = rest.split_once(',')?;
        if !header.ends_with(";base64") {
            return None;
        }
        let mime = header.trim_end_matches(";base64").to_string();
        return Some((data.to_string(), Some(mime)));
    }

    let looks_encoded = text.len() >= 64
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_' | b'\n' | b'\r'));
    looks_encoded.then(|| (text.to_string(), None))
}

fn image_object(value: &Value) -> Option<ImageResponse> {
    if let Some(image) = value.get("image") {
        if let Some(data) = str_field(image, &BASE64_KEYS) {
            return Some(ImageResponse::ImageObject {
                data: data.to_string(),
                mime_type: mime_of(image),
            });
        }
    }

    for list_key in ["data", "images", "predictions", "generated_images"] {
        let Some(items) = value.get(list_key).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let target = item.get("image").unwrap_or(item);
            if let Some(data) = str_field(target, &BASE64_KEYS) {
                return Some(ImageResponse::ImageObject {
                    data: data.to_string(),
                    mime_type: mime_of(target),
                });
            }
        }
    }

    None
}

fn summarize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let texts: Vec<&str> = parts(value)
                .into_iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            if !texts.is_empty() {
                let joined = texts.join(" ");
                let preview: String = joined.chars().take(160).collect();
                return format!("text only: {}", preview);
            }
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("object with keys [{}]", keys.join(", "))
        }
        Value::Array(items) => format!("array of {} items without image data", items.len()),
        other => format!("unexpected {}", other),
    }
}

impl ImageResponse {
    /// Classify a parsed response body
    pub fn classify(value: &Value) -> Self {
        if let Value::Array(items) = value {
            return items
                .iter()
                .map(Self::classify)
                .find(|r| !matches!(r, Self::Unrecognized { .. }))
                .map(|inner| Self::TopLevelArray(Box::new(inner)))
                .unwrap_or_else(|| Self::Unrecognized { summary: summarize(value) });
        }

        let candidate_parts = parts(value);

        if let Some(found) = inline_data(value).or_else(|| candidate_parts.iter().find_map(|p| inline_data(p))) {
            return found;
        }

        if let Some((data, mime_type)) = candidate_parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .find_map(text_payload)
        {
            return Self::NestedText { data, mime_type };
        }

        if let Some(found) = image_object(value) {
            return found;
        }

        Self::Unrecognized { summary: summarize(value) }
    }

    /// Raw image bytes carried by the response
    pub fn decode(&self) -> Result<Vec<u8>, ImageApiError> {
        match self {
            Self::InlineData { data, .. } | Self::NestedText { data, .. } | Self::ImageObject { data, .. } => {
                let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(&cleaned)
                    .or_else(|_| URL_SAFE.decode(&cleaned))
                    .map_err(|e| ImageApiError::NoImageData(format!("invalid base64 payload: {}", e)))
            }
            Self::TopLevelArray(inner) => inner.decode(),
            Self::Unrecognized { summary } => Err(ImageApiError::NoImageData(summary.clone())),
        }
    }

    /// Short label for logs
    pub fn shape(&self) -> &'static str {
        match self {
            Self::InlineData { .. } => "inline data",
            Self::NestedText { .. } => "nested text",
            Self::ImageObject { .. } => "image object",
            Self::TopLevelArray(_) => "top-level array",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}
