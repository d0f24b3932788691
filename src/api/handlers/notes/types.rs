use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    api::handlers::{normalize_optional, optional_string, required_string},
    store::NoteInput,
};

pub(super) const TITLE_MAX_CHARS: usize = 100;
pub(super) const SUMMARY_MAX_CHARS: usize = 200;

/// Body accepted by `POST /notes` and `PUT /notes/{id}`.
#[derive(ToSchema, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NoteRequest {
    /// 1 to 100 characters.
    pub title: String,
    pub content: String,
    /// Up to 200 characters.
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

/// Check a raw JSON body and collect every rule it breaks.
pub(super) fn validate_note_body(body: &Value) -> Result<NoteInput, Vec<String>> {
    let Some(body) = body.as_object() else {
        return Err(vec!["body must be a JSON object".to_string()]);
    };
    let mut details = Vec::new();

    let title = required_string(body, "title", &mut details);
    if title
        .as_ref()
        .is_some_and(|title| title.chars().count() > TITLE_MAX_CHARS)
    {
        details.push(format!(
            "title must be {TITLE_MAX_CHARS} characters or fewer"
        ));
    }

    let content = required_string(body, "content", &mut details);

    let summary = optional_string(body, "summary", &mut details);
    if summary
        .as_ref()
        .is_some_and(|summary| summary.chars().count() > SUMMARY_MAX_CHARS)
    {
        details.push(format!(
            "summary must be {SUMMARY_MAX_CHARS} characters or fewer"
        ));
    }

    let tags = match body.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let tags: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            tags.unwrap_or_else(|| {
                details.push("each tag must be a string".to_string());
                Vec::new()
            })
        }
        Some(_) => {
            details.push("tags must be an array".to_string());
            Vec::new()
        }
    };

    let is_pinned = match body.get("isPinned") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(value)) => *value,
        Some(_) => {
            details.push("isPinned must be a boolean".to_string());
            false
        }
    };

    match (title, content) {
        (Some(title), Some(content)) if details.is_empty() => Ok(NoteInput {
            title,
            content,
            summary: normalize_optional(summary),
            tags,
            is_pinned,
        }),
        _ => Err(details),
    }
}
