use serde_json::Value;

use crate::error::IntegrityError;
use crate::model::{fields, DateLabel, PlanDate, PlanId, PlanRecord, PlanStyle, DEFAULT_STYLE_ID};
use crate::remote::RemoteDocument;

fn has_content(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn required_date(doc: &RemoteDocument) -> Result<PlanDate, IntegrityError> {
    let raw = match doc.fields.get(fields::DATE) {
        Some(Value::String(raw)) if !raw.is_empty() => raw,
        _ => return Err(IntegrityError::MissingDate(doc.id.clone())),
    };
    raw.parse().map_err(|_| IntegrityError::InvalidDate {
        id: doc.id.clone(),
        raw: raw.clone(),
    })
}

/// Decode a plan document, applying field defaults.
pub fn decode_plan(doc: &RemoteDocument) -> Result<PlanRecord, IntegrityError> {
    let date = required_date(doc)?;
    let content = doc.fields.get(fields::CONTENT);
    if !has_content(content) {
        return Err(IntegrityError::MissingContent(doc.id.clone()));
    }
    let prev_id = doc
        .fields
        .get(fields::PREV)
        .and_then(Value::as_str)
        .filter(|raw| !raw.is_empty())
        .map(PlanId::from);
    let done = doc
        .fields
        .get(fields::DONE)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let style_id = doc
        .fields
        .get(fields::STYLE_ID)
        .and_then(Value::as_str)
        .filter(|raw| !raw.is_empty())
        .unwrap_or(DEFAULT_STYLE_ID)
        .to_string();
    Ok(PlanRecord {
        id: doc.id.clone(),
        date,
        prev_id,
        content: content.cloned().unwrap_or(Value::Null),
        done,
        style_id,
        snapshot: doc.fields.clone(),
    })
}

pub fn decode_label(doc: &RemoteDocument) -> Result<(PlanDate, DateLabel), IntegrityError> {
    let date = required_date(doc)?;
    let content = doc.fields.get(fields::CONTENT);
    if !has_content(content) {
        return Err(IntegrityError::MissingContent(doc.id.clone()));
    }
    Ok((
        date,
        DateLabel {
            label_id: doc.id.clone(),
            content: content.cloned().unwrap_or(Value::Null),
        },
    ))
}

/// Styles carry no mandatory fields; missing colours decode as empty strings.
pub fn decode_style(doc: &RemoteDocument) -> (String, PlanStyle) {
    let text = |name: &str| {
        doc.fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };
    (
        doc.id.as_str().to_string(),
        PlanStyle {
            label: text(fields::STYLE_LABEL),
            color: text(fields::STYLE_COLOR),
            color_done: text(fields::STYLE_COLOR_DONE),
        },
    )
}
