//! Field names of remote documents.

use serde_json::Value;

use super::{Fields, PlanDate, PlanId};

pub const DATE: &str = "date";
pub const PREV: &str = "prev";
pub const CONTENT: &str = "content";
pub const DONE: &str = "done";
pub const STYLE_ID: &str = "styleId";

pub const STYLE_LABEL: &str = "label";
pub const STYLE_COLOR: &str = "color";
pub const STYLE_COLOR_DONE: &str = "colorDone";

/// Body for a position change: the empty string encodes "head".
pub fn link(date: PlanDate, prev: Option<&PlanId>) -> Fields {
    let mut fields = Fields::new();
    fields.insert(DATE.into(), Value::String(date.to_string()));
    fields.insert(PREV.into(), prev_value(prev));
    fields
}

pub fn prev_value(prev: Option<&PlanId>) -> Value {
    Value::String(prev.map(|id| id.as_str().to_string()).unwrap_or_default())
}

pub fn single(name: &str, value: Value) -> Fields {
    let mut fields = Fields::new();
    fields.insert(name.into(), value);
    fields
}

/// Extract the date a document is filed under, if it carries a parseable one.
pub fn document_date(fields: &Fields) -> Option<PlanDate> {
    fields
        .get(DATE)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
}
