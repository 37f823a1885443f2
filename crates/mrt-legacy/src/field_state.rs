use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// How a legacy field looked when the document was read.
///
/// Writing an empty value back restores the same shape: an absent field stays absent, `null`
/// stays `null`, and anything else becomes `""`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullableFieldState {
    pub exists: bool,
    pub was_null: bool,
    pub was_string: bool,
    pub was_number: bool,
}

impl NullableFieldState {
    /// State assumed for a field that was never captured.
    pub const PRESENT_STRING: Self = Self {
        exists: true,
        was_null: false,
        was_string: true,
        was_number: false,
    };

    pub fn read(obj: Option<&Map<String, Value>>, key: &str) -> Self {
        match obj.and_then(|obj| obj.get(key)) {
            None => Self::default(),
            Some(value) => Self {
                exists: true,
                was_null: value.is_null(),
                was_string: value.is_string(),
                was_number: value.is_number(),
            },
        }
    }
}

/// Field states of one legacy object, keyed by legacy field name.
pub type FieldStates = BTreeMap<String, NullableFieldState>;

pub(crate) fn capture_states(obj: &Map<String, Value>, keys: &[&str]) -> FieldStates {
    let mut states: FieldStates = obj
        .keys()
        .map(|key| (key.clone(), NullableFieldState::read(Some(obj), key)))
        .collect();
    for &key in keys {
        states
            .entry(key.to_string())
            .or_insert_with(|| NullableFieldState::read(Some(obj), key));
    }
    states
}

/// The value to store for `next`, or `None` when the field must be left absent.
pub fn write_nullable_string(state: &NullableFieldState, next: &str) -> Option<Value> {
    if !next.is_empty() {
        return Some(Value::String(next.to_string()));
    }
    if !state.exists {
        None
    } else if state.was_null {
        Some(Value::Null)
    } else {
        Some(Value::String(String::new()))
    }
}

/// Writes `value` into `item[key]` following the field's captured state.
pub fn write_legacy_field(item: &mut Map<String, Value>, states: &FieldStates, key: &str, value: &str) {
    let state = states
        .get(key)
        .copied()
        .unwrap_or_else(|| NullableFieldState::read(Some(item), key));
    match write_nullable_string(&state, value) {
        Some(written) => {
            item.insert(key.to_string(), written);
        }
        None => {
            item.shift_remove(key);
        }
    }
}

/// String content of a scalar: strings as-is, numbers in their JSON spelling, anything else empty.
pub(crate) fn any_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// String content of a nullable string field; `null`, absent and non-strings read as empty.
pub(crate) fn nullable_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}
