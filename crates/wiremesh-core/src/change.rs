//! Tracking of in-flight field edits before they are committed.
//!
//! An editor keeps one [`ChangeSet`] per peer or connection being edited and
//! feeds every keystroke through [`apply_edit`]. The change set doubles as the
//! body of the PATCH request that commits the edit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::validate::ValidationError;

/// Outcome of a single field edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    /// Valid and equal to the committed value.
    Unchanged,
    /// Valid and different from the committed value.
    Changed,
    /// Rejected by the validator, with the message to show.
    Invalid(String),
}

/// Pending edits and errors, keyed by field name. `None` entries are explicit
/// clears so a field that reverts drops out of both maps on the receiving end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub errors: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub changed_fields: BTreeMap<String, Option<serde_json::Value>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one validated edit into the set.
    pub fn record<T>(
        &mut self,
        field: &str,
        validated: Result<T, ValidationError>,
        original: &T,
    ) -> FieldState
    where
        T: PartialEq + Serialize,
    {
        let value = match validated {
            Ok(value) => value,
            Err(e) => return self.reject(field, e.to_string()),
        };

        if value == *original {
            debug!(field, "field unchanged");
            self.changed_fields.insert(field.to_string(), None);
            self.errors.insert(field.to_string(), None);
            return FieldState::Unchanged;
        }

        match serde_json::to_value(&value) {
            Ok(json) => {
                debug!(field, "field changed");
                self.changed_fields.insert(field.to_string(), Some(json));
                self.errors.insert(field.to_string(), None);
                FieldState::Changed
            }
            Err(e) => {
                warn!(field, error = %e, "edited value cannot be serialized");
                self.reject(field, format!("{field} cannot be serialized"))
            }
        }
    }

    fn reject(&mut self, field: &str, message: String) -> FieldState {
        debug!(field, error = %message, "field invalid");
        self.errors.insert(field.to_string(), Some(message.clone()));
        FieldState::Invalid(message)
    }

    /// Whether any field currently carries an error.
    pub fn has_errors(&self) -> bool {
        self.errors.values().any(Option::is_some)
    }

    /// The changed fields that still hold a value, as a JSON object.
    pub fn patch(&self) -> serde_json::Map<String, serde_json::Value> {
        self.changed_fields
            .iter()
            .filter_map(|(field, value)| Some((field.clone(), value.clone()?)))
            .collect()
    }
}

/// Run `validator` and fold its result into `change_set`, returning the
/// field's state and the updated set. Validator arguments are captured by the
/// closure.
pub fn apply_edit<T, F>(
    field: &str,
    validator: F,
    original: &T,
    mut change_set: ChangeSet,
) -> (FieldState, ChangeSet)
where
    T: PartialEq + Serialize,
    F: FnOnce() -> Result<T, ValidationError>,
{
    let state = change_set.record(field, validator(), original);
    (state, change_set)
}

/// Semantic highlight for a field, left to the presentation layer to style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Nothing to call out.
    Neutral,
    /// Part of something being created.
    Created,
    /// Edited but not yet committed.
    Modified,
    /// Rejected.
    Invalid,
}

/// Maps [`FieldState`] to a [`Tone`]. While creating, every valid field reads
/// as `Created`; while editing, only changed ones stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub unchanged: Tone,
    pub changed: Tone,
    pub error: Tone,
}

impl Palette {
    pub fn new(is_new: bool) -> Self {
        if is_new {
            Self { unchanged: Tone::Created, changed: Tone::Created, error: Tone::Invalid }
        } else {
            Self { unchanged: Tone::Neutral, changed: Tone::Modified, error: Tone::Invalid }
        }
    }

    pub fn tone(&self, state: &FieldState) -> Tone {
        match state {
            FieldState::Unchanged => self.unchanged,
            FieldState::Changed => self.changed,
            FieldState::Invalid(_) => self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{Field, validate};
    use test_case::test_case;
    use wiremesh_types::{EnabledValue, FieldValue};

    fn name_validator(input: &str) -> impl FnOnce() -> Result<String, ValidationError> + '_ {
        move || validate(Field::Name, &FieldValue::text(input), None).map(|()| input.to_string())
    }

    fn mtu_validator(enabled: bool, value: i64) -> impl FnOnce() -> Result<EnabledValue<u16>, ValidationError> {
        move || {
            validate(Field::Mtu, &FieldValue::toggle(enabled, value), None)?;
            Ok(EnabledValue { enabled, value: u16::try_from(value).unwrap_or_default() })
        }
    }

    #[test]
    fn invalid_edit_records_error() {
        let original = "laptop".to_string();
        let (state, set) = apply_edit("name", name_validator(""), &original, ChangeSet::new());
        assert_eq!(state, FieldState::Invalid("name cannot be empty".into()));
        assert_eq!(set.errors["name"], Some("name cannot be empty".into()));
        assert!(set.has_errors());
    }

    #[test]
    fn changed_edit_records_value_and_clears_error() {
        let original = "laptop".to_string();
        let (_, set) = apply_edit("name", name_validator(""), &original, ChangeSet::new());
        let (state, set) = apply_edit("name", name_validator("desktop"), &original, set);
        assert_eq!(state, FieldState::Changed);
        assert_eq!(set.changed_fields["name"], Some(serde_json::json!("desktop")));
        assert_eq!(set.errors["name"], None);
        assert!(!set.has_errors());
    }

    #[test]
    fn reverting_clears_both_maps() {
        let original = "laptop".to_string();
        let (_, set) = apply_edit("name", name_validator("desktop"), &original, ChangeSet::new());
        let (state, set) = apply_edit("name", name_validator("laptop"), &original, set);
        assert_eq!(state, FieldState::Unchanged);
        assert_eq!(set.changed_fields["name"], None);
        assert_eq!(set.errors["name"], None);
        assert!(set.patch().is_empty());
    }

    #[test]
    fn unchanged_edit_is_idempotent() {
        let original = EnabledValue::on(1420u16);
        let (first_state, once) =
            apply_edit("mtu", mtu_validator(true, 1420), &original, ChangeSet::new());
        let (second_state, twice) = apply_edit("mtu", mtu_validator(true, 1420), &original, once.clone());
        assert_eq!(first_state, FieldState::Unchanged);
        assert_eq!(second_state, FieldState::Unchanged);
        assert_eq!(once, twice);
        assert_eq!(twice.changed_fields["mtu"], None);
        assert_eq!(twice.errors["mtu"], None);
    }

    #[test]
    fn toggle_change_is_deep_compared() {
        let original = EnabledValue::on(1420u16);
        let (state, set) = apply_edit("mtu", mtu_validator(false, 1420), &original, ChangeSet::new());
        assert_eq!(state, FieldState::Changed);
        assert_eq!(
            set.changed_fields["mtu"],
            Some(serde_json::json!({ "enabled": false, "value": 1420 }))
        );
    }

    #[test]
    fn list_order_matters() {
        let original = vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()];
        let reordered = vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()];
        let (state, _) = apply_edit("dns", || Ok(reordered), &original, ChangeSet::new());
        assert_eq!(state, FieldState::Changed);
    }

    #[test]
    fn fields_are_tracked_independently() {
        let mut set = ChangeSet::new();
        set.record("name", Ok("desktop".to_string()), &"laptop".to_string());
        set.record("endpoint", Err(ValidationError::InvalidEndpoint), &String::new());

        let patch = set.patch();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch["name"], serde_json::json!("desktop"));
        assert_eq!(set.errors["endpoint"], Some("endpoint is not IPv4 nor an FQDN".into()));
    }

    #[test]
    fn change_set_wire_format() {
        let mut set = ChangeSet::new();
        set.record("name", Ok("desktop".to_string()), &"laptop".to_string());
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "errors": { "name": null },
                "changed_fields": { "name": "desktop" },
            })
        );
    }

    #[test_case(true, FieldState::Unchanged, Tone::Created ; "new unchanged")]
    #[test_case(true, FieldState::Changed, Tone::Created ; "new changed")]
    #[test_case(false, FieldState::Unchanged, Tone::Neutral ; "edit unchanged")]
    #[test_case(false, FieldState::Changed, Tone::Modified ; "edit changed")]
    #[test_case(false, FieldState::Invalid("x".into()), Tone::Invalid ; "edit invalid")]
    #[test_case(true, FieldState::Invalid("x".into()), Tone::Invalid ; "new invalid")]
    fn palette(is_new: bool, state: FieldState, expected: Tone) {
        assert_eq!(Palette::new(is_new).tone(&state), expected);
    }
}
