use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::directory::UserId;
use super::folder::FolderId;
use super::risk::RiskScenarioId;
use super::uuid_id;
use crate::errors::DomainError;
use crate::validation::{Field, ValidationErrors};

uuid_id!(RiskAcceptanceId);

pub const NAME_MAX_LEN: usize = 200;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceState {
    Submitted,
    Accepted,
    Rejected,
    Revoked,
}

impl AcceptanceState {
    pub const ALL: [AcceptanceState; 4] =
        [Self::Submitted, Self::Accepted, Self::Rejected, Self::Revoked];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Revoked => "Revoked",
        }
    }

    pub fn can_transition_to(self, next: AcceptanceState) -> bool {
        matches!(
            (self, next),
            (Self::Submitted, Self::Accepted)
                | (Self::Submitted, Self::Rejected)
                | (Self::Accepted, Self::Revoked)
                | (Self::Rejected, Self::Revoked)
        )
    }

    /// Name of the date field stamped when entering this state.
    pub fn date_field(self) -> Option<&'static str> {
        match self {
            Self::Submitted => None,
            Self::Accepted => Some("accepted_date"),
            Self::Rejected => Some("rejected_date"),
            Self::Revoked => Some("revoked_date"),
        }
    }
}

impl fmt::Display for AcceptanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AcceptanceState {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|state| state.as_str() == key).ok_or_else(|| {
            DomainError::InvariantViolation(format!("`{value}` is not a valid state"))
        })
    }
}

/// Checks a single edge of the acceptance workflow.
pub fn validate_transition(
    from: AcceptanceState,
    to: AcceptanceState,
) -> Result<(), DomainError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::InvalidAcceptanceTransition { from, to })
    }
}

/// Approver decisions exposed as dedicated workflow actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
    Revoke,
}

impl Decision {
    pub fn target_state(self) -> AcceptanceState {
        match self {
            Self::Accept => AcceptanceState::Accepted,
            Self::Reject => AcceptanceState::Rejected,
            Self::Revoke => AcceptanceState::Revoked,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Revoke => "revoke",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAcceptance {
    pub id: RiskAcceptanceId,
    pub name: String,
    pub description: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub accepted_date: Option<NaiveDate>,
    pub rejected_date: Option<NaiveDate>,
    pub revoked_date: Option<NaiveDate>,
    pub justification: Option<String>,
    pub state: AcceptanceState,
    pub folder_id: FolderId,
    pub approver_id: Option<UserId>,
    pub risk_scenario_ids: Vec<RiskScenarioId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskAcceptance {
    pub fn new(name: impl Into<String>, folder_id: FolderId) -> Self {
        let now = Utc::now();
        Self {
            id: RiskAcceptanceId::new(),
            name: name.into(),
            description: None,
            expiry_date: None,
            accepted_date: None,
            rejected_date: None,
            revoked_date: None,
            justification: None,
            state: AcceptanceState::Submitted,
            folder_id,
            approver_id: None,
            risk_scenario_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn date_for(&self, state: AcceptanceState) -> Option<NaiveDate> {
        match state {
            AcceptanceState::Submitted => None,
            AcceptanceState::Accepted => self.accepted_date,
            AcceptanceState::Rejected => self.rejected_date,
            AcceptanceState::Revoked => self.revoked_date,
        }
    }

    fn date_slot(&mut self, state: AcceptanceState) -> Option<&mut Option<NaiveDate>> {
        match state {
            AcceptanceState::Submitted => None,
            AcceptanceState::Accepted => Some(&mut self.accepted_date),
            AcceptanceState::Rejected => Some(&mut self.rejected_date),
            AcceptanceState::Revoked => Some(&mut self.revoked_date),
        }
    }

    /// An acceptance is void once its expiry date has passed.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| today > expiry)
    }

    pub fn apply(&mut self, changes: RiskAcceptanceChanges) {
        if let Some(name) = changes.name {
            self.name = name;
        }
        changes.description.apply_to(&mut self.description);
        changes.expiry_date.apply_to(&mut self.expiry_date);
        changes.accepted_date.apply_to(&mut self.accepted_date);
        changes.rejected_date.apply_to(&mut self.rejected_date);
        changes.revoked_date.apply_to(&mut self.revoked_date);
        changes.justification.apply_to(&mut self.justification);
        if let Some(state) = changes.state {
            self.state = state;
        }
        if let Some(folder_id) = changes.folder_id {
            self.folder_id = folder_id;
        }
        changes.approver_id.apply_to(&mut self.approver_id);
        if let Some(risk_scenario_ids) = changes.risk_scenario_ids {
            self.risk_scenario_ids = risk_scenario_ids;
        }
        self.updated_at = Utc::now();
    }

    /// Moves the workflow along one edge and stamps the matching date.
    pub fn decide(&mut self, decision: Decision, today: NaiveDate) -> Result<(), DomainError> {
        let next = decision.target_state();
        validate_transition(self.state, next)?;

        self.state = next;
        if let Some(slot) = self.date_slot(next) {
            *slot = Some(today);
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Workflow invariants between a stored record (if any) and its next version.
///
/// - a state change must follow a legal edge;
/// - a non-submitted state needs its date populated;
/// - a date may only be newly set by the transition into its own state;
/// - a date that is already set never changes or clears;
/// - `expiry_date` may not fall before `accepted_date`.
pub fn check_lifecycle(previous: Option<&RiskAcceptance>, next: &RiskAcceptance) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    let previous_state = previous.map(|record| record.state).unwrap_or(AcceptanceState::Submitted);

    if next.state != previous_state {
        if let Err(error) = validate_transition(previous_state, next.state) {
            errors.add("state", error.to_string());
        }
    }

    if let Some(field) = next.state.date_field() {
        if next.date_for(next.state).is_none() {
            errors.add(field, format!("this field is required when state is `{}`", next.state));
        }
    }

    for state in [AcceptanceState::Accepted, AcceptanceState::Rejected, AcceptanceState::Revoked] {
        let Some(field) = state.date_field() else { continue };
        let before = previous.and_then(|record| record.date_for(state));
        let after = next.date_for(state);
        let entering = next.state == state && previous_state != state;

        if before.is_some() && after != before {
            errors.add(field, "this field cannot be changed once set");
        } else if after.is_some() && after != before && !entering {
            errors.add(field, format!("this field can only be set when moving to `{state}`"));
        }
    }

    let dates_touched = previous.map_or(true, |record| {
        record.expiry_date != next.expiry_date || record.accepted_date != next.accepted_date
    });
    if let (Some(expiry), Some(accepted)) = (next.expiry_date, next.accepted_date) {
        if dates_touched && expiry < accepted {
            errors.add("expiry_date", format!("must not be before accepted_date ({accepted})"));
        }
    }

    errors
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Create,
    Update,
}

/// Raw request payload. Values stay untyped JSON until [`RiskAcceptanceInput::parse`]
/// so that every malformed field, type mismatches included, is reported in one response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RiskAcceptanceInput {
    #[serde(default)]
    pub name: Field<Value>,
    #[serde(default)]
    pub description: Field<Value>,
    #[serde(default)]
    pub expiry_date: Field<Value>,
    #[serde(default)]
    pub accepted_date: Field<Value>,
    #[serde(default)]
    pub rejected_date: Field<Value>,
    #[serde(default)]
    pub revoked_date: Field<Value>,
    #[serde(default)]
    pub justification: Field<Value>,
    #[serde(default)]
    pub state: Field<Value>,
    #[serde(default)]
    pub folder: Field<Value>,
    #[serde(default)]
    pub approver: Field<Value>,
    #[serde(default)]
    pub risk_scenarios: Field<Value>,
}

/// Typed changes extracted from a payload. Invalid fields are left `Absent`
/// and reported through the accompanying [`ValidationErrors`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RiskAcceptanceChanges {
    pub name: Option<String>,
    pub description: Field<String>,
    pub expiry_date: Field<NaiveDate>,
    pub accepted_date: Field<NaiveDate>,
    pub rejected_date: Field<NaiveDate>,
    pub revoked_date: Field<NaiveDate>,
    pub justification: Field<String>,
    pub state: Option<AcceptanceState>,
    pub folder_id: Option<FolderId>,
    pub approver_id: Field<UserId>,
    pub risk_scenario_ids: Option<Vec<RiskScenarioId>>,
}

impl RiskAcceptanceInput {
    pub fn parse(self, mode: InputMode, errors: &mut ValidationErrors) -> RiskAcceptanceChanges {
        RiskAcceptanceChanges {
            name: text("name", self.name, errors).and_then(|field| parse_name(field, mode, errors)),
            description: text("description", self.description, errors)
                .map(normalize_text)
                .unwrap_or(Field::Absent),
            expiry_date: dated("expiry_date", self.expiry_date, errors),
            accepted_date: dated("accepted_date", self.accepted_date, errors),
            rejected_date: dated("rejected_date", self.rejected_date, errors),
            revoked_date: dated("revoked_date", self.revoked_date, errors),
            justification: text("justification", self.justification, errors)
                .map(normalize_text)
                .unwrap_or(Field::Absent),
            state: text("state", self.state, errors)
                .and_then(|field| parse_state(field, mode, errors)),
            folder_id: text("folder", self.folder, errors)
                .and_then(|field| parse_folder(field, mode, errors)),
            approver_id: text("approver", self.approver, errors)
                .map(|field| parse_uuid_field("approver", field, errors))
                .unwrap_or(Field::Absent),
            risk_scenario_ids: string_list("risk_scenarios", self.risk_scenarios, errors)
                .and_then(|field| parse_scenarios(field, errors)),
        }
    }
}

/// Narrows a raw JSON field to a string. `None` means the type was wrong
/// and an error has been recorded.
fn text(name: &str, field: Field<Value>, errors: &mut ValidationErrors) -> Option<Field<String>> {
    match field {
        Field::Absent => Some(Field::Absent),
        Field::Null => Some(Field::Null),
        Field::Value(Value::String(raw)) => Some(Field::Value(raw)),
        Field::Value(other) => {
            errors.add(name, format!("expected a string, got {}", json_type(&other)));
            None
        }
    }
}

fn string_list(
    name: &str,
    field: Field<Value>,
    errors: &mut ValidationErrors,
) -> Option<Field<Vec<String>>> {
    match field {
        Field::Absent => Some(Field::Absent),
        Field::Null => Some(Field::Null),
        Field::Value(Value::Array(items)) => {
            let mut raw_ids = Vec::with_capacity(items.len());
            let mut valid = true;
            for item in items {
                match item {
                    Value::String(raw) => raw_ids.push(raw),
                    other => {
                        valid = false;
                        errors.add(name, format!("expected a string id, got {}", json_type(&other)));
                    }
                }
            }
            valid.then_some(Field::Value(raw_ids))
        }
        Field::Value(other) => {
            errors.add(name, format!("expected a list of ids, got {}", json_type(&other)));
            None
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn dated(name: &str, field: Field<Value>, errors: &mut ValidationErrors) -> Field<NaiveDate> {
    text(name, field, errors).map(|field| parse_date(name, field, errors)).unwrap_or(Field::Absent)
}

fn parse_name(field: Field<String>, mode: InputMode, errors: &mut ValidationErrors) -> Option<String> {
    match (field, mode) {
        (Field::Absent, InputMode::Update) => None,
        (Field::Absent, InputMode::Create) => {
            errors.add("name", "this field is required");
            None
        }
        (Field::Null, _) => {
            errors.add("name", "this field may not be null");
            None
        }
        (Field::Value(name), _) => {
            let name = name.trim();
            if name.is_empty() {
                errors.add("name", "this field may not be blank");
                None
            } else if name.chars().count() > NAME_MAX_LEN {
                errors.add("name", format!("ensure this field has no more than {NAME_MAX_LEN} characters"));
                None
            } else {
                Some(name.to_string())
            }
        }
    }
}

fn normalize_text(field: Field<String>) -> Field<String> {
    match field {
        Field::Value(text) if text.trim().is_empty() => Field::Null,
        Field::Value(text) => Field::Value(text.trim().to_string()),
        other => other,
    }
}

fn parse_date(name: &str, field: Field<String>, errors: &mut ValidationErrors) -> Field<NaiveDate> {
    match field {
        Field::Value(raw) => match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
            Ok(date) => Field::Value(date),
            Err(_) => {
                errors.add(name, format!("`{raw}` has the wrong format, use YYYY-MM-DD"));
                Field::Absent
            }
        },
        Field::Null => Field::Null,
        Field::Absent => Field::Absent,
    }
}

fn parse_state(
    field: Field<String>,
    mode: InputMode,
    errors: &mut ValidationErrors,
) -> Option<AcceptanceState> {
    match field {
        Field::Absent => None,
        Field::Null => {
            errors.add("state", "this field may not be null");
            None
        }
        Field::Value(raw) => match raw.parse::<AcceptanceState>() {
            Ok(AcceptanceState::Submitted) => Some(AcceptanceState::Submitted),
            Ok(state) if mode == InputMode::Create => {
                errors.add(
                    "state",
                    format!("new risk acceptances start in `submitted`, not `{state}`"),
                );
                None
            }
            Ok(state) => Some(state),
            Err(_) => {
                errors.add("state", format!("`{raw}` is not a valid choice"));
                None
            }
        },
    }
}

fn parse_folder(
    field: Field<String>,
    mode: InputMode,
    errors: &mut ValidationErrors,
) -> Option<FolderId> {
    match (parse_uuid_field::<FolderId>("folder", field.clone(), errors), field, mode) {
        (Field::Value(id), _, _) => Some(id),
        (_, Field::Absent, InputMode::Create) => {
            errors.add("folder", "this field is required");
            None
        }
        (_, Field::Null, _) => {
            errors.add("folder", "this field may not be null");
            None
        }
        _ => None,
    }
}

fn parse_uuid_field<T>(name: &str, field: Field<String>, errors: &mut ValidationErrors) -> Field<T>
where
    T: std::str::FromStr,
{
    match field {
        Field::Value(raw) => match raw.parse::<T>() {
            Ok(id) => Field::Value(id),
            Err(_) => {
                errors.add(name, format!("`{raw}` is not a valid UUID"));
                Field::Absent
            }
        },
        Field::Null => Field::Null,
        Field::Absent => Field::Absent,
    }
}

fn parse_scenarios(
    field: Field<Vec<String>>,
    errors: &mut ValidationErrors,
) -> Option<Vec<RiskScenarioId>> {
    match field {
        Field::Absent => None,
        Field::Null => {
            errors.add("risk_scenarios", "this field may not be null");
            None
        }
        Field::Value(raw_ids) => {
            let mut ids = Vec::with_capacity(raw_ids.len());
            let mut valid = true;
            for raw in raw_ids {
                match raw.parse::<RiskScenarioId>() {
                    Ok(id) if !ids.contains(&id) => ids.push(id),
                    Ok(_) => {}
                    Err(_) => {
                        valid = false;
                        errors.add("risk_scenarios", format!("`{raw}` is not a valid UUID"));
                    }
                }
            }
            valid.then_some(ids)
        }
    }
}
