use crate::storage::{self, StorageError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A stored prescription. Every field except the registration number is
/// defaulted on decode so that partial records arriving through a backup
/// import survive to the reconciler instead of failing the whole snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionRecord {
    #[serde(default)]
    pub registration_number: u64,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub department: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhar_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_time: Option<OffsetDateTime>,
    // Imported records keep whatever extra fields they carried.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PrescriptionRecord {
    /// Builds a record out of one backup entry, field by field. Reference
    /// exports carry numbers as JSON strings ("age": "45"), so every numeric
    /// field is coerced rather than decoded strictly; a field that cannot be
    /// coerced falls back to its default instead of sinking the entry. Only a
    /// non-object entry yields `None`.
    pub(crate) fn from_backup_entry(entry: Value) -> Option<Self> {
        let Value::Object(mut object) = entry else {
            return None;
        };

        let registration_number = object
            .remove("registrationNumber")
            .as_ref()
            .and_then(coerce_u64)
            .unwrap_or(0);
        let age = object
            .remove("age")
            .as_ref()
            .and_then(coerce_u64)
            .and_then(|age| u32::try_from(age).ok())
            .unwrap_or(0);
        let room_number = object
            .remove("roomNumber")
            .as_ref()
            .and_then(coerce_u64)
            .and_then(|room| u32::try_from(room).ok())
            .filter(|room| *room > 0);
        let date_time = object.remove("dateTime").and_then(|value| match value {
            Value::String(text) => OffsetDateTime::parse(&text, &Rfc3339).ok(),
            _ => None,
        });

        Some(Self {
            registration_number,
            patient_name: object
                .remove("patientName")
                .and_then(coerce_string)
                .unwrap_or_default(),
            age,
            gender: object
                .remove("gender")
                .and_then(coerce_string)
                .unwrap_or_default(),
            department: object
                .remove("department")
                .and_then(coerce_string)
                .unwrap_or_default(),
            kind: object
                .remove("type")
                .and_then(coerce_string)
                .unwrap_or_default(),
            room_number,
            address: object.remove("address").and_then(coerce_string),
            aadhar_number: object.remove("aadharNumber").and_then(coerce_string),
            mobile_number: object.remove("mobileNumber").and_then(coerce_string),
            payment_method: object.remove("paymentMethod").and_then(coerce_string),
            date_time,
            extra: object,
        })
    }
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text).filter(|text| !text.trim().is_empty()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Client-supplied intake data. Any registration number in here is ignored;
/// the store assigns its own. The numeric fields stay raw JSON values because
/// form clients send them as strings; validation coerces and reports
/// per-field messages instead of rejecting the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDraft {
    #[serde(default)]
    pub registration_number: Option<Value>,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub age: Option<Value>,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub department: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub room_number: Option<Value>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub aadhar_number: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date_time: Option<OffsetDateTime>,
}

#[derive(Debug)]
pub enum PrescriptionError {
    Validation(String),
    Storage(StorageError),
}

impl std::fmt::Display for PrescriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrescriptionError::Validation(message) => f.write_str(message),
            PrescriptionError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl From<StorageError> for PrescriptionError {
    fn from(err: StorageError) -> Self {
        PrescriptionError::Storage(err)
    }
}

/// Owns the prescription collection file.
pub struct PrescriptionStore {
    path: PathBuf,
}

impl PrescriptionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn list(&self) -> Result<Vec<PrescriptionRecord>, PrescriptionError> {
        Ok(storage::load_collection(&self.path)?)
    }

    /// Validates and appends a fresh prescription. The registration number is
    /// computed as max + 1 over the collection loaded in this same
    /// transaction, overriding anything the client sent.
    pub fn intake(&self, draft: PrescriptionDraft) -> Result<PrescriptionRecord, PrescriptionError> {
        let validated = validate_draft(draft).map_err(PrescriptionError::Validation)?;

        let mut records: Vec<PrescriptionRecord> = storage::load_collection(&self.path)?;
        let next_number = records
            .iter()
            .map(|record| record.registration_number)
            .max()
            .unwrap_or(0)
            + 1;

        let record = PrescriptionRecord {
            registration_number: next_number,
            patient_name: validated.patient_name,
            age: validated.age,
            gender: validated.gender,
            department: validated.department,
            kind: validated.kind,
            room_number: validated.room_number,
            address: validated.address,
            aadhar_number: validated.aadhar_number,
            mobile_number: validated.mobile_number,
            payment_method: validated.payment_method,
            date_time: Some(validated.date_time),
            extra: Map::new(),
        };

        records.push(record.clone());
        storage::save_collection(&self.path, &records)?;
        Ok(record)
    }

    /// Replaces the whole collection. Only the backup import path uses this.
    pub(crate) fn replace_all(&self, records: &[PrescriptionRecord]) -> Result<(), PrescriptionError> {
        Ok(storage::save_collection(&self.path, records)?)
    }
}

struct ValidatedDraft {
    patient_name: String,
    age: u32,
    gender: String,
    department: String,
    kind: String,
    room_number: Option<u32>,
    address: Option<String>,
    aadhar_number: Option<String>,
    mobile_number: Option<String>,
    payment_method: Option<String>,
    date_time: OffsetDateTime,
}

fn validate_draft(draft: PrescriptionDraft) -> Result<ValidatedDraft, String> {
    if draft.patient_name.trim().is_empty() {
        return Err("Patient name is required".to_string());
    }

    let age = match draft.age.as_ref().filter(|value| !is_blank(value)) {
        None => return Err("Age is required".to_string()),
        Some(value) => match coerce_i64(value).filter(|age| *age > 0) {
            Some(age) => {
                u32::try_from(age).map_err(|_| "Age must be a positive number".to_string())?
            }
            None => return Err("Age must be a positive number".to_string()),
        },
    };

    if draft.gender.trim().is_empty() {
        return Err("Gender is required".to_string());
    }
    if draft.department.trim().is_empty() {
        return Err("Department is required".to_string());
    }
    if draft.kind.trim().is_empty() {
        return Err("Type is required".to_string());
    }

    let room_number = match draft.room_number.as_ref().filter(|value| !is_blank(value)) {
        None => None,
        Some(value) => match coerce_i64(value).filter(|room| *room > 0) {
            Some(room) => Some(
                u32::try_from(room)
                    .map_err(|_| "Room number must be a positive number".to_string())?,
            ),
            None => return Err("Room number must be a positive number".to_string()),
        },
    };

    let aadhar_number = normalize_optional(draft.aadhar_number);
    if let Some(aadhar) = aadhar_number.as_deref()
        && !is_exact_digits(aadhar, 12)
    {
        return Err("Aadhar number must be exactly 12 digits".to_string());
    }

    let mobile_number = normalize_optional(draft.mobile_number);
    if let Some(mobile) = mobile_number.as_deref()
        && !is_exact_digits(mobile, 10)
    {
        return Err("Mobile number must be exactly 10 digits".to_string());
    }

    Ok(ValidatedDraft {
        patient_name: draft.patient_name,
        age,
        gender: draft.gender,
        department: draft.department,
        kind: draft.kind,
        room_number,
        address: normalize_optional(draft.address),
        aadhar_number,
        mobile_number,
        payment_method: normalize_optional(draft.payment_method),
        date_time: draft.date_time.unwrap_or_else(OffsetDateTime::now_utc),
    })
}

// Empty form fields arrive as empty strings; treat them as absent.
fn normalize_optional(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

fn is_exact_digits(value: &str, count: usize) -> bool {
    value.len() == count && value.chars().all(|ch| ch.is_ascii_digit())
}
