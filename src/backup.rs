use crate::prescriptions::PrescriptionRecord;
use crate::users::{Role, UserRecord};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;

pub(crate) const BACKUP_VERSION: &str = "1.0";
pub(crate) const BACKUP_DESCRIPTION: &str = "Prescription App Backup";

/// A full point-in-time export. Field order matches the files the original
/// application produced; user entries never carry a password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub prescriptions: Vec<PrescriptionRecord>,
    #[serde(default)]
    pub users: Vec<SafeUser>,
    pub metadata: BackupMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    pub description: String,
}

/// A user entry as exported: the identity fields only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeUser {
    pub username: String,
    pub role: Role,
    #[serde(
        rename = "createdBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by: Option<String>,
}

#[derive(Debug)]
pub enum BackupError {
    Malformed,
    Encode(serde_json::Error),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupError::Malformed => f.write_str("Invalid backup data format"),
            BackupError::Encode(err) => write!(f, "failed to encode backup: {err}"),
        }
    }
}

/// Builds a snapshot from the two live collections, stripping password
/// hashes and stamping the metadata.
pub fn export(prescriptions: Vec<PrescriptionRecord>, users: &[UserRecord]) -> BackupSnapshot {
    let users = users
        .iter()
        .map(|user| SafeUser {
            username: user.username.clone(),
            role: user.role,
            created_by: user.created_by.clone(),
        })
        .collect();

    BackupSnapshot {
        prescriptions,
        users,
        metadata: BackupMetadata {
            version: BACKUP_VERSION.to_string(),
            timestamp: Some(OffsetDateTime::now_utc()),
            description: BACKUP_DESCRIPTION.to_string(),
        },
    }
}

pub fn serialize(snapshot: &BackupSnapshot) -> Result<String, BackupError> {
    serde_json::to_string_pretty(snapshot).map_err(BackupError::Encode)
}

/// Validates and decodes a raw backup payload. The structural checks mirror
/// the import contract: the payload must be a JSON object carrying `metadata`
/// and a `prescriptions` array. Individual prescription entries are decoded
/// tolerantly; entries that are not objects at all are skipped with a
/// warning rather than failing the import.
pub fn decode(raw: &str) -> Result<BackupSnapshot, BackupError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| BackupError::Malformed)?;
    let Value::Object(mut object) = value else {
        return Err(BackupError::Malformed);
    };

    let Some(Value::Array(raw_prescriptions)) = object.remove("prescriptions") else {
        return Err(BackupError::Malformed);
    };
    let Some(raw_metadata) = object.remove("metadata") else {
        return Err(BackupError::Malformed);
    };

    let metadata: BackupMetadata =
        serde_json::from_value(raw_metadata).map_err(|_| BackupError::Malformed)?;
    let users: Vec<SafeUser> = match object.remove("users") {
        Some(raw_users) => serde_json::from_value(raw_users).unwrap_or_default(),
        None => Vec::new(),
    };

    let mut prescriptions = Vec::with_capacity(raw_prescriptions.len());
    for entry in raw_prescriptions {
        match PrescriptionRecord::from_backup_entry(entry) {
            Some(record) => prescriptions.push(record),
            None => eprintln!("skipping non-object backup prescription entry"),
        }
    }

    Ok(BackupSnapshot {
        prescriptions,
        users,
        metadata,
    })
}

/// Dated default file name for exports, matching the original convention.
pub fn default_export_file_name(now: OffsetDateTime) -> String {
    let date = now
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "export".to_string());
    format!("prescription-app-backup-{date}.json")
}
