use crate::backup;
use crate::config::AppConfig;
use crate::merge;
use crate::prescriptions::{
    PrescriptionDraft, PrescriptionError, PrescriptionRecord, PrescriptionStore,
};
use crate::sanitize::{sanitize_str, sanitize_value};
use crate::users::{Identity, UserError, UserRecord, UserStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed operation surface the UI process talks to. Every operation
/// returns plain data; nothing panics across this boundary. Inbound argument
/// objects are sanitized before they reach a store.
pub struct Gateway {
    users: UserStore,
    prescriptions: PrescriptionStore,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AdminExistsResponse {
    pub success: bool,
    #[serde(rename = "adminExists", skip_serializing_if = "Option::is_none")]
    pub admin_exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The `{ error, success: false }` shape read operations fall back to.
#[derive(Debug, Serialize)]
pub struct OperationFailure {
    pub error: String,
    pub success: bool,
}

impl OperationFailure {
    fn new(error: String) -> Self {
        Self {
            error,
            success: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecordsResponse<T> {
    Records(Vec<T>),
    Failure(OperationFailure),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SaveResponse {
    Saved(PrescriptionRecord),
    Failure(OperationFailure),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ExportResponse {
    Snapshot(backup::BackupSnapshot),
    Failure(OperationFailure),
}

#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct ModeratorRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "createdBy", default)]
    created_by: String,
}

impl Gateway {
    /// Opens the gateway over a data directory, creating it if needed.
    /// Failure to create the directory is the one unrecoverable startup
    /// error.
    pub fn open(config: &AppConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            users: UserStore::new(config.users_path()),
            prescriptions: PrescriptionStore::new(config.prescriptions_path()),
        })
    }

    pub fn check_admin_exists(&self) -> AdminExistsResponse {
        match self.users.admin_exists() {
            Ok(admin_exists) => AdminExistsResponse {
                success: true,
                admin_exists: Some(admin_exists),
                message: None,
            },
            Err(err) => AdminExistsResponse {
                success: false,
                admin_exists: None,
                message: Some(format!("Failed to check admin existence: {err}")),
            },
        }
    }

    pub fn register_admin(&self, payload: Value) -> StatusResponse {
        let Some(credentials) = decode_credentials(payload) else {
            return missing_credentials();
        };

        match self
            .users
            .register_admin(&credentials.username, &credentials.password)
        {
            Ok(_) => StatusResponse {
                success: true,
                message: "Admin created successfully".to_string(),
            },
            Err(UserError::Storage(err)) => StatusResponse {
                success: false,
                message: format!("Failed to create admin: {err}"),
            },
            Err(err) => StatusResponse {
                success: false,
                message: err.to_string(),
            },
        }
    }

    pub fn login(&self, payload: Value) -> LoginResponse {
        let Some(credentials) = decode_credentials(payload) else {
            return LoginResponse {
                success: false,
                user: None,
                message: Some("Username and password are required".to_string()),
            };
        };

        match self
            .users
            .authenticate(&credentials.username, &credentials.password)
        {
            Ok(identity) => LoginResponse {
                success: true,
                user: Some(identity),
                message: None,
            },
            Err(UserError::InvalidCredentials) => LoginResponse {
                success: false,
                user: None,
                message: Some("Invalid username or password".to_string()),
            },
            Err(_) => LoginResponse {
                success: false,
                user: None,
                message: Some(
                    "Authentication system error. Please contact IT support.".to_string(),
                ),
            },
        }
    }

    pub fn create_moderator(&self, payload: Value) -> StatusResponse {
        let payload = sanitize_value(payload);
        let Ok(request) = serde_json::from_value::<ModeratorRequest>(payload) else {
            return missing_credentials();
        };
        if request.username.is_empty() || request.password.is_empty() {
            return missing_credentials();
        }

        match self.users.create_moderator(
            &request.username,
            &request.password,
            &request.created_by,
        ) {
            Ok(_) => StatusResponse {
                success: true,
                message: "Moderator created successfully".to_string(),
            },
            Err(UserError::Storage(err)) => StatusResponse {
                success: false,
                message: format!("Failed to create moderator: {err}"),
            },
            Err(err) => StatusResponse {
                success: false,
                message: err.to_string(),
            },
        }
    }

    pub fn get_users(&self) -> RecordsResponse<UserRecord> {
        match self.users.list() {
            Ok(users) => RecordsResponse::Records(users),
            Err(err) => RecordsResponse::Failure(OperationFailure::new(err.to_string())),
        }
    }

    pub fn delete_moderator(&self, username: &str) -> StatusResponse {
        if username.is_empty() {
            return StatusResponse {
                success: false,
                message: "Username is required".to_string(),
            };
        }

        match self.users.delete_moderator(&sanitize_str(username)) {
            Ok(()) => StatusResponse {
                success: true,
                message: "Moderator deleted successfully".to_string(),
            },
            Err(UserError::Storage(err)) => StatusResponse {
                success: false,
                message: format!("Failed to delete moderator: {err}"),
            },
            Err(err) => StatusResponse {
                success: false,
                message: err.to_string(),
            },
        }
    }

    pub fn get_prescriptions(&self) -> RecordsResponse<PrescriptionRecord> {
        match self.prescriptions.list() {
            Ok(records) => RecordsResponse::Records(records),
            Err(err) => RecordsResponse::Failure(OperationFailure::new(err.to_string())),
        }
    }

    pub fn save_prescription(&self, payload: Value) -> SaveResponse {
        if !payload.is_object() {
            return SaveResponse::Failure(OperationFailure::new(
                "Invalid prescription data".to_string(),
            ));
        }

        let payload = sanitize_value(payload);
        let draft: PrescriptionDraft = match serde_json::from_value(payload) {
            Ok(draft) => draft,
            Err(_) => {
                return SaveResponse::Failure(OperationFailure::new(
                    "Invalid prescription data".to_string(),
                ));
            }
        };

        match self.prescriptions.intake(draft) {
            Ok(record) => SaveResponse::Saved(record),
            Err(err) => SaveResponse::Failure(OperationFailure::new(err.to_string())),
        }
    }

    /// Merges an imported snapshot's prescriptions into the live set. The
    /// snapshot's user entries are deliberately ignored: restoring accounts
    /// from an arbitrary file would bypass the one-time admin registration
    /// gate.
    pub fn import_backup(&self, raw: &str) -> StatusResponse {
        let snapshot = match backup::decode(raw) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                return StatusResponse {
                    success: false,
                    message: "Invalid backup data format".to_string(),
                };
            }
        };

        let live = match self.prescriptions.list() {
            Ok(live) => live,
            Err(err) => return import_failure(err),
        };

        let (merged, added) = merge::merge(live, snapshot.prescriptions);
        if let Err(err) = self.prescriptions.replace_all(&merged) {
            return import_failure(err);
        }

        StatusResponse {
            success: true,
            message: format!("Import successful. Added {added} new prescriptions."),
        }
    }

    /// Snapshot of the full exportable state, composed from the two read
    /// operations.
    pub fn export_backup(&self) -> ExportResponse {
        let prescriptions = match self.prescriptions.list() {
            Ok(records) => records,
            Err(err) => return ExportResponse::Failure(OperationFailure::new(err.to_string())),
        };
        let users = match self.users.list() {
            Ok(users) => users,
            Err(err) => return ExportResponse::Failure(OperationFailure::new(err.to_string())),
        };

        ExportResponse::Snapshot(backup::export(prescriptions, &users))
    }
}

fn decode_credentials(payload: Value) -> Option<Credentials> {
    let payload = sanitize_value(payload);
    let credentials: Credentials = serde_json::from_value(payload).ok()?;
    if credentials.username.is_empty() || credentials.password.is_empty() {
        return None;
    }
    Some(credentials)
}

fn missing_credentials() -> StatusResponse {
    StatusResponse {
        success: false,
        message: "Username and password are required".to_string(),
    }
}

fn import_failure(err: PrescriptionError) -> StatusResponse {
    StatusResponse {
        success: false,
        message: format!("Failed to import backup: {err}"),
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn open_gateway(test_name: &str) -> (Gateway, PathBuf) {
        let root = create_temp_root(test_name);
        let config = AppConfig {
            data_dir: root.clone(),
        };
        let gateway = Gateway::open(&config).expect("open gateway");
        (gateway, root)
    }

    fn intake_payload(name: &str) -> Value {
        json!({
            "patientName": name,
            "age": 30,
            "gender": "Male",
            "department": "OPD",
            "type": "General",
        })
    }

    #[test]
    fn check_admin_exists__should_report_false_then_true() {
        // Given
        let (gateway, root) = open_gateway("admin-exists");

        // When
        let before = gateway.check_admin_exists();
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));
        let after = gateway.check_admin_exists();

        // Then
        assert!(before.success);
        assert_eq!(before.admin_exists, Some(false));
        assert_eq!(after.admin_exists, Some(true));

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn register_admin__should_succeed_at_most_once() {
        // Given
        let (gateway, root) = open_gateway("register-once");

        // When
        let first =
            gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));
        let second =
            gateway.register_admin(json!({"username": "other-doc", "password": "An0ther&pass"}));

        // Then
        assert!(first.success);
        assert_eq!(first.message, "Admin created successfully");
        assert!(!second.success);
        assert_eq!(second.message, "Admin user already exists");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn register_admin__should_require_username_and_password() {
        // Given
        let (gateway, root) = open_gateway("register-missing");

        // When
        let response = gateway.register_admin(json!({"username": "head-doc"}));

        // Then
        assert!(!response.success);
        assert_eq!(response.message, "Username and password are required");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn login__should_return_role_bearing_identity() {
        // Given
        let (gateway, root) = open_gateway("login-ok");
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));

        // When
        let response = gateway.login(json!({"username": "head-doc", "password": "Secur3&pass"}));

        // Then
        assert!(response.success);
        let user = response.user.expect("user");
        assert_eq!(user.username, "head-doc");
        assert_eq!(
            serde_json::to_value(&user).expect("encode"),
            json!({"username": "head-doc", "role": "admin"})
        );

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn login__should_fail_without_revealing_which_field_was_wrong() {
        // Given
        let (gateway, root) = open_gateway("login-fail");
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));

        // When
        let bad_password =
            gateway.login(json!({"username": "head-doc", "password": "Wr0ng&pass!"}));
        let unknown_user =
            gateway.login(json!({"username": "nobody", "password": "Secur3&pass"}));

        // Then
        assert!(!bad_password.success);
        assert!(!unknown_user.success);
        assert_eq!(bad_password.message, unknown_user.message);
        assert_eq!(
            bad_password.message.as_deref(),
            Some("Invalid username or password")
        );

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn create_moderator__should_reject_admin_username() {
        // Given
        let (gateway, root) = open_gateway("moderator-collision");
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));

        // When
        let response = gateway.create_moderator(json!({
            "username": "head-doc",
            "password": "An0ther&pass",
            "createdBy": "head-doc",
        }));

        // Then
        assert!(!response.success);
        assert_eq!(response.message, "Username already exists");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn delete_moderator__should_protect_admin_records() {
        // Given
        let (gateway, root) = open_gateway("delete-protected");
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));

        // When
        let response = gateway.delete_moderator("head-doc");

        // Then
        assert!(!response.success);
        assert_eq!(response.message, "User not found or cannot be deleted");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn save_prescription__should_assign_sequential_numbers() {
        // Given
        let (gateway, root) = open_gateway("save-sequential");

        // When
        let first = gateway.save_prescription(intake_payload("Asha Rao"));
        let second = gateway.save_prescription(intake_payload("Ravi Kumar"));

        // Then
        match (first, second) {
            (SaveResponse::Saved(first), SaveResponse::Saved(second)) => {
                assert_eq!(first.registration_number, 1);
                assert_eq!(second.registration_number, 2);
            }
            other => panic!("expected saved records, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn save_prescription__should_sanitize_string_fields() {
        // Given
        let (gateway, root) = open_gateway("save-sanitize");
        let mut payload = intake_payload("<b>Asha</b>");
        payload["address"] = json!("12/4 Lake Road");

        // When
        let response = gateway.save_prescription(payload);

        // Then
        match response {
            SaveResponse::Saved(record) => {
                assert_eq!(record.patient_name, "&lt;b&gt;Asha&lt;&#x2F;b&gt;");
                assert_eq!(record.address.as_deref(), Some("12&#x2F;4 Lake Road"));
            }
            other => panic!("expected saved record, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn save_prescription__should_surface_validation_message() {
        // Given
        let (gateway, root) = open_gateway("save-invalid");
        let mut payload = intake_payload("Asha Rao");
        payload["aadharNumber"] = json!("12345");

        // When
        let response = gateway.save_prescription(payload);

        // Then
        match response {
            SaveResponse::Failure(failure) => {
                assert!(!failure.success);
                assert_eq!(failure.error, "Aadhar number must be exactly 12 digits");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn save_prescription__should_report_field_message_for_string_age() {
        // Given a form client that sends numbers as strings.
        let (gateway, root) = open_gateway("save-string-age");
        let mut valid = intake_payload("Asha Rao");
        valid["age"] = json!("45");
        let mut invalid = intake_payload("Ravi Kumar");
        invalid["age"] = json!("abc");

        // When
        let saved = gateway.save_prescription(valid);
        let rejected = gateway.save_prescription(invalid);

        // Then
        match saved {
            SaveResponse::Saved(record) => assert_eq!(record.age, 45),
            other => panic!("expected saved record, got {other:?}"),
        }
        match rejected {
            SaveResponse::Failure(failure) => {
                assert_eq!(failure.error, "Age must be a positive number");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn save_prescription__should_reject_non_object_payload() {
        // Given
        let (gateway, root) = open_gateway("save-non-object");

        // When
        let response = gateway.save_prescription(json!("not an object"));

        // Then
        match response {
            SaveResponse::Failure(failure) => {
                assert_eq!(failure.error, "Invalid prescription data");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn import_backup__should_merge_and_report_added_count() {
        // Given
        let (gateway, root) = open_gateway("import-merge");
        gateway.save_prescription(intake_payload("Asha Rao"));
        gateway.save_prescription(intake_payload("Ravi Kumar"));
        let raw = r#"{
            "metadata": {"version": "1.0"},
            "prescriptions": [
                {"registrationNumber": 2, "patientName": "Imported Duplicate"},
                {"registrationNumber": 5, "patientName": "Imported New"}
            ]
        }"#;

        // When
        let response = gateway.import_backup(raw);

        // Then
        assert!(response.success);
        assert_eq!(
            response.message,
            "Import successful. Added 1 new prescriptions."
        );
        match gateway.get_prescriptions() {
            RecordsResponse::Records(records) => {
                let numbers: Vec<u64> =
                    records.iter().map(|r| r.registration_number).collect();
                assert_eq!(numbers, vec![1, 2, 5]);
                assert_eq!(records[1].patient_name, "Ravi Kumar");
            }
            other => panic!("expected records, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn import_backup__should_accept_string_typed_numbers() {
        // Given a backup produced by the form-based app, where age and
        // roomNumber were written as strings.
        let (gateway, root) = open_gateway("import-string-numbers");
        let raw = r#"{
            "metadata": {"version": "1.0"},
            "prescriptions": [
                {
                    "registrationNumber": 5,
                    "patientName": "Asha Rao",
                    "age": "45",
                    "gender": "Female",
                    "department": "OPD",
                    "type": "General",
                    "roomNumber": "12"
                }
            ]
        }"#;

        // When
        let response = gateway.import_backup(raw);

        // Then
        assert!(response.success);
        assert_eq!(response.message, "Import successful. Added 1 new prescriptions.");
        match gateway.get_prescriptions() {
            RecordsResponse::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].registration_number, 5);
                assert_eq!(records[0].age, 45);
                assert_eq!(records[0].room_number, Some(12));
            }
            other => panic!("expected records, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn import_backup__should_be_idempotent() {
        // Given
        let (gateway, root) = open_gateway("import-idempotent");
        let raw = r#"{
            "metadata": {"version": "1.0"},
            "prescriptions": [{"registrationNumber": 3, "patientName": "Once"}]
        }"#;

        // When
        let first = gateway.import_backup(raw);
        let second = gateway.import_backup(raw);

        // Then
        assert_eq!(first.message, "Import successful. Added 1 new prescriptions.");
        assert_eq!(second.message, "Import successful. Added 0 new prescriptions.");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn import_backup__should_reject_malformed_payload() {
        // Given
        let (gateway, root) = open_gateway("import-malformed");

        // When
        let response = gateway.import_backup(r#"{"prescriptions": []}"#);

        // Then
        assert!(!response.success);
        assert_eq!(response.message, "Invalid backup data format");

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn export_backup__should_never_include_password_hashes() {
        // Given
        let (gateway, root) = open_gateway("export-hashless");
        gateway.register_admin(json!({"username": "head-doc", "password": "Secur3&pass"}));
        gateway.save_prescription(intake_payload("Asha Rao"));

        // When
        let response = gateway.export_backup();

        // Then
        let encoded = serde_json::to_string(&response).expect("encode");
        assert!(!encoded.contains("password"));
        match response {
            ExportResponse::Snapshot(snapshot) => {
                assert_eq!(snapshot.prescriptions.len(), 1);
                assert_eq!(snapshot.users.len(), 1);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    #[test]
    fn export_backup__should_round_trip_through_import() {
        // Given
        let (gateway, root) = open_gateway("export-round-trip");
        gateway.save_prescription(intake_payload("Asha Rao"));
        let ExportResponse::Snapshot(snapshot) = gateway.export_backup() else {
            panic!("expected snapshot");
        };
        let raw = backup::serialize(&snapshot).expect("serialize");
        let (fresh, fresh_root) = open_gateway("export-round-trip-fresh");

        // When
        let response = fresh.import_backup(&raw);

        // Then
        assert!(response.success);
        match fresh.get_prescriptions() {
            RecordsResponse::Records(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].registration_number, 1);
                assert_eq!(records[0].patient_name, "Asha Rao");
            }
            other => panic!("expected records, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
        std::fs::remove_dir_all(&fresh_root).expect("cleanup");
    }

    #[test]
    fn get_users__should_fail_with_error_shape_on_corrupt_collection() {
        // Given
        let (gateway, root) = open_gateway("users-corrupt");
        std::fs::write(root.join("users.json"), "[broken").expect("corrupt file");

        // When
        let response = gateway.get_users();

        // Then
        match response {
            RecordsResponse::Failure(failure) => {
                assert!(!failure.success);
                assert!(failure.error.contains("not valid JSON"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        std::fs::remove_dir_all(&root).expect("cleanup");
    }

    fn create_temp_root(test_name: &str) -> PathBuf {
        let mut root = std::env::temp_dir();
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        root.push(format!("rxledger-{}-{}", test_name, nanos));
        std::fs::create_dir_all(&root).expect("create temp dir");
        root
    }
}
