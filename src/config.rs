use std::path::PathBuf;

pub(crate) const USERS_FILE: &str = "users.json";
pub(crate) const PRESCRIPTIONS_FILE: &str = "prescriptions.json";

#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }

    pub fn prescriptions_path(&self) -> PathBuf {
        self.data_dir.join(PRESCRIPTIONS_FILE)
    }
}
