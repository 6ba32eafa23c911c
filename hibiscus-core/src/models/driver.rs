use chrono::{DateTime, Utc};
use hibiscus_shared::Masked;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VEHICLE: &str = "Toyota Hiace";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub phone: Masked<String>,
    pub email: Masked<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Driver {
    pub fn new(name: String, phone: String, email: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            phone: Masked(phone),
            email: Masked(email),
            vehicle: None,
            license: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn vehicle_or_default(&self) -> &str {
        self.vehicle
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VEHICLE)
    }
}
