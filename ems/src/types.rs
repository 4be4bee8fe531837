use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

// =============================================================================
// RECORDS - Shapes returned by the backend
// =============================================================================

/// Energy unit a user prefers for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitEnergy {
    Kwh,
    Wh,
}

/// Kind of building a user profile describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HomeType {
    Apartment,
    House,
    Office,
    Industrial,
}

/// Authorization level carried in the token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Client,
}

impl UnitEnergy {
    pub const VALUES: [&'static str; 2] = ["KWH", "WH"];
}

impl UserRole {
    pub const VALUES: [&'static str; 2] = ["ADMIN", "CLIENT"];
}

impl HomeType {
    pub const VALUES: [&'static str; 4] = ["APARTMENT", "HOUSE", "OFFICE", "INDUSTRIAL"];
}

impl fmt::Display for UnitEnergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kwh => f.write_str("KWH"),
            Self::Wh => f.write_str("WH"),
        }
    }
}

impl fmt::Display for HomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apartment => f.write_str("APARTMENT"),
            Self::House => f.write_str("HOUSE"),
            Self::Office => f.write_str("OFFICE"),
            Self::Industrial => f.write_str("INDUSTRIAL"),
        }
    }
}

/// Error returned when parsing an enum label that the backend does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

impl fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseLabelError {}

impl std::str::FromStr for UnitEnergy {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "KWH" => Ok(Self::Kwh),
            "WH" => Ok(Self::Wh),
            _ => Err(ParseLabelError {
                kind: "energy unit",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("ADMIN"),
            Self::Client => f.write_str("CLIENT"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "CLIENT" => Ok(Self::Client),
            _ => Err(ParseLabelError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

impl std::str::FromStr for HomeType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "APARTMENT" => Ok(Self::Apartment),
            "HOUSE" => Ok(Self::House),
            "OFFICE" => Ok(Self::Office),
            "INDUSTRIAL" => Ok(Self::Industrial),
            _ => Err(ParseLabelError {
                kind: "home type",
                value: s.to_string(),
            }),
        }
    }
}

/// Profile of the account behind a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier (UUID string), same value as the token subject
    pub id: String,
    pub unit_energy: UnitEnergy,
    pub home_type: HomeType,
    /// Monthly consumption goal in kWh
    pub goal_kwh_month: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A metered appliance owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Maximum hourly consumption the device is rated for
    pub max_consumption: i32,
    /// Owner of the device
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Energy used during one hour of a day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    /// Hour of day, 0-23
    pub hour: i32,
    pub value: f64,
}

/// Hourly consumption series of one device for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionResponse {
    pub device_id: String,
    /// Day in `YYYY-MM-DD` form
    pub day: String,
    pub points: Vec<HourlyPoint>,
}

impl ConsumptionResponse {
    /// Sum of all hourly values.
    pub fn total(&self) -> f64 {
        self.points.iter().map(|point| point.value).sum()
    }
}

/// Body returned by the login and registration endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
}

// =============================================================================
// PAYLOADS - Request bodies sent to the backend
// =============================================================================

/// Credentials for `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Credentials for `/auth/register`. Same shape as a login.
pub type RegisterRequest = LoginRequest;

/// Parameters for creating the caller's profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreateRequest {
    pub unit_energy: UnitEnergy,
    pub home_type: HomeType,
    pub goal_kwh_month: i64,
}

/// Parameters for updating a profile. `user_id` is only honoured for admins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_energy: Option<UnitEnergy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_type: Option<HomeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_kwh_month: Option<i64>,
}

impl UserUpdateRequest {
    /// Creates an empty update, all fields None
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets another user's profile (admin only)
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub const fn with_unit_energy(mut self, unit_energy: UnitEnergy) -> Self {
        self.unit_energy = Some(unit_energy);
        self
    }

    pub const fn with_home_type(mut self, home_type: HomeType) -> Self {
        self.home_type = Some(home_type);
        self
    }

    pub const fn with_goal_kwh_month(mut self, goal: i64) -> Self {
        self.goal_kwh_month = Some(goal);
        self
    }
}

/// Parameters for registering a new device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCreateRequest {
    pub user_id: String,
    pub name: String,
    pub max_consumption: i32,
}

impl DeviceCreateRequest {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, max_consumption: i32) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            max_consumption,
        }
    }
}

/// Parameters for updating an existing device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceUpdateRequest {
    /// ID of the device to update
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consumption: Option<i32>,
}

impl From<&Device> for DeviceUpdateRequest {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            name: Some(device.name.clone()),
            max_consumption: Some(device.max_consumption),
        }
    }
}

impl DeviceUpdateRequest {
    /// Creates an update for the given device with no field changes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            max_consumption: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub const fn with_max_consumption(mut self, max_consumption: i32) -> Self {
        self.max_consumption = Some(max_consumption);
        self
    }
}
