use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    VerifiedRep,
    ClubLead,
    #[default]
    Student,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::VerifiedRep, Role::ClubLead, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::VerifiedRep => "verified_rep",
            Role::ClubLead => "club_lead",
            Role::Student => "student",
        }
    }

    pub fn permissions(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "upload_timetable",
                "assign_roles",
                "lock_rooms",
                "cancel_any_booking",
                "view_analytics",
            ],
            Role::VerifiedRep => &["mark_room_free", "view_batch_schedule"],
            Role::ClubLead => &["book_room", "cancel_own_booking", "view_availability"],
            Role::Student => &["view_availability"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    pub uid: String,
    pub email: Option<String>,
    pub role: Role,
    pub batch: Option<String>,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

/// Local mirror of a user known to the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub uid: String,
    pub email: Option<String>,
    pub role: Role,
    pub batch: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
}

impl UserProfile {
    pub fn first_seen(uid: &str, email: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            email,
            role: Role::Student,
            batch: None,
            metadata: serde_json::json!({}),
            created_at: now,
            last_login: Some(now),
            verified_at: None,
            verified_by: None,
            revoked_at: None,
            revoked_by: None,
        }
    }

    pub fn assign_role(&mut self, role: Role, metadata: serde_json::Value, by: &str, now: DateTime<Utc>) {
        self.batch = metadata
            .get("batch")
            .and_then(|b| b.as_str())
            .map(str::to_string);
        self.role = role;
        self.metadata = metadata;
        self.verified_at = Some(now);
        self.verified_by = Some(by.to_string());
    }

    pub fn revoke_role(&mut self, by: &str, now: DateTime<Utc>) {
        self.role = Role::Student;
        self.batch = None;
        self.metadata = serde_json::json!({});
        self.revoked_at = Some(now);
        self.revoked_by = Some(by.to_string());
    }
}
