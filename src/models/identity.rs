// src/models/identity.rs

use serde::{Deserialize, Serialize};

/// Role asserted by the external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Participant,
    Examiner,
    Admin,
    Director,
}

impl Role {
    /// Parses a role claim. Unknown roles get the least privilege.
    pub fn from_claim(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "examiner" | "teacher" => Role::Examiner,
            "admin" | "administrator" => Role::Admin,
            "director" => Role::Director,
            _ => Role::Participant,
        }
    }

    /// Administrators and directors may manage every room.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }

    pub fn can_create_rooms(&self) -> bool {
        matches!(self, Role::Examiner) || self.is_elevated()
    }
}

/// The authenticated caller of a room operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

impl Actor {
    /// Name shown to other users, falling back to the user id.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.id.as_str())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_claim() {
        assert_eq!(Role::from_claim("Teacher"), Role::Examiner);
        assert_eq!(Role::from_claim("director"), Role::Director);
        assert_eq!(Role::from_claim("student"), Role::Participant);
        assert_eq!(Role::from_claim(""), Role::Participant);
    }

    #[test]
    fn test_elevated_roles() {
        assert!(Role::Admin.is_elevated());
        assert!(Role::Director.is_elevated());
        assert!(!Role::Examiner.is_elevated());
        assert!(Role::Examiner.can_create_rooms());
        assert!(!Role::Participant.can_create_rooms());
    }
}
