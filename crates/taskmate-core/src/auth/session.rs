use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::User;

/// Snapshot of the signed-in identity.
///
/// Persisted as JSON in the profile tier. The `federated` flag is stored
/// for convenience only; on restore it is re-derived from the credential
/// record in the secret tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub federated: bool,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn from_user(user: &User, federated: bool) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.name.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            role: user.role.clone(),
            federated,
            created_at: Utc::now(),
        }
    }

    /// Copy profile fields from a fresh server payload.
    /// Returns false (and changes nothing) when the payload is for another user.
    pub fn apply_profile(&mut self, user: &User) -> bool {
        if user.id != self.user_id {
            return false;
        }
        self.email = user.email.clone();
        self.display_name = user.name.clone();
        self.full_name = user.full_name.clone();
        self.avatar = user.avatar.clone();
        self.role = user.role.clone();
        true
    }

    /// Name to greet the user with
    pub fn greeting_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(full) if !full.trim().is_empty() => full,
            _ => &self.display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{name}@b.com"),
            name: name.to_string(),
            full_name: None,
            avatar: None,
            role: None,
        }
    }

    #[test]
    fn test_from_user() {
        let session = Session::from_user(&user("1", "a"), false);
        assert_eq!(session.user_id, "1");
        assert_eq!(session.email, "a@b.com");
        assert_eq!(session.display_name, "a");
        assert!(!session.federated);
    }

    #[test]
    fn test_apply_profile_same_user() {
        let mut session = Session::from_user(&user("1", "a"), false);
        let mut updated = user("1", "renamed");
        updated.full_name = Some("Renamed Person".to_string());
        assert!(session.apply_profile(&updated));
        assert_eq!(session.display_name, "renamed");
        assert_eq!(session.greeting_name(), "Renamed Person");
    }

    #[test]
    fn test_greeting_name_skips_blank_full_name() {
        let mut named = user("1", "a");
        named.full_name = Some("  ".to_string());
        assert_eq!(Session::from_user(&named, false).greeting_name(), "a");
    }

    #[test]
    fn test_apply_profile_other_user_is_ignored() {
        let mut session = Session::from_user(&user("1", "a"), false);
        let before = session.clone();
        assert!(!session.apply_profile(&user("2", "b")));
        assert_eq!(session, before);
    }

    #[test]
    fn test_json_round_trip_preserves_equality() {
        let session = Session::from_user(&user("1", "a"), true);
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
