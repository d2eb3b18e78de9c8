//! Permission resolution for the proposal workflow.
//!
//! Two capability tiers exist:
//!
//! - **Creators**: any identity whose level is at least
//!   [`DEFAULT_MIN_CREATE_LEVEL`] (configurable) may author proposals.
//! - **Authority identities**: a small configured set of principals that may
//!   vote (approve / reject) and edit or delete any proposal, including
//!   already-approved content.
//!
//! Unknown identities are never an error; every check simply returns `false`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Default minimum level required to author proposals (the two upper tiers).
pub const DEFAULT_MIN_CREATE_LEVEL: u8 = 5;

/// The authenticated caller, as supplied by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable user id from the identity provider.
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    /// Audience tier, 1-6.
    pub level: u8,
}

/// The fixed capability set of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub create: bool,
    pub vote: bool,
    pub approve: bool,
    pub reject: bool,
    pub manage: bool,
}

/// Configured authority set and creation threshold.
#[derive(Debug, Clone, Default)]
pub struct AuthorityConfig {
    /// Normalized (trimmed, lowercased) authority emails.
    emails: HashSet<String>,
    /// Stable user ids granted authority regardless of email.
    user_ids: HashSet<String>,
    min_create_level: u8,
}

impl AuthorityConfig {
    pub fn new<E, U>(emails: E, user_ids: U, min_create_level: u8) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
            user_ids: user_ids
                .into_iter()
                .map(|u| u.as_ref().trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            min_create_level,
        }
    }

    /// Number of configured authority principals (emails plus user ids).
    pub fn authority_count(&self) -> usize {
        self.emails.len() + self.user_ids.len()
    }

    pub fn min_create_level(&self) -> u8 {
        self.min_create_level
    }
}

/// Trim and lowercase an email for comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Resolves capabilities from the configured [`AuthorityConfig`].
#[derive(Debug, Clone)]
pub struct PermissionResolver {
    config: AuthorityConfig,
}

impl PermissionResolver {
    pub fn new(config: AuthorityConfig) -> Self {
        Self { config }
    }

    /// Level-based creation right.
    pub fn can_create_proposals(&self, level: u8) -> bool {
        level >= self.config.min_create_level
    }

    pub fn can_vote_on_proposals(&self, email: &str) -> bool {
        self.has_absolute_authority(email)
    }

    pub fn can_approve_proposals(&self, email: &str) -> bool {
        self.has_absolute_authority(email)
    }

    pub fn can_reject_proposals(&self, email: &str) -> bool {
        self.has_absolute_authority(email)
    }

    /// True only for configured authority emails.
    pub fn has_absolute_authority(&self, email: &str) -> bool {
        let email = normalize_email(email);
        !email.is_empty() && self.config.emails.contains(&email)
    }

    /// Authority check over the full principal: email or stable user id.
    pub fn is_authority(&self, principal: &Principal) -> bool {
        self.has_absolute_authority(&principal.email)
            || self.config.user_ids.contains(principal.user_id.trim())
    }

    pub fn capabilities(&self, principal: &Principal) -> Capabilities {
        let authority = self.is_authority(principal);
        Capabilities {
            create: authority || self.can_create_proposals(principal.level),
            vote: authority,
            approve: authority,
            reject: authority,
            manage: authority,
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PermissionResolver {
        PermissionResolver::new(AuthorityConfig::new(
            ["Nihilus@Tribunal.dev", " luke@tribunal.dev "],
            ["user-77"],
            DEFAULT_MIN_CREATE_LEVEL,
        ))
    }

    fn principal(user_id: &str, email: &str, level: u8) -> Principal {
        Principal {
            user_id: user_id.to_string(),
            email: email.to_string(),
            display_name: "Test".to_string(),
            level,
        }
    }

    #[test]
    fn test_create_requires_upper_tiers() {
        let r = resolver();
        assert!(!r.can_create_proposals(1));
        assert!(!r.can_create_proposals(4));
        assert!(r.can_create_proposals(5));
        assert!(r.can_create_proposals(6));
    }

    #[test]
    fn test_authority_email_is_case_insensitive_and_trimmed() {
        let r = resolver();
        assert!(r.has_absolute_authority("nihilus@tribunal.dev"));
        assert!(r.has_absolute_authority("  NIHILUS@tribunal.DEV "));
        assert!(r.can_approve_proposals("Luke@Tribunal.dev"));
        assert!(r.can_reject_proposals("luke@tribunal.dev"));
        assert!(r.can_vote_on_proposals("luke@tribunal.dev"));
    }

    #[test]
    fn test_unknown_identity_is_denied_without_error() {
        let r = resolver();
        assert!(!r.has_absolute_authority("someone@tribunal.dev"));
        assert!(!r.can_approve_proposals(""));
        assert!(!r.can_reject_proposals("   "));
    }

    #[test]
    fn test_high_level_does_not_grant_votes() {
        let r = resolver();
        let caps = r.capabilities(&principal("u1", "maestro@tribunal.dev", 6));
        assert!(caps.create);
        assert!(!caps.vote);
        assert!(!caps.approve);
        assert!(!caps.reject);
        assert!(!caps.manage);
    }

    #[test]
    fn test_authority_by_user_id() {
        let r = resolver();
        let p = principal("user-77", "other@tribunal.dev", 1);
        assert!(r.is_authority(&p));
        let caps = r.capabilities(&p);
        assert!(caps.create, "authority may always create");
        assert!(caps.manage);
    }

    #[test]
    fn test_empty_config_grants_nothing() {
        let r = PermissionResolver::new(AuthorityConfig::new(
            Vec::<String>::new(),
            Vec::<String>::new(),
            DEFAULT_MIN_CREATE_LEVEL,
        ));
        assert_eq!(r.config().authority_count(), 0);
        assert!(!r.has_absolute_authority(""));
        assert!(!r.is_authority(&principal("", "", 6)));
    }
}
