use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A person entry returned by an LDAP group search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMember {
    pub distinguished_name: String,
    pub common_name: String,
    pub display_name: String,
}

impl DirectoryMember {
    /// Key used to match against [`PlatformUser::match_key`].
    pub fn match_key(&self) -> String {
        self.common_name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    pub name: String,
    pub real_name: String,
    pub display_name: String,
    pub is_deleted: bool,
}

impl PlatformUser {
    pub fn match_key(&self) -> String {
        self.name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub member_user_ids: Vec<String>,
    pub member_count: u64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Slack users holding an account for some directory member, in Slack's user
/// list order, one entry per user id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub users: Vec<PlatformUser>,
}

impl MatchResult {
    pub fn user_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

/// One member of `in_group` that `not_in_group` lacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    pub index: usize,
    pub user: PlatformUser,
    pub in_group: String,
    pub not_in_group: String,
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}. SlackId: {} RealName: {} DisplayName: {} \t is not in {} but in {}",
            self.index,
            self.user.id,
            self.user.real_name,
            self.user.display_name,
            self.not_in_group,
            self.in_group
        )
    }
}

/// Membership the target group ends up with, plus the delta against its
/// current membership for the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub group_id: String,
    pub group_name: String,
    pub user_ids: Vec<String>,
    pub additions: Vec<String>,
    pub removals: Vec<String>,
}

impl WritePlan {
    pub fn is_noop(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    DryRun { user_ids: Vec<String> },
    Written { user_ids: Vec<String> },
}

impl WriteOutcome {
    pub fn user_ids(&self) -> &[String] {
        match self {
            WriteOutcome::DryRun { user_ids } | WriteOutcome::Written { user_ids } => user_ids,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_entry_renders_one_line() {
        let entry = DiffEntry {
            index: 2,
            user: PlatformUser {
                id: "U3".to_string(),
                name: "jdoe".to_string(),
                real_name: "D012345".to_string(),
                display_name: "John Doe".to_string(),
                is_deleted: false,
            },
            in_group: "Ops".to_string(),
            not_in_group: "Dev".to_string(),
        };

        assert_eq!(
            entry.to_string(),
            "2. SlackId: U3 RealName: D012345 DisplayName: John Doe \t is not in Dev but in Ops"
        );
    }

    #[test]
    fn match_keys_fold_case() {
        let member = DirectoryMember {
            distinguished_name: "CN=JDoe,OU=Identities,DC=corp".to_string(),
            common_name: "JDoe".to_string(),
            display_name: "John Doe".to_string(),
        };
        let user = PlatformUser {
            id: "U1".to_string(),
            name: "jdoe".to_string(),
            real_name: String::new(),
            display_name: String::new(),
            is_deleted: false,
        };
        assert_eq!(member.match_key(), user.match_key());
    }
}
