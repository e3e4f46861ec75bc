use crate::domain::{
    DiffEntry, DirectoryMember, MatchResult, PlatformClient, PlatformGroup, PlatformUser,
    WriteOutcome, WritePlan,
};
use crate::utils::error::{Result, SyncError};
use std::collections::{HashMap, HashSet};

/// Slack users whose name matches the common name of some LDAP member,
/// ignoring case. Deleted users are dropped and each user id appears once.
pub fn match_members(directory: &[DirectoryMember], users: &[PlatformUser]) -> MatchResult {
    let wanted: HashSet<String> = directory
        .iter()
        .map(DirectoryMember::match_key)
        .filter(|key| !key.is_empty())
        .collect();

    if wanted.is_empty() {
        return MatchResult::default();
    }

    let mut seen = HashSet::new();
    let users = users
        .iter()
        .filter(|user| !user.is_deleted)
        .filter(|user| wanted.contains(&user.match_key()))
        .filter(|user| seen.insert(user.id.as_str()))
        .cloned()
        .collect();

    MatchResult { users }
}

/// First group whose name equals `name` exactly.
pub fn resolve_group<'a>(groups: &'a [PlatformGroup], name: &str) -> Result<&'a PlatformGroup> {
    let mut candidates = groups.iter().filter(|group| group.name == name);

    let group = candidates
        .next()
        .ok_or_else(|| SyncError::GroupNotFoundError {
            name: name.to_string(),
        })?;

    let duplicates = candidates.count();
    if duplicates > 0 {
        tracing::warn!(
            group = %name,
            chosen = %group.id,
            duplicates,
            "Several Slack groups share this name, using the first one"
        );
    }
    if let Some(deleted_at) = group.deleted_at {
        tracing::warn!(group = %name, id = %group.id, %deleted_at, "Slack group is marked as deleted");
    }

    Ok(group)
}

/// Builds the membership to write into `target`. An empty match is refused so
/// a failed LDAP lookup never wipes the group.
pub fn plan_write(target: &PlatformGroup, matched: &MatchResult) -> Result<WritePlan> {
    if matched.is_empty() {
        return Err(SyncError::NoUsersToSyncError {
            group: target.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    let user_ids: Vec<String> = matched
        .users
        .iter()
        .filter(|user| seen.insert(user.id.as_str()))
        .map(|user| user.id.clone())
        .collect();

    let current: HashSet<&str> = target.member_user_ids.iter().map(String::as_str).collect();
    let additions = user_ids
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect();
    let removals = target
        .member_user_ids
        .iter()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();

    Ok(WritePlan {
        group_id: target.id.clone(),
        group_name: target.name.clone(),
        user_ids,
        additions,
        removals,
    })
}

/// Replaces the group membership when `write_enabled`, otherwise only logs
/// what would have been written.
pub async fn write_back<P>(platform: &P, plan: &WritePlan, write_enabled: bool) -> Result<WriteOutcome>
where
    P: PlatformClient + ?Sized,
{
    tracing::info!(
        group = %plan.group_name,
        id = %plan.group_id,
        members = plan.user_ids.len(),
        additions = plan.additions.len(),
        removals = plan.removals.len(),
        "Target group resolved"
    );
    for (i, id) in plan.user_ids.iter().enumerate() {
        tracing::debug!("{}. ID: {}", i + 1, id);
    }
    if !plan.additions.is_empty() {
        tracing::info!("  + {}", plan.additions.join(","));
    }
    if !plan.removals.is_empty() {
        tracing::info!("  - {}", plan.removals.join(","));
    }

    if !write_enabled {
        tracing::info!(
            users = %plan.user_ids.join(","),
            "No changes were written, because write is disabled (dry run)"
        );
        return Ok(WriteOutcome::DryRun {
            user_ids: plan.user_ids.clone(),
        });
    }

    platform
        .replace_group_members(&plan.group_id, &plan.user_ids)
        .await?;

    tracing::info!(
        group = %plan.group_name,
        users = %plan.user_ids.join(","),
        "✅ Changes were written"
    );
    Ok(WriteOutcome::Written {
        user_ids: plan.user_ids.clone(),
    })
}

/// Members of `group_a` missing from `group_b`, numbered from 1 in the order
/// of `group_a`'s member list.
pub fn diff_groups(
    users: &[PlatformUser],
    groups: &[PlatformGroup],
    group_a: &str,
    group_b: &str,
) -> Result<Vec<DiffEntry>> {
    let a = resolve_group(groups, group_a)?;
    let b = resolve_group(groups, group_b)?;

    let in_b: HashSet<&str> = b.member_user_ids.iter().map(String::as_str).collect();
    let by_id: HashMap<&str, &PlatformUser> =
        users.iter().map(|user| (user.id.as_str(), user)).collect();

    a.member_user_ids
        .iter()
        .filter(|id| !in_b.contains(id.as_str()))
        .enumerate()
        .map(|(i, id)| -> Result<DiffEntry> {
            let user = by_id
                .get(id.as_str())
                .ok_or_else(|| SyncError::UserNotFoundError {
                    id: id.clone(),
                    group: a.name.clone(),
                })?;
            Ok(DiffEntry {
                index: i + 1,
                user: (*user).clone(),
                in_group: a.name.clone(),
                not_in_group: b.name.clone(),
            })
        })
        .collect()
}
