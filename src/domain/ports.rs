use crate::domain::model::{DirectoryMember, PlatformGroup, PlatformUser};
use crate::utils::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Members of every group DN, concatenated in the order the groups are
    /// given. Duplicates across groups are kept.
    async fn fetch_members(&self, group_dns: &[String]) -> Result<Vec<DirectoryMember>>;
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_users(&self) -> Result<Vec<PlatformUser>>;

    async fn list_groups(&self, include_membership: bool) -> Result<Vec<PlatformGroup>>;

    /// Replaces the whole membership of `group_id`. Users not listed are
    /// removed from the group.
    async fn replace_group_members(&self, group_id: &str, user_ids: &[String]) -> Result<()>;
}
