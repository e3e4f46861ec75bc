use crate::domain::{PlatformClient, PlatformGroup, PlatformUser};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

const USERS_PAGE_SIZE: u32 = 200;

/// Slack Web API client authenticated with a bearer token.
pub struct SlackClient {
    client: Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct UserGroupsListResponse {
    #[serde(default)]
    usergroups: Vec<SlackUserGroup>,
}

#[derive(Debug, Deserialize)]
struct SlackUserGroup {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    user_count: u64,
    /// Seconds since the epoch, 0 while the group is active.
    #[serde(default)]
    date_delete: i64,
}

impl From<SlackUser> for PlatformUser {
    fn from(user: SlackUser) -> Self {
        let real_name = user
            .real_name
            .filter(|name| !name.is_empty())
            .unwrap_or(user.profile.real_name);
        PlatformUser {
            id: user.id,
            name: user.name,
            real_name,
            display_name: user.profile.display_name,
            is_deleted: user.deleted,
        }
    }
}

impl From<SlackUserGroup> for PlatformGroup {
    fn from(group: SlackUserGroup) -> Self {
        let deleted_at = if group.date_delete > 0 {
            DateTime::from_timestamp(group.date_delete, 0)
        } else {
            None
        };
        PlatformGroup {
            id: group.id,
            name: group.name,
            description: group.description,
            member_user_ids: group.users,
            member_count: group.user_count,
            deleted_at,
        }
    }
}

fn api_error(method: &str, message: impl Into<String>) -> SyncError {
    SyncError::PlatformApiError {
        method: method.to_string(),
        message: message.into(),
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>, api_url: &str) -> Result<Self> {
        let normalized = if api_url.ends_with('/') {
            api_url.to_string()
        } else {
            format!("{}/", api_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| SyncError::InvalidConfigValueError {
            field: "slack.apiUrl".to_string(),
            value: api_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .user_agent(concat!("slack-ldap-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::ConfigError {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> Result<Url> {
        self.base_url
            .join(method)
            .map_err(|e| api_error(method, format!("invalid endpoint: {}", e)))
    }

    /// Sends the request and unwraps Slack's `{"ok": .., "error": ..}` envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<T> {
        tracing::debug!(method, "Calling Slack API");

        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| api_error(method, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(method, format!("HTTP {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| api_error(method, format!("invalid JSON response: {}", e)))?;

        if !body.get("ok").and_then(|ok| ok.as_bool()).unwrap_or(false) {
            let error = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown_error");
            return Err(api_error(method, error));
        }

        serde_json::from_value(body)
            .map_err(|e| api_error(method, format!("unexpected response shape: {}", e)))
    }
}

#[async_trait]
impl PlatformClient for SlackClient {
    async fn list_users(&self) -> Result<Vec<PlatformUser>> {
        const METHOD: &str = "users.list";
        let url = self.endpoint(METHOD)?;

        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("limit", USERS_PAGE_SIZE.to_string())]);
            if !cursor.is_empty() {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let page: UsersListResponse = self.call(METHOD, request).await?;
            users.extend(page.members.into_iter().map(PlatformUser::from));

            cursor = page.response_metadata.unwrap_or_default().next_cursor;
            if cursor.is_empty() {
                break;
            }
            tracing::debug!(fetched = users.len(), "Fetching next page of Slack users");
        }

        tracing::debug!(count = users.len(), "Slack users fetched");
        Ok(users)
    }

    async fn list_groups(&self, include_membership: bool) -> Result<Vec<PlatformGroup>> {
        const METHOD: &str = "usergroups.list";
        let request = self.client.get(self.endpoint(METHOD)?).query(&[
            ("include_users", include_membership.to_string()),
            ("include_count", "true".to_string()),
        ]);

        let response: UserGroupsListResponse = self.call(METHOD, request).await?;
        let groups: Vec<PlatformGroup> = response
            .usergroups
            .into_iter()
            .map(PlatformGroup::from)
            .collect();

        for group in &groups {
            tracing::debug!(
                "Slack group: ID: {}, Name: {}, Count: {} (Deleted: {:?}) - {}",
                group.id,
                group.name,
                group.member_count,
                group.deleted_at,
                group.description
            );
        }
        Ok(groups)
    }

    async fn replace_group_members(&self, group_id: &str, user_ids: &[String]) -> Result<()> {
        const METHOD: &str = "usergroups.users.update";
        let request = self.client.post(self.endpoint(METHOD)?).json(&json!({
            "usergroup": group_id,
            "users": user_ids.join(","),
        }));

        let _: serde_json::Value = self.call(METHOD, request).await?;
        tracing::debug!(group_id, count = user_ids.len(), "Slack group membership replaced");
        Ok(())
    }
}
