use crate::config::RunMode;
use crate::core::reconciler;
use crate::domain::{DiffEntry, DirectoryClient, PlatformClient, WriteOutcome, WritePlan};
use crate::utils::error::{Result, SyncError};
use std::future::Future;
use std::time::Duration;

/// Immutable per-run settings, built once from the configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: RunMode,
    pub target_group: String,
    pub diff_pairs: Vec<(String, String)>,
    pub group_dns: Vec<String>,
    pub write_enabled: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub directory_members: usize,
    pub platform_users: usize,
    pub matched_users: usize,
    pub plan: WritePlan,
    pub outcome: WriteOutcome,
}

#[derive(Debug, Clone)]
pub struct DiffReport {
    pub group_a: String,
    pub group_b: String,
    pub entries: Vec<DiffEntry>,
}

#[derive(Debug, Clone)]
pub enum RunReport {
    Sync(SyncReport),
    Diff(Vec<DiffReport>),
}

pub struct SyncEngine<D: DirectoryClient, P: PlatformClient> {
    directory: Option<D>,
    platform: P,
    settings: RunSettings,
}

impl<D: DirectoryClient, P: PlatformClient> SyncEngine<D, P> {
    /// An engine without a directory client can only run in diff mode.
    pub fn new(platform: P, settings: RunSettings) -> Self {
        Self {
            directory: None,
            platform,
            settings,
        }
    }

    pub fn with_directory(mut self, directory: D) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!(mode = %self.settings.mode, "Starting run");
        match self.settings.mode {
            RunMode::Sync => self.run_sync().await.map(RunReport::Sync),
            RunMode::Diff => self.run_diff().await.map(RunReport::Diff),
        }
    }

    async fn run_sync(&self) -> Result<SyncReport> {
        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| SyncError::MissingConfigError {
                field: "ldap".to_string(),
            })?;

        tracing::info!("🔍 Fetching LDAP group members...");
        let members = self
            .with_deadline(
                "ldap search",
                directory.fetch_members(&self.settings.group_dns),
            )
            .await?;
        tracing::info!("Fetched {} LDAP members", members.len());

        tracing::info!("👥 Fetching Slack users...");
        let users = self
            .with_deadline("slack users.list", self.platform.list_users())
            .await?;

        let matched = reconciler::match_members(&members, &users);
        tracing::info!(
            "{} user in LDAP group | {} in Slack at all | {} user will be in Slack group {}",
            members.len(),
            users.len(),
            matched.len(),
            self.settings.target_group
        );

        let groups = self
            .with_deadline("slack usergroups.list", self.platform.list_groups(true))
            .await?;
        tracing::info!("Fetched {} Slack groups", groups.len());

        let target = reconciler::resolve_group(&groups, &self.settings.target_group)?;
        let plan = reconciler::plan_write(target, &matched)?;
        if plan.is_noop() {
            tracing::info!(group = %plan.group_name, "Group membership is already up to date");
        }

        let outcome = self
            .with_deadline(
                "slack usergroups.users.update",
                reconciler::write_back(&self.platform, &plan, self.settings.write_enabled),
            )
            .await?;

        Ok(SyncReport {
            directory_members: members.len(),
            platform_users: users.len(),
            matched_users: matched.len(),
            plan,
            outcome,
        })
    }

    async fn run_diff(&self) -> Result<Vec<DiffReport>> {
        let users = self
            .with_deadline("slack users.list", self.platform.list_users())
            .await?;
        let groups = self
            .with_deadline("slack usergroups.list", self.platform.list_groups(true))
            .await?;
        tracing::info!(
            "Fetched {} Slack users and {} Slack groups",
            users.len(),
            groups.len()
        );

        let mut reports = Vec::with_capacity(self.settings.diff_pairs.len());
        for (group_a, group_b) in &self.settings.diff_pairs {
            let entries = reconciler::diff_groups(&users, &groups, group_a, group_b)?;
            tracing::info!(
                "📋 {} member(s) of {} are not in {}",
                entries.len(),
                group_a,
                group_b
            );
            for entry in &entries {
                tracing::info!("{}", entry);
            }
            reports.push(DiffReport {
                group_a: group_a.clone(),
                group_b: group_b.clone(),
                entries,
            });
        }

        Ok(reports)
    }

    async fn with_deadline<T, F>(&self, stage: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.settings.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::TimeoutError {
                stage: stage.to_string(),
                seconds: self.settings.timeout.as_secs(),
            }),
        }
    }
}
