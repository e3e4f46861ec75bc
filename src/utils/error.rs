use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("LDAP connection to {url} failed: {message}")]
    ConnectionError { url: String, message: String },

    #[error("LDAP bind as '{bind_dn}' failed: {message}")]
    AuthError { bind_dn: String, message: String },

    #[error("LDAP search for group '{group}' failed: {message}")]
    SearchError { group: String, message: String },

    #[error("Slack API call {method} failed: {message}")]
    PlatformApiError { method: String, message: String },

    #[error("Slack group '{name}' wasn't found - check config")]
    GroupNotFoundError { name: String },

    #[error("No users to sync into Slack group '{group}', update skipped")]
    NoUsersToSyncError { group: String },

    #[error("Slack user '{id}' is a member of group '{group}' but missing from the user list")]
    UserNotFoundError { id: String, group: String },

    #[error("{stage} did not finish within {seconds}s")]
    TimeoutError { stage: String, seconds: u64 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The pipeline stage an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    Config,
    Directory,
    Platform,
    Reconcile,
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorStage::Config => "config",
            ErrorStage::Directory => "ldap",
            ErrorStage::Platform => "slack",
            ErrorStage::Reconcile => "reconcile",
        };
        f.write_str(name)
    }
}

impl SyncError {
    pub fn stage(&self) -> ErrorStage {
        match self {
            SyncError::ConnectionError { .. }
            | SyncError::AuthError { .. }
            | SyncError::SearchError { .. } => ErrorStage::Directory,
            SyncError::PlatformApiError { .. } => ErrorStage::Platform,
            SyncError::GroupNotFoundError { .. }
            | SyncError::NoUsersToSyncError { .. }
            | SyncError::UserNotFoundError { .. } => ErrorStage::Reconcile,
            SyncError::TimeoutError { stage, .. } => {
                if stage.starts_with("ldap") {
                    ErrorStage::Directory
                } else {
                    ErrorStage::Platform
                }
            }
            SyncError::ConfigError { .. }
            | SyncError::MissingConfigError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::IoError(_) => ErrorStage::Config,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.stage() {
            ErrorStage::Config => 1,
            ErrorStage::Directory => 3,
            ErrorStage::Platform => 4,
            ErrorStage::Reconcile => 5,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SyncError::ConnectionError { .. } => {
                "Check ldap.host/ldap.port and the TLS certificates, then retry"
            }
            SyncError::AuthError { .. } => "Verify ldap.bindUser and ldap.bindPwd",
            SyncError::SearchError { .. } => "Verify ldap.baseCN and ldap.groupCNs",
            SyncError::PlatformApiError { .. } => {
                "Verify slack.securityToken and its scopes (users:read, usergroups:read, usergroups:write)"
            }
            SyncError::GroupNotFoundError { .. } => {
                "Group names are case-sensitive; compare against the Slack user group list"
            }
            SyncError::NoUsersToSyncError { .. } => {
                "No LDAP member has a Slack account; check ldap.groupCNs before writing"
            }
            SyncError::UserNotFoundError { .. } => "Slack data is inconsistent; rerun later",
            SyncError::TimeoutError { .. } => "Raise default.timeoutSeconds or check connectivity",
            SyncError::ConfigError { .. }
            | SyncError::MissingConfigError { .. }
            | SyncError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and run again"
            }
            SyncError::IoError(_) => "Check that the file exists and is readable",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
