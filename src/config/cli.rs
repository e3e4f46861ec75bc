use crate::config::{Config, RunMode};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "slack-ldap-sync")]
#[command(about = "Sync a Slack user group with the members of LDAP groups")]
pub struct CliArgs {
    /// Path to the YAML (or TOML) configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Override default.mode from the config
    #[arg(long, value_enum)]
    pub mode: Option<RunMode>,

    /// Override slack.targetGroup from the config
    #[arg(long)]
    pub target_group: Option<String>,

    /// Write the membership to Slack (default is a dry run)
    #[arg(long, conflicts_with = "dry_run")]
    pub write: bool,

    /// Force a dry run even if the config enables writing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CliArgs {
    /// Applies command line overrides. The result is not modified afterwards.
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(mode) = self.mode {
            config.default.mode = mode;
        }
        if let Some(target) = &self.target_group {
            config.slack.target_group = Some(target.clone());
        }
        if self.write {
            config.default.write = true;
        }
        if self.dry_run {
            config.default.write = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::from_yaml_str(
            r#"
slack:
  securityToken: xoxp-test
  targetGroup: Ops
default:
  write: true
"#,
        )
        .unwrap()
    }

    #[test]
    fn dry_run_wins_over_config_write() {
        let args = CliArgs::parse_from(["slack-ldap-sync", "--dry-run"]);
        let config = args.apply_to(base_config());
        assert!(!config.default.write);
    }

    #[test]
    fn overrides_mode_and_target() {
        let args = CliArgs::parse_from([
            "slack-ldap-sync",
            "--mode",
            "diff",
            "--target-group",
            "Dev",
        ]);
        let config = args.apply_to(base_config());
        assert_eq!(config.default.mode, RunMode::Diff);
        assert_eq!(config.slack.target_group.as_deref(), Some("Dev"));
        assert!(config.default.write);
    }

    #[test]
    fn write_and_dry_run_conflict() {
        let parsed = CliArgs::try_parse_from(["slack-ldap-sync", "--write", "--dry-run"]);
        assert!(parsed.is_err());
    }
}
