use anyhow::Context;
use clap::Parser;
use slack_ldap_sync::domain::WriteOutcome;
use slack_ldap_sync::utils::{logger, validation::Validate};
use slack_ldap_sync::{
    CliArgs, Config, LdapDirectoryClient, RunMode, RunReport, SlackClient, SyncEngine,
};

fn load_config(args: &CliArgs) -> anyhow::Result<Config> {
    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config file '{}'", args.config))?;
    Ok(args.apply_to(config))
}

fn build_engine(config: &Config) -> slack_ldap_sync::Result<SyncEngine<LdapDirectoryClient, SlackClient>> {
    let platform = SlackClient::new(config.slack.security_token.clone(), &config.slack.api_url)?;
    let engine = SyncEngine::new(platform, config.run_settings());

    match config.mode() {
        RunMode::Sync => {
            let directory = LdapDirectoryClient::new(config.ldap()?.clone(), config.timeout());
            Ok(engine.with_directory(directory))
        }
        RunMode::Diff => Ok(engine),
    }
}

/// Diff entries are not repeated here; the engine logs each one as it compares.
fn report_lines(report: &RunReport) -> Vec<String> {
    match report {
        RunReport::Sync(report) => {
            let outcome = match &report.outcome {
                WriteOutcome::Written { user_ids } => format!(
                    "✅ Slack group {} now has {} members",
                    report.plan.group_name,
                    user_ids.len()
                ),
                WriteOutcome::DryRun { user_ids } => format!(
                    "🔍 Dry run: Slack group {} would be set to {}",
                    report.plan.group_name,
                    user_ids.join(",")
                ),
            };
            vec![
                format!(
                    "{} LDAP members | {} Slack users | {} matched",
                    report.directory_members, report.platform_users, report.matched_users
                ),
                outcome,
            ]
        }
        RunReport::Diff(_) => Vec::new(),
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting slack-ldap-sync");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            eprintln!("💡 Make sure the file exists and is valid YAML or TOML");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ Configuration validation failed: {}", e);
        std::process::exit(e.exit_code());
    }

    for line in config.summary() {
        tracing::info!("  {}", line);
    }

    let result = match build_engine(&config) {
        Ok(engine) => engine.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            for line in report_lines(&report) {
                println!("{}", line);
            }
            tracing::info!("✅ Run completed successfully");
        }
        Err(e) => {
            tracing::error!("❌ Run failed at stage {}: {}", e.stage(), e);
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
