use async_trait::async_trait;
use httpmock::prelude::*;
use slack_ldap_sync::domain::{DirectoryClient, DirectoryMember, WriteOutcome};
use slack_ldap_sync::{Config, RunReport, SlackClient, SyncEngine, SyncError};

struct FixedDirectory(Vec<DirectoryMember>);

#[async_trait]
impl DirectoryClient for FixedDirectory {
    async fn fetch_members(
        &self,
        _group_dns: &[String],
    ) -> slack_ldap_sync::Result<Vec<DirectoryMember>> {
        Ok(self.0.clone())
    }
}

struct FailingDirectory;

#[async_trait]
impl DirectoryClient for FailingDirectory {
    async fn fetch_members(
        &self,
        _group_dns: &[String],
    ) -> slack_ldap_sync::Result<Vec<DirectoryMember>> {
        Err(SyncError::AuthError {
            bind_dn: "CN=reader,DC=corp".to_string(),
            message: "invalid credentials".to_string(),
        })
    }
}

fn member(cn: &str) -> DirectoryMember {
    DirectoryMember {
        distinguished_name: format!("CN={},OU=Identities,DC=corp,DC=example,DC=com", cn),
        common_name: cn.to_string(),
        display_name: cn.to_string(),
    }
}

fn config(server: &MockServer, target: &str, write: bool) -> Config {
    let yaml = format!(
        r#"
slack:
  securityToken: xoxp-test
  targetGroup: {target}
  apiUrl: {url}
ldap:
  host: ldap.corp.example.com
  bindUser: CN=reader,OU=Identities,DC=corp,DC=example,DC=com
  bindPwd: secret
  groupCNs:
    - CN=Ops,OU=Groups,DC=corp,DC=example,DC=com
  baseCN: DC=corp,DC=example,DC=com
default:
  mode: sync
  write: {write}
"#,
        target = target,
        url = server.base_url(),
        write = write
    );
    Config::from_yaml_str(&yaml).unwrap()
}

fn mock_slack_reads(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/users.list");
        then.status(200).json_body(serde_json::json!({
            "ok": true,
            "members": [
                {"id": "U1", "name": "jdoe", "real_name": "D000001", "deleted": false,
                 "profile": {"display_name": "John Doe"}},
                {"id": "U2", "name": "asmith", "real_name": "D000002", "deleted": false,
                 "profile": {"display_name": "Anna Smith"}},
                {"id": "U3", "name": "gone", "real_name": "D000003", "deleted": true,
                 "profile": {"display_name": "Gone"}}
            ],
            "response_metadata": {"next_cursor": ""}
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/usergroups.list")
            .query_param("include_users", "true");
        then.status(200).json_body(serde_json::json!({
            "ok": true,
            "usergroups": [
                {"id": "G1", "name": "Ops", "description": "Operations",
                 "users": ["U9"], "user_count": 1, "date_delete": 0},
                {"id": "G2", "name": "Dev", "description": "Developers",
                 "users": [], "user_count": 0, "date_delete": 0}
            ]
        }));
    });
}

#[tokio::test]
async fn test_dry_run_does_not_call_update() {
    let server = MockServer::start();
    mock_slack_reads(&server);
    let update = server.mock(|when, then| {
        when.method(POST).path("/usergroups.users.update");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });

    let config = config(&server, "Ops", false);
    let platform = SlackClient::new("xoxp-test", &config.slack.api_url).unwrap();
    let engine = SyncEngine::new(platform, config.run_settings()).with_directory(FixedDirectory(vec![
        member("JDoe"),
        member("asmith"),
        member("gone"),
    ]));

    let report = engine.run().await.unwrap();

    update.assert_hits(0);
    let RunReport::Sync(report) = report else {
        panic!("expected a sync report");
    };
    assert_eq!(
        report.outcome,
        WriteOutcome::DryRun {
            user_ids: vec!["U1".to_string(), "U2".to_string()]
        }
    );
    assert_eq!(report.plan.removals, vec!["U9".to_string()]);
}

#[tokio::test]
async fn test_write_replaces_target_membership() {
    let server = MockServer::start();
    mock_slack_reads(&server);
    let update = server.mock(|when, then| {
        when.method(POST)
            .path("/usergroups.users.update")
            .json_body(serde_json::json!({"usergroup": "G1", "users": "U1,U2"}));
        then.status(200)
            .json_body(serde_json::json!({"ok": true, "usergroup": {"id": "G1"}}));
    });

    let config = config(&server, "Ops", true);
    let platform = SlackClient::new("xoxp-test", &config.slack.api_url).unwrap();
    let engine = SyncEngine::new(platform, config.run_settings())
        .with_directory(FixedDirectory(vec![member("jdoe"), member("asmith"), member("jdoe")]));

    let report = tokio_test::assert_ok!(engine.run().await);

    update.assert();
    assert!(matches!(report, RunReport::Sync(ref r) if r.outcome.was_written()));
}

#[tokio::test]
async fn test_unknown_target_group_aborts_without_writing() {
    let server = MockServer::start();
    mock_slack_reads(&server);
    let update = server.mock(|when, then| {
        when.method(POST).path("/usergroups.users.update");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });

    let config = config(&server, "QA", true);
    let platform = SlackClient::new("xoxp-test", &config.slack.api_url).unwrap();
    let engine = SyncEngine::new(platform, config.run_settings())
        .with_directory(FixedDirectory(vec![member("jdoe")]));

    let err = engine.run().await.unwrap_err();

    update.assert_hits(0);
    assert!(matches!(err, SyncError::GroupNotFoundError { ref name } if name == "QA"));
    assert_eq!(err.exit_code(), 5);
}

#[tokio::test]
async fn test_failed_slack_write_is_fatal() {
    let server = MockServer::start();
    mock_slack_reads(&server);
    server.mock(|when, then| {
        when.method(POST).path("/usergroups.users.update");
        then.status(200)
            .json_body(serde_json::json!({"ok": false, "error": "permission_denied"}));
    });

    let config = config(&server, "Ops", true);
    let platform = SlackClient::new("xoxp-test", &config.slack.api_url).unwrap();
    let engine = SyncEngine::new(platform, config.run_settings())
        .with_directory(FixedDirectory(vec![member("jdoe")]));

    let err = engine.run().await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::PlatformApiError { ref method, ref message }
            if method == "usergroups.users.update" && message == "permission_denied"
    ));
}

#[tokio::test]
async fn test_directory_failure_stops_before_slack() {
    let server = MockServer::start();
    let users = server.mock(|when, then| {
        when.method(GET).path("/users.list");
        then.status(200).json_body(serde_json::json!({"ok": true, "members": []}));
    });

    let config = config(&server, "Ops", true);
    let platform = SlackClient::new("xoxp-test", &config.slack.api_url).unwrap();
    let engine = SyncEngine::new(platform, config.run_settings()).with_directory(FailingDirectory);

    let err = engine.run().await.unwrap_err();

    users.assert_hits(0);
    assert!(matches!(err, SyncError::AuthError { .. }));
    assert_eq!(err.exit_code(), 3);
}
