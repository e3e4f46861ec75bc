use crate::config::LdapConfig;
use crate::domain::{DirectoryClient, DirectoryMember};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use ldap3::{ldap_escape, Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, Identity, TlsConnector};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const MEMBER_ATTRIBUTES: [&str; 5] = ["distinguishedName", "cn", "displayName", "sn", "givenName"];

/// LDAP result code for invalid credentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Reads group members from an LDAP directory over TLS.
///
/// Every call to [`DirectoryClient::fetch_members`] opens its own connection
/// and unbinds it before returning.
pub struct LdapDirectoryClient {
    config: LdapConfig,
    timeout: Duration,
}

impl LdapDirectoryClient {
    pub fn new(config: LdapConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn member_filter(&self, group_dn: &str) -> String {
        format!(
            "(&(objectClass={})(memberOf={}))",
            ldap_escape(self.config.object_class.as_str()),
            ldap_escape(group_dn)
        )
    }

    /// A custom connector is only needed for extra CA roots or a client identity.
    fn tls_connector(&self) -> Result<Option<TlsConnector>> {
        if self.config.certificates.is_empty() && self.config.client_cert.is_none() {
            return Ok(None);
        }

        let tls_error = |message: String| SyncError::ConnectionError {
            url: self.config.url(),
            message,
        };

        let mut builder = TlsConnector::builder();
        builder.danger_accept_invalid_certs(self.config.insecure_skip_verify);

        for path in &self.config.certificates {
            let pem = std::fs::read(path)
                .map_err(|e| tls_error(format!("cannot read certificate {}: {}", path, e)))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| tls_error(format!("invalid certificate {}: {}", path, e)))?;
            builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&self.config.client_cert, &self.config.client_key)
        {
            let cert = std::fs::read(cert_path)
                .map_err(|e| tls_error(format!("cannot read client certificate: {}", e)))?;
            let key = std::fs::read(key_path)
                .map_err(|e| tls_error(format!("cannot read client key: {}", e)))?;
            let identity = Identity::from_pkcs8(&cert, &key)
                .map_err(|e| tls_error(format!("invalid client identity: {}", e)))?;
            builder.identity(identity);
        }

        builder
            .build()
            .map(Some)
            .map_err(|e| tls_error(format!("TLS setup failed: {}", e)))
    }

    async fn connect(&self) -> Result<Ldap> {
        let url = self.config.url();
        info!(bind_dn = %self.config.bind_user, url = %url, "Connecting to LDAP");

        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.config.start_tls)
            .set_no_tls_verify(self.config.insecure_skip_verify);
        if let Some(connector) = self.tls_connector()? {
            settings = settings.set_connector(connector);
        }

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| SyncError::ConnectionError {
                url: url.clone(),
                message: e.to_string(),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        Ok(ldap)
    }

    #[instrument(skip(self, session))]
    async fn search_group<S: DirectorySession>(
        &self,
        session: &mut S,
        group_dn: &str,
    ) -> Result<Vec<DirectoryMember>> {
        let filter = self.member_filter(group_dn);
        debug!(filter = %filter, base_dn = %self.config.base_cn, "Searching LDAP");

        let entries = self
            .bounded(
                "ldap search",
                session.search_members(&self.config.base_cn, &filter, group_dn),
            )
            .await?;

        let members: Vec<DirectoryMember> = entries.into_iter().filter_map(entry_to_member).collect();

        if members.is_empty() {
            warn!("Warning: no members in given LDAP group {}", group_dn);
        } else {
            info!(count = members.len(), "LDAP group members found");
        }
        Ok(members)
    }

    /// Binds, then concatenates the members of every group in order.
    async fn collect_members<S: DirectorySession>(
        &self,
        session: &mut S,
        group_dns: &[String],
    ) -> Result<Vec<DirectoryMember>> {
        let bind_dn = &self.config.bind_user;
        debug!(bind_dn = %bind_dn, "Performing LDAP bind");
        self.bounded("ldap bind", session.bind(bind_dn, &self.config.bind_pwd))
            .await?;

        let mut members = Vec::new();
        for group_dn in group_dns {
            members.extend(self.search_group(session, group_dn).await?);
        }
        Ok(members)
    }

    /// Unbinds whether or not the searches succeeded.
    async fn run_session<S: DirectorySession>(
        &self,
        session: &mut S,
        group_dns: &[String],
    ) -> Result<Vec<DirectoryMember>> {
        let result = self.collect_members(session, group_dns).await;
        if tokio::time::timeout(self.timeout, session.unbind()).await.is_err() {
            warn!("LDAP unbind timed out");
        }
        result
    }

    async fn bounded<T, F>(&self, stage: &str, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::TimeoutError {
                stage: stage.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// The LDAP operations a member lookup needs from an open connection.
#[async_trait]
trait DirectorySession: Send {
    async fn bind(&mut self, bind_dn: &str, password: &str) -> Result<()>;

    async fn search_members(
        &mut self,
        base_dn: &str,
        filter: &str,
        group_dn: &str,
    ) -> Result<Vec<SearchEntry>>;

    async fn unbind(&mut self);
}

#[async_trait]
impl DirectorySession for Ldap {
    async fn bind(&mut self, bind_dn: &str, password: &str) -> Result<()> {
        let auth_error = |message: String| SyncError::AuthError {
            bind_dn: bind_dn.to_string(),
            message,
        };

        let result = self
            .simple_bind(bind_dn, password)
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        match result.rc {
            0 => Ok(()),
            RC_INVALID_CREDENTIALS => Err(auth_error("invalid credentials".to_string())),
            rc => Err(auth_error(format!("code {}: {}", rc, result.text))),
        }
    }

    async fn search_members(
        &mut self,
        base_dn: &str,
        filter: &str,
        group_dn: &str,
    ) -> Result<Vec<SearchEntry>> {
        let search_error = |message: String| SyncError::SearchError {
            group: group_dn.to_string(),
            message,
        };

        let (entries, _) = self
            .search(base_dn, Scope::Subtree, filter, MEMBER_ATTRIBUTES.to_vec())
            .await
            .map_err(|e| search_error(e.to_string()))?
            .success()
            .map_err(|e| search_error(e.to_string()))?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    async fn unbind(&mut self) {
        if let Err(e) = Ldap::unbind(self).await {
            warn!(error = %e, "Error during LDAP unbind");
        }
    }
}

/// Case-insensitive lookup of the first value of `name`.
fn first_attr<'a>(entry: &'a SearchEntry, name: &str) -> Option<&'a str> {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

fn entry_to_member(entry: SearchEntry) -> Option<DirectoryMember> {
    let Some(common_name) = first_attr(&entry, "cn").map(str::to_string) else {
        warn!(dn = %entry.dn, "LDAP entry has no cn, skipping");
        return None;
    };

    let distinguished_name = if entry.dn.is_empty() {
        first_attr(&entry, "distinguishedName")
            .unwrap_or_default()
            .to_string()
    } else {
        entry.dn.clone()
    };
    let display_name = first_attr(&entry, "displayName")
        .unwrap_or_default()
        .to_string();

    Some(DirectoryMember {
        distinguished_name,
        common_name,
        display_name,
    })
}

#[async_trait]
impl DirectoryClient for LdapDirectoryClient {
    /// If the caller drops this future mid-run, dropping the `Ldap` handle
    /// stops the connection driver and closes the socket without an unbind.
    async fn fetch_members(&self, group_dns: &[String]) -> Result<Vec<DirectoryMember>> {
        let mut ldap = self.connect().await?;
        self.run_session(&mut ldap, group_dns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> LdapConfig {
        serde_yaml::from_str(
            r#"
host: 127.0.0.1
port: 1
bindUser: CN=reader,OU=Identities,DC=corp,DC=example,DC=com
bindPwd: secret
groupCNs: ["CN=Ops,OU=Groups,DC=corp,DC=example,DC=com"]
baseCN: DC=corp,DC=example,DC=com
"#,
        )
        .unwrap()
    }

    fn entry(dn: &str, attrs: &[(&str, &str)]) -> SearchEntry {
        SearchEntry {
            dn: dn.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
                .collect::<HashMap<_, _>>(),
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_member_filter_escapes_group_dn() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(1));

        assert_eq!(
            client.member_filter("CN=Ops,OU=Groups,DC=corp"),
            "(&(objectClass=organizationalPerson)(memberOf=CN=Ops,OU=Groups,DC=corp))"
        );
        assert_eq!(
            client.member_filter("CN=Ops (EU)*,DC=corp"),
            r"(&(objectClass=organizationalPerson)(memberOf=CN=Ops \28EU\29\2a,DC=corp))"
        );
    }

    #[test]
    fn test_entry_to_member_reads_attributes_ignoring_case() {
        let member = entry_to_member(entry(
            "CN=jdoe,OU=Identities,DC=corp",
            &[("CN", "jdoe"), ("displayname", "John Doe")],
        ))
        .unwrap();

        assert_eq!(member.distinguished_name, "CN=jdoe,OU=Identities,DC=corp");
        assert_eq!(member.common_name, "jdoe");
        assert_eq!(member.display_name, "John Doe");
    }

    #[test]
    fn test_entry_without_cn_is_skipped() {
        assert!(entry_to_member(entry("CN=x,DC=corp", &[("displayName", "X")])).is_none());
    }

    #[test]
    fn test_entry_without_display_name_keeps_member() {
        let member = entry_to_member(entry("", &[("cn", "asmith"), ("distinguishedName", "CN=asmith,DC=corp")]))
            .unwrap();
        assert_eq!(member.distinguished_name, "CN=asmith,DC=corp");
        assert_eq!(member.display_name, "");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_connection_error() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(2));

        let err = client
            .fetch_members(&["CN=Ops,OU=Groups,DC=corp".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::ConnectionError { ref url, .. } if url == "ldaps://127.0.0.1:1"));
    }

    #[test]
    fn test_missing_certificate_file_fails_tls_setup() {
        let mut config = config();
        config.certificates = vec!["/nonexistent/ca.pem".to_string()];
        let client = LdapDirectoryClient::new(config, Duration::from_secs(1));

        assert!(matches!(
            client.tls_connector(),
            Err(SyncError::ConnectionError { .. })
        ));
    }

    /// Serves canned search results per group and records what was called.
    #[derive(Default)]
    struct ScriptedSession {
        bind_error: bool,
        results: HashMap<String, Result<Vec<SearchEntry>>>,
        stalled_group: Option<String>,
        searched: Vec<String>,
        unbound: bool,
    }

    impl ScriptedSession {
        fn with_group(mut self, group_dn: &str, cns: &[&str]) -> Self {
            let entries = cns
                .iter()
                .map(|cn| entry(&format!("CN={},OU=Identities,DC=corp", cn), &[("cn", *cn)]))
                .collect();
            self.results.insert(group_dn.to_string(), Ok(entries));
            self
        }

        fn with_failing_group(mut self, group_dn: &str) -> Self {
            self.results.insert(
                group_dn.to_string(),
                Err(SyncError::SearchError {
                    group: group_dn.to_string(),
                    message: "noSuchObject".to_string(),
                }),
            );
            self
        }
    }

    #[async_trait]
    impl DirectorySession for ScriptedSession {
        async fn bind(&mut self, bind_dn: &str, _password: &str) -> Result<()> {
            if self.bind_error {
                return Err(SyncError::AuthError {
                    bind_dn: bind_dn.to_string(),
                    message: "invalid credentials".to_string(),
                });
            }
            Ok(())
        }

        async fn search_members(
            &mut self,
            _base_dn: &str,
            _filter: &str,
            group_dn: &str,
        ) -> Result<Vec<SearchEntry>> {
            self.searched.push(group_dn.to_string());
            if self.stalled_group.as_deref() == Some(group_dn) {
                std::future::pending::<()>().await;
            }
            self.results.remove(group_dn).unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn unbind(&mut self) {
            self.unbound = true;
        }
    }

    fn groups() -> Vec<String> {
        vec![
            "CN=Ops,DC=corp".to_string(),
            "CN=Empty,DC=corp".to_string(),
            "CN=Dev,DC=corp".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_members_from_all_groups_are_concatenated_in_order() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(5));
        let mut session = ScriptedSession::default()
            .with_group("CN=Ops,DC=corp", &["jdoe", "asmith"])
            .with_group("CN=Empty,DC=corp", &[])
            .with_group("CN=Dev,DC=corp", &["asmith", "bwayne"]);

        let members = client.run_session(&mut session, &groups()).await.unwrap();

        let cns: Vec<&str> = members.iter().map(|m| m.common_name.as_str()).collect();
        assert_eq!(cns, vec!["jdoe", "asmith", "asmith", "bwayne"]);
        assert_eq!(session.searched, groups());
        assert!(session.unbound);
    }

    #[tokio::test]
    async fn test_search_failure_stops_the_loop_and_still_unbinds() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(5));
        let mut session = ScriptedSession::default()
            .with_group("CN=Ops,DC=corp", &["jdoe"])
            .with_failing_group("CN=Empty,DC=corp")
            .with_group("CN=Dev,DC=corp", &["bwayne"]);

        let err = client.run_session(&mut session, &groups()).await.unwrap_err();

        assert!(matches!(err, SyncError::SearchError { ref group, .. } if group == "CN=Empty,DC=corp"));
        assert_eq!(session.searched.len(), 2);
        assert!(session.unbound);
    }

    #[tokio::test]
    async fn test_bind_failure_skips_searches_and_still_unbinds() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(5));
        let mut session = ScriptedSession {
            bind_error: true,
            ..Default::default()
        };

        let err = client.run_session(&mut session, &groups()).await.unwrap_err();

        assert!(matches!(err, SyncError::AuthError { .. }));
        assert_eq!(err.exit_code(), 3);
        assert!(session.searched.is_empty());
        assert!(session.unbound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_search_times_out_and_still_unbinds() {
        let client = LdapDirectoryClient::new(config(), Duration::from_secs(5));
        let mut session = ScriptedSession {
            stalled_group: Some("CN=Empty,DC=corp".to_string()),
            ..Default::default()
        }
        .with_group("CN=Ops,DC=corp", &["jdoe"]);

        let err = client.run_session(&mut session, &groups()).await.unwrap_err();

        assert!(matches!(err, SyncError::TimeoutError { ref stage, seconds: 5 } if stage == "ldap search"));
        assert_eq!(err.exit_code(), 3);
        assert!(session.unbound);
    }
}
