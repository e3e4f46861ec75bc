// Adapters layer: concrete clients for the directory and the messaging platform.

pub mod ldap;
pub mod slack;

pub use ldap::LdapDirectoryClient;
pub use slack::SlackClient;
