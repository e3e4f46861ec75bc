// Domain layer: run-scoped models and the two client ports. No I/O here.

pub mod model;
pub mod ports;

pub use model::{
    DiffEntry, DirectoryMember, MatchResult, PlatformGroup, PlatformUser, WriteOutcome, WritePlan,
};
pub use ports::{DirectoryClient, PlatformClient};
