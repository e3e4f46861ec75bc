pub mod engine;
pub mod reconciler;

pub use crate::domain::ports::{DirectoryClient, PlatformClient};
pub use crate::utils::error::Result;
