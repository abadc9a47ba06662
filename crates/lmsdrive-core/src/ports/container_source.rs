//! Container source port
//!
//! Root containers come from a module-listing service outside this system.
//! The daemon supplies them from configuration.

use crate::domain::Container;

/// Supplies the root containers whose document trees should be mirrored
#[async_trait::async_trait]
pub trait IContainerSource: Send + Sync {
    async fn list_containers(&self) -> anyhow::Result<Vec<Container>>;
}
