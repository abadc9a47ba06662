//! Daemon-side implementations of the container and notification ports

use async_trait::async_trait;
use tracing::{info, warn};

use lmsdrive_core::domain::Container;
use lmsdrive_core::ports::{
    IContainerSource, INotificationService, Notification, NotificationPriority,
};

/// Serves the containers listed in the `containers` config section
pub struct StaticContainerSource {
    containers: Vec<Container>,
}

impl StaticContainerSource {
    pub fn new(containers: Vec<Container>) -> Self {
        Self { containers }
    }
}

#[async_trait]
impl IContainerSource for StaticContainerSource {
    async fn list_containers(&self) -> anyhow::Result<Vec<Container>> {
        Ok(self.containers.clone())
    }
}

/// Writes notifications to the log
pub struct LogNotifier;

#[async_trait]
impl INotificationService for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match notification.priority {
            NotificationPriority::High => warn!(
                category = %notification.category,
                title = %notification.title,
                "{}",
                notification.body
            ),
            _ => info!(
                category = %notification.category,
                title = %notification.title,
                "{}",
                notification.body
            ),
        }
        Ok(())
    }
}
