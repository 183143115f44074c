//! Outbound alert publishing.

use std::sync::Arc;

use async_trait::async_trait;

use tripwire_core::MisconductAlert;

use crate::error::QueueError;

/// Accepts a finished alert for delivery to downstream consumers.
///
/// Called synchronously by the dispatcher under the pass deadline; the
/// caller does not retry on failure.
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish_alert(&self, alert: &MisconductAlert) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: AlertPublisher + ?Sized> AlertPublisher for Arc<T> {
    async fn publish_alert(&self, alert: &MisconductAlert) -> Result<(), QueueError> {
        (**self).publish_alert(alert).await
    }
}
