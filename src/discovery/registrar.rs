//! Publishes discovery descriptors for every enabled sensor category

use super::descriptors::{catalogue, DeviceDescriptor, SensorDescriptor, STATUS_OBJECT_ID};
use crate::config::EnabledSensors;
use crate::protocol::{sanitize_identifier, SensorCategory, TopicBuilder};
use crate::transport::{MqttError, QoS, Transport};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a registration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub published: usize,
    pub failed: usize,
    pub skipped_status: bool,
}

/// Announces sensor entities for one device
pub struct DiscoveryRegistrar<T: Transport> {
    transport: Arc<T>,
    device_id: String,
    device: DeviceDescriptor,
}

impl<T: Transport> DiscoveryRegistrar<T> {
    /// `hostname` is the raw device hostname from settings
    pub fn new(transport: Arc<T>, hostname: &str) -> Self {
        let device_id = sanitize_identifier(hostname.trim());
        let device = DeviceDescriptor::new(hostname, &device_id);
        Self {
            transport,
            device_id,
            device,
        }
    }

    /// Every descriptor a full pass would publish, with its config topic
    pub fn descriptors(&self, enabled: &EnabledSensors) -> Vec<(String, SensorDescriptor)> {
        let status_topic = self.transport.status_topic();
        let mut descriptors = Vec::new();

        if let Some(status_topic) = status_topic.as_deref() {
            descriptors.push((
                TopicBuilder::build_discovery_topic(
                    "binary_sensor",
                    &self.device_id,
                    STATUS_OBJECT_ID,
                ),
                SensorDescriptor::status(&self.device, &self.device_id, status_topic),
            ));
        }

        for category in SensorCategory::ALL {
            if !enabled.is_enabled(category) {
                continue;
            }
            for template in catalogue(category) {
                descriptors.push((
                    TopicBuilder::build_discovery_topic(
                        template.component.as_str(),
                        &self.device_id,
                        template.object_id,
                    ),
                    SensorDescriptor::from_template(
                        template,
                        category,
                        &self.device,
                        &self.device_id,
                        status_topic.as_deref(),
                    ),
                ));
            }
        }

        descriptors
    }

    /// Publish the status sensor and then each enabled category, in order.
    ///
    /// Individual publish failures are logged and counted; the pass carries
    /// on with the remaining descriptors.
    pub async fn register_all(&self, enabled: &EnabledSensors) -> RegistrationSummary {
        let mut summary = RegistrationSummary::default();

        if self.transport.status_topic().is_none() {
            warn!("Status topic not configured, skipping status sensor registration");
            summary.skipped_status = true;
        }

        for (topic, descriptor) in self.descriptors(enabled) {
            match self.publish_descriptor(&topic, &descriptor).await {
                Ok(()) => summary.published += 1,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to publish discovery config");
                    summary.failed += 1;
                }
            }
        }

        info!(
            device_id = %self.device_id,
            published = summary.published,
            failed = summary.failed,
            "Discovery registration complete"
        );
        summary
    }

    async fn publish_descriptor<D: Serialize + Sync>(
        &self,
        topic: &str,
        descriptor: &D,
    ) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(descriptor).map_err(MqttError::SerializationError)?;
        self.transport
            .publish(topic, payload, true, QoS::AtMostOnce)
            .await?;
        debug!(topic = %topic, "Published discovery config");
        Ok(())
    }
}
