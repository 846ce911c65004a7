use crate::{counter::CounterUpdate, error::Error, gateway::fanout::FanoutClient};

use log::*;
use service::config::Config;

/// Publish a counter update to the fan-out provider's channel for `channel_id`.
///
/// Delivery is best-effort: callers log failures and still answer their own
/// request successfully, since the authoritative value is always recomputable
/// independent of delivery.
pub async fn publish_update(
    config: &Config,
    channel_id: &str,
    update: &CounterUpdate,
) -> Result<(), Error> {
    debug!(
        "Initiating fan-out publish for channel {channel_id} with value {}",
        update.value
    );

    let fanout_client = FanoutClient::new(config).await?;
    fanout_client.publish(channel_id, update).await
}
