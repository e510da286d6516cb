//! Broker connection provider

use crate::config::BrokerSettings;
use crate::{BridgeError, BridgeResult};
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{info, warn};

/// An open AMQP connection
///
/// Owned by the runtime and closed explicitly on shutdown. Construction fails
/// instead of retrying: without a broker there is nothing to relay.
pub struct BrokerConnection {
    connection: Connection,
    host: String,
}

impl BrokerConnection {
    /// Connect using the configured credentials
    ///
    /// # Errors
    ///
    /// `Configuration` if credentials are missing, `Connectivity` if the broker
    /// is unreachable, refuses the credentials, or does not answer within
    /// `connect_timeout_ms`.
    pub async fn connect(settings: &BrokerSettings) -> BridgeResult<Self> {
        let uri = amqp_uri(settings)?;

        info!(host = %settings.host, vhost = %settings.vhost, "Connecting to broker");

        let connect = Connection::connect(&uri, ConnectionProperties::default());
        let connection =
            tokio::time::timeout(Duration::from_millis(settings.connect_timeout_ms), connect)
                .await
                .map_err(|_| {
                    BridgeError::connectivity(format!(
                        "Timed out connecting to broker at {} after {}ms",
                        settings.host, settings.connect_timeout_ms
                    ))
                })?
                .map_err(|e| {
                    BridgeError::connectivity_with_source(
                        format!("Failed to connect to broker at {}", settings.host),
                        e,
                    )
                })?;

        info!(host = %settings.host, "Connected to broker");

        Ok(Self {
            connection,
            host: settings.host.clone(),
        })
    }

    /// Open a channel on this connection
    pub async fn open_channel(&self) -> BridgeResult<Channel> {
        self.connection.create_channel().await.map_err(|e| {
            BridgeError::connectivity_with_source(
                format!("Failed to open channel on {}", self.host),
                e,
            )
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Close the connection; subscriptions on it stop delivering
    pub async fn close(&self) -> BridgeResult<()> {
        if !self.is_connected() {
            warn!(host = %self.host, "Broker connection already closed");
            return Ok(());
        }

        self.connection
            .close(200, "bridge shutting down")
            .await
            .map_err(|e| BridgeError::connectivity_with_source("Failed to close broker connection", e))?;

        info!(host = %self.host, "Broker connection closed");
        Ok(())
    }
}

/// Build the `amqp://` URI for the configured broker
///
/// Credentials and vhost are percent-encoded, so passwords containing `@` or
/// `/` survive. The default vhost `/` becomes `%2f`.
pub(crate) fn amqp_uri(settings: &BrokerSettings) -> BridgeResult<String> {
    if settings.user.is_empty() || settings.password.is_empty() {
        return Err(BridgeError::config("broker credentials are missing"));
    }

    let mut uri = reqwest::Url::parse(&format!("amqp://{}", settings.host)).map_err(|e| {
        BridgeError::config(format!("Invalid broker host '{}': {}", settings.host, e))
    })?;

    uri.set_username(&settings.user)
        .map_err(|_| BridgeError::config("broker user cannot be set on the URI"))?;
    uri.set_password(Some(&settings.password))
        .map_err(|_| BridgeError::config("broker password cannot be set on the URI"))?;

    let vhost = settings.vhost.replace('%', "%25").replace('/', "%2f");
    uri.set_path(&format!("/{}", vhost));

    Ok(uri.to_string())
}
