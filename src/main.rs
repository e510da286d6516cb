//! Sensor bridge binary
//!
//! Usage:
//!   userRabbit=bridge \
//!   passwordRabbit=secret \
//!   INSTANCE_IP=10.0.0.5 \
//!   SINK_URL=http://10.0.0.6:8082/naranjas/ \
//!   sensor-bridge
//!
//! Variables may also come from a `.env` file in the working directory, and
//! `BRIDGE_CONFIG_FILE` may point to a TOML file with the full configuration.

use sensor_bridge::{BridgeConfig, BridgeResult, BridgeRuntime};

#[tokio::main]
async fn main() -> BridgeResult<()> {
    dotenvy::dotenv().ok();

    let config = BridgeConfig::load()?;

    let runtime = BridgeRuntime::new(config).await?;
    runtime.run().await?;

    Ok(())
}
