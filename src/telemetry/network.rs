//! IPv4 addresses from `ip -j addr`

use super::TelemetryError;
use crate::protocol::NetworkInfo;
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;

/// Upper bound on the `ip` invocation
pub const IP_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct Interface {
    #[serde(default)]
    ifname: String,
    #[serde(default)]
    addr_info: Vec<Address>,
}

#[derive(Debug, Deserialize)]
struct Address {
    #[serde(default)]
    family: String,
    local: Option<String>,
}

/// Run `ip -j addr` and classify the addresses it reports
pub async fn collect_network() -> Result<NetworkInfo, TelemetryError> {
    let output = tokio::time::timeout(
        IP_COMMAND_TIMEOUT,
        Command::new("ip").args(["-j", "addr"]).output(),
    )
    .await
    .map_err(|_| TelemetryError::CommandFailed("ip -j addr timed out".to_string()))??;

    if !output.status.success() {
        return Err(TelemetryError::CommandFailed(format!(
            "ip -j addr exited with {}",
            output.status
        )));
    }

    parse_ip_addr_json(&String::from_utf8_lossy(&output.stdout))
}

/// Classify addresses: `wl*` is Wi-Fi, `en*`/`eth*` is Ethernet, and the
/// first non-loopback IPv4 address of any interface is the primary one.
pub fn parse_ip_addr_json(json: &str) -> Result<NetworkInfo, TelemetryError> {
    let interfaces: Vec<Interface> = serde_json::from_str(json)?;
    let mut info = NetworkInfo::default();

    for interface in &interfaces {
        for address in &interface.addr_info {
            if address.family != "inet" {
                continue;
            }
            let Some(ip) = address.local.as_deref() else {
                continue;
            };
            if ip.is_empty() || ip.starts_with("127.") {
                continue;
            }

            if interface.ifname.starts_with("wl") {
                info.ip_wifi = Some(ip.to_string());
            } else if interface.ifname.starts_with("en") || interface.ifname.starts_with("eth") {
                info.ip_ethernet = Some(ip.to_string());
            }

            if info.ip_primary.is_none() {
                info.ip_primary = Some(ip.to_string());
            }
        }
    }

    Ok(info)
}
