//! Host information the swarm consumes: usable local addresses, uptime,
//! platform string.

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;

/// Enumerate non-loopback, non-link-local addresses via `ip -o addr`.
pub async fn discover_addresses() -> Result<Vec<IpAddr>> {
    let output = Command::new("ip")
        .args(["-o", "addr"])
        .output()
        .await
        .context("Failed to run `ip -o addr`")?;
    if !output.status.success() {
        bail!("`ip -o addr` exited with {}", output.status);
    }
    Ok(parse_ip_addr_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract usable addresses from `ip -o addr` output, de-duplicated in
/// first-seen order.
pub fn parse_ip_addr_output(output: &str) -> Vec<IpAddr> {
    let mut addrs: Vec<IpAddr> = Vec::new();
    for line in output.lines() {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word != "inet" && word != "inet6" {
                continue;
            }
            let Some(cidr) = words.next() else { break };
            let host = cidr.split('/').next().unwrap_or(cidr);
            match host.parse::<IpAddr>() {
                Ok(addr) if is_usable(&addr) && !addrs.contains(&addr) => addrs.push(addr),
                _ => {}
            }
            break;
        }
    }
    addrs
}

/// Whether a client can usefully bind to `addr` to reach a remote server.
pub fn is_usable(addr: &IpAddr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() || addr.is_multicast() {
        return false;
    }
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => !v6.is_unicast_link_local(),
    }
}

/// System uptime, e.g. `Uptime: 1d 2h 3m`, or `Uptime: N/A`.
pub fn system_uptime() -> String {
    match std::fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|s| s.split_whitespace().next()?.parse::<f64>().ok())
    {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            format_uptime(Duration::from_secs(secs as u64))
        }
        _ => "Uptime: N/A".to_string(),
    }
}

/// Days and hours are omitted when zero; minutes are always shown.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;

    let mut out = String::from("Uptime:");
    if days > 0 {
        out.push_str(&format!(" {days}d"));
    }
    if hours > 0 {
        out.push_str(&format!(" {hours}h"));
    }
    out.push_str(&format!(" {minutes}m"));
    out
}

/// `{os} {arch}`, e.g. `linux x86_64`.
pub fn platform() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}
