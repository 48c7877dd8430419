//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration. File: ~/.config/rangelink/config.toml or
/// /etc/rangelink/config.toml.
/// Env overrides: RANGELINK_DISCOVERY_PORT, RANGELINK_TRANSPORT_PORT,
/// RANGELINK_MODEL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Discovery UDP port (default 47201).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Transport TCP port (default 47202).
    #[serde(default = "default_transport_port")]
    pub transport_port: u16,
    /// Device model string used in the generated display name.
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_discovery_port() -> u16 {
    47201
}
fn default_transport_port() -> u16 {
    47202
}
fn default_model() -> String {
    "linux".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            transport_port: default_transport_port(),
            model: default_model(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_else(Config::default);
    if let Ok(s) = std::env::var("RANGELINK_DISCOVERY_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.discovery_port = p;
        }
    }
    if let Ok(s) = std::env::var("RANGELINK_TRANSPORT_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.transport_port = p;
        }
    }
    if let Ok(s) = std::env::var("RANGELINK_MODEL") {
        if !s.is_empty() {
            c.model = s;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/rangelink/config.toml"));
    }
    out.push(PathBuf::from("/etc/rangelink/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.discovery_port, 47201);
        assert_eq!(c.transport_port, 47202);
        assert_eq!(c.model, "linux");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let c: Config = toml::from_str("model = \"rpi4\"").unwrap();
        assert_eq!(c.model, "rpi4");
        assert_eq!(c.discovery_port, 47201);
    }
}
