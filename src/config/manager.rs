//! Configuration Manager

use super::{default_shell, Config, Protocol, RelayMode};
use crate::Result;
use anyhow::{bail, Context};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

/// Values given on the command line; `None`/`false` leaves the loaded value alone
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub protocol: Option<Protocol>,
    pub listen: Option<String>,
    pub connect: Option<String>,
    pub exec: Option<String>,
    pub shell: bool,
    pub log_level: Option<String>,
}

impl ConfigManager {
    /// Load configuration: defaults, then `NETPIPE_*` variables, then the file
    pub fn load(path: Option<&Path>) -> Result<Config> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`ConfigManager::load`], reading variables through `lookup`
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        config.apply_env(lookup)?;

        let Some(path) = path else {
            return Ok(config);
        };

        tracing::debug!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let overlay: toml::Table = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // A mode chosen by the file replaces the one chosen by the environment
        if let Some(toml::Value::Table(relay)) = overlay.get("relay") {
            let listen = relay.contains_key("listen");
            let connect = relay.contains_key("connect");
            if listen && !connect {
                config.relay.connect = None;
            }
            if connect && !listen {
                config.relay.listen = None;
            }
        }

        let mut merged =
            toml::Table::try_from(&config).context("Failed to serialize configuration")?;
        merge_tables(&mut merged, overlay);

        toml::Value::Table(merged)
            .try_into()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Recursively overwrite `base` with every key present in `overlay`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(nested) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, nested);
                continue;
            }
            base.insert(key, toml::Value::Table(nested));
        } else {
            base.insert(key, value);
        }
    }
}

impl Config {
    /// Override fields from `NETPIPE_*` variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(protocol) = lookup("NETPIPE_PROTOCOL") {
            self.relay.protocol = protocol
                .parse()
                .with_context(|| format!("Invalid NETPIPE_PROTOCOL: {}", protocol))?;
        }

        if let Some(listen) = lookup("NETPIPE_LISTEN") {
            self.relay.listen = Some(listen);
        }

        if let Some(connect) = lookup("NETPIPE_CONNECT") {
            self.relay.connect = Some(connect);
        }

        if let Some(exec) = lookup("NETPIPE_EXEC") {
            self.relay.exec = Some(exec);
        }

        if let Some(shell) = lookup("NETPIPE_SHELL") {
            self.relay.shell = shell
                .parse::<bool>()
                .with_context(|| format!("Invalid NETPIPE_SHELL: {}", shell))?;
        }

        if let Some(timeout) = lookup("NETPIPE_DIAL_TIMEOUT") {
            self.relay.dial_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid NETPIPE_DIAL_TIMEOUT: {}", timeout))?;
        }

        if let Some(level) = lookup("NETPIPE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, cli: &CliOverrides) {
        if let Some(protocol) = cli.protocol {
            self.relay.protocol = protocol;
            tracing::debug!("CLI override: protocol set to {}", protocol);
        }

        if let Some(listen) = &cli.listen {
            self.relay.listen = Some(listen.clone());
            self.relay.connect = None;
        }

        if let Some(connect) = &cli.connect {
            self.relay.connect = Some(connect.clone());
            if cli.listen.is_none() {
                self.relay.listen = None;
            }
        }

        if let Some(exec) = &cli.exec {
            self.relay.exec = Some(exec.clone());
        }

        if cli.shell {
            self.relay.shell = true;
        }

        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.mode().context("Relay configuration validation failed")?;

        if self.relay.protocol == Protocol::Udp && self.relay.listen.is_some() {
            bail!("udp can only be used to connect; a udp listener cannot accept peers");
        }

        if self.relay.dial_timeout == Duration::ZERO {
            bail!("relay.dial_timeout must be greater than 0");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Listen or connect, whichever is configured
    pub fn mode(&self) -> Result<RelayMode> {
        let listen = self.relay.listen.as_deref().filter(|s| !s.is_empty());
        let connect = self.relay.connect.as_deref().filter(|s| !s.is_empty());

        match (listen, connect) {
            (Some(addr), None) => Ok(RelayMode::Listen(normalize_listen_addr(addr))),
            (None, Some(addr)) => Ok(RelayMode::Connect(addr.to_string())),
            (None, None) => bail!("either a listen address (-l) or a connect address (-c) is required"),
            (Some(_), Some(_)) => bail!("listen (-l) and connect (-c) are mutually exclusive"),
        }
    }

    /// The exec string handed to the launcher; empty means local stdio.
    ///
    /// Shell mode replaces any configured exec string with the platform shell.
    pub fn effective_exec(&self) -> String {
        if self.relay.shell {
            default_shell().to_string()
        } else {
            self.relay.exec.clone().unwrap_or_default()
        }
    }
}

/// A bare `:port` binds every interface
pub fn normalize_listen_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}
