//! systemd-networkd style key=value section files.
//!
//! Reads back the subset of persisted interface configuration the daemon
//! cares about (DHCP mode, DNS/NTP servers, LLDP emission) and provides
//! the writer used to emit `.network`/`.netdev` files.

use std::path::{Path, PathBuf};

/// Path of the persisted `.network` file for an interface.
pub fn intf_conf_path(conf_dir: &Path, name: &str) -> PathBuf {
    conf_dir.join(format!("00-bmc-{name}.network"))
}

/// Path of the persisted `.netdev` file for a virtual device.
pub fn intf_dev_path(conf_dir: &Path, name: &str) -> PathBuf {
    conf_dir.join(format!("{name}.netdev"))
}

/// One `[Section]` with its key=value entries, repeats preserved.
#[derive(Debug, Clone, Default)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

/// A parsed configuration file.
///
/// A missing or unreadable file parses as an empty configuration; a new
/// interface simply has no persisted settings yet.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    sections: Vec<Section>,
}

impl NetworkConfig {
    /// Load the configuration for an interface from the config directory.
    pub fn load(conf_dir: &Path, name: &str) -> Self {
        match std::fs::read_to_string(intf_conf_path(conf_dir, name)) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    /// Parse configuration text.
    pub fn parse(text: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if let Some(section) = sections.last_mut() {
                section
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { sections }
    }

    /// All values for a repeated key within a section, in file order.
    pub fn values<'a>(&'a self, section: &str, key: &str) -> Vec<&'a str> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The last value for a key within a section.
    pub fn value<'a>(&'a self, section: &str, key: &str) -> Option<&'a str> {
        self.values(section, key).pop()
    }

    /// Static DNS servers from the `[Network]` section.
    pub fn dns_servers(&self) -> Vec<String> {
        self.values("Network", "DNS")
            .iter()
            .flat_map(|v| v.split_whitespace())
            .map(str::to_owned)
            .collect()
    }

    /// Static NTP servers from the `[Network]` section.
    pub fn ntp_servers(&self) -> Vec<String> {
        self.values("Network", "NTP")
            .iter()
            .flat_map(|v| v.split_whitespace())
            .map(str::to_owned)
            .collect()
    }

    /// DHCP enablement per family from `[Network] DHCP=`.
    pub fn dhcp_enabled(&self) -> (bool, bool) {
        match self.value("Network", "DHCP").unwrap_or("false") {
            "true" | "yes" => (true, true),
            "ipv4" => (true, false),
            "ipv6" => (false, true),
            _ => (false, false),
        }
    }

    /// Whether LLDP transmission is configured for this interface.
    pub fn emit_lldp(&self) -> bool {
        matches!(self.value("Network", "EmitLLDP"), Some("true") | Some("yes"))
    }
}

/// Writer producing section files in the supervisor's format.
#[derive(Debug, Default)]
pub struct ConfigWriter {
    out: String,
}

impl ConfigWriter {
    /// Start an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new `[Section]`.
    pub fn section(&mut self, name: &str) -> &mut Self {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        self.out.push('[');
        self.out.push_str(name);
        self.out.push_str("]\n");
        self
    }

    /// Append a key=value entry to the current section.
    pub fn entry(&mut self, key: &str, value: impl AsRef<str>) -> &mut Self {
        self.out.push_str(key);
        self.out.push('=');
        self.out.push_str(value.as_ref());
        self.out.push('\n');
        self
    }

    /// Return the file contents.
    pub fn finish(self) -> String {
        self.out
    }
}
