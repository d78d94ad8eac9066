//! Versioned, human-maintained gamedata: symbolic names to offsets, host
//! aliases and byte signatures, per platform.
//!
//! ```toml
//! [CBasePlayerPawn]
//! "CBasePlayerPawn::GetEyePosition" = { windows = 169, linux = 170 }
//!
//! [CSource2Server]
//! "&s_GameEventManager" = { linux = { signature = "48 8D 3D ? ? ? ? E8", offset = 3, relative = true } }
//!
//! [CPointOrient]
//! m_bActive = 0x4F8
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::signature::Signature;

/// Read contract the resolver needs from a gamedata document.
pub trait ConfigSource {
    fn lookup(&self, group: &str, symbol: &str) -> Option<ConfigValue>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// A raw offset, index or absolute address.
    Number(i64),
    /// A name for the host metadata to look up instead of the symbol itself.
    Name(String),
    Signature(Signature),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" | "win64" => Ok(Platform::Windows),
            "linux" | "linuxsteamrt64" => Ok(Platform::Linux),
            "macos" | "osx" => Ok(Platform::MacOs),
            other => Err(format!("unknown platform \"{}\"", other)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Gamedata for one platform, already reduced to that platform's values.
#[derive(Debug, Clone, Default)]
pub struct GameConfig {
    groups: HashMap<String, HashMap<String, ConfigValue>>,
}

impl GameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, platform: Platform) -> Result<Self> {
        let document: toml::Table = text.parse()?;
        let mut config = Self::new();

        for (group, entries) in document {
            let toml::Value::Table(entries) = entries else {
                return Err(Error::ConfigParse {
                    group,
                    symbol: String::new(),
                    reason: "top-level entries must be tables".into(),
                });
            };
            for (symbol, value) in entries {
                let parsed = parse_entry(value, platform).map_err(|reason| Error::ConfigParse {
                    group: group.clone(),
                    symbol: symbol.clone(),
                    reason,
                })?;
                match parsed {
                    Some(value) => config.insert(&group, &symbol, value),
                    None => debug!("{}::{} has no value for {}", group, symbol, platform),
                }
            }
        }

        Ok(config)
    }

    pub fn load(path: &Path, platform: Platform) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::parse(&text, platform)?;
        info!(
            "Loaded gamedata from {} for {} ({} groups, {} entries)",
            path.display(),
            platform,
            config.groups.len(),
            config.len(),
        );
        Ok(config)
    }

    pub fn insert(&mut self, group: &str, symbol: &str, value: ConfigValue) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(symbol.to_string(), value);
    }

    pub fn remove(&mut self, group: &str, symbol: &str) -> Option<ConfigValue> {
        self.groups.get_mut(group)?.remove(symbol)
    }

    pub fn with(mut self, group: &str, symbol: &str, value: ConfigValue) -> Self {
        self.insert(group, symbol, value);
        self
    }

    /// Entries from `other` replace entries with the same group and symbol.
    pub fn merge(&mut self, other: GameConfig) {
        for (group, entries) in other.groups {
            self.groups.entry(group).or_default().extend(entries);
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfigSource for GameConfig {
    fn lookup(&self, group: &str, symbol: &str) -> Option<ConfigValue> {
        self.groups.get(group)?.get(symbol).cloned()
    }
}

/// One gamedata entry as written: a value for every platform, or a table
/// keyed by platform.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Value(RawValue),
    PerPlatform(PlatformValues),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(i64),
    Name(String),
    Signature(RawSignature),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSignature {
    signature: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    relative: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlatformValues {
    windows: Option<RawValue>,
    linux: Option<RawValue>,
    macos: Option<RawValue>,
}

impl RawEntry {
    fn for_platform(self, platform: Platform) -> std::result::Result<Option<RawValue>, String> {
        match self {
            RawEntry::Value(value) => Ok(Some(value)),
            RawEntry::PerPlatform(PlatformValues {
                windows: None,
                linux: None,
                macos: None,
            }) => Err("table has neither platform keys nor a signature".into()),
            RawEntry::PerPlatform(mut values) => Ok(match platform {
                Platform::Windows => values.windows.take(),
                Platform::Linux => values.linux.take(),
                Platform::MacOs => values.macos.take(),
            }),
        }
    }
}

impl RawValue {
    fn into_config_value(self) -> std::result::Result<ConfigValue, String> {
        match self {
            RawValue::Number(n) => Ok(ConfigValue::Number(n)),
            RawValue::Name(name) if name.is_empty() => Err("empty name".into()),
            RawValue::Name(name) => Ok(ConfigValue::Name(name)),
            RawValue::Signature(raw) => Signature::parse(&raw.signature)
                .map(|sig| sig.with_offset(raw.offset).relative(raw.relative))
                .map(ConfigValue::Signature)
                .map_err(|e| e.to_string()),
        }
    }
}

fn parse_entry(value: toml::Value, platform: Platform) -> std::result::Result<Option<ConfigValue>, String> {
    let entry = RawEntry::deserialize(value).map_err(|e| e.to_string())?;
    entry
        .for_platform(platform)?
        .map(RawValue::into_config_value)
        .transpose()
}
