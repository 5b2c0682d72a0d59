//! Server configuration, read from TOML.
//!
//! ```toml
//! log_level = "debug"
//! default_rules = true
//!
//! [limits]
//! search_max_results = 500
//! search_time_limit_ms = 30000
//!
//! [[virtual_attribute]]
//! name = "description"
//! attribute_type = "description"
//! provider = "user-defined"
//! conflict_behavior = "merge-real-and-virtual"
//! value = ["managed by virtdir"]
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use sketching::LogLevel;
use virtdir_proto::config::LimitsConfig;

use crate::prelude::*;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    /// Register the builtin entryDN, entryUUID, isMemberOf, subschemaSubentry and virtual
    /// static member rules.
    #[serde(default = "default_true")]
    pub default_rules: bool,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default, rename = "virtual_attribute")]
    pub virtual_attributes: Vec<VirtualAttributeConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            log_level: LogLevel::default(),
            default_rules: true,
            limits: LimitsConfig::default(),
            virtual_attributes: Vec::with_capacity(0),
        }
    }
}

impl ServerConfig {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self, OperationError> {
        let mut f = File::open(config_path.as_ref()).map_err(|e| {
            admin_error!(?e, path = ?config_path.as_ref(), "unable to open config file");
            OperationError::FsError
        })?;

        let mut contents = String::new();
        f.read_to_string(&mut contents).map_err(|e| {
            admin_error!(?e, path = ?config_path.as_ref(), "unable to read config file");
            OperationError::FsError
        })?;

        Self::from_str(&contents)
    }

    /// Install the global log subscriber at the configured level. Returns false if one was
    /// already installed.
    pub fn start_logging(&self) -> bool {
        sketching::start_logging(self.log_level)
    }
}

impl FromStr for ServerConfig {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| {
            admin_error!(?e, "unable to parse config");
            OperationError::SerdeTomlError
        })
    }
}
