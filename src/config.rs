use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::{macros::config::MacroConfig, motor_controller::config::ControllerConfig};

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct LinkamConfig {
    pub controller: ControllerConfig,
    pub macros: MacroConfig,
}

impl LinkamConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid Linkam configuration")
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_json_str(&json)
    }
}
