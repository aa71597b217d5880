//! Deploy-time parameters.
//!
//! Read from the deployment JSON:
//!
//! ```json
//! { "zkLightClients": [ { "deploy": { "genesisValidatorsRoot": "0x…", "genesisTime": 1606824023, … } } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::types::{ChainId, LightClientConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid deploy settings: {0}")]
    Json(String),

    #[error("No light client deployments configured")]
    NoDeployments,

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Protocol state tracks chain {found}, light client expects chain {expected}")]
    ChainMismatch { expected: ChainId, found: ChainId },

    #[error("{what}: {expected} entries expected, {found} given")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate light client deployment for chain {chain_id}")]
    DuplicateChain { chain_id: ChainId },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Json(_) => ErrorKind::Malformed,
            _ => ErrorKind::Configuration,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientDeployment {
    pub deploy: LightClientConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySettings {
    pub zk_light_clients: Vec<LightClientDeployment>,
}

impl DeploySettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Every deployment is valid and no source chain appears twice.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zk_light_clients.is_empty() {
            return Err(ConfigError::NoDeployments);
        }
        let mut seen = Vec::with_capacity(self.zk_light_clients.len());
        for deployment in &self.zk_light_clients {
            deployment.deploy.validate()?;
            let chain_id = deployment.deploy.source_chain_id;
            if seen.contains(&chain_id) {
                return Err(ConfigError::DuplicateChain { chain_id });
            }
            seen.push(chain_id);
        }
        Ok(())
    }

    pub fn light_clients(&self) -> impl Iterator<Item = &LightClientConfig> {
        self.zk_light_clients.iter().map(|d| &d.deploy)
    }

    pub fn for_chain(&self, chain_id: ChainId) -> Option<&LightClientConfig> {
        self.light_clients().find(|c| c.source_chain_id == chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "zkLightClients": [
            {
                "deploy": {
                    "genesisValidatorsRoot": "0x4b363db94e286120d76eb905340fdd4e54bfe9f06bf33ff6cf5ad27f511bfe95",
                    "genesisTime": 1606824023,
                    "secondsPerSlot": 12,
                    "slotsPerPeriod": 8192,
                    "syncCommitteePeriod": 741,
                    "syncCommitteePoseidon": "0x0ab2afdc05c8b6ae1f2ab20874fb4159e25d5c1d4faa41aee232d6ab331332df",
                    "sourceChainId": 1,
                    "finalityThreshold": 461
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_deploy_settings() {
        let settings = DeploySettings::from_json(SETTINGS).unwrap();
        let config = settings.for_chain(1).unwrap();
        assert_eq!(config.genesis_time, 1606824023);
        assert_eq!(config.slots_per_period, 8192);
        assert_eq!(config.finality_threshold, 461);
        assert_eq!(config.genesis_validators_root[0], 0x4b);
        assert!(settings.for_chain(2).is_none());
    }

    #[test]
    fn test_zero_slots_per_period_rejected() {
        let json = SETTINGS.replace("\"slotsPerPeriod\": 8192", "\"slotsPerPeriod\": 0");
        let err = DeploySettings::from_json(&json).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "slotsPerPeriod",
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_duplicate_chain_rejected() {
        let mut settings = DeploySettings::from_json(SETTINGS).unwrap();
        settings
            .zk_light_clients
            .push(settings.zk_light_clients[0].clone());
        assert_eq!(
            settings.validate(),
            Err(ConfigError::DuplicateChain { chain_id: 1 })
        );
    }

    #[test]
    fn test_bad_json_is_malformed() {
        let err = DeploySettings::from_json("{\"zkLightClients\": 3}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert_eq!(
            DeploySettings::from_json("{\"zkLightClients\": []}"),
            Err(ConfigError::NoDeployments)
        );
    }

    #[test]
    fn test_missing_file() {
        let err = DeploySettings::load("/nonexistent/deploy.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
