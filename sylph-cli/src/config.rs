//! Replay scenario loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use sylph_bridge::{DispatcherConfig, Role};
use thiserror::Error;

/// A replay scenario (loaded from a .toml script)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub bridge: DispatcherConfig,
    pub transports: Vec<TransportScript>,
}

/// Events reported for one transport, in order
///
/// The transport is opened before the first step and closed after the last
/// one unless `keep_open` is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportScript {
    pub label: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub keep_open: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    OpenChannel { channel: String },
    CloseChannel { channel: String },
    Error { channel: String, message: String },
    Message { channel: String, text: String },
    Data { channel: String, bytes: Vec<u8> },
}

impl Step {
    pub fn channel(&self) -> &str {
        match self {
            Step::OpenChannel { channel }
            | Step::CloseChannel { channel }
            | Step::Error { channel, .. }
            | Step::Message { channel, .. }
            | Step::Data { channel, .. } => channel,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Scenario has no transports")]
    NoTransports,

    #[error("Duplicate transport label: {0}")]
    DuplicateTransport(String),

    #[error("Transport {transport}: channel {channel} used before it is opened")]
    ChannelNotOpened { transport: String, channel: String },

    #[error("Transport {transport}: channel {channel} opened twice")]
    ChannelOpenedTwice { transport: String, channel: String },
}

impl Scenario {
    /// Check the scenario is self-consistent before replaying it
    pub fn validate(&self) -> std::result::Result<(), ScenarioError> {
        if self.transports.is_empty() {
            return Err(ScenarioError::NoTransports);
        }

        let mut labels = HashSet::new();
        for transport in &self.transports {
            if !labels.insert(transport.label.as_str()) {
                return Err(ScenarioError::DuplicateTransport(transport.label.clone()));
            }
            transport.validate()?;
        }
        Ok(())
    }

    /// Total number of scripted steps across all transports
    pub fn step_count(&self) -> usize {
        self.transports.iter().map(|t| t.steps.len()).sum()
    }
}

impl TransportScript {
    fn validate(&self) -> std::result::Result<(), ScenarioError> {
        // Channel labels are scoped to their transport. A closed label may be
        // opened again and gets a fresh handle.
        let mut open = HashSet::new();
        for step in &self.steps {
            let channel = step.channel();
            let known = match step {
                Step::OpenChannel { .. } => !open.insert(channel),
                Step::CloseChannel { .. } => open.remove(channel),
                _ => open.contains(channel),
            };
            match (step, known) {
                (Step::OpenChannel { .. }, true) => {
                    return Err(ScenarioError::ChannelOpenedTwice {
                        transport: self.label.clone(),
                        channel: channel.to_string(),
                    })
                }
                (Step::OpenChannel { .. }, false) => {}
                (_, false) => {
                    return Err(ScenarioError::ChannelNotOpened {
                        transport: self.label.clone(),
                        channel: channel.to_string(),
                    })
                }
                (_, true) => {}
            }
        }
        Ok(())
    }
}

/// Load and validate a scenario from a TOML file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file: {:?}", path))?;

    let scenario: Scenario = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file: {:?}", path))?;

    scenario
        .validate()
        .with_context(|| format!("Invalid scenario file: {:?}", path))?;

    Ok(scenario)
}
