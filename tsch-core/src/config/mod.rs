/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Node configuration loading.
//!
//! The expected YAML structure is (every section and key is optional):
//! ```yaml
//! node:
//!   id: 3
//! schedule:
//!   max_slotframes: 4
//!   max_links: 32
//!   slot_duration_us: 15000
//!   hopping_sequence: [16, 17, 23, 18, 26, 15, 25, 22, 19, 11, 12, 13, 24, 14, 20, 21]
//! rpl:
//!   objective_function: pdr        # pdr | hop_etx
//!   min_hoprankinc: 1
//!   etx_threshold: 64
//!   hysteresis: 0
//!   metric_container: none         # none | etx | energy
//! orchestra:
//!   mode: sender_based             # sender_based | receiver_based
//!   eb_period: 397
//!   common_shared_period: 31       # null disables the shared slotframe
//!   unicast_period: 253
//!   unicast_period2: null
//!   unicast_shared: false
//!   lease_lifetime_secs: 120
//!   static_links:
//!     - { tx_index: 3, rx_index: 2, timeslot: 1 }
//! deployment:
//!   nodes:
//!     - { id: 1, mac: "00:15:8d:00:00:36:01:41" }
//!   index_shuffle: { multiplier: 10, modulus: 20 }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::asn::hopping::{HoppingSequence, DEFAULT_HOPPING_SEQUENCE};
use crate::asn::DEFAULT_SLOT_DURATION_US;
use crate::node::{IndexShuffle, LinkAddr, NodeDirectory};
use crate::orchestra::{
    OrchestraConfig, OrchestraMode, StaticLink, DEFAULT_COMMON_SHARED_PERIOD, DEFAULT_EB_PERIOD,
    DEFAULT_LEASE_LIFETIME, DEFAULT_UNICAST_PERIOD,
};
use crate::rpl::{
    HopEtx, MetricContainerKind, ObjectiveFunction, ObjectiveFunctionKind, Pdr,
    DEFAULT_ETX_THRESHOLD, DEFAULT_MIN_HOPRANKINC,
};
use crate::schedule::{DEFAULT_MAX_LINKS, DEFAULT_MAX_SLOTFRAMES};

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    node: NodeSection,
    #[serde(default)]
    schedule: ScheduleSection,
    #[serde(default)]
    rpl: RplSection,
    #[serde(default)]
    orchestra: OrchestraSection,
    #[serde(default)]
    deployment: DeploymentSection,
}

#[derive(Debug, Deserialize)]
struct NodeSection {
    #[serde(default = "default_node_id")]
    id: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: default_node_id(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ScheduleSection {
    max_slotframes: usize,
    max_links: usize,
    slot_duration_us: u32,
    hopping_sequence: Vec<u8>,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            max_slotframes: DEFAULT_MAX_SLOTFRAMES,
            max_links: DEFAULT_MAX_LINKS,
            slot_duration_us: DEFAULT_SLOT_DURATION_US,
            hopping_sequence: DEFAULT_HOPPING_SEQUENCE.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OfName {
    HopEtx,
    #[default]
    Pdr,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum McName {
    #[default]
    None,
    Etx,
    Energy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RplSection {
    objective_function: OfName,
    min_hoprankinc: u16,
    etx_threshold: u16,
    hysteresis: u16,
    metric_container: McName,
}

impl Default for RplSection {
    fn default() -> Self {
        Self {
            objective_function: OfName::default(),
            min_hoprankinc: DEFAULT_MIN_HOPRANKINC,
            etx_threshold: DEFAULT_ETX_THRESHOLD,
            hysteresis: 0,
            metric_container: McName::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ModeName {
    #[default]
    SenderBased,
    ReceiverBased,
}

#[derive(Debug, Deserialize)]
struct StaticLinkEntry {
    tx_index: u16,
    rx_index: u16,
    timeslot: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OrchestraSection {
    mode: ModeName,
    eb_period: u16,
    common_shared_period: Option<u16>,
    unicast_period: u16,
    unicast_period2: Option<u16>,
    unicast_shared: bool,
    lease_lifetime_secs: u64,
    static_links: Vec<StaticLinkEntry>,
}

impl Default for OrchestraSection {
    fn default() -> Self {
        Self {
            mode: ModeName::default(),
            eb_period: DEFAULT_EB_PERIOD,
            common_shared_period: Some(DEFAULT_COMMON_SHARED_PERIOD),
            unicast_period: DEFAULT_UNICAST_PERIOD,
            unicast_period2: None,
            unicast_shared: false,
            lease_lifetime_secs: DEFAULT_LEASE_LIFETIME.as_secs(),
            static_links: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentNode {
    id: u16,
    mac: String,
}

#[derive(Debug, Deserialize)]
struct ShuffleEntry {
    multiplier: u16,
    modulus: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeploymentSection {
    nodes: Vec<DeploymentNode>,
    index_shuffle: Option<ShuffleEntry>,
}

fn default_node_id() -> u16 {
    1
}

// ── Public data structures ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub max_slotframes: usize,
    /// Size of the fixed link pool.
    pub max_links: usize,
    pub slot_duration_us: u32,
    pub hopping_sequence: Vec<u8>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let s = ScheduleSection::default();
        Self {
            max_slotframes: s.max_slotframes,
            max_links: s.max_links,
            slot_duration_us: s.slot_duration_us,
            hopping_sequence: s.hopping_sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RplConfig {
    pub objective_function: ObjectiveFunctionKind,
    pub min_hoprankinc: u16,
    /// Phase-2 band of the ETX-hop parent scan.
    pub etx_threshold: u16,
    /// PDR best-parent hysteresis; zero disables it.
    pub hysteresis: u16,
    pub metric_container: MetricContainerKind,
}

impl Default for RplConfig {
    fn default() -> Self {
        Self {
            objective_function: ObjectiveFunctionKind::default(),
            min_hoprankinc: DEFAULT_MIN_HOPRANKINC,
            etx_threshold: DEFAULT_ETX_THRESHOLD,
            hysteresis: 0,
            metric_container: MetricContainerKind::default(),
        }
    }
}

impl RplConfig {
    /// Build the configured objective function.
    pub fn objective_function(&self) -> ObjectiveFunction {
        match self.objective_function {
            ObjectiveFunctionKind::HopEtx => ObjectiveFunction::HopEtx(HopEtx {
                min_hoprankinc: self.min_hoprankinc,
                threshold: self.etx_threshold,
            }),
            ObjectiveFunctionKind::Pdr => ObjectiveFunction::Pdr(Pdr {
                min_hoprankinc: self.min_hoprankinc,
                hysteresis: self.hysteresis,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentConfig {
    /// `(id, mac)` in deployment order.
    pub nodes: Vec<(u16, LinkAddr)>,
    pub index_shuffle: Option<IndexShuffle>,
}

impl DeploymentConfig {
    pub fn node_directory(&self) -> NodeDirectory {
        NodeDirectory::new(self.nodes.clone(), self.index_shuffle)
    }
}

/// Complete configuration of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TschConfig {
    pub node_id: u16,
    pub schedule: ScheduleConfig,
    pub rpl: RplConfig,
    pub orchestra: OrchestraConfig,
    pub deployment: DeploymentConfig,
}

impl Default for TschConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            schedule: ScheduleConfig::default(),
            rpl: RplConfig::default(),
            orchestra: OrchestraConfig::default(),
            deployment: DeploymentConfig::default(),
        }
    }
}

impl TschConfig {
    /// Reject values the runtime cannot work with.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.node_id == 0 {
            bail!("node.id must be non-zero (0 is the broadcast id)");
        }
        if self.schedule.slot_duration_us == 0 {
            bail!("schedule.slot_duration_us must be non-zero");
        }
        if self.schedule.hopping_sequence.is_empty() {
            bail!("schedule.hopping_sequence must not be empty");
        }

        let o = &self.orchestra;
        let periods = [
            ("orchestra.eb_period", Some(o.eb_period)),
            ("orchestra.common_shared_period", o.common_shared_period),
            ("orchestra.unicast_period", Some(o.unicast_period)),
            ("orchestra.unicast_period2", o.unicast_period2),
        ];
        for (name, period) in periods {
            if period == Some(0) {
                bail!("{name} must be non-zero");
            }
        }

        let needed = 2 + o.common_shared_period.is_some() as usize + o.unicast_period2.is_some() as usize;
        if self.schedule.max_slotframes < needed {
            bail!(
                "schedule.max_slotframes is {} but orchestra needs {needed} slotframes",
                self.schedule.max_slotframes
            );
        }

        if let Some(bad) = o.static_links.iter().find(|l| l.timeslot >= o.unicast_period) {
            bail!(
                "static link timeslot {} is outside the unicast slotframe (period {})",
                bad.timeslot,
                o.unicast_period
            );
        }

        if !self.deployment.nodes.is_empty()
            && !self.deployment.nodes.iter().any(|(id, _)| *id == self.node_id)
        {
            bail!("node.id {} is not listed in deployment.nodes", self.node_id);
        }
        Ok(())
    }

    /// # Errors
    /// Fails only for an empty sequence, which [`validate`](Self::validate)
    /// already rejects.
    pub fn hopping_sequence(&self) -> Result<HoppingSequence> {
        HoppingSequence::new(self.schedule.hopping_sequence.clone())
            .context("invalid hopping sequence")
    }
}

fn convert(file: ConfigFile) -> Result<TschConfig> {
    let mut nodes = Vec::with_capacity(file.deployment.nodes.len());
    for entry in file.deployment.nodes {
        let mac: LinkAddr = entry
            .mac
            .parse()
            .with_context(|| format!("deployment node {}", entry.id))?;
        nodes.push((entry.id, mac));
    }

    let orchestra = OrchestraConfig {
        mode: match file.orchestra.mode {
            ModeName::SenderBased => OrchestraMode::SenderBased,
            ModeName::ReceiverBased => OrchestraMode::ReceiverBased,
        },
        eb_period: file.orchestra.eb_period,
        common_shared_period: file.orchestra.common_shared_period,
        unicast_period: file.orchestra.unicast_period,
        unicast_period2: file.orchestra.unicast_period2,
        unicast_shared: file.orchestra.unicast_shared,
        lease_lifetime: Duration::from_secs(file.orchestra.lease_lifetime_secs),
        static_links: file
            .orchestra
            .static_links
            .into_iter()
            .map(|l| StaticLink {
                tx_index: l.tx_index,
                rx_index: l.rx_index,
                timeslot: l.timeslot,
            })
            .collect(),
    };

    Ok(TschConfig {
        node_id: file.node.id,
        schedule: ScheduleConfig {
            max_slotframes: file.schedule.max_slotframes,
            max_links: file.schedule.max_links,
            slot_duration_us: file.schedule.slot_duration_us,
            hopping_sequence: file.schedule.hopping_sequence,
        },
        rpl: RplConfig {
            objective_function: match file.rpl.objective_function {
                OfName::HopEtx => ObjectiveFunctionKind::HopEtx,
                OfName::Pdr => ObjectiveFunctionKind::Pdr,
            },
            min_hoprankinc: file.rpl.min_hoprankinc,
            etx_threshold: file.rpl.etx_threshold,
            hysteresis: file.rpl.hysteresis,
            metric_container: match file.rpl.metric_container {
                McName::None => MetricContainerKind::None,
                McName::Etx => MetricContainerKind::Etx,
                McName::Energy => MetricContainerKind::Energy,
            },
        },
        orchestra,
        deployment: DeploymentConfig {
            nodes,
            index_shuffle: file.deployment.index_shuffle.map(|s| IndexShuffle {
                multiplier: s.multiplier,
                modulus: s.modulus,
            }),
        },
    })
}

// ── ConfigManager ─────────────────────────────────────────────────────────────

/// Loads and holds the node configuration.
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: TschConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate `path`, replacing any previously loaded config.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed,
    /// a MAC address does not parse, or validation fails.  The previous
    /// configuration is kept in that case.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading TSCH configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = convert(file)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        if config.deployment.nodes.is_empty() {
            warn!("No deployment table, using simulation addressing (id = last MAC byte)");
        }
        debug!(
            node_id = config.node_id,
            of = ?config.rpl.objective_function,
            mode = ?config.orchestra.mode,
            unicast_period = config.orchestra.unicast_period,
            nodes = config.deployment.nodes.len(),
            "configuration parsed"
        );

        self.config = config;
        self.loaded = true;
        info!(node_id = self.config.node_id, "configuration loaded");
        Ok(())
    }

    pub fn config(&self) -> &TschConfig {
        &self.config
    }

    pub fn into_config(self) -> TschConfig {
        self.config
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
