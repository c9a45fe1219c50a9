/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info, warn};

use tsch_core::asn::{self, Asn};
use tsch_core::config::{ConfigManager, TschConfig};
use tsch_core::context::NodeContext;
use tsch_core::node::LinkAddr;
use tsch_core::orchestra::PacketInfo;
use tsch_core::rpl::TxStatus;
use tsch_core::schedule::{LinkOptions, LinkPeer, NoopRadio, RadioRequest};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Single-node TSCH slot loop.
///
/// Example:
///   tsch-node --config node.yaml --slots 40000 --node-id 3
#[derive(Debug, Parser)]
#[command(
    name = "tsch-node",
    about = "TSCH node simulator – Orchestra schedule and RPL parent selection",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML node configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Number of timeslots to simulate.
    #[arg(short = 's', long = "slots", default_value_t = 20_000)]
    slots: u64,

    /// Override `node.id` from the configuration.
    #[arg(short = 'n', long = "node-id")]
    node_id: Option<u16>,

    /// Pace the loop at the configured slot duration instead of running flat out.
    #[arg(short = 'p', long = "pace", default_value_t = false)]
    pace: bool,
}

// ── Simulated neighborhood ────────────────────────────────────────────────────

/// Deterministic link model: every `loss_period`-th attempt is lost.
struct LossyLink {
    attempts: u64,
    loss_period: u64,
}

impl LossyLink {
    fn transmit(&mut self) -> TxStatus {
        self.attempts += 1;
        if self.attempts % self.loss_period == 0 {
            TxStatus::NoAck
        } else {
            TxStatus::Ok
        }
    }
}

/// Pick a neighbor that is not us; simulation ids are single bytes.
fn neighbor_of(node_id: u16, offset: u16) -> LinkAddr {
    let id = if node_id > offset { node_id - offset } else { node_id + offset };
    LinkAddr::from_node_id(u8::try_from(id).unwrap_or(u8::MAX))
}

// ── Simulation ────────────────────────────────────────────────────────────────

async fn run(config: TschConfig, slots: u64, pace: bool) -> Result<()> {
    let slot_duration_us = config.schedule.slot_duration_us;
    let slot_duration = asn::duration_from_slots(1, slot_duration_us);
    let node_id = config.node_id;
    let mut ctx = NodeContext::init(config, Box::new(NoopRadio))?;

    let parent = neighbor_of(node_id, 1);
    let child = neighbor_of(node_id, 2);
    let own_addr = ctx.node_addr();

    ctx.on_network_joined(Asn::default());
    ctx.on_time_source_changed(Some(parent));
    ctx.update_neighbor(parent, 1, 0);
    ctx.update_neighbor(child, 3, 256);

    let mut link = LossyLink {
        attempts: 0,
        loss_period: 5,
    };
    let mut interval = tokio::time::interval(slot_duration);
    let mut tx_count = 0u64;
    let mut rx_count = 0u64;

    for slot in 0..slots {
        if pace {
            interval.tick().await;
        }
        let asn = Asn::from_u64(slot);
        ctx.tick(asn);

        // Stop generating traffic half-way so leases can age out
        let traffic = slot < slots / 2;

        let candidates: Vec<(LinkOptions, LinkPeer, u8)> = ctx
            .schedule_lookup_current()
            .iter()
            .map(|c| (c.link.options(), c.link.peer(), ctx.channel_for(c.link)))
            .collect();
        if candidates.is_empty() {
            ctx.request_radio(RadioRequest::Off);
            continue;
        }
        ctx.request_radio(RadioRequest::On);

        for (options, peer, channel) in candidates {
            if !traffic {
                break;
            }
            if let (true, LinkPeer::Unicast(dest)) = (options.contains(LinkOptions::TX), peer) {
                let status = link.transmit();
                ctx.on_tx_outcome(dest, status, 1, false);
                tx_count += 1;
                debug!(asn = %asn, channel, dest = %dest, ?status, "unicast on dedicated link");
            } else if options.contains(LinkOptions::TX | LinkOptions::SHARED) && slot % 7 == 0 {
                // Bootstrap the dedicated schedule through the shared cell
                ctx.on_tx_outcome(parent, TxStatus::Ok, 1, false);
                tx_count += 1;
            }
            if options.contains(LinkOptions::RX) && slot % 3 == 0 {
                ctx.on_rx(&PacketInfo {
                    sender: child,
                    receiver: own_addr,
                    is_control: false,
                });
                rx_count += 1;
            }
        }
    }

    let simulated = u32::try_from(slots)
        .map(|n| asn::duration_from_slots(n, slot_duration_us))
        .unwrap_or(Duration::MAX);
    info!(
        slots,
        simulated = ?simulated,
        tx_count,
        rx_count,
        rank = ctx.rpl().dag.rank,
        parent = ?ctx.rpl().dag.preferred_parent,
        links = ctx.store().link_count(),
        "simulation finished"
    );
    for sf in ctx.store().slotframes() {
        for l in sf.links() {
            info!(
                frame = sf.id(),
                timeslot = l.timeslot(),
                channel_offset = l.channel_offset(),
                options = ?l.options(),
                peer = ?l.peer(),
                leased = l.lease().is_some(),
                "link"
            );
        }
    }
    if let Some(p) = ctx.parents().get(&parent) {
        info!(link_metric = p.link_metric, tx_count = p.tx_count, "parent link statistics");
    }

    ctx.teardown();
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(
        config = ?cli.config,
        slots = cli.slots,
        node_id = ?cli.node_id,
        pace = cli.pace,
        "tsch-node starting up"
    );

    // ── Load configuration ────────────────────────────────────────────────────
    let mut manager = ConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = manager.load_from_file(path) {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => warn!("No configuration file provided, using defaults"),
    }

    let mut config = manager.into_config();
    if let Some(id) = cli.node_id {
        config.node_id = id;
    }

    if let Err(e) = run(config, cli.slots, cli.pace).await {
        error!("Simulation failed: {:#}", e);
        process::exit(1);
    }
}
