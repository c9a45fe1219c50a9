/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-node runtime context.
//!
//! [`NodeContext`] owns everything a node needs between network bring-up
//! ([`NodeContext::init`]) and network leave ([`NodeContext::teardown`]):
//! the schedule store and its lock, the RPL instance with its neighbor table,
//! and Orchestra.  The MAC driver calls into it once per slot and once per
//! completed transmission or reception.
//!
//! ```text
//!  MAC driver                NodeContext
//!  ──────────                ───────────
//!  tick(asn)          ─────► lease sweep every lifetime/4 slots
//!  on_tx_outcome(..)  ─────► OF feedback ─► Orchestra ─► parent reselection
//!  on_rx(..)          ─────► Orchestra
//!  schedule_lookup_current ◄─ candidate links for this slot
//! ```

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::asn::hopping::HoppingSequence;
use crate::asn::Asn;
use crate::config::TschConfig;
use crate::node::{LinkAddr, NodeDirectory, NodeIndexLookup};
use crate::orchestra::{Orchestra, PacketInfo};
use crate::rpl::{ParentTable, Rank, RplError, RplInstance, TxStatus};
use crate::schedule::{
    Link, LinkId, LinkOptions, LinkPeer, LinkType, RadioControl, RadioRequest, ScheduleError,
    ScheduleLock, ScheduleStore, ScheduledLink,
};

pub struct NodeContext {
    config: TschConfig,
    lock: ScheduleLock,
    store: ScheduleStore,
    hopping: HoppingSequence,
    directory: NodeDirectory,
    orchestra: Orchestra,
    rpl: RplInstance,
    parents: ParentTable,
    node_addr: LinkAddr,
    time_source: Option<LinkAddr>,
    asn: Asn,
    last_sweep: Asn,
    sweep_interval: u32,
}

impl NodeContext {
    /// Bring the node up: build the schedule and install Orchestra's
    /// slotframes.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the node id has no
    /// address or index in the deployment, or the initial layout does not
    /// fit the schedule capacity.
    pub fn init(config: TschConfig, radio: Box<dyn RadioControl>) -> Result<Self> {
        config.validate()?;

        let directory = config.deployment.node_directory();
        let node_addr = directory
            .addr_from_id(config.node_id)
            .with_context(|| format!("node id {} has no link-layer address", config.node_id))?;
        let node_index = directory
            .index_from_id(config.node_id)
            .with_context(|| format!("node id {} has no index", config.node_id))?;

        let orchestra = Orchestra::new(
            config.orchestra.clone(),
            node_index,
            config.schedule.slot_duration_us,
        )?;
        let hopping = config.hopping_sequence()?;

        let lock = ScheduleLock::new(radio);
        let mut store = ScheduleStore::new(config.schedule.max_slotframes, config.schedule.max_links);
        {
            let guard = lock.acquire();
            orchestra
                .init(&mut store, &guard)
                .context("orchestra layout does not fit the schedule")?;
        }

        let rpl = RplInstance::new(config.rpl.objective_function(), config.rpl.metric_container);
        let sweep_interval = (orchestra.lifetime_slots() / 4).max(1);

        info!(
            node_id = config.node_id,
            node_index,
            addr = %node_addr,
            of = ?rpl.of().kind(),
            ocp = rpl.of().ocp(),
            slotframes = store.slotframes().count(),
            links = store.link_count(),
            "node context initialised"
        );

        Ok(Self {
            config,
            lock,
            store,
            hopping,
            directory,
            orchestra,
            rpl,
            parents: ParentTable::new(),
            node_addr,
            time_source: None,
            asn: Asn::default(),
            last_sweep: Asn::default(),
            sweep_interval,
        })
    }

    /// Leave the network: drop the schedule and all neighbor state.
    ///
    /// Returns the configuration so the node can be brought up again.
    pub fn teardown(mut self) -> TschConfig {
        {
            let guard = self.lock.acquire();
            self.store.clear(&guard);
        }
        self.parents.clear();
        self.rpl.set_joined(false);
        info!(node_id = self.config.node_id, asn = %self.asn, "node context torn down");
        self.config
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &TschConfig {
        &self.config
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn lock(&self) -> &ScheduleLock {
        &self.lock
    }

    pub fn rpl(&self) -> &RplInstance {
        &self.rpl
    }

    pub fn parents(&self) -> &ParentTable {
        &self.parents
    }

    pub fn orchestra(&self) -> &Orchestra {
        &self.orchestra
    }

    pub fn node_addr(&self) -> LinkAddr {
        self.node_addr
    }

    pub fn node_index(&self) -> u16 {
        self.orchestra.node_index()
    }

    pub fn asn(&self) -> Asn {
        self.asn
    }

    pub fn time_source(&self) -> Option<LinkAddr> {
        self.time_source
    }

    // ── Schedule ──────────────────────────────────────────────────────────────

    /// Add or update a link under the schedule lock.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_add_link(
        &mut self,
        frame: u16,
        options: LinkOptions,
        link_type: LinkType,
        peer: LinkPeer,
        timeslot: u16,
        channel_offset: u16,
    ) -> Result<LinkId, ScheduleError> {
        let guard = self.lock.acquire();
        self.store
            .add_or_update_link(&guard, frame, options, link_type, peer, timeslot, channel_offset)
            .map(|l| l.id())
    }

    /// Remove the link at `timeslot` under the schedule lock.
    pub fn schedule_remove_link(
        &mut self,
        frame: u16,
        timeslot: u16,
    ) -> Result<Option<Link>, ScheduleError> {
        let guard = self.lock.acquire();
        self.store.remove_link_at(&guard, frame, timeslot)
    }

    /// Candidate links for the current slot.
    pub fn schedule_lookup_current(&self) -> Vec<ScheduledLink<'_>> {
        self.store.lookup_by_current_slot(self.asn)
    }

    /// Physical channel `link` uses in the current slot.
    pub fn channel_for(&self, link: &Link) -> u8 {
        self.hopping.channel_for(self.asn, link.channel_offset())
    }

    /// Radio power request; deferred while the schedule lock is held.
    pub fn request_radio(&self, request: RadioRequest) {
        self.lock.request_radio(request);
    }

    // ── Slot and network events ───────────────────────────────────────────────

    /// Advance to `asn` and sweep leases when the sweep interval has elapsed.
    pub fn tick(&mut self, asn: Asn) {
        self.asn = asn;
        if asn.diff(self.last_sweep) as i64 >= self.sweep_interval as i64 {
            let changed = {
                let guard = self.lock.acquire();
                self.orchestra.expire_leases(&mut self.store, &guard, asn)
            };
            self.last_sweep = asn;
            if changed > 0 {
                debug!(asn = %asn, changed, "periodic lease sweep");
            }
        }
    }

    /// Become the DAG root.
    pub fn set_root(&mut self) {
        self.rpl.set_root();
        self.refresh_metric_container();
    }

    /// Record a neighbor's advertised rank and path metric, then reselect.
    pub fn update_neighbor(&mut self, addr: LinkAddr, rank: Rank, advertised_path_metric: u16) {
        match self.parents.get_mut(&addr) {
            Some(p) => {
                p.rank = rank;
                p.advertised_path_metric = advertised_path_metric;
            }
            None => {
                let mut p = self.rpl.of().new_parent(addr, rank);
                p.advertised_path_metric = advertised_path_metric;
                debug!(neighbor = %addr, rank, link_metric = p.link_metric, "new neighbor");
                self.parents.insert(p);
            }
        }
        self.reselect_parent();
    }

    /// Outcome of a unicast transmission to `peer` after `attempts` tries.
    pub fn on_tx_outcome(&mut self, peer: LinkAddr, status: TxStatus, attempts: u16, is_control: bool) {
        if let Some(parent) = self.parents.get_mut(&peer) {
            self.rpl.of().on_link_feedback(parent, status, attempts);
        }

        let packet = PacketInfo {
            sender: self.node_addr,
            receiver: peer,
            is_control,
        };
        {
            let guard = self.lock.acquire();
            if let Err(e) = self.orchestra.on_packet_sent(
                &mut self.store,
                &guard,
                &self.directory,
                &packet,
                status,
                self.asn,
            ) {
                warn!(error = %e, peer = %peer, "orchestra could not schedule tx link");
            }
        }

        self.reselect_parent();
    }

    /// A frame addressed to (or overheard by) this node was received.
    pub fn on_rx(&mut self, packet: &PacketInfo) {
        let guard = self.lock.acquire();
        if let Err(e) = self.orchestra.on_packet_received(
            &mut self.store,
            &guard,
            &self.directory,
            packet,
            self.asn,
        ) {
            warn!(error = %e, sender = %packet.sender, "orchestra could not schedule rx link");
        }
    }

    pub fn on_time_source_changed(&mut self, new: Option<LinkAddr>) {
        let old = self.time_source;
        {
            let guard = self.lock.acquire();
            if let Err(e) = self.orchestra.on_time_source_changed(
                &mut self.store,
                &guard,
                &self.directory,
                old.as_ref(),
                new.as_ref(),
            ) {
                warn!(error = %e, "could not move EB listening slot");
            }
        }
        self.time_source = new;
    }

    /// The node (re)synchronised at `asn`.
    pub fn on_network_joined(&mut self, asn: Asn) {
        self.asn = asn;
        self.last_sweep = asn;
        self.orchestra.on_network_joined(&mut self.store, asn);
        self.rpl.set_joined(true);
        self.reselect_parent();
    }

    fn reselect_parent(&mut self) {
        match self.rpl.reselect_parent(&self.parents) {
            Ok(_) => {}
            Err(RplError::NoEligibleParent) => {
                debug!("no eligible parent, advertising infinite rank");
            }
            Err(e) => warn!(error = %e, "parent selection failed"),
        }
        self.refresh_metric_container();
    }

    fn refresh_metric_container(&mut self) {
        if let Err(e) = self.rpl.update_metric_container(&self.parents) {
            debug!(error = %e, "metric container not refreshed");
        }
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("node_addr", &self.node_addr)
            .field("asn", &self.asn)
            .field("links", &self.store.link_count())
            .field("rank", &self.rpl.dag.rank)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
