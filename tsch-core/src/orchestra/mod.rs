/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Orchestra: autonomous slotframe layout with leased unicast links.
//!
//! # Slotframes
//!
//! | id | Role | Default period | Channel offset |
//! |----|------|----------------|----------------|
//! | 0 | Enhanced beacons: TX at own index, RX at time source's index | 397 | 0 |
//! | 1 | Common shared cell (optional) | 31 | 1 |
//! | 2 | Unicast | 253 | 2 |
//! | 3 | Second unicast frame (optional) | `unicast_period2` | 3 |
//!
//! # Leases
//!
//! In sender-based mode every successful unicast exchange installs or
//! refreshes a link in a unicast slotframe:
//!
//! ```text
//! RX from S  ──►  RX link at slot(index(S)),  last_rx = now
//! TX OK to D ──►  TX link at slot(own index), last_tx = now, peer = D
//! ```
//!
//! A link whose both directions went unused for the lease lifetime is
//! removed.  A link with only one stale direction loses that direction's
//! flags and keeps the other.  Links installed without a lease (static
//! links) are merged with but never expire.

use std::time::Duration;

use tracing::{debug, info};

use crate::asn::{self, Asn, AsnError};
use crate::node::{LinkAddr, NodeIndexLookup};
use crate::rpl::TxStatus;
use crate::schedule::{
    LeaseTimestamps, LinkExtra, LinkOptions, LinkPeer, LinkType, LockGuard, ScheduleError,
    ScheduleStore,
};

// ── Constants ─────────────────────────────────────────────────────────────────

pub const EB_SLOTFRAME_ID: u16 = 0;
pub const COMMON_SHARED_SLOTFRAME_ID: u16 = 1;
pub const UNICAST_SLOTFRAME_ID: u16 = 2;
pub const UNICAST_SLOTFRAME2_ID: u16 = 3;

pub const DEFAULT_EB_PERIOD: u16 = 397;
pub const DEFAULT_COMMON_SHARED_PERIOD: u16 = 31;
pub const DEFAULT_UNICAST_PERIOD: u16 = 253;
pub const DEFAULT_LEASE_LIFETIME: Duration = Duration::from_secs(2 * 60);

const EB_CHANNEL_OFFSET: u16 = 0;
const COMMON_SHARED_CHANNEL_OFFSET: u16 = 1;
const UNICAST_CHANNEL_OFFSET: u16 = 2;
const UNICAST2_CHANNEL_OFFSET: u16 = 3;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Who owns the dedicated unicast slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestraMode {
    /// Each node transmits in its own index slot; receivers lease an RX link
    /// at the sender's slot.
    #[default]
    SenderBased,
    /// Each node listens in its own index slot; senders lease a TX link at
    /// the receiver's slot.
    ReceiverBased,
}

/// A fixed cell shared by two nodes, installed at init without a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticLink {
    pub tx_index: u16,
    pub rx_index: u16,
    pub timeslot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestraConfig {
    pub mode: OrchestraMode,
    pub eb_period: u16,
    /// `None` disables the common shared slotframe.
    pub common_shared_period: Option<u16>,
    pub unicast_period: u16,
    /// Indices `>= unicast_period` spill into slotframe 3 when set.
    pub unicast_period2: Option<u16>,
    /// Add `SHARED` to leased TX links.
    pub unicast_shared: bool,
    pub lease_lifetime: Duration,
    pub static_links: Vec<StaticLink>,
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            mode: OrchestraMode::default(),
            eb_period: DEFAULT_EB_PERIOD,
            common_shared_period: Some(DEFAULT_COMMON_SHARED_PERIOD),
            unicast_period: DEFAULT_UNICAST_PERIOD,
            unicast_period2: None,
            unicast_shared: false,
            lease_lifetime: DEFAULT_LEASE_LIFETIME,
            static_links: Vec::new(),
        }
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Addressing of a frame that was just sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub sender: LinkAddr,
    pub receiver: LinkAddr,
    /// Routing control traffic never shapes the schedule.
    pub is_control: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Tx,
    Rx,
}

/// Where an index's dedicated unicast cell lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicastSlot {
    pub frame: u16,
    pub timeslot: u16,
    pub channel_offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Remove,
    Downgrade { options: LinkOptions, peer: LinkPeer },
}

// ── Orchestra ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Orchestra {
    config: OrchestraConfig,
    node_index: u16,
    lifetime_slots: u32,
}

impl Orchestra {
    /// # Errors
    /// [`AsnError::ZeroSlotDuration`] when `slot_duration_us == 0`.
    pub fn new(
        config: OrchestraConfig,
        node_index: u16,
        slot_duration_us: u32,
    ) -> Result<Self, AsnError> {
        let lifetime_slots = asn::slots_from_duration(config.lease_lifetime, slot_duration_us)?;
        Ok(Self {
            config,
            node_index,
            lifetime_slots,
        })
    }

    pub fn config(&self) -> &OrchestraConfig {
        &self.config
    }

    pub fn node_index(&self) -> u16 {
        self.node_index
    }

    /// Lease lifetime in slots.
    pub fn lifetime_slots(&self) -> u32 {
        self.lifetime_slots
    }

    /// Slotframes that hold leased links.
    pub fn unicast_frames(&self) -> Vec<u16> {
        let mut frames = vec![UNICAST_SLOTFRAME_ID];
        if self.config.unicast_period2.is_some() {
            frames.push(UNICAST_SLOTFRAME2_ID);
        }
        frames
    }

    fn eb_timeslot(&self, index: u16) -> u16 {
        index % self.config.eb_period
    }

    /// Dedicated unicast cell of the node with `index`.
    pub fn slot_for_index(&self, index: u16) -> UnicastSlot {
        let period = self.config.unicast_period;
        match self.config.unicast_period2 {
            Some(period2) if index >= period => UnicastSlot {
                frame: UNICAST_SLOTFRAME2_ID,
                timeslot: (index - period) % period2,
                channel_offset: UNICAST2_CHANNEL_OFFSET,
            },
            Some(_) => UnicastSlot {
                frame: UNICAST_SLOTFRAME_ID,
                timeslot: index,
                channel_offset: UNICAST_CHANNEL_OFFSET,
            },
            None => UnicastSlot {
                frame: UNICAST_SLOTFRAME_ID,
                timeslot: index % period,
                channel_offset: UNICAST_CHANNEL_OFFSET,
            },
        }
    }

    // ── Initialisation ────────────────────────────────────────────────────────

    /// Install the slotframes and the links that exist from the start.
    pub fn init(&self, store: &mut ScheduleStore, guard: &LockGuard<'_>) -> Result<(), ScheduleError> {
        let cfg = &self.config;

        store.add_slotframe(guard, EB_SLOTFRAME_ID, cfg.eb_period)?;
        store.add_or_update_link(
            guard,
            EB_SLOTFRAME_ID,
            LinkOptions::TX,
            LinkType::AdvertisingOnly,
            LinkPeer::Broadcast,
            self.eb_timeslot(self.node_index),
            EB_CHANNEL_OFFSET,
        )?;

        if let Some(period) = cfg.common_shared_period {
            store.add_slotframe(guard, COMMON_SHARED_SLOTFRAME_ID, period)?;
            store.add_or_update_link(
                guard,
                COMMON_SHARED_SLOTFRAME_ID,
                LinkOptions::RX | LinkOptions::TX | LinkOptions::SHARED,
                LinkType::Normal,
                LinkPeer::Broadcast,
                0,
                COMMON_SHARED_CHANNEL_OFFSET,
            )?;
        }

        store.add_slotframe(guard, UNICAST_SLOTFRAME_ID, cfg.unicast_period)?;
        if let Some(period2) = cfg.unicast_period2 {
            store.add_slotframe(guard, UNICAST_SLOTFRAME2_ID, period2)?;
        }

        match cfg.mode {
            OrchestraMode::SenderBased => self.install_static_links(store, guard)?,
            OrchestraMode::ReceiverBased => {
                let own = self.slot_for_index(self.node_index);
                store.add_or_update_link(
                    guard,
                    own.frame,
                    LinkOptions::RX,
                    LinkType::Normal,
                    LinkPeer::None,
                    own.timeslot,
                    own.channel_offset,
                )?;
            }
        }

        info!(
            node_index = self.node_index,
            mode = ?cfg.mode,
            eb_period = cfg.eb_period,
            unicast_period = cfg.unicast_period,
            lifetime_slots = self.lifetime_slots,
            links = store.link_count(),
            "orchestra initialised"
        );
        Ok(())
    }

    fn install_static_links(
        &self,
        store: &mut ScheduleStore,
        guard: &LockGuard<'_>,
    ) -> Result<(), ScheduleError> {
        for entry in &self.config.static_links {
            let options = if entry.tx_index == self.node_index {
                LinkOptions::RX | LinkOptions::TX | LinkOptions::SHARED
            } else if entry.rx_index == self.node_index {
                LinkOptions::RX
            } else {
                continue;
            };
            store.add_or_update_link(
                guard,
                UNICAST_SLOTFRAME_ID,
                options,
                LinkType::Normal,
                LinkPeer::Broadcast,
                entry.timeslot,
                UNICAST_CHANNEL_OFFSET,
            )?;
        }
        Ok(())
    }

    // ── Packet events ─────────────────────────────────────────────────────────

    /// A unicast frame from `packet.sender` was received.
    pub fn on_packet_received(
        &self,
        store: &mut ScheduleStore,
        guard: &LockGuard<'_>,
        lookup: &impl NodeIndexLookup,
        packet: &PacketInfo,
        now: Asn,
    ) -> Result<(), ScheduleError> {
        if packet.is_control {
            return Ok(());
        }

        // Sweep first: stale leases must free their cells even when the
        // pool is too full for the merge below.
        self.expire_leases(store, guard, now);

        let unicast = lookup.id_from_addr(&packet.receiver).is_some();
        if unicast && self.config.mode == OrchestraMode::SenderBased {
            if let Some(src_index) = lookup.index_from_addr(&packet.sender) {
                let slot = self.slot_for_index(src_index);
                self.merge_link(store, guard, slot, LinkOptions::RX, None, Direction::Rx, now)?;
            } else {
                debug!(sender = %packet.sender, "no index for sender, rx not scheduled");
            }
        }
        Ok(())
    }

    /// A unicast frame to `packet.receiver` completed with `status`.
    pub fn on_packet_sent(
        &self,
        store: &mut ScheduleStore,
        guard: &LockGuard<'_>,
        lookup: &impl NodeIndexLookup,
        packet: &PacketInfo,
        status: TxStatus,
        now: Asn,
    ) -> Result<(), ScheduleError> {
        if packet.is_control {
            return Ok(());
        }

        self.expire_leases(store, guard, now);

        let dest_index = lookup.index_from_addr(&packet.receiver);
        if let (Some(dest_index), TxStatus::Ok) = (dest_index, status) {
            let mut options = LinkOptions::TX;
            if self.config.unicast_shared {
                options |= LinkOptions::SHARED;
            }
            let slot = match self.config.mode {
                OrchestraMode::SenderBased => self.slot_for_index(self.node_index),
                OrchestraMode::ReceiverBased => self.slot_for_index(dest_index),
            };
            let peer = LinkPeer::Unicast(packet.receiver);
            self.merge_link(store, guard, slot, options, Some(peer), Direction::Tx, now)?;
        }
        Ok(())
    }

    /// Add `options` to the link at `slot`, creating it if needed, and
    /// stamp the lease for `direction`.
    ///
    /// `peer == None` keeps the existing link's peer (or none for a new link).
    #[allow(clippy::too_many_arguments)]
    fn merge_link(
        &self,
        store: &mut ScheduleStore,
        guard: &LockGuard<'_>,
        slot: UnicastSlot,
        options: LinkOptions,
        peer: Option<LinkPeer>,
        direction: Direction,
        now: Asn,
    ) -> Result<(), ScheduleError> {
        let existing = store
            .lookup_by_timeslot(slot.frame, slot.timeslot)
            .map(|l| (l.options(), l.peer()));

        let (merged, target_peer) = match existing {
            None => (options, peer.unwrap_or(LinkPeer::None)),
            Some((old_options, old_peer)) => (old_options | options, peer.unwrap_or(old_peer)),
        };

        if existing != Some((merged, target_peer)) {
            store.add_or_update_link(
                guard,
                slot.frame,
                merged,
                LinkType::Normal,
                target_peer,
                slot.timeslot,
                slot.channel_offset,
            )?;
            debug!(
                frame = slot.frame,
                timeslot = slot.timeslot,
                options = ?merged,
                peer = ?target_peer,
                ?direction,
                "orchestra link merged"
            );
        }

        let Some(link) = store.link_mut(slot.frame, slot.timeslot) else {
            return Ok(());
        };
        if existing.is_none() {
            *link.extra_mut() = LinkExtra::OrchestraLease(LeaseTimestamps::fresh(now));
        } else if let Some(lease) = link.lease_mut() {
            match direction {
                Direction::Tx => lease.last_tx = now,
                Direction::Rx => lease.last_rx = now,
            }
        }
        Ok(())
    }

    // ── Lease maintenance ─────────────────────────────────────────────────────

    fn is_stale(&self, now: Asn, last: Asn) -> bool {
        now.diff(last) as i64 > self.lifetime_slots as i64
    }

    fn expiry_for(&self, now: Asn, options: LinkOptions, peer: LinkPeer, lease: &LeaseTimestamps) -> Option<Expiry> {
        let tx_stale = self.is_stale(now, lease.last_tx);
        let rx_stale = self.is_stale(now, lease.last_rx);
        let directions = LinkOptions::TX | LinkOptions::RX;

        let downgrade = |remaining: LinkOptions, peer: LinkPeer| {
            if remaining.intersects(directions) {
                Expiry::Downgrade {
                    options: remaining,
                    peer,
                }
            } else {
                Expiry::Remove
            }
        };

        match (tx_stale, rx_stale) {
            (true, true) => Some(Expiry::Remove),
            (true, false) if options.contains(LinkOptions::TX) => Some(downgrade(
                options.without(LinkOptions::TX | LinkOptions::SHARED),
                LinkPeer::None,
            )),
            (false, true) if options.contains(LinkOptions::RX) => {
                Some(downgrade(options.without(LinkOptions::RX), peer))
            }
            _ => None,
        }
    }

    /// Remove or downgrade leased links whose lease ran out.  Returns the
    /// number of links changed.
    pub fn expire_leases(&self, store: &mut ScheduleStore, guard: &LockGuard<'_>, now: Asn) -> usize {
        let mut changed = 0;
        for frame in self.unicast_frames() {
            let Some(sf) = store.slotframe(frame) else {
                continue;
            };
            let pending: Vec<(u16, u16, Expiry)> = sf
                .links()
                .filter_map(|l| {
                    let lease = l.lease()?;
                    self.expiry_for(now, l.options(), l.peer(), lease)
                        .map(|e| (l.timeslot(), l.channel_offset(), e))
                })
                .collect();

            for (timeslot, channel_offset, expiry) in pending {
                let applied = match expiry {
                    Expiry::Remove => {
                        debug!(frame, timeslot, "orchestra lease expired, link removed");
                        store.remove_link_at(guard, frame, timeslot).map(|_| ())
                    }
                    Expiry::Downgrade { options, peer } => {
                        debug!(frame, timeslot, ?options, "orchestra lease expired, link downgraded");
                        store
                            .add_or_update_link(
                                guard,
                                frame,
                                options,
                                LinkType::Normal,
                                peer,
                                timeslot,
                                channel_offset,
                            )
                            .map(|_| ())
                    }
                };
                if applied.is_ok() {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Restart every lease at `now`, so links survive a resynchronisation
    /// and age out normally afterwards.
    pub fn on_network_joined(&self, store: &mut ScheduleStore, now: Asn) {
        let mut refreshed = 0usize;
        for frame in self.unicast_frames() {
            let Some(timeslots) = store.slotframe(frame).map(|sf| sf.timeslots()) else {
                continue;
            };
            for timeslot in timeslots {
                if let Some(lease) = store.link_mut(frame, timeslot).and_then(|l| l.lease_mut()) {
                    *lease = LeaseTimestamps::fresh(now);
                    refreshed += 1;
                }
            }
        }
        info!(asn = %now, refreshed, "network joined, leases restarted");
    }

    /// Move the beacon RX link from the old time source's slot to the new
    /// one's.  The node's own EB transmit slot is never touched.
    pub fn on_time_source_changed(
        &self,
        store: &mut ScheduleStore,
        guard: &LockGuard<'_>,
        lookup: &impl NodeIndexLookup,
        old: Option<&LinkAddr>,
        new: Option<&LinkAddr>,
    ) -> Result<(), ScheduleError> {
        let old_index = old.and_then(|a| lookup.index_from_addr(a));
        let new_index = new.and_then(|a| lookup.index_from_addr(a));
        if old_index == new_index {
            return Ok(());
        }

        let own_slot = self.eb_timeslot(self.node_index);

        if let Some(index) = old_index {
            let timeslot = self.eb_timeslot(index);
            if timeslot != own_slot {
                store.remove_link_at(guard, EB_SLOTFRAME_ID, timeslot)?;
                debug!(old_index = index, timeslot, "stopped listening to old time source EBs");
            }
        }

        if let Some(index) = new_index {
            let timeslot = self.eb_timeslot(index);
            if timeslot == own_slot {
                debug!(new_index = index, "time source shares our EB slot, no rx link added");
            } else {
                store.add_or_update_link(
                    guard,
                    EB_SLOTFRAME_ID,
                    LinkOptions::RX,
                    LinkType::AdvertisingOnly,
                    LinkPeer::None,
                    timeslot,
                    EB_CHANNEL_OFFSET,
                )?;
                info!(new_index = index, timeslot, "listening to new time source EBs");
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
