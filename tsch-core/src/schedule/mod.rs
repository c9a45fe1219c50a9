/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Slotframe / link schedule store.
//!
//! [`ScheduleStore`] holds every installed [`Slotframe`], each of which owns
//! its [`Link`]s keyed by timeslot offset.  The slot-timing engine reads the
//! store once per slot through [`ScheduleStore::lookup_by_current_slot`];
//! Orchestra and the node context mutate it after a transmission or reception
//! completes.
//!
//! # Invariants
//! * At most one link per `(slotframe, timeslot)`: links live in a
//!   `BTreeMap<u16, Link>` keyed by timeslot.
//! * Every structural mutator takes a [`LockGuard`], i.e. it only runs while
//!   the [`ScheduleLock`] is held.
//! * `add_or_update_link` on an occupied timeslot updates the existing link
//!   in place: its [`LinkId`] and its [`LinkExtra`] metadata survive.
//! * A failed call leaves the store exactly as it was.
//!
//! # Design decisions vs the firmware schedule
//!
//! | Topic | Firmware | Rust |
//! |---|---|---|
//! | Link storage | linked list per slotframe, memb pool | `BTreeMap` per slotframe, capacity counter |
//! | Link identity | raw pointer | [`LinkId`] handle, preserved across updates |
//! | Per-link metadata | `void *data` | [`LinkExtra`] enum owned by the link |
//! | Lock discipline | convention | `&LockGuard` argument on every mutator |

pub mod error;
pub mod lock;

pub use error::ScheduleError;
pub use lock::{LockGuard, NoopRadio, RadioControl, RadioRequest, ScheduleLock};

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use tracing::{debug, info};

use crate::asn::{Asn, AsnDivisor};
use crate::node::LinkAddr;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default maximum number of installed slotframes.
pub const DEFAULT_MAX_SLOTFRAMES: usize = 4;

/// Default size of the link pool (`TSCH_MAX_LINKS`).
pub const DEFAULT_MAX_LINKS: usize = 32;

// ── Link attributes ───────────────────────────────────────────────────────────

/// Direction flags of a link: a subset of `{TX, RX, SHARED}`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkOptions(u8);

impl LinkOptions {
    pub const NONE: LinkOptions = LinkOptions(0);
    pub const TX: LinkOptions = LinkOptions(1 << 0);
    pub const RX: LinkOptions = LinkOptions(1 << 1);
    pub const SHARED: LinkOptions = LinkOptions(1 << 2);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: LinkOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: LinkOptions) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Flags in `self` that are not in `other`.
    #[must_use]
    pub const fn without(self, other: LinkOptions) -> LinkOptions {
        LinkOptions(self.0 & !other.0)
    }
}

impl BitOr for LinkOptions {
    type Output = LinkOptions;

    fn bitor(self, rhs: LinkOptions) -> LinkOptions {
        LinkOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for LinkOptions {
    fn bitor_assign(&mut self, rhs: LinkOptions) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for LinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let names = [
            (LinkOptions::TX, "TX"),
            (LinkOptions::RX, "RX"),
            (LinkOptions::SHARED, "SHARED"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// What kind of traffic a link carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    /// Data frames only.
    #[default]
    Normal,
    /// Data frames and enhanced beacons.
    Advertising,
    /// Enhanced beacons only.
    AdvertisingOnly,
}

/// Neighbor a link is dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPeer {
    /// Not bound to any neighbor.
    #[default]
    None,
    /// Any neighbor (broadcast cell).
    Broadcast,
    /// One specific neighbor.
    Unicast(LinkAddr),
}

impl LinkPeer {
    pub fn addr(&self) -> Option<&LinkAddr> {
        match self {
            LinkPeer::Unicast(addr) => Some(addr),
            _ => None,
        }
    }
}

/// Lease timestamps Orchestra attaches to the links it manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTimestamps {
    pub last_tx: Asn,
    pub last_rx: Asn,
}

impl LeaseTimestamps {
    /// A lease whose both directions were last used at `now`.
    pub fn fresh(now: Asn) -> Self {
        Self {
            last_tx: now,
            last_rx: now,
        }
    }
}

/// Metadata owned by a link on behalf of the subsystem that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkExtra {
    #[default]
    None,
    OrchestraLease(LeaseTimestamps),
}

/// Stable identity of a link, preserved across in-place updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u32);

impl LinkId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// A scheduled cell: one timeslot/channel-offset pair in a slotframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    id: LinkId,
    slotframe: u16,
    timeslot: u16,
    channel_offset: u16,
    options: LinkOptions,
    link_type: LinkType,
    peer: LinkPeer,
    extra: LinkExtra,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn slotframe(&self) -> u16 {
        self.slotframe
    }

    pub fn timeslot(&self) -> u16 {
        self.timeslot
    }

    pub fn channel_offset(&self) -> u16 {
        self.channel_offset
    }

    pub fn options(&self) -> LinkOptions {
        self.options
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn peer(&self) -> LinkPeer {
        self.peer
    }

    pub fn extra(&self) -> &LinkExtra {
        &self.extra
    }

    /// Metadata is not structural, so it may be edited without the lock.
    pub fn extra_mut(&mut self) -> &mut LinkExtra {
        &mut self.extra
    }

    /// The Orchestra lease, if one is attached.
    pub fn lease(&self) -> Option<&LeaseTimestamps> {
        match &self.extra {
            LinkExtra::OrchestraLease(ts) => Some(ts),
            LinkExtra::None => None,
        }
    }

    pub fn lease_mut(&mut self) -> Option<&mut LeaseTimestamps> {
        match &mut self.extra {
            LinkExtra::OrchestraLease(ts) => Some(ts),
            LinkExtra::None => None,
        }
    }
}

// ── Slotframe ─────────────────────────────────────────────────────────────────

/// A repeating cycle of `length` timeslots.
#[derive(Debug, Clone)]
pub struct Slotframe {
    id: u16,
    length: u16,
    divisor: AsnDivisor,
    links: BTreeMap<u16, Link>,
}

impl Slotframe {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    /// Timeslot offset active at `asn`.
    pub fn current_timeslot(&self, asn: Asn) -> u16 {
        asn.modulo(&self.divisor)
    }

    /// Links in ascending timeslot order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link_at(&self, timeslot: u16) -> Option<&Link> {
        self.links.get(&timeslot)
    }

    /// Timeslots currently occupied, ascending.
    pub fn timeslots(&self) -> Vec<u16> {
        self.links.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// One candidate link for the current slot and the slotframe it came from.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledLink<'a> {
    pub slotframe: u16,
    pub link: &'a Link,
}

// ── ScheduleStore ─────────────────────────────────────────────────────────────

/// All installed slotframes and their links.
#[derive(Debug)]
pub struct ScheduleStore {
    /// Slotframes by id; `BTreeMap` keeps lookups deterministic.
    slotframes: BTreeMap<u16, Slotframe>,
    max_slotframes: usize,
    max_links: usize,
    link_count: usize,
    next_link_id: u32,
}

impl ScheduleStore {
    /// Create an empty store with fixed slotframe and link capacities.
    pub fn new(max_slotframes: usize, max_links: usize) -> Self {
        Self {
            slotframes: BTreeMap::new(),
            max_slotframes,
            max_links,
            link_count: 0,
            next_link_id: 0,
        }
    }

    // ── Slotframes ────────────────────────────────────────────────────────────

    /// Install a new slotframe.
    ///
    /// # Errors
    /// * [`ScheduleError::DuplicateSlotframeId`] – `id` already exists.
    /// * [`ScheduleError::InvalidSlotframeLength`] – `length == 0`.
    /// * [`ScheduleError::ScheduleFull`] – slotframe pool exhausted.
    pub fn add_slotframe(
        &mut self,
        _guard: &LockGuard<'_>,
        id: u16,
        length: u16,
    ) -> Result<&Slotframe, ScheduleError> {
        if self.slotframes.contains_key(&id) {
            return Err(ScheduleError::DuplicateSlotframeId { id });
        }
        let divisor = AsnDivisor::new(length)
            .map_err(|_| ScheduleError::InvalidSlotframeLength { id, length })?;
        if self.slotframes.len() >= self.max_slotframes {
            return Err(ScheduleError::ScheduleFull {
                what: "slotframe",
                capacity: self.max_slotframes,
            });
        }

        info!(frame = id, length, "slotframe added");
        let sf = self.slotframes.entry(id).or_insert(Slotframe {
            id,
            length,
            divisor,
            links: BTreeMap::new(),
        });
        Ok(sf)
    }

    /// Remove a slotframe together with all of its links.
    pub fn remove_slotframe(
        &mut self,
        _guard: &LockGuard<'_>,
        id: u16,
    ) -> Result<Slotframe, ScheduleError> {
        let sf = self
            .slotframes
            .remove(&id)
            .ok_or(ScheduleError::UnknownSlotframe { id })?;
        self.link_count -= sf.links.len();
        info!(frame = id, links = sf.links.len(), "slotframe removed");
        Ok(sf)
    }

    /// Remove every slotframe (network leave).
    pub fn clear(&mut self, _guard: &LockGuard<'_>) {
        if !self.slotframes.is_empty() {
            info!(
                slotframes = self.slotframes.len(),
                links = self.link_count,
                "schedule cleared"
            );
        }
        self.slotframes.clear();
        self.link_count = 0;
    }

    pub fn slotframe(&self, id: u16) -> Option<&Slotframe> {
        self.slotframes.get(&id)
    }

    /// Slotframes in ascending id order.
    pub fn slotframes(&self) -> impl Iterator<Item = &Slotframe> {
        self.slotframes.values()
    }

    // ── Links ─────────────────────────────────────────────────────────────────

    /// Add a link, or update the one already occupying `timeslot` in place.
    ///
    /// An update overwrites options, type, peer and channel offset but keeps
    /// the link's [`LinkId`] and its [`LinkExtra`] metadata.
    ///
    /// # Errors
    /// * [`ScheduleError::UnknownSlotframe`]
    /// * [`ScheduleError::TimeslotOutOfRange`]
    /// * [`ScheduleError::ScheduleFull`] – only when a new link is needed.
    #[allow(clippy::too_many_arguments)]
    pub fn add_or_update_link(
        &mut self,
        _guard: &LockGuard<'_>,
        frame: u16,
        options: LinkOptions,
        link_type: LinkType,
        peer: LinkPeer,
        timeslot: u16,
        channel_offset: u16,
    ) -> Result<&Link, ScheduleError> {
        let sf = self
            .slotframes
            .get_mut(&frame)
            .ok_or(ScheduleError::UnknownSlotframe { id: frame })?;
        if timeslot >= sf.length {
            return Err(ScheduleError::TimeslotOutOfRange {
                frame,
                timeslot,
                length: sf.length,
            });
        }

        let link = match sf.links.entry(timeslot) {
            Entry::Occupied(entry) => {
                let link = entry.into_mut();
                link.options = options;
                link.link_type = link_type;
                link.peer = peer;
                link.channel_offset = channel_offset;
                debug!(
                    frame,
                    timeslot,
                    link = link.id.0,
                    ?options,
                    ?peer,
                    "link updated in place"
                );
                link
            }
            Entry::Vacant(entry) => {
                if self.link_count >= self.max_links {
                    return Err(ScheduleError::ScheduleFull {
                        what: "link",
                        capacity: self.max_links,
                    });
                }
                let id = LinkId(self.next_link_id);
                self.next_link_id = self.next_link_id.wrapping_add(1);
                self.link_count += 1;
                debug!(
                    frame,
                    timeslot,
                    channel_offset,
                    link = id.0,
                    ?options,
                    ?link_type,
                    ?peer,
                    "link added"
                );
                entry.insert(Link {
                    id,
                    slotframe: frame,
                    timeslot,
                    channel_offset,
                    options,
                    link_type,
                    peer,
                    extra: LinkExtra::None,
                })
            }
        };
        Ok(link)
    }

    /// Add a link, failing if `timeslot` is already occupied.
    ///
    /// # Errors
    /// [`ScheduleError::TimeslotOccupiedByIncompatibleLink`] plus everything
    /// [`add_or_update_link`](Self::add_or_update_link) can return.
    #[allow(clippy::too_many_arguments)]
    pub fn add_link_strict(
        &mut self,
        guard: &LockGuard<'_>,
        frame: u16,
        options: LinkOptions,
        link_type: LinkType,
        peer: LinkPeer,
        timeslot: u16,
        channel_offset: u16,
    ) -> Result<&Link, ScheduleError> {
        if self.lookup_by_timeslot(frame, timeslot).is_some() {
            return Err(ScheduleError::TimeslotOccupiedByIncompatibleLink { frame, timeslot });
        }
        self.add_or_update_link(
            guard,
            frame,
            options,
            link_type,
            peer,
            timeslot,
            channel_offset,
        )
    }

    /// Remove the link with handle `link` from `frame`.
    pub fn remove_link(
        &mut self,
        _guard: &LockGuard<'_>,
        frame: u16,
        link: LinkId,
    ) -> Result<Link, ScheduleError> {
        let sf = self
            .slotframes
            .get_mut(&frame)
            .ok_or(ScheduleError::UnknownSlotframe { id: frame })?;
        let timeslot = sf
            .links
            .values()
            .find(|l| l.id == link)
            .map(|l| l.timeslot)
            .ok_or(ScheduleError::UnknownLink {
                frame,
                link: link.0,
            })?;
        let removed = sf
            .links
            .remove(&timeslot)
            .ok_or(ScheduleError::UnknownLink {
                frame,
                link: link.0,
            })?;
        self.link_count -= 1;
        debug!(frame, timeslot, link = link.0, "link removed");
        Ok(removed)
    }

    /// Remove whatever link occupies `timeslot` in `frame`.
    ///
    /// Returns `Ok(None)` when the timeslot was already free.
    pub fn remove_link_at(
        &mut self,
        _guard: &LockGuard<'_>,
        frame: u16,
        timeslot: u16,
    ) -> Result<Option<Link>, ScheduleError> {
        let sf = self
            .slotframes
            .get_mut(&frame)
            .ok_or(ScheduleError::UnknownSlotframe { id: frame })?;
        let removed = sf.links.remove(&timeslot);
        if let Some(link) = &removed {
            self.link_count -= 1;
            debug!(frame, timeslot, link = link.id.0, "link removed");
        }
        Ok(removed)
    }

    pub fn lookup_by_timeslot(&self, frame: u16, timeslot: u16) -> Option<&Link> {
        self.slotframes.get(&frame)?.links.get(&timeslot)
    }

    /// Mutable access for metadata edits (see [`Link::extra_mut`]).
    pub fn link_mut(&mut self, frame: u16, timeslot: u16) -> Option<&mut Link> {
        self.slotframes.get_mut(&frame)?.links.get_mut(&timeslot)
    }

    /// Every link dedicated to `addr`, with its slotframe id.
    pub fn links_for_peer(&self, addr: &LinkAddr) -> Vec<ScheduledLink<'_>> {
        self.slotframes
            .values()
            .flat_map(|sf| sf.links.values())
            .filter(|l| l.peer.addr() == Some(addr))
            .map(|link| ScheduledLink {
                slotframe: link.slotframe,
                link,
            })
            .collect()
    }

    /// Candidate links for the slot at `asn`: at most one per slotframe,
    /// ascending slotframe id.
    ///
    /// Several slotframes may each contribute a link; choosing between them
    /// is the slot-timing engine's job.
    pub fn lookup_by_current_slot(&self, asn: Asn) -> Vec<ScheduledLink<'_>> {
        self.slotframes
            .values()
            .filter_map(|sf| {
                sf.links
                    .get(&sf.current_timeslot(asn))
                    .map(|link| ScheduledLink {
                        slotframe: sf.id,
                        link,
                    })
            })
            .collect()
    }

    /// Total number of links across all slotframes.
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    pub fn max_links(&self) -> usize {
        self.max_links
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SLOTFRAMES, DEFAULT_MAX_LINKS)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
