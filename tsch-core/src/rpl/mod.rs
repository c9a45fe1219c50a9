/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! RPL objective functions.
//!
//! An objective function turns per-transmission link feedback into a link
//! metric, derives a routing rank from a candidate parent, and ranks parents
//! and DAGs against each other.  Two variants are provided:
//!
//! * [`HopEtx`]: ETX link metric, hop-count rank, two-phase
//!   [`select_parent`] scan.
//! * [`Pdr`]: packet-delivery-ratio link metric, loss-rate rank,
//!   pairwise [`best_parent`](ObjectiveFunction::best_parent) with an
//!   optional hysteresis band.
//!
//! The variant is fixed when the node is configured, so dispatch is a plain
//! `match` over [`ObjectiveFunction`].
//!
//! ```text
//! on_tx_outcome ──► on_link_feedback ──► Parent.link_metric
//!                                              │
//!                   reselect_parent ◄──────────┘
//!                         │
//!                         ├─► Dag.preferred_parent / Dag.rank
//!                         └─► update_metric_container ──► MetricContainer
//! ```

pub mod error;
pub mod hop_etx;
pub mod pdr;

pub use error::RplError;
pub use hop_etx::{select_parent, HopEtx};
pub use pdr::Pdr;

use tracing::{debug, info, warn};

use crate::node::LinkAddr;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Routing rank.
pub type Rank = u16;

pub const INFINITE_RANK: Rank = 0xFFFF;

/// Fixed-point scale of ETX values (`1.0 ETX == 128`).
pub const ETX_DIVISOR: u16 = 128;

/// Path cost reported when there is no parent, in whole ETX units.
pub const MAX_PATH_COST: u16 = 100;

pub const DEFAULT_MIN_HOPRANKINC: u16 = 1;

/// Default phase-2 band of the ETX-hop parent scan: half an ETX.
pub const DEFAULT_ETX_THRESHOLD: u16 = ETX_DIVISOR / 2;

/// Objective code point both variants advertise.
pub const OBJECTIVE_CODE_POINT: u16 = 1;

// Metric container wire constants.
pub const MC_TYPE_NONE: u8 = 0;
pub const MC_TYPE_ENERGY: u8 = 2;
pub const MC_TYPE_ETX: u8 = 7;
pub const MC_FLAG_P: u8 = 0x8;
pub const MC_AGGR_ADDITIVE: u8 = 0;
const MC_ENERGY_TYPE_SHIFT: u8 = 1;

// ── Feedback ──────────────────────────────────────────────────────────────────

/// Outcome of one MAC transmission, as reported after retransmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Ok,
    NoAck,
    /// Collision or other transmission error; never changes the metric.
    Other,
}

impl TxStatus {
    fn updates_metric(self) -> bool {
        matches!(self, TxStatus::Ok | TxStatus::NoAck)
    }
}

// ── Neighbors ─────────────────────────────────────────────────────────────────

/// A candidate parent and the link statistics kept for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub addr: LinkAddr,
    /// Rank the neighbor advertises.
    pub rank: Rank,
    /// ETX (ETX-hop) or PDR (PDR variant), in the variant's fixed point.
    pub link_metric: u16,
    /// Transmissions recorded towards this neighbor.
    pub tx_count: u16,
    /// Path metric the neighbor advertised in its own metric container.
    pub advertised_path_metric: u16,
}

impl Parent {
    pub fn is_finite(&self) -> bool {
        self.rank != INFINITE_RANK
    }
}

/// Neighbor table in insertion order.
///
/// Scan order matters: on ties the earlier neighbor keeps its place.
#[derive(Debug, Clone, Default)]
pub struct ParentTable {
    parents: Vec<Parent>,
}

impl ParentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `parent.addr`, returning the old one.
    pub fn insert(&mut self, parent: Parent) -> Option<Parent> {
        match self.parents.iter_mut().find(|p| p.addr == parent.addr) {
            Some(slot) => Some(std::mem::replace(slot, parent)),
            None => {
                self.parents.push(parent);
                None
            }
        }
    }

    pub fn get(&self, addr: &LinkAddr) -> Option<&Parent> {
        self.parents.iter().find(|p| p.addr == *addr)
    }

    pub fn get_mut(&mut self, addr: &LinkAddr) -> Option<&mut Parent> {
        self.parents.iter_mut().find(|p| p.addr == *addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parent> {
        self.parents.iter()
    }

    /// Neighbors advertising a finite rank.
    pub fn finite_rank(&self) -> impl Iterator<Item = &Parent> {
        self.parents.iter().filter(|p| p.is_finite())
    }

    pub fn as_slice(&self) -> &[Parent] {
        &self.parents
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn clear(&mut self) {
        self.parents.clear();
    }
}

// ── DAG ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dag {
    pub grounded: bool,
    pub preference: u8,
    pub rank: Rank,
    pub joined: bool,
    pub preferred_parent: Option<LinkAddr>,
}

impl Default for Dag {
    fn default() -> Self {
        Self {
            grounded: false,
            preference: 0,
            rank: INFINITE_RANK,
            joined: false,
            preferred_parent: None,
        }
    }
}

/// Pick the better of two DAGs: grounded first, then higher preference,
/// then lower rank.  A full tie returns `d2`.
pub fn best_dag<'a>(d1: &'a Dag, d2: &'a Dag) -> &'a Dag {
    if d1.grounded != d2.grounded {
        return if d1.grounded { d1 } else { d2 };
    }
    if d1.preference != d2.preference {
        return if d1.preference > d2.preference { d1 } else { d2 };
    }
    if d1.rank < d2.rank {
        d1
    } else {
        d2
    }
}

// ── Metric container ──────────────────────────────────────────────────────────

/// Which metric object the node advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricContainerKind {
    #[default]
    None,
    Etx,
    Energy,
}

impl MetricContainerKind {
    fn type_code(self) -> u8 {
        match self {
            MetricContainerKind::None => MC_TYPE_NONE,
            MetricContainerKind::Etx => MC_TYPE_ETX,
            MetricContainerKind::Energy => MC_TYPE_ENERGY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyType {
    Mains = 0,
    Battery = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricObject {
    #[default]
    Empty,
    Etx(u16),
    Energy { flags: u8, estimate: u16 },
}

/// DAG metric container carried in outgoing DIOs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricContainer {
    pub kind: MetricContainerKind,
    pub type_code: u8,
    pub flags: u8,
    pub aggregation: u8,
    pub precedence: u8,
    pub object: MetricObject,
}

impl MetricContainer {
    pub fn new(kind: MetricContainerKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

// ── ObjectiveFunction ─────────────────────────────────────────────────────────

/// Which objective function a node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectiveFunctionKind {
    HopEtx,
    #[default]
    Pdr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectiveFunction {
    HopEtx(HopEtx),
    Pdr(Pdr),
}

impl ObjectiveFunction {
    pub fn kind(&self) -> ObjectiveFunctionKind {
        match self {
            ObjectiveFunction::HopEtx(_) => ObjectiveFunctionKind::HopEtx,
            ObjectiveFunction::Pdr(_) => ObjectiveFunctionKind::Pdr,
        }
    }

    pub fn ocp(&self) -> u16 {
        OBJECTIVE_CODE_POINT
    }

    pub fn min_hoprankinc(&self) -> u16 {
        match self {
            ObjectiveFunction::HopEtx(of) => of.min_hoprankinc,
            ObjectiveFunction::Pdr(of) => of.min_hoprankinc,
        }
    }

    /// Link metric a freshly discovered neighbor starts with.
    pub fn initial_link_metric(&self) -> u16 {
        match self {
            ObjectiveFunction::HopEtx(_) => hop_etx::ETX_INIT_LINK_METRIC,
            ObjectiveFunction::Pdr(_) => pdr::PDR_INIT_LINK_METRIC,
        }
    }

    /// A neighbor entry seeded with this variant's initial link metric.
    pub fn new_parent(&self, addr: LinkAddr, rank: Rank) -> Parent {
        Parent {
            addr,
            rank,
            link_metric: self.initial_link_metric(),
            tx_count: 0,
            advertised_path_metric: 0,
        }
    }

    /// Neither variant keeps per-DAG state.
    pub fn reset(&self, dag: &Dag) {
        debug!(rank = dag.rank, "objective function reset");
    }

    /// Fold one transmission outcome into `parent`'s link metric.
    ///
    /// Only `Ok` and `NoAck` count; `tx_count` grows by `numtx` after the
    /// metric update, so the update sees the count before this feedback.
    pub fn on_link_feedback(&self, parent: &mut Parent, status: TxStatus, numtx: u16) {
        if !status.updates_metric() {
            debug!(neighbor = %parent.addr, ?status, "feedback ignored");
            return;
        }
        let before = parent.link_metric;
        match self {
            ObjectiveFunction::HopEtx(of) => of.link_feedback(parent, status, numtx),
            ObjectiveFunction::Pdr(of) => of.link_feedback(parent, status, numtx),
        }
        parent.tx_count = parent.tx_count.saturating_add(numtx);
        debug!(
            neighbor = %parent.addr,
            ?status,
            numtx,
            from = before,
            to = parent.link_metric,
            "link metric updated"
        );
    }

    pub fn calculate_rank(&self, parent: Option<&Parent>, base_rank: Rank) -> Rank {
        match self {
            ObjectiveFunction::HopEtx(of) => of.calculate_rank(parent, base_rank),
            ObjectiveFunction::Pdr(of) => of.calculate_rank(parent, base_rank),
        }
    }

    /// Pairwise parent preference.
    ///
    /// The ETX-hop variant answers `None`: it selects through
    /// [`select_parent`] instead.
    pub fn best_parent<'a>(
        &self,
        dag: &Dag,
        p1: &'a Parent,
        p2: &'a Parent,
    ) -> Option<&'a Parent> {
        match self {
            ObjectiveFunction::HopEtx(of) => of.best_parent(p1, p2),
            ObjectiveFunction::Pdr(of) => Some(of.best_parent(dag, p1, p2)),
        }
    }

    pub fn best_dag<'a>(&self, d1: &'a Dag, d2: &'a Dag) -> &'a Dag {
        best_dag(d1, d2)
    }

    /// ETX-scaled path cost through `parent`, saturating.
    pub fn calculate_path_metric(&self, parent: Option<&Parent>) -> u16 {
        let Some(parent) = parent else {
            return MAX_PATH_COST.saturating_mul(ETX_DIVISOR);
        };
        let link_etx = match self {
            ObjectiveFunction::HopEtx(_) => parent.link_metric as u32,
            ObjectiveFunction::Pdr(_) => pdr::pdr_to_etx(parent.link_metric),
        };
        let total = parent.advertised_path_metric as u32 + link_etx;
        u16::try_from(total).unwrap_or(u16::MAX)
    }

    /// Refresh `mc` for an outgoing DIO.
    ///
    /// The header fields are always stamped.  The metric object is only
    /// written when `dag` is joined.
    ///
    /// # Errors
    /// [`RplError::NotJoined`] when the DAG is not joined yet.
    pub fn update_metric_container(
        &self,
        dag: &Dag,
        preferred_parent: Option<&Parent>,
        mc: &mut MetricContainer,
    ) -> Result<(), RplError> {
        mc.type_code = mc.kind.type_code();
        if mc.kind == MetricContainerKind::None {
            return Ok(());
        }
        mc.flags = MC_FLAG_P;
        mc.aggregation = MC_AGGR_ADDITIVE;
        mc.precedence = 0;

        if !dag.joined {
            return Err(RplError::NotJoined);
        }

        let is_root = dag.rank == self.min_hoprankinc();
        let path_metric = if is_root {
            0
        } else {
            self.calculate_path_metric(preferred_parent)
        };

        mc.object = match mc.kind {
            MetricContainerKind::Etx => MetricObject::Etx(path_metric),
            MetricContainerKind::Energy => {
                let energy = if is_root {
                    EnergyType::Mains
                } else {
                    EnergyType::Battery
                };
                MetricObject::Energy {
                    flags: (energy as u8) << MC_ENERGY_TYPE_SHIFT,
                    estimate: path_metric,
                }
            }
            MetricContainerKind::None => MetricObject::Empty,
        };
        debug!(
            path_metric,
            whole = path_metric / ETX_DIVISOR,
            "path metric to the root updated"
        );
        Ok(())
    }
}

// ── RplInstance ───────────────────────────────────────────────────────────────

/// One RPL instance: the current DAG, its metric container and the
/// objective function that drives both.
#[derive(Debug, Clone)]
pub struct RplInstance {
    pub dag: Dag,
    pub mc: MetricContainer,
    of: ObjectiveFunction,
}

impl RplInstance {
    pub fn new(of: ObjectiveFunction, mc_kind: MetricContainerKind) -> Self {
        let dag = Dag::default();
        of.reset(&dag);
        Self {
            dag,
            mc: MetricContainer::new(mc_kind),
            of,
        }
    }

    pub fn of(&self) -> &ObjectiveFunction {
        &self.of
    }

    pub fn root_rank(&self) -> Rank {
        self.of.min_hoprankinc()
    }

    pub fn is_root(&self) -> bool {
        self.dag.rank == self.root_rank()
    }

    /// Become the grounded root of the DAG.
    pub fn set_root(&mut self) {
        self.dag.rank = self.root_rank();
        self.dag.grounded = true;
        self.dag.joined = true;
        self.dag.preferred_parent = None;
        info!(rank = self.dag.rank, "DAG root");
    }

    /// Mark the DAG joined (or left); leaving resets rank and parent.
    pub fn set_joined(&mut self, joined: bool) {
        self.dag.joined = joined;
        if !joined {
            self.dag.rank = INFINITE_RANK;
            self.dag.preferred_parent = None;
            self.of.reset(&self.dag);
        }
    }

    /// Re-run parent selection over `table` and update the DAG.
    ///
    /// The root never selects a parent and returns `Ok(None)`.
    ///
    /// # Errors
    /// [`RplError::NoEligibleParent`] when no neighbor has a finite rank;
    /// the node then advertises an infinite rank.
    pub fn reselect_parent(&mut self, table: &ParentTable) -> Result<Option<LinkAddr>, RplError> {
        if self.is_root() {
            return Ok(None);
        }

        let chosen = match &self.of {
            ObjectiveFunction::HopEtx(of) => select_parent(table.as_slice(), of.threshold),
            ObjectiveFunction::Pdr(_) => {
                let mut best: Option<&Parent> = None;
                for candidate in table.finite_rank() {
                    best = Some(match best {
                        None => candidate,
                        Some(current) => self
                            .of
                            .best_parent(&self.dag, current, candidate)
                            .unwrap_or(current),
                    });
                }
                best.ok_or(RplError::NoEligibleParent)
            }
        };

        let parent = match chosen {
            Ok(parent) => parent,
            Err(err) => {
                if self.dag.preferred_parent.is_some() {
                    warn!(error = %err, "lost preferred parent");
                }
                self.dag.preferred_parent = None;
                self.dag.rank = INFINITE_RANK;
                return Err(err);
            }
        };

        let rank = self.of.calculate_rank(Some(parent), 0);
        if self.dag.preferred_parent != Some(parent.addr) {
            info!(
                parent = %parent.addr,
                parent_rank = parent.rank,
                link_metric = parent.link_metric,
                rank,
                "preferred parent changed"
            );
        }
        self.dag.preferred_parent = Some(parent.addr);
        self.dag.rank = rank;
        Ok(Some(parent.addr))
    }

    /// Refresh the instance's metric container from the preferred parent.
    ///
    /// # Errors
    /// [`RplError::NotJoined`] before the DAG is joined.
    pub fn update_metric_container(&mut self, table: &ParentTable) -> Result<(), RplError> {
        let parent = self
            .dag
            .preferred_parent
            .as_ref()
            .and_then(|addr| table.get(addr));
        self.of
            .update_metric_container(&self.dag, parent, &mut self.mc)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(id: u8, rank: Rank, link_metric: u16) -> Parent {
        Parent {
            addr: LinkAddr::from_node_id(id),
            rank,
            link_metric,
            tx_count: 0,
            advertised_path_metric: 0,
        }
    }

    fn dag(grounded: bool, preference: u8, rank: Rank) -> Dag {
        Dag {
            grounded,
            preference,
            rank,
            ..Dag::default()
        }
    }

    fn etx_of() -> ObjectiveFunction {
        ObjectiveFunction::HopEtx(HopEtx::default())
    }

    fn pdr_of() -> ObjectiveFunction {
        ObjectiveFunction::Pdr(Pdr::default())
    }

    // ── best_dag ──────────────────────────────────────────────────────────────

    #[test]
    fn grounded_dag_wins() {
        let a = dag(true, 0, 900);
        let b = dag(false, 7, 2);
        assert_eq!(best_dag(&a, &b), &a);
        assert_eq!(best_dag(&b, &a), &a);
    }

    #[test]
    fn preference_breaks_grounded_tie() {
        let a = dag(true, 1, 2);
        let b = dag(true, 3, 900);
        assert_eq!(best_dag(&a, &b), &b);
    }

    #[test]
    fn lower_rank_breaks_preference_tie_and_full_tie_returns_second() {
        let a = dag(false, 1, 10);
        let b = dag(false, 1, 20);
        assert_eq!(best_dag(&a, &b), &a);
        let c = dag(false, 1, 10);
        assert!(std::ptr::eq(best_dag(&a, &c), &c));
    }

    // ── feedback dispatch ─────────────────────────────────────────────────────

    #[test]
    fn other_status_changes_nothing() {
        let of = etx_of();
        let mut p = parent(1, 10, 300);
        of.on_link_feedback(&mut p, TxStatus::Other, 3);
        assert_eq!(p.link_metric, 300);
        assert_eq!(p.tx_count, 0);
    }

    #[test]
    fn tx_count_grows_after_metric_update() {
        let of = etx_of();
        let mut p = parent(1, 10, ETX_DIVISOR);
        // tx_count 0 → early alpha 70: (128*70 + 256*30)/100 = 166
        of.on_link_feedback(&mut p, TxStatus::Ok, 2);
        assert_eq!(p.link_metric, 166);
        assert_eq!(p.tx_count, 2);
    }

    #[test]
    fn new_parent_uses_variant_initial_metric() {
        let addr = LinkAddr::from_node_id(4);
        assert_eq!(etx_of().new_parent(addr, 5).link_metric, 128);
        assert_eq!(pdr_of().new_parent(addr, 5).link_metric, 64256);
    }

    // ── path metric and metric container ──────────────────────────────────────

    #[test]
    fn path_metric_without_parent_is_max_cost() {
        assert_eq!(etx_of().calculate_path_metric(None), 100 * 128);
    }

    #[test]
    fn etx_path_metric_adds_link_to_advertised() {
        let mut p = parent(1, 3, 200);
        p.advertised_path_metric = 300;
        assert_eq!(etx_of().calculate_path_metric(Some(&p)), 500);
    }

    #[test]
    fn pdr_path_metric_converts_to_etx() {
        // PDR 32767 is about 50 %, i.e. ETX 2.0
        let p = parent(1, 3, 32767);
        assert_eq!(pdr_of().calculate_path_metric(Some(&p)), 256);
    }

    #[test]
    fn metric_container_not_joined_only_stamps_header() {
        let of = etx_of();
        let mut mc = MetricContainer::new(MetricContainerKind::Etx);
        let err = of
            .update_metric_container(&Dag::default(), None, &mut mc)
            .unwrap_err();
        assert_eq!(err, RplError::NotJoined);
        assert_eq!(mc.type_code, MC_TYPE_ETX);
        assert_eq!(mc.flags, MC_FLAG_P);
        assert_eq!(mc.object, MetricObject::Empty);
    }

    #[test]
    fn metric_container_none_kind_sets_type_only() {
        let of = etx_of();
        let mut mc = MetricContainer::new(MetricContainerKind::None);
        of.update_metric_container(&Dag::default(), None, &mut mc)
            .unwrap();
        assert_eq!(mc.type_code, MC_TYPE_NONE);
        assert_eq!(mc.flags, 0);
    }

    #[test]
    fn root_advertises_zero_path_and_mains_energy() {
        let mut inst = RplInstance::new(etx_of(), MetricContainerKind::Energy);
        inst.set_root();
        inst.update_metric_container(&ParentTable::new()).unwrap();
        assert_eq!(
            inst.mc.object,
            MetricObject::Energy {
                flags: 0,
                estimate: 0
            }
        );
    }

    #[test]
    fn joined_node_advertises_parent_path() {
        let mut table = ParentTable::new();
        let mut p = parent(2, 1, 256);
        p.advertised_path_metric = 0;
        table.insert(p);

        let mut inst = RplInstance::new(etx_of(), MetricContainerKind::Etx);
        inst.set_joined(true);
        inst.reselect_parent(&table).unwrap();
        inst.update_metric_container(&table).unwrap();
        assert_eq!(inst.mc.object, MetricObject::Etx(256));
        assert_eq!(inst.dag.rank, 2);
    }

    // ── reselect_parent ───────────────────────────────────────────────────────

    #[test]
    fn no_finite_neighbor_leaves_node_unreachable() {
        let mut table = ParentTable::new();
        table.insert(parent(1, INFINITE_RANK, 128));
        let mut inst = RplInstance::new(pdr_of(), MetricContainerKind::None);
        assert_eq!(
            inst.reselect_parent(&table),
            Err(RplError::NoEligibleParent)
        );
        assert_eq!(inst.dag.rank, INFINITE_RANK);
        assert_eq!(inst.dag.preferred_parent, None);
    }

    #[test]
    fn pdr_reselect_picks_lowest_computed_rank() {
        let mut table = ParentTable::new();
        table.insert(parent(1, 1, 30_000));
        table.insert(parent(2, 1, 65_000));
        let mut inst = RplInstance::new(pdr_of(), MetricContainerKind::None);
        let chosen = inst.reselect_parent(&table).unwrap();
        assert_eq!(chosen, Some(LinkAddr::from_node_id(2)));
    }

    #[test]
    fn root_does_not_select() {
        let mut table = ParentTable::new();
        table.insert(parent(1, 1, 128));
        let mut inst = RplInstance::new(etx_of(), MetricContainerKind::None);
        inst.set_root();
        assert_eq!(inst.reselect_parent(&table), Ok(None));
    }

    #[test]
    fn parent_table_replaces_by_address() {
        let mut table = ParentTable::new();
        assert!(table.insert(parent(1, 10, 128)).is_none());
        let old = table.insert(parent(1, 20, 128)).unwrap();
        assert_eq!(old.rank, 10);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&LinkAddr::from_node_id(1)).unwrap().rank, 20);
    }
}
