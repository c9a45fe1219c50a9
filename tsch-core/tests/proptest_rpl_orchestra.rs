/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Property-based tests for the RPL objective functions and Orchestra leases.
//!
//! These tests verify metric bounds and convergence under long feedback
//! sequences, the DAG ordering, and that lease sweeps settle in one pass.

use proptest::prelude::*;
use tsch_core::asn::Asn;
use tsch_core::node::{LinkAddr, NodeDirectory};
use tsch_core::orchestra::{Orchestra, OrchestraConfig, PacketInfo, UNICAST_SLOTFRAME_ID};
use tsch_core::rpl::pdr::PDR_ONE;
use tsch_core::rpl::{
    best_dag, select_parent, Dag, HopEtx, ObjectiveFunction, Parent, Pdr, RplError, TxStatus,
    DEFAULT_ETX_THRESHOLD, ETX_DIVISOR, INFINITE_RANK,
};
use tsch_core::schedule::{NoopRadio, ScheduleError, ScheduleLock, ScheduleStore};

fn status_strategy() -> impl Strategy<Value = TxStatus> {
    prop_oneof![Just(TxStatus::Ok), Just(TxStatus::NoAck)]
}

fn etx() -> ObjectiveFunction {
    ObjectiveFunction::HopEtx(HopEtx::default())
}

fn pdr() -> ObjectiveFunction {
    ObjectiveFunction::Pdr(Pdr::default())
}

// ─── ETX Link Metric ─────────────────────────────────────────────────────────

proptest! {
    /// The ETX estimate stays between one transmission and the NOACK
    /// penalty for any mix of outcomes with up to 16 attempts.
    #[test]
    fn etx_stays_bounded(
        feedback in proptest::collection::vec((status_strategy(), 1u16..=16), 1..200),
    ) {
        let of = etx();
        let mut parent = of.new_parent(LinkAddr::from_node_id(2), 256);
        for (status, numtx) in feedback {
            of.on_link_feedback(&mut parent, status, numtx);
            prop_assert!(parent.link_metric >= ETX_DIVISOR);
            prop_assert!(parent.link_metric <= 16 * ETX_DIVISOR);
        }
    }

    /// Repeated NOACKs never improve the estimate.
    #[test]
    fn etx_noack_is_monotone(count in 1usize..300, numtx in 1u16..=16) {
        let of = etx();
        let mut parent = of.new_parent(LinkAddr::from_node_id(2), 256);
        prop_assert_eq!(parent.link_metric, ETX_DIVISOR);
        for _ in 0..count {
            let before = parent.link_metric;
            of.on_link_feedback(&mut parent, TxStatus::NoAck, numtx);
            prop_assert!(parent.link_metric >= before);
        }
    }
}

// ─── PDR Link Metric ─────────────────────────────────────────────────────────

proptest! {
    /// Single-attempt successes push the PDR up to its integer fixed point
    /// and never past `PDR_ONE`.
    #[test]
    fn pdr_converges_under_success(start in 0u16..=u16::MAX, count in 1usize..1_000) {
        let of = pdr();
        let mut parent = of.new_parent(LinkAddr::from_node_id(2), 256);
        parent.link_metric = start;
        for _ in 0..count {
            let before = parent.link_metric;
            of.on_link_feedback(&mut parent, TxStatus::Ok, 1);
            prop_assert!(parent.link_metric >= before);
            prop_assert!(parent.link_metric as u32 <= PDR_ONE);
        }
        if count >= 900 {
            prop_assert!(parent.link_metric >= 65_486);
        }
    }

    /// Failures only ever lower the PDR.
    #[test]
    fn pdr_decays_under_failure(
        start in 0u16..=u16::MAX,
        feedback in proptest::collection::vec(1u16..=8, 1..400),
    ) {
        let of = pdr();
        let mut parent = of.new_parent(LinkAddr::from_node_id(2), 256);
        parent.link_metric = start;
        for numtx in feedback {
            let before = parent.link_metric;
            of.on_link_feedback(&mut parent, TxStatus::NoAck, numtx);
            prop_assert!(parent.link_metric <= before);
        }
    }

    /// PDR rank never drops below the plain hop increment over the parent.
    #[test]
    fn pdr_rank_respects_hop_floor(rank in 0u16..INFINITE_RANK, metric in 0u16..=u16::MAX) {
        let of = pdr();
        let mut parent = of.new_parent(LinkAddr::from_node_id(2), rank);
        parent.link_metric = metric;
        let computed = of.calculate_rank(Some(&parent), 0);
        prop_assert!(computed >= rank.saturating_add(of.min_hoprankinc()));
    }
}

// ─── DAG Ordering ────────────────────────────────────────────────────────────

fn dag_strategy() -> impl Strategy<Value = Dag> {
    (any::<bool>(), 0u8..4, any::<u16>()).prop_map(|(grounded, preference, rank)| Dag {
        grounded,
        preference,
        rank,
        ..Dag::default()
    })
}

fn key(d: &Dag) -> (bool, u8, u16) {
    (d.grounded, d.preference, d.rank)
}

proptest! {
    /// The winner does not depend on argument order, except between DAGs
    /// that compare equal.
    #[test]
    fn best_dag_is_antisymmetric(a in dag_strategy(), b in dag_strategy()) {
        let ab = key(best_dag(&a, &b));
        let ba = key(best_dag(&b, &a));
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn best_dag_is_transitive(a in dag_strategy(), b in dag_strategy(), c in dag_strategy()) {
        let ab = best_dag(&a, &b);
        let bc = best_dag(&b, &c);
        if key(ab) == key(&a) && key(bc) == key(&b) {
            prop_assert_eq!(key(best_dag(&a, &c)), key(&a));
        }
    }
}

// ─── Parent Selection ────────────────────────────────────────────────────────

fn parent_strategy() -> impl Strategy<Value = Parent> {
    (1u8..=32, prop_oneof![3 => 1u16..1_024, 1 => Just(INFINITE_RANK)], 128u16..=2048).prop_map(
        |(id, rank, link_metric)| Parent {
            addr: LinkAddr::from_node_id(id),
            rank,
            link_metric,
            tx_count: 0,
            advertised_path_metric: 0,
        },
    )
}

proptest! {
    /// An infinite-rank neighbor is never chosen, and selection only fails
    /// when no finite neighbor exists.
    #[test]
    fn select_parent_picks_finite(parents in proptest::collection::vec(parent_strategy(), 0..12)) {
        let any_finite = parents.iter().any(|p| p.rank != INFINITE_RANK);
        match select_parent(&parents, DEFAULT_ETX_THRESHOLD) {
            Ok(chosen) => {
                prop_assert!(any_finite);
                prop_assert_ne!(chosen.rank, INFINITE_RANK);
            }
            Err(e) => {
                prop_assert!(!any_finite);
                prop_assert_eq!(e, RplError::NoEligibleParent);
            }
        }
    }
}

// ─── Orchestra Lease Sweeps ──────────────────────────────────────────────────

const OWN_ID: u8 = 5;

#[derive(Debug, Clone)]
struct Event {
    sent: bool,
    peer: u8,
    status: TxStatus,
    advance: u32,
}

fn event_strategy() -> impl Strategy<Value = Event> {
    (any::<bool>(), 1u8..=40, status_strategy(), 0u32..3_000).prop_map(
        |(sent, peer, status, advance)| Event {
            sent,
            peer,
            status,
            advance,
        },
    )
}

proptest! {
    /// A second sweep at the same ASN finds nothing left to change, and no
    /// leased link outlives its lease in both directions.
    #[test]
    fn lease_sweep_is_idempotent(
        events in proptest::collection::vec(event_strategy(), 1..60),
        settle in 0u32..20_000,
    ) {
        let lock = ScheduleLock::new(Box::new(NoopRadio));
        let guard = lock.acquire();
        let mut store = ScheduleStore::new(4, 64);
        let directory = NodeDirectory::default();
        let orchestra = Orchestra::new(OrchestraConfig::default(), OWN_ID as u16, 15_000).unwrap();
        orchestra.init(&mut store, &guard).unwrap();

        let own = LinkAddr::from_node_id(OWN_ID);
        let mut now = Asn::default();
        for event in events {
            now.increment(event.advance);
            let peer = LinkAddr::from_node_id(event.peer);
            if event.sent {
                let packet = PacketInfo { sender: own, receiver: peer, is_control: false };
                orchestra
                    .on_packet_sent(&mut store, &guard, &directory, &packet, event.status, now)
                    .unwrap();
            } else {
                let packet = PacketInfo { sender: peer, receiver: own, is_control: false };
                orchestra
                    .on_packet_received(&mut store, &guard, &directory, &packet, now)
                    .unwrap();
            }
        }

        now.increment(settle);
        orchestra.expire_leases(&mut store, &guard, now);
        prop_assert_eq!(orchestra.expire_leases(&mut store, &guard, now), 0);

        let lifetime = orchestra.lifetime_slots() as i32;
        for frame in orchestra.unicast_frames() {
            let Some(sf) = store.slotframe(frame) else { continue };
            for link in sf.links() {
                if let Some(lease) = link.lease() {
                    let freshest = now.diff(lease.last_tx).min(now.diff(lease.last_rx));
                    prop_assert!(freshest <= lifetime);
                }
            }
        }
    }
}

proptest! {
    /// With a link pool too small for every neighbor, each packet event still
    /// sweeps: right after it, no leased link is stale in both directions.
    /// A merge may fail with `ScheduleFull`, but only once every leased
    /// cell is still live.
    #[test]
    fn packet_events_sweep_in_a_full_pool(
        events in proptest::collection::vec(event_strategy(), 1..60),
        spare in 1usize..4,
    ) {
        let lock = ScheduleLock::new(Box::new(NoopRadio));
        let guard = lock.acquire();
        // EB link + shared cell, then `spare` unicast cells
        let mut store = ScheduleStore::new(4, 2 + spare);
        let directory = NodeDirectory::default();
        let orchestra = Orchestra::new(OrchestraConfig::default(), OWN_ID as u16, 15_000).unwrap();
        orchestra.init(&mut store, &guard).unwrap();
        let lifetime = orchestra.lifetime_slots() as i32;

        let own = LinkAddr::from_node_id(OWN_ID);
        let mut now = Asn::default();
        for event in events {
            now.increment(event.advance);
            let peer = LinkAddr::from_node_id(event.peer);
            let result = if event.sent {
                let packet = PacketInfo { sender: own, receiver: peer, is_control: false };
                orchestra.on_packet_sent(&mut store, &guard, &directory, &packet, event.status, now)
            } else {
                let packet = PacketInfo { sender: peer, receiver: own, is_control: false };
                orchestra.on_packet_received(&mut store, &guard, &directory, &packet, now)
            };
            prop_assert!(
                matches!(result, Ok(()) | Err(ScheduleError::ScheduleFull { .. })),
                "unexpected result {:?}",
                result
            );
            prop_assert!(store.link_count() <= store.max_links());

            let sf = store.slotframe(UNICAST_SLOTFRAME_ID).unwrap();
            for link in sf.links() {
                if let Some(lease) = link.lease() {
                    let freshest = now.diff(lease.last_tx).min(now.diff(lease.last_rx));
                    prop_assert!(freshest <= lifetime);
                }
            }
        }
    }
}
