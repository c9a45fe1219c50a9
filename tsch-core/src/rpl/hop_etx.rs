/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! ETX-hop objective function.
//!
//! Link quality is tracked as an EWMA of the ETX, but rank is pure hop
//! count.  Parent choice is the two-phase [`select_parent`] scan.

use tracing::debug;

use super::{
    Parent, Rank, RplError, TxStatus, DEFAULT_ETX_THRESHOLD, DEFAULT_MIN_HOPRANKINC, ETX_DIVISOR,
    INFINITE_RANK,
};

const ETX_SCALE: u32 = 100;
const ETX_ALPHA: u32 = 90;
const ETX_EARLY_THRESHOLD: u16 = 2;
const ETX_EARLY_ALPHA: u32 = 70;

/// ETX charged for a transmission that was never acknowledged.
pub const NOACK_ETX_PENALTY: u16 = 16;

/// A new neighbor is assumed to deliver on the first attempt.
pub const ETX_INIT_LINK_METRIC: u16 = ETX_DIVISOR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopEtx {
    pub min_hoprankinc: u16,
    /// Width of the phase-2 link-metric band.
    pub threshold: u16,
}

impl Default for HopEtx {
    fn default() -> Self {
        Self {
            min_hoprankinc: DEFAULT_MIN_HOPRANKINC,
            threshold: DEFAULT_ETX_THRESHOLD,
        }
    }
}

impl HopEtx {
    pub(super) fn link_feedback(&self, parent: &mut Parent, status: TxStatus, numtx: u16) {
        let alpha = if parent.tx_count < ETX_EARLY_THRESHOLD {
            ETX_ALPHA.min(ETX_EARLY_ALPHA)
        } else {
            ETX_ALPHA
        };
        let packet_etx = match status {
            TxStatus::NoAck => NOACK_ETX_PENALTY as u32 * ETX_DIVISOR as u32,
            _ => numtx as u32 * ETX_DIVISOR as u32,
        };
        let recorded = parent.link_metric as u32;
        let new_etx = (recorded * alpha + packet_etx * (ETX_SCALE - alpha)) / ETX_SCALE;
        parent.link_metric = u16::try_from(new_etx).unwrap_or(u16::MAX);
    }

    pub(super) fn calculate_rank(&self, parent: Option<&Parent>, _base_rank: Rank) -> Rank {
        match parent {
            None => INFINITE_RANK,
            Some(p) => p.rank.saturating_add(self.min_hoprankinc),
        }
    }

    /// Unused by this variant.
    pub(super) fn best_parent<'a>(&self, _p1: &'a Parent, _p2: &'a Parent) -> Option<&'a Parent> {
        None
    }
}

/// Two-phase parent scan over `parents`, ignoring infinite-rank entries.
///
/// 1. Find the neighbor with the lowest link metric.
/// 2. Among neighbors whose link metric is below `best_link + threshold`,
///    pick the lowest rank.  The best-link neighbor is the starting
///    candidate, and earlier entries win ties.
///
/// The band is half-open, `[best_link, best_link + threshold)`: a neighbor
/// sitting exactly at `best_link + threshold` is outside it.
///
/// # Errors
/// [`RplError::NoEligibleParent`] when no neighbor has a finite rank.
pub fn select_parent(parents: &[Parent], threshold: u16) -> Result<&Parent, RplError> {
    let mut finite = parents.iter().filter(|p| p.is_finite());

    let mut best_link = finite.next().ok_or(RplError::NoEligibleParent)?;
    for p in finite {
        if p.link_metric < best_link.link_metric {
            best_link = p;
        }
    }

    let band = best_link.link_metric as u32 + threshold as u32;
    let mut best = best_link;
    for p in parents.iter().filter(|p| p.is_finite()) {
        if (p.link_metric as u32) < band && p.rank < best.rank {
            best = p;
        }
    }

    debug!(
        best_link = %best_link.addr,
        best_link_metric = best_link.link_metric,
        best_link_rank = best_link.rank,
        chosen = %best.addr,
        chosen_metric = best.link_metric,
        chosen_rank = best.rank,
        "two-phase parent scan"
    );
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LinkAddr;

    fn parent(id: u8, rank: Rank, link_metric: u16, tx_count: u16) -> Parent {
        Parent {
            addr: LinkAddr::from_node_id(id),
            rank,
            link_metric,
            tx_count,
            advertised_path_metric: 0,
        }
    }

    #[test]
    fn band_prefers_lower_rank_over_best_link() {
        let a = parent(0xA, 5, 50, 0);
        let b = parent(0xB, 10, 40, 0);
        let table = [a.clone(), b];
        let chosen = select_parent(&table, 15).unwrap();
        assert_eq!(chosen, &a);
    }

    #[test]
    fn neighbor_outside_band_is_ignored() {
        let a = parent(0xA, 5, 60, 0);
        let b = parent(0xB, 10, 40, 0);
        let table = [a, b.clone()];
        // 60 is not below 40 + 15
        assert_eq!(select_parent(&table, 15).unwrap(), &b);
    }

    #[test]
    fn band_upper_edge_is_exclusive() {
        let a = parent(0xA, 5, 55, 0);
        let b = parent(0xB, 10, 40, 0);
        let table = [a, b.clone()];
        assert_eq!(select_parent(&table, 15).unwrap(), &b);
    }

    #[test]
    fn infinite_rank_neighbors_never_win() {
        let a = parent(0xA, INFINITE_RANK, 1, 0);
        let b = parent(0xB, 10, 400, 0);
        let table = [a, b.clone()];
        assert_eq!(select_parent(&table, 64).unwrap(), &b);
    }

    #[test]
    fn all_infinite_is_an_error() {
        let table = [parent(0xA, INFINITE_RANK, 1, 0)];
        assert_eq!(select_parent(&table, 64), Err(RplError::NoEligibleParent));
        assert_eq!(select_parent(&[], 64), Err(RplError::NoEligibleParent));
    }

    #[test]
    fn early_phase_uses_faster_alpha() {
        let of = HopEtx::default();
        let mut p = parent(1, 1, 128, 0);
        of.link_feedback(&mut p, TxStatus::Ok, 3);
        // (128*70 + 384*30)/100
        assert_eq!(p.link_metric, 204);

        let mut settled = parent(1, 1, 128, 5);
        of.link_feedback(&mut settled, TxStatus::Ok, 3);
        // (128*90 + 384*10)/100
        assert_eq!(settled.link_metric, 153);
    }

    #[test]
    fn noack_charges_fixed_penalty() {
        let of = HopEtx::default();
        let mut p = parent(1, 1, 128, 10);
        of.link_feedback(&mut p, TxStatus::NoAck, 1);
        // (128*90 + 2048*10)/100
        assert_eq!(p.link_metric, 320);
    }

    #[test]
    fn rank_is_hop_count() {
        let of = HopEtx::default();
        assert_eq!(of.calculate_rank(None, 0), INFINITE_RANK);
        assert_eq!(of.calculate_rank(Some(&parent(1, 7, 900, 0)), 0), 8);
        assert_eq!(
            of.calculate_rank(Some(&parent(1, INFINITE_RANK - 1, 0, 0)), 0),
            INFINITE_RANK
        );
    }

    #[test]
    fn best_parent_hook_is_inert() {
        let of = HopEtx::default();
        let a = parent(1, 1, 1, 0);
        let b = parent(2, 2, 2, 0);
        assert!(of.best_parent(&a, &b).is_none());
    }
}
