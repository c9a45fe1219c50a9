/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! PDR objective function.
//!
//! The link metric is a packet delivery ratio in 16-bit fixed point
//! (`0..=PDR_ONE`).  Rank is a path loss rate, never below the plain hop
//! increment over the parent.

use tracing::trace;

use super::{Dag, Parent, Rank, TxStatus, DEFAULT_MIN_HOPRANKINC, ETX_DIVISOR, INFINITE_RANK};

const PRR_SCALE: u32 = 100;
const PRR_ALPHA: u32 = 98;
const PRR_EXPONENT: u32 = 4;

pub const PDR_BASE: u32 = 65_536;
pub const PDR_ONE: u32 = PDR_BASE - 1;

/// 98 % delivery.
pub const PDR_INIT_LINK_METRIC: u16 = 64_256;

/// ETX-scaled equivalent of a PDR value; zero maps to zero.
pub fn pdr_to_etx(pdr: u16) -> u32 {
    if pdr == 0 {
        return 0;
    }
    ETX_DIVISOR as u32 * PDR_ONE / pdr as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdr {
    pub min_hoprankinc: u16,
    /// Rank band within which the current preferred parent is kept.
    pub hysteresis: u16,
}

impl Default for Pdr {
    fn default() -> Self {
        Self {
            min_hoprankinc: DEFAULT_MIN_HOPRANKINC,
            hysteresis: 0,
        }
    }
}

fn decay(pdr: u32) -> u32 {
    pdr * PRR_ALPHA / PRR_SCALE
}

impl Pdr {
    /// `numtx - 1` implied failures, then the final outcome.
    pub(super) fn link_feedback(&self, parent: &mut Parent, status: TxStatus, numtx: u16) {
        let mut pdr = parent.link_metric as u32;
        for _ in 1..numtx {
            pdr = decay(pdr);
        }
        pdr = match status {
            TxStatus::NoAck => decay(pdr),
            _ => (pdr * PRR_ALPHA + PDR_ONE * (PRR_SCALE - PRR_ALPHA)) / PRR_SCALE,
        };
        parent.link_metric = pdr.min(PDR_ONE) as u16;
    }

    pub(super) fn calculate_rank(&self, parent: Option<&Parent>, _base_rank: Rank) -> Rank {
        let Some(p) = parent else {
            return INFINITE_RANK;
        };
        let base = PDR_BASE as u64;
        let link_loss = base - p.link_metric as u64;

        let mut link_loss_rate = base;
        for _ in 0..PRR_EXPONENT {
            link_loss_rate = link_loss_rate * link_loss / base;
        }

        let link_prr = (PDR_ONE as u64).saturating_sub(link_loss_rate);
        let parent_pdr = base - p.rank as u64;
        let path_pdr = (base / 2 + parent_pdr * link_prr) / base;
        let path_loss_rate = (PDR_ONE as u64).saturating_sub(path_pdr);

        let hop_floor = p.rank as u64 + self.min_hoprankinc as u64;
        let rank = path_loss_rate.max(hop_floor);
        trace!(
            parent_rank = p.rank,
            link_metric = p.link_metric,
            path_loss_rate,
            rank,
            "PDR rank"
        );
        u16::try_from(rank).unwrap_or(INFINITE_RANK)
    }

    /// Lower computed rank wins.  When one candidate is the current
    /// preferred parent and the two ranks lie strictly inside the
    /// hysteresis band, the preferred parent is kept.
    pub(super) fn best_parent<'a>(&self, dag: &Dag, p1: &'a Parent, p2: &'a Parent) -> &'a Parent {
        let r1 = self.calculate_rank(Some(p1), 0) as i32;
        let r2 = self.calculate_rank(Some(p2), 0) as i32;
        let band = self.hysteresis as i32;

        if let Some(preferred) = dag.preferred_parent {
            let current = if p1.addr == preferred {
                Some(p1)
            } else if p2.addr == preferred {
                Some(p2)
            } else {
                None
            };
            if let Some(current) = current {
                if r1 < r2 + band && r1 > r2 - band {
                    trace!(r1, r2, band, parent = %current.addr, "hysteresis keeps preferred parent");
                    return current;
                }
            }
        }

        if r1 < r2 {
            p1
        } else {
            p2
        }
    }
}
