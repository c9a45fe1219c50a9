/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use thiserror::Error;

/// Recoverable routing conditions.  Neither is fatal: the node keeps running
/// and retries on the next feedback or neighbor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RplError {
    /// Every known neighbor advertises an infinite rank.
    #[error("no neighbor with a finite rank is eligible as parent")]
    NoEligibleParent,

    /// The metric container cannot be filled before the DAG is joined.
    #[error("metric container update skipped: DAG not joined")]
    NotJoined,
}
