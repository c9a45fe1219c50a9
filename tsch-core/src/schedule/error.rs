/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error type for schedule store mutations.
//!
//! A failed call never leaves the store half-modified: every check runs
//! before the first write, so the caller can log the variant and carry on
//! with the previous schedule.

use thiserror::Error;

/// Errors returned by [`ScheduleStore`](super::ScheduleStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// A slotframe with this id is already installed.
    #[error("slotframe {id} already exists")]
    DuplicateSlotframeId { id: u16 },

    /// No slotframe with this id is installed.
    #[error("slotframe {id} does not exist")]
    UnknownSlotframe { id: u16 },

    /// Slotframes must have at least one timeslot.
    #[error("slotframe {id} has invalid length {length}")]
    InvalidSlotframeLength { id: u16, length: u16 },

    /// The requested timeslot lies outside the slotframe.
    #[error("timeslot {timeslot} is outside slotframe {frame} (length {length})")]
    TimeslotOutOfRange {
        frame: u16,
        timeslot: u16,
        length: u16,
    },

    /// A strict add found the timeslot already occupied.
    #[error("timeslot {timeslot} of slotframe {frame} is already occupied")]
    TimeslotOccupiedByIncompatibleLink { frame: u16, timeslot: u16 },

    /// The fixed-size slotframe or link pool is exhausted.
    #[error("schedule full: {what} pool of {capacity} exhausted")]
    ScheduleFull { what: &'static str, capacity: usize },

    /// The link handle does not belong to the given slotframe.
    #[error("link {link} not found in slotframe {frame}")]
    UnknownLink { frame: u16, link: u32 },
}
