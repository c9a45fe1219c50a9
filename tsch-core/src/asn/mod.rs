/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Absolute Slot Number (ASN) arithmetic and slot timing.
//!
//! The ASN counts MAC timeslots since network formation.  It is 40 bits wide
//! and kept in the same two-word layout the radio firmware uses: a 32-bit low
//! word (`ls4b`) plus one extra high byte (`ms1b`).
//!
//! | Operation | Width | Notes |
//! |-----------|-------|-------|
//! | [`Asn::increment`] / [`Asn::decrement`] | 40 bits | carry/borrow into `ms1b`, wraps at 2^40 |
//! | [`Asn::diff`] | 32 bits | only the low words take part |
//! | [`Asn::modulo`] | 16-bit result | no 40-bit division, see [`AsnDivisor`] |
//!
//! # Why a precomputed divisor
//! `asn mod d` is needed every slot for every active slotframe.  A 40-bit
//! division is expensive on the target MCUs, so each divisor carries
//! `2^32 mod d` and the modulo is reassembled from two cheap 32-bit
//! operations:
//!
//! ```text
//! asn mod d = ((ls4b mod d) + (ms1b * (2^32 mod d)) mod d) mod d
//! ```

pub mod hopping;

use std::fmt;
use std::num::NonZeroU16;
use std::time::Duration;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default timeslot duration in microseconds (`TsSlotDuration`).
pub const DEFAULT_SLOT_DURATION_US: u32 = 15_000;

/// Mask selecting the 40 bits an ASN can hold.
const ASN_MASK: u64 = (1 << 40) - 1;

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors produced by ASN helpers.
#[derive(Debug, PartialEq, Eq)]
pub enum AsnError {
    /// A modulo divisor of zero was requested.
    ZeroDivisor,

    /// A slot duration of zero makes slot conversion meaningless.
    ZeroSlotDuration,
}

impl fmt::Display for AsnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsnError::ZeroDivisor => write!(f, "ASN divisor must be non-zero"),
            AsnError::ZeroSlotDuration => write!(f, "slot duration must be non-zero"),
        }
    }
}

impl std::error::Error for AsnError {}

// ── Asn ───────────────────────────────────────────────────────────────────────

/// A 40-bit absolute slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Asn {
    /// Least significant 4 bytes.
    ls4b: u32,
    /// Most significant byte.
    ms1b: u8,
}

impl Asn {
    /// Build an ASN from its high byte and low word.
    pub const fn new(ms1b: u8, ls4b: u32) -> Self {
        Self { ls4b, ms1b }
    }

    /// Build an ASN from a plain integer; bits above 40 are discarded.
    pub const fn from_u64(value: u64) -> Self {
        let value = value & ASN_MASK;
        Self {
            ls4b: value as u32,
            ms1b: (value >> 32) as u8,
        }
    }

    /// The ASN as a plain 40-bit integer.
    pub const fn as_u64(self) -> u64 {
        ((self.ms1b as u64) << 32) | self.ls4b as u64
    }

    pub const fn ls4b(self) -> u32 {
        self.ls4b
    }

    pub const fn ms1b(self) -> u8 {
        self.ms1b
    }

    /// Advance by `inc` slots, carrying into the high byte.
    pub fn increment(&mut self, inc: u32) {
        let (ls4b, carried) = self.ls4b.overflowing_add(inc);
        if carried {
            self.ms1b = self.ms1b.wrapping_add(1);
        }
        self.ls4b = ls4b;
    }

    /// Move back by `dec` slots, borrowing from the high byte.
    pub fn decrement(&mut self, dec: u32) {
        let (ls4b, borrowed) = self.ls4b.overflowing_sub(dec);
        if borrowed {
            self.ms1b = self.ms1b.wrapping_sub(1);
        }
        self.ls4b = ls4b;
    }

    /// Non-mutating [`increment`](Self::increment).
    #[must_use]
    pub fn plus(mut self, inc: u32) -> Self {
        self.increment(inc);
        self
    }

    /// Signed 32-bit difference `self - other`.
    ///
    /// Only the low words are compared, so the result is meaningful as long as
    /// both ASNs are less than 2^31 slots apart.
    pub fn diff(self, other: Asn) -> i32 {
        self.ls4b.wrapping_sub(other.ls4b) as i32
    }

    /// `self mod divisor`, bit-exact with a full 40-bit modulo.
    pub fn modulo(self, divisor: &AsnDivisor) -> u16 {
        let val = divisor.val as u32;
        let low = self.ls4b % val;
        let high = (self.ms1b as u32 * divisor.ms1b_remainder as u32) % val;
        ((low + high) % val) as u16
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}.{:08x}", self.ms1b, self.ls4b)
    }
}

// ── AsnDivisor ────────────────────────────────────────────────────────────────

/// A modulo divisor with its `2^32 mod val` remainder precomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsnDivisor {
    val: u16,
    /// Remainder of `0x1_0000_0000 / val`.
    ms1b_remainder: u16,
}

impl AsnDivisor {
    /// Precompute the divisor for `val`.
    ///
    /// # Errors
    /// [`AsnError::ZeroDivisor`] when `val == 0`.
    pub fn new(val: u16) -> Result<Self, AsnError> {
        NonZeroU16::new(val)
            .map(Self::from_nonzero)
            .ok_or(AsnError::ZeroDivisor)
    }

    /// Infallible form of [`new`](Self::new) for a length known to be non-zero.
    pub const fn from_nonzero(val: NonZeroU16) -> Self {
        let v = val.get() as u32;
        // (2^32 - 1) mod v, plus one, folded back into range
        let ms1b_remainder = (((u32::MAX % v) + 1) % v) as u16;
        Self {
            val: val.get(),
            ms1b_remainder,
        }
    }

    pub fn val(&self) -> u16 {
        self.val
    }

    pub fn ms1b_remainder(&self) -> u16 {
        self.ms1b_remainder
    }
}

// ── Slot timing ───────────────────────────────────────────────────────────────

/// Number of whole timeslots that fit in `duration`.
///
/// Used to express clock-based lifetimes (lease expiry, keep-alives) in slots.
///
/// # Errors
/// [`AsnError::ZeroSlotDuration`] when `slot_duration_us == 0`.
pub fn slots_from_duration(duration: Duration, slot_duration_us: u32) -> Result<u32, AsnError> {
    if slot_duration_us == 0 {
        return Err(AsnError::ZeroSlotDuration);
    }
    let slots = duration.as_micros() / slot_duration_us as u128;
    Ok(u32::try_from(slots).unwrap_or(u32::MAX))
}

/// Wall-clock duration of `slots` timeslots.
pub fn duration_from_slots(slots: u32, slot_duration_us: u32) -> Duration {
    Duration::from_micros(slots as u64 * slot_duration_us as u64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
