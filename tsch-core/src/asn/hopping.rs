/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Channel hopping: map `(ASN, channel offset)` to a physical channel.
//!
//! `channel = sequence[(asn + channel_offset) mod len(sequence)]`

use std::num::NonZeroU16;

use super::{Asn, AsnDivisor, AsnError};

/// The 16-channel IEEE 802.15.4 (2.4 GHz) default hopping sequence.
pub const DEFAULT_HOPPING_SEQUENCE: [u8; 16] =
    [16, 17, 23, 18, 26, 15, 25, 22, 19, 11, 12, 13, 24, 14, 20, 21];

const DEFAULT_HOPPING_LEN: NonZeroU16 =
    NonZeroU16::MIN.saturating_add(DEFAULT_HOPPING_SEQUENCE.len() as u16 - 1);

/// A channel hopping sequence with its length divisor precomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoppingSequence {
    channels: Vec<u8>,
    divisor: AsnDivisor,
}

impl HoppingSequence {
    /// # Errors
    /// [`AsnError::ZeroDivisor`] for an empty sequence.
    pub fn new(channels: Vec<u8>) -> Result<Self, AsnError> {
        let len = u16::try_from(channels.len()).map_err(|_| AsnError::ZeroDivisor)?;
        let divisor = AsnDivisor::new(len)?;
        Ok(Self { channels, divisor })
    }

    /// Physical channel used at `asn` by a link with `channel_offset`.
    pub fn channel_for(&self, asn: Asn, channel_offset: u16) -> u8 {
        let index = asn.plus(channel_offset as u32).modulo(&self.divisor);
        self.channels[index as usize]
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels
    }
}

impl Default for HoppingSequence {
    fn default() -> Self {
        Self {
            channels: DEFAULT_HOPPING_SEQUENCE.to_vec(),
            divisor: AsnDivisor::from_nonzero(DEFAULT_HOPPING_LEN),
        }
    }
}
