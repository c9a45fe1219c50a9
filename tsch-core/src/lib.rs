/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! TSCH core – slot timing, schedule and routing metrics for one mesh node
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── asn/            – 40-bit ASN arithmetic, slot timing, channel hopping
//! ├── schedule/       – slotframe / link store and its recursive lock
//! ├── rpl/            – RPL objective functions (ETX-hop, PDR)
//! ├── orchestra/      – autonomous slotframes with leased unicast links
//! ├── node.rs         – link-layer addresses and node index lookup
//! ├── config/         – YAML node configuration
//! └── context.rs      – per-node runtime context (init / teardown)
//! ```

pub mod asn;
pub mod config;
pub mod context;
pub mod node;
pub mod orchestra;
pub mod rpl;
pub mod schedule;
