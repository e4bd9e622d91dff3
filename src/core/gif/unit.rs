// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Receiving-unit interface
//!
//! The GIF itself (packet parsing, the PATH1/PATH2/PATH3 arbiter, and the
//! renderer behind it) lives outside this crate. The DMA engine only needs
//! the small capability set below: ask whether PATH3 may proceed, hand over
//! packet data, and kick the arbiter when a path finishes. A test double
//! implementing this trait can simulate masking and backpressure without a
//! rendering backend.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Activity state of one GIF path, as tracked by the receiving unit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub enum PathState {
    /// Nothing queued on this path
    #[default]
    Idle,
    /// Mid-packet, more data expected
    Active,
    /// Packet boundary reached, waiting for the arbiter
    Wait,
}

/// Which feed a GIF packet arrived over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GifTransferKind {
    /// PATH1: VU1 XGKICK
    Path1Kick,
    /// PATH2: VIF1 DIRECT/DIRECTHL
    Path2Direct,
    /// PATH3: GIF DMA (the only kind this engine sends)
    Path3Dma,
}

/// External GIF capability set used by the DMA engine
pub trait GifUnit {
    /// May PATH3 transfer right now? (arbiter free, not mid PATH1/2 packet)
    fn can_do_path3(&self) -> bool;

    /// Is PATH3 masked by VIF1 MSKPATH3 or GIF MODE.M3R?
    fn path3_masked(&self) -> bool;

    /// Current PATH3 activity state
    fn path3_state(&self) -> PathState;

    /// Demote/promote PATH3 (the engine only ever writes `Idle` here, when
    /// collapsing a WAIT window)
    fn set_path3_state(&mut self, state: PathState);

    /// Is a GS SIGNAL waiting to be acknowledged? PATH3 pauses while one is.
    fn signal_pending(&self) -> bool {
        false
    }

    /// Do PATH1/PATH2 have buffered packets the arbiter could run?
    fn paths_queued(&self) -> bool {
        false
    }

    /// Run the arbiter to process buffered path data
    fn execute(&mut self, flush_only: bool, from_path_check: bool);

    /// Offer packet data; returns the number of bytes actually consumed.
    ///
    /// Consuming less than offered is a legitimate result (the unit hit a
    /// packet boundary or a masking window), not an error. Callers push the
    /// remainder back or stop advancing addresses.
    fn transfer_packet_data(&mut self, kind: GifTransferKind, data: &[u8]) -> usize;
}
