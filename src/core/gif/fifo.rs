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

//! GIF hardware packet FIFO
//!
//! The real GIF stages PATH3 packets in a 16-quadword FIFO; a handful of
//! titles poll its fill count (GIF_STAT.FQC) or the CSR mirror and misbehave
//! without it. The ring itself is dumb storage; occupancy is tracked in the
//! externally visible FQC mirror, and the empty/normal/full CSR field is
//! recomputed after every mutation.
//!
//! A drain hands the entire occupancy to the receiving unit in one offer.
//! The unit may consume less than offered (packet boundary, masking window);
//! the shortfall is pushed back by rewinding the read index, so no data is
//! lost or duplicated.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{GifDma, GifTransferKind, GifUnit, CYCLES_SHORT, CYCLE_BIAS};
use crate::core::dmac::{DmacScheduler, IntChannel, QW_SIZE};

/// FIFO capacity in quadwords
pub const FIFO_QWC: usize = 16;

/// Fixed-capacity quadword ring with a drain staging mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct GifFifo {
    /// Read index, quadword units, wraps mod capacity
    read_qw: u32,

    /// Write index, quadword units, wraps mod capacity
    write_qw: u32,

    /// Raw quadword storage
    data: [[u8; 16]; FIFO_QWC],

    /// In-flight read staging area handed to the packet consumer
    staging: [[u8; 16]; FIFO_QWC],
}

impl GifFifo {
    pub fn new() -> Self {
        Self {
            read_qw: 0,
            write_qw: 0,
            data: [[0; 16]; FIFO_QWC],
            staging: [[0; 16]; FIFO_QWC],
        }
    }

    /// Zero indices, storage, and staging
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Current read index (quadwords)
    #[inline(always)]
    pub fn read_index(&self) -> u32 {
        self.read_qw
    }

    /// Current write index (quadwords)
    #[inline(always)]
    pub fn write_index(&self) -> u32 {
        self.write_qw
    }

    /// Copy `count` quadwords in at the write index, wrapping
    fn push_qwords(&mut self, src: &[u8], count: u32) {
        for i in 0..count as usize {
            self.data[self.write_qw as usize].copy_from_slice(&src[i * 16..(i + 1) * 16]);
            self.write_qw = (self.write_qw + 1) % FIFO_QWC as u32;
        }
    }

    /// Copy `count` quadwords out at the read index into staging, wrapping
    fn drain_to_staging(&mut self, count: u32) {
        for i in 0..count as usize {
            self.staging[i] = self.data[self.read_qw as usize];
            self.read_qw = (self.read_qw + 1) % FIFO_QWC as u32;
        }
    }

    /// The first `count` staged quadwords as a byte slice
    fn staged_bytes(&self, count: u32) -> &[u8] {
        self.staging[..count as usize].as_flattened()
    }
}

impl Default for GifFifo {
    fn default() -> Self {
        Self::new()
    }
}

impl GifDma {
    /// Accept up to `qwc` quadwords from `src` into the packet FIFO
    ///
    /// Accepts `min(qwc, capacity - occupancy)` quadwords and returns the
    /// number taken (0 when full). Never blocks.
    pub fn fifo_write(&mut self, src: &[u8], qwc: u32) -> u32 {
        if self.regs.stat.fqc == FIFO_QWC as u32 {
            log::trace!("GIF FIFO full");
            return 0;
        }

        let accepted = qwc.min(FIFO_QWC as u32 - self.regs.stat.fqc);
        self.regs.stat.fqc += accepted;
        self.fifo.push_qwords(src, accepted);

        self.update_fifo_csr();
        accepted
    }

    /// Drain the packet FIFO into the receiving unit
    ///
    /// Offers the entire occupancy in one transfer; whatever the unit does
    /// not consume is pushed back by rewinding the read index. Returns the
    /// occupancy remaining after the operation.
    ///
    /// When invoked outside the interrupt-driven path (`from_dma` false),
    /// schedules a handler re-entry itself: a short one if PATH3 cannot
    /// currently progress while the channel runs, otherwise one proportional
    /// to the quadwords consumed.
    pub fn fifo_read(
        &mut self,
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
        from_dma: bool,
    ) -> u32 {
        if !unit.can_do_path3() || self.regs.stat.fqc == 0 {
            if self.channel.chcr.str() && !sched.is_pending(IntChannel::Gif) && !from_dma {
                self.schedule_interrupt(sched, CYCLES_SHORT);
            }
            return 0;
        }

        let size = self.regs.stat.fqc;
        let old_read = self.fifo.read_index();

        self.fifo.drain_to_staging(size);
        self.regs.stat.fqc = 0;

        let consumed = unit
            .transfer_packet_data(GifTransferKind::Path3Dma, self.fifo.staged_bytes(size))
            as u32
            / QW_SIZE;

        if consumed < size {
            // Partial consumption: expose exactly the unread remainder
            self.fifo.read_qw = (old_read + consumed) % FIFO_QWC as u32;
            self.regs.stat.fqc = size - consumed;
        }

        if !from_dma {
            self.schedule_interrupt(sched, consumed as i32 * CYCLE_BIAS);
        }

        self.update_fifo_csr();
        self.regs.stat.fqc
    }
}
