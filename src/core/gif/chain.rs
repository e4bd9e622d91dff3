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

//! Direct and source-chain PATH3 transfers
//!
//! The transfer loop walks descriptor tags until it has a non-empty segment,
//! then moves that one segment and yields. Zero-length descriptors are
//! consumed without yielding since no bus time passes for them. Stall
//! control (REFS tags racing the companion drain channel's STADR) and the
//! software pause bit both interrupt the loop with a short reschedule.

use super::{
    GifDma, GifTransferKind, GifUnit, HandlerAction, CYCLES_MIN, CYCLES_SHORT,
    CYCLES_STALLED, CYCLE_BIAS,
};
use crate::core::dmac::{
    dma_source, read_dma_tag, DmacScheduler, DmaTag, StallSelect, TagId, TransferMode,
    QW_SIZE,
};

/// Intermittent-mode packet split: fine granularity for small packets
const IMT_SPLIT_FINE: u32 = 8;

/// Packet size above which intermittent splitting gets less picky
const IMT_SPLIT_THRESHOLD: u32 = 128;

/// Intermittent-mode packet split: coarse cap for large packets
const IMT_SPLIT_COARSE: u32 = 1024;

impl GifDma {
    /// Hand one run of quadwords to the GIF (or the packet FIFO) and
    /// advance the channel by what was actually taken
    pub(crate) fn write_ring_dma(
        &mut self,
        unit: &mut dyn GifUnit,
        src: &[u8],
        mut qwc: u32,
    ) -> u32 {
        if self.regs.stat.imt {
            // Splitting by 8qw keeps PATH3 masking windows honest but can be
            // really slow, so on bigger packets be less picky.
            if qwc > IMT_SPLIT_THRESHOLD {
                qwc = qwc.min(IMT_SPLIT_COARSE);
            } else {
                qwc = qwc.min(IMT_SPLIT_FINE);
            }
        }

        let size = if self.fifo_enabled() {
            self.fifo_write(src, qwc)
        } else {
            unit.transfer_packet_data(
                GifTransferKind::Path3Dma,
                &src[..(qwc * QW_SIZE) as usize],
            ) as u32
                / QW_SIZE
        };

        self.channel.advance_source(size);
        size
    }

    /// Move the channel's current segment; returns quadwords moved, or -1
    /// when the source does not resolve
    fn gif_chain(&mut self, ram: &[u8], unit: &mut dyn GifUnit) -> i32 {
        let qwc = self.channel.qwc;
        let Some(src) = dma_source(ram, self.channel.madr, qwc) else {
            // Must step past the segment and clear QWC, else it loops
            self.channel.madr = self.channel.madr.wrapping_add(qwc * QW_SIZE);
            self.channel.qwc = 0;
            log::warn!("Hackfix - unmapped GIF chain source");
            return -1;
        };

        self.write_ring_dma(unit, src, qwc) as i32
    }

    /// Fetch the next descriptor and walk the chain one step
    pub(crate) fn read_tag(&mut self, ram: &[u8]) -> Option<DmaTag> {
        let tag = read_dma_tag(ram, self.channel.tadr)?;

        self.channel.load_tag(tag);
        self.channel.madr = tag.addr();
        // One quadword read for the tag itself
        self.state.gscycles += 2;

        self.state.gspath3done = self.channel.follow_chain_tag(tag.id());
        Some(tag)
    }

    /// Terminal descriptor check: IRQ-on-tag with TIE set ends the chain
    fn check_tie(&mut self, tag: DmaTag) {
        if self.channel.chcr.tie() && tag.irq() {
            log::trace!("GIF tag IRQ set, chain ends");
            self.state.gspath3done = true;
        }
    }

    /// Chain/direct transfer step (non-MFIFO)
    pub(crate) fn dma_transfer(
        &mut self,
        ram: &[u8],
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> HandlerAction {
        while self.channel.qwc > 0 || !self.state.gspath3done {
            self.state.gscycles = self.state.prevcycles;

            if self.regs.ctrl.pse {
                log::debug!("GIF DMA temporarily paused (PSE)");
                return self.reschedule(CYCLES_SHORT);
            }

            // Re-check a stalled REFS segment against the drain address the
            // companion channel has reached since
            if self.dmac.std == StallSelect::Gif && self.state.prevcycles != 0 {
                if self.channel.madr.wrapping_add(self.channel.qwc * QW_SIZE) > self.dmac.stadr {
                    self.state.gscycles = 0;
                    return self.reschedule(CYCLES_MIN);
                }
                self.state.prevcycles = 0;
                self.channel.qwc = 0;
            }

            if self.channel.chcr.mode() == TransferMode::Chain
                && !self.state.gspath3done
                && self.channel.qwc == 0
            {
                let Some(tag) = self.read_tag(ram) else {
                    // Unmapped tag: end the DMA cleanly instead of spinning
                    log::warn!(
                        "Hackfix - unmapped GIF chain tag at 0x{:08X}",
                        self.channel.tadr
                    );
                    self.state.gspath3done = true;
                    self.channel.qwc = 0;
                    return self.reschedule(CYCLES_SHORT);
                };

                log::trace!(
                    "GIF chain tag: id={:?} qwc={} madr=0x{:08X} tadr=0x{:08X}",
                    tag.id(),
                    self.channel.qwc,
                    self.channel.madr,
                    self.channel.tadr
                );

                if !self.fifo_enabled() {
                    self.regs.stat.fqc = self.channel.qwc.min(16);
                }

                if self.dmac.std == StallSelect::Gif && tag.id() == TagId::Refs {
                    let end = self.channel.madr.wrapping_add(self.channel.qwc * QW_SIZE);
                    if end > self.dmac.stadr {
                        // Stalled: rewind the tag, remember the cycle cost,
                        // and let the stall interrupt sort it out
                        self.state.prevcycles = self.state.gscycles;
                        self.channel.tadr = self.channel.tadr.wrapping_sub(QW_SIZE);
                        self.channel.qwc = 0;
                        sched.raise_stall_irq();
                        self.state.gscycles = 0;
                        return self.reschedule(CYCLES_STALLED);
                    }
                }

                self.check_tie(tag);
            } else if self.dmac.std == StallSelect::Gif
                && self.channel.chcr.mode() == TransferMode::Normal
            {
                log::debug!("GIF DMA stall control in normal mode not implemented");
            }

            if !self.fifo_enabled() {
                self.regs.stat.fqc = self.channel.qwc.min(16);
                self.regs.csr_fifo = super::FifoStatus::Full;
            }

            if self.channel.qwc > 0 {
                // Can't do PATH3? Try the DMA again later.
                if !self.fifo_enabled() && !unit.can_do_path3() {
                    if !unit.path3_masked() {
                        log::debug!("PATH3 stalled");
                        return self.reschedule(CYCLES_STALLED);
                    }
                    return HandlerAction::Idle;
                }

                let moved = self.gif_chain(ram, unit);
                self.state.gscycles += moved * CYCLE_BIAS;
                return self.reschedule(self.state.gscycles);
            }
        }

        // QWC == 0 and the chain is done: let the next entry finalize
        self.state.prevcycles = 0;
        self.reschedule(CYCLES_SHORT)
    }
}
