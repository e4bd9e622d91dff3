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

//! MFIFO ring drain
//!
//! In MFIFO mode the controller configures a power-of-two window of main
//! memory (D_RBOR base, D_RBSR mask) as a circular buffer: SPR0 writes
//! packets in and advances its MADR, and the GIF channel drains them out
//! from the same region, tags included. Availability is the distance from
//! our drain address to the writer's cursor, wrapped around the ring.
//!
//! Transfers that cross the top of the ring are split into two legs, one to
//! the ring limit and one restarting at the base. Chain addresses are
//! renormalized into the window after every step; tags whose data follows
//! the tag (CNT/NEXT/CALL/RET/END) additionally get their target clamped
//! onto the ring, while REF-family targets may legitimately point outside.

use super::{
    GifDma, GifState, GifTransferKind, GifUnit, HandlerAction, CYCLES_MIN,
    CYCLES_SHORT, CYCLES_STALLED,
};
use crate::core::dmac::{
    dma_source, read_dma_tag, DmacScheduler, IntChannel, MfifoSelect, StallSelect,
    TagId, QW_SIZE,
};

impl GifDma {
    /// Renormalize an address into the ring window
    #[inline(always)]
    pub(crate) fn qwctag(&self, addr: u32) -> u32 {
        self.dmac.rbor + (addr & self.dmac.rbsr)
    }

    /// Quadwords available between `drain` and the SPR0 write cursor
    ///
    /// Latches the EMPTY engine state when nothing is available.
    pub(crate) fn mfifo_available(&mut self, drain: u32) -> u32 {
        log::trace!(
            "MFIFO avail: base=0x{:08X} spr0=0x{:08X} drain=0x{:08X}",
            self.dmac.rbor,
            self.spr0_madr,
            drain
        );

        let avail = if drain <= self.spr0_madr {
            // Drain below the write cursor: plain difference
            (self.spr0_madr - drain) >> 4
        } else {
            // Writer has wrapped: base up to the cursor, plus what is left
            // in the top of the ring
            let limit = self.dmac.rbor + self.dmac.rbsr + QW_SIZE;
            (self.spr0_madr.wrapping_sub(self.dmac.rbor)).wrapping_add(limit.wrapping_sub(drain))
                >> 4
        };

        if avail == 0 {
            self.state.gifstate |= GifState::EMPTY;
        }
        avail
    }

    /// Drain up to the channel's remaining count out of the ring, splitting
    /// across the ring boundary when needed
    fn mfifo_ring_transfer(&mut self, ram: &[u8], unit: &mut dyn GifUnit) -> bool {
        let qwc = self
            .mfifo_available(self.channel.madr)
            .min(self.channel.qwc);

        let until_end = (self.dmac.rbor + self.dmac.rbsr + QW_SIZE)
            .wrapping_sub(self.channel.madr)
            >> 4;
        let need_wrap = until_end < qwc;
        let first_leg = if need_wrap { until_end } else { qwc };

        let Some(src) = dma_source(ram, self.channel.madr, first_leg) else {
            return false;
        };

        let transferred = if self.fifo_enabled() {
            self.fifo_write(src, first_leg)
        } else {
            unit.transfer_packet_data(GifTransferKind::Path3Dma, src) as u32 / QW_SIZE
        };

        self.channel.advance_source(transferred);

        self.channel.madr = self.qwctag(self.channel.madr);
        self.channel.tadr = self.qwctag(self.channel.tadr);

        if need_wrap && transferred == until_end {
            // Second leg resumes at the ring base
            let second_leg = qwc - until_end;

            let Some(src) = dma_source(ram, self.dmac.rbor, second_leg) else {
                return false;
            };

            let transferred2 = if self.fifo_enabled() {
                self.fifo_write(src, second_leg)
            } else {
                unit.transfer_packet_data(GifTransferKind::Path3Dma, src) as u32 / QW_SIZE
            };

            self.channel.advance_source(transferred2);
            self.state.mfifocycles += ((transferred + transferred2) * 2) as i32;
        } else {
            self.state.mfifocycles += (transferred * 2) as i32;
        }

        true
    }

    /// Move the channel's current segment in MFIFO mode
    ///
    /// In-ring sources come out of the ring (with wrap handling); sources a
    /// REF tag pointed outside the window go through the ordinary direct
    /// path. Returns `false` when the source does not resolve.
    fn mfifo_chain(&mut self, ram: &[u8], unit: &mut dyn GifUnit) -> bool {
        // QWC == 0? Nothing to transfer.
        if self.channel.qwc == 0 {
            return true;
        }

        if (self.channel.madr & !self.dmac.rbsr) == self.dmac.rbor {
            if self.mfifo_available(self.channel.madr) == 0 {
                log::trace!("MFIFO empty before transfer");
                self.state.gifstate = GifState::EMPTY;
                self.state.mfifocycles += 4;
                return true;
            }

            let ok = self.mfifo_ring_transfer(ram, unit);

            // Keep the addresses on the ring; the next tag follows the data
            self.channel.madr = self.qwctag(self.channel.madr);
            self.channel.tadr = self.channel.madr;

            ok
        } else {
            log::trace!(
                "MFIFO transfer from outside the ring: qwc={} madr=0x{:08X}",
                self.channel.qwc,
                self.channel.madr
            );

            let qwc = self.channel.qwc;
            let Some(src) = dma_source(ram, self.channel.madr, qwc) else {
                return false;
            };

            let moved = self.write_ring_dma(unit, src, qwc);
            self.state.mfifocycles += (moved * 2) as i32;
            true
        }
    }

    /// Clamp a tag-relative address back onto the ring for the tag types
    /// whose data follows the tag; REF-family targets stay untouched
    fn mfifo_mask_mem(&mut self, id: TagId) {
        match id {
            TagId::Cnt | TagId::Next | TagId::Call | TagId::Ret | TagId::End => {
                if self.channel.madr < self.dmac.rbor {
                    log::trace!(
                        "MFIFO MADR 0x{:08X} below ring base 0x{:08X}, wrapping",
                        self.channel.madr,
                        self.dmac.rbor
                    );
                    self.channel.madr = self.qwctag(self.channel.madr);
                } else if self.channel.madr > self.dmac.rbor + self.dmac.rbsr {
                    // Usual scenario: the tag sits near the end of the ring
                    log::trace!(
                        "MFIFO MADR 0x{:08X} above ring top, wrapping",
                        self.channel.madr
                    );
                    self.channel.madr = self.qwctag(self.channel.madr);
                }
            }
            // MADR may legitimately live outside the ring
            _ => {}
        }
    }

    /// Reschedule after an MFIFO step: cycle cost with a floor of 4, or the
    /// stall delay when the ring ran dry and the FIFO path wants a retry
    fn mfifo_resched(&self) -> HandlerAction {
        if self.fifo_enabled() && self.state.gifstate.contains(GifState::EMPTY) {
            return self.reschedule(CYCLES_STALLED);
        }
        self.reschedule(self.state.mfifocycles.max(CYCLES_MIN))
    }

    /// MFIFO tag fetch + transfer step
    pub(crate) fn mfifo_transfer(
        &mut self,
        ram: &[u8],
        unit: &mut dyn GifUnit,
    ) -> HandlerAction {
        self.state.mfifocycles = 0;

        if self.regs.ctrl.pse {
            log::debug!("GIF MFIFO DMA temporarily paused (PSE)");
            return self.reschedule(CYCLES_SHORT);
        }

        if self.channel.qwc == 0 {
            self.channel.tadr = self.qwctag(self.channel.tadr);

            if self.mfifo_available(self.channel.tadr) == 0 {
                log::trace!("MFIFO empty before tag read");
                self.state.gifstate = GifState::EMPTY;
                return self.mfifo_resched();
            }

            let Some(tag) = read_dma_tag(ram, self.channel.tadr) else {
                log::warn!(
                    "Hackfix - unmapped MFIFO tag at 0x{:08X}",
                    self.channel.tadr
                );
                self.state.gspath3done = true;
                self.channel.qwc = 0;
                return self.mfifo_resched();
            };

            self.channel.load_tag(tag);
            self.channel.madr = tag.addr();
            self.state.mfifocycles += 2;

            log::trace!(
                "MFIFO chain tag: id={:?} qwc={} madr=0x{:08X} tadr=0x{:08X} spr0=0x{:08X}",
                tag.id(),
                self.channel.qwc,
                self.channel.madr,
                self.channel.tadr,
                self.spr0_madr
            );

            self.state.gspath3done = self.channel.follow_chain_tag(tag.id());

            if self.dmac.std == StallSelect::Gif && tag.id() == TagId::Refs {
                log::debug!("GIF MFIFO DMA stall control not implemented");
            }

            self.mfifo_mask_mem(tag.id());

            self.channel.tadr = self.qwctag(self.channel.tadr);

            if self.channel.chcr.tie() && tag.irq() {
                log::trace!("MFIFO tag IRQ set, chain ends");
                self.state.gspath3done = true;
            }
        }

        if !self.mfifo_chain(ram, unit) {
            log::debug!(
                "MFIFO chain error: qwc={} madr=0x{:08X} tadr=0x{:08X}",
                self.channel.qwc,
                self.channel.madr,
                self.channel.tadr
            );
            self.state.gspath3done = true;
            // Sanity
            self.channel.qwc = 0;
        }

        self.mfifo_resched()
    }

    /// Top-level handler for the MFIFO interrupt channel
    pub(crate) fn mfifo_interrupt(
        &mut self,
        ram: &[u8],
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> HandlerAction {
        log::trace!("gif mfifo interrupt");
        self.state.mfifocycles = 0;

        if self.dmac.mfd != MfifoSelect::Gif {
            // GIF is not the MFIFO drain anymore, come out
            log::debug!("GIF leaving MFIFO mid-flight");
            return self.interrupt(ram, unit, sched);
        }

        self.check_path_status(unit);

        if let Some(action) = self.vif_gate(unit, sched) {
            return action;
        }

        if unit.signal_pending() {
            return self.reschedule(CYCLES_STALLED);
        }

        if self.fifo_enabled() {
            if let Some(action) = self.fifo_drain_step(unit, sched) {
                return action;
            }
        }

        self.check_path_status(unit);

        if let Some(action) = self.vif_gate(unit, sched) {
            return action;
        }

        if !self.channel.chcr.str() {
            log::warn!("Spurious GIF MFIFO interrupt with STR clear");
            sched.cancel(IntChannel::MfifoGif);
            return HandlerAction::Idle;
        }

        if self.state.gifstate.contains(GifState::EMPTY) {
            sched.fire_mfifo_empty();
            if self.fifo_enabled() {
                return self.reschedule(CYCLES_STALLED);
            }
            return HandlerAction::Idle;
        }

        if self.channel.qwc > 0 || !self.state.gspath3done {
            // Can't do PATH3, so try the DMA again later
            if !self.fifo_enabled() && !unit.can_do_path3() {
                if !unit.path3_masked() {
                    log::debug!("PATH3 stalled");
                    return self.reschedule(CYCLES_STALLED);
                }
                return HandlerAction::Idle;
            }
            return self.mfifo_transfer(ram, unit);
        }

        // End of DMA
        if !self.fifo_enabled() {
            self.regs.stat.fqc = 0;
            self.regs.csr_fifo = super::FifoStatus::Empty;
        }

        if self.spr0_madr == self.channel.tadr {
            sched.fire_mfifo_empty();
        }

        self.state.gscycles = 0;
        self.channel.chcr.set_str(false);
        self.state.gifstate = GifState::READY;

        log::debug!("GIF MFIFO DMA end");
        HandlerAction::Complete
    }
}
