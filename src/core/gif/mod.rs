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

//! GIF DMA engine
//!
//! This module implements the EE's GIF channel (channel 2): the DMA path
//! that streams display-list packets to the Graphics Interface over PATH3.
//! It covers normal and source-chain transfers, the shared-memory MFIFO
//! ring drained from SPR0, the 16-quadword hardware packet FIFO, and the
//! interrupt-driven timing model.
//!
//! # Structure
//!
//! The engine is a single context struct, [`GifDma`], mutated by a handler
//! that the host's cycle scheduler re-enters once per scheduled event. Each
//! entry performs at most one bounded unit of work and returns a
//! [`HandlerAction`] telling the host what to do next:
//!
//! ```text
//! entry -> path coordination -> { defer to VIF1
//!                               | MFIFO variant
//!                               | FIFO drain
//!                               | chain/direct transfer
//!                               | finalize + channel IRQ }
//! ```
//!
//! The cycle constants in here are empirical. They were tuned against game
//! behavior, not derived from documentation; retest compatibility before
//! changing one.
//!
//! # References
//!
//! - [PS2TEK: GIF](https://psi-rockin.github.io/ps2tek/#gif)
//! - [PS2TEK: DMAC source chaining](https://psi-rockin.github.io/ps2tek/#dmacsourcechaining)

use bincode::{Decode, Encode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::core::config::CoreConfig;
use crate::core::dmac::{
    DmaChannel, DmacRegisters, DmacScheduler, IntChannel, MfifoSelect,
};

mod chain;
pub mod fifo;
mod mfifo;
pub mod unit;

#[cfg(test)]
mod tests;

pub use fifo::GifFifo;
pub use unit::{GifTransferKind, GifUnit, PathState};

/// EE cycles per quadword of useful work
pub const CYCLE_BIAS: i32 = 2;

/// Minimum reschedule delay when no work was done
pub const CYCLES_MIN: i32 = 4;

/// Short defer: empty packet loops, VIF handoff, end-of-chain
pub const CYCLES_SHORT: i32 = 16;

/// Retry delay while the master DMA enable is off
pub const CYCLES_DMA_MASKED: i32 = 64;

/// Retry delay for stalled/paused PATH3
pub const CYCLES_STALLED: i32 = 128;

bitflags! {
    /// Coarse engine state
    ///
    /// `READY` is the empty set; `EMPTY` is latched while the MFIFO ring has
    /// no quadwords between the SPR0 write cursor and our drain address, and
    /// cleared when the writer tops the ring up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GifState: u8 {
        const EMPTY = 0x10;
    }
}

impl GifState {
    pub const READY: GifState = GifState::empty();
}

/// FIFO fill level mirrored into the GS CSR register
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub enum FifoStatus {
    Normal,
    #[default]
    Empty,
    Full,
}

/// GIF_STAT mirror (the fields this engine maintains or reacts to)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode,
)]
pub struct GifStat {
    /// Active path (3 = a PATH3 transfer just ran; cleared by the
    /// coordinator on the next handler entry)
    pub apath: u32,

    /// Output path in progress
    pub oph: bool,

    /// Intermittent PATH3 mode: split large packets so PATH1/2 can slip in
    pub imt: bool,

    /// FIFO quadword count (0-16)
    pub fqc: u32,
}

/// GIF_CTRL mirror
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode,
)]
pub struct GifCtrl {
    /// Temporary PATH3 pause requested by software
    pub pse: bool,
}

/// GIF register mirrors shared with the rest of the machine
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode,
)]
pub struct GifRegisters {
    pub stat: GifStat,
    pub ctrl: GifCtrl,

    /// GS CSR FIFO field, recomputed from FQC after every FIFO mutation
    pub csr_fifo: FifoStatus,
}

/// Cross-entry engine state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Coarse state (READY / MFIFO EMPTY)
    pub gifstate: GifState,

    /// No further chain descriptor remains
    pub gspath3done: bool,

    /// Cycle cost accumulated by the current segment
    pub gscycles: i32,

    /// Cycle memory across a stall-control rewind
    pub prevcycles: i32,

    /// Cycle cost accumulated by the current MFIFO entry
    pub mfifocycles: i32,
}

/// What the host must do after a handler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Re-enter the handler on `channel` after `cycles`
    Reschedule { channel: IntChannel, cycles: i32 },

    /// The channel finished its descriptor chain: STR has been cleared,
    /// raise the channel's completion interrupt
    Complete,

    /// Nothing to schedule; another agent (VIF1, the ring writer, software)
    /// will re-enter the engine
    Idle,
}

/// Apply a handler result through the scheduler
///
/// Rescheduling honors the hardware's re-raise rule: an event is (re)armed
/// when none is pending, or when the pending one carries a smaller cycle
/// budget than requested. The unsigned comparison of a possibly negative
/// request is deliberate; titles depend on the resulting immediate re-entry.
pub fn apply_action(sched: &mut dyn DmacScheduler, action: HandlerAction) {
    match action {
        HandlerAction::Reschedule { channel, cycles } => {
            if !sched.is_pending(channel) || sched.cycle_budget(channel) < cycles as u32 {
                sched.schedule(channel, cycles);
            }
        }
        HandlerAction::Complete => sched.raise_gif_irq(),
        HandlerAction::Idle => {}
    }
}

/// The GIF DMA engine context
///
/// All shared state of the subsystem lives here and is passed by reference
/// to every component, so tests can construct fresh, deterministic contexts.
#[derive(Debug, Clone)]
pub struct GifDma {
    /// Hardware packet FIFO (staged PATH3 path)
    pub fifo: GifFifo,

    /// GIF_STAT / GIF_CTRL / CSR mirrors
    pub regs: GifRegisters,

    /// Cross-entry engine state
    pub state: EngineState,

    /// The GIF channel's register set (D2)
    pub channel: DmaChannel,

    /// Controller-wide registers (MFD/STD/DMAE, STADR, ring base/mask)
    pub dmac: DmacRegisters,

    /// VIF1 STAT.VGW mirror: VIF1 is gated waiting on GIF
    pub vif1_vgw: bool,

    /// SPR0 MADR mirror: the MFIFO ring's write cursor
    pub spr0_madr: u32,

    /// Feature flag: stage PATH3 DMA through the packet FIFO
    /// (read-only, latched from [`CoreConfig`])
    fifo_enabled: bool,
}

impl GifDma {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            fifo: GifFifo::new(),
            regs: GifRegisters::default(),
            state: EngineState::default(),
            channel: DmaChannel::default(),
            dmac: DmacRegisters::new(),
            vif1_vgw: false,
            spr0_madr: 0,
            fifo_enabled: config.gif_fifo,
        }
    }

    /// Whether PATH3 DMA is staged through the packet FIFO
    #[inline(always)]
    pub fn fifo_enabled(&self) -> bool {
        self.fifo_enabled
    }

    /// Reset the FIFO and all cross-entry engine state
    pub fn init(&mut self) {
        self.fifo.init();
        self.regs.stat.fqc = 0;
        self.regs.csr_fifo = FifoStatus::Empty;
        self.state.gifstate = GifState::READY;
        self.state.gspath3done = false;
        self.state.gscycles = 0;
        self.state.prevcycles = 0;
        self.state.mfifocycles = 0;
    }

    /// Interrupt channel this engine currently runs on
    #[inline(always)]
    pub fn int_channel(&self) -> IntChannel {
        if self.dmac.mfd == MfifoSelect::Gif {
            IntChannel::MfifoGif
        } else {
            IntChannel::Gif
        }
    }

    /// Build a reschedule action on the current interrupt channel
    #[inline(always)]
    fn reschedule(&self, cycles: i32) -> HandlerAction {
        HandlerAction::Reschedule {
            channel: self.int_channel(),
            cycles,
        }
    }

    /// Request a handler re-entry directly (for out-of-band entry points
    /// like FIFO register reads; handler paths return actions instead)
    pub(crate) fn schedule_interrupt(&self, sched: &mut dyn DmacScheduler, cycles: i32) {
        apply_action(sched, self.reschedule(cycles));
    }

    /// Recompute the CSR FIFO field from the FQC mirror
    pub(crate) fn update_fifo_csr(&mut self) {
        self.regs.csr_fifo = if self.regs.stat.fqc >= 15 {
            FifoStatus::Full
        } else if self.regs.stat.fqc == 0 {
            FifoStatus::Empty
        } else {
            FifoStatus::Normal
        };
    }

    /// Path/state coordination, run on every handler entry
    ///
    /// Retires a just-finished PATH3 transfer (APATH mirror), kicks the
    /// arbiter if other paths have buffered work, and collapses a WAIT
    /// window to IDLE. The WAIT demotion is required for PATH3 masking
    /// timing.
    pub(crate) fn check_path_status(&mut self, unit: &mut dyn GifUnit) {
        if self.regs.stat.apath == 3 {
            self.regs.stat.apath = 0;
            self.regs.stat.oph = false;
            if matches!(unit.path3_state(), PathState::Idle | PathState::Wait)
                && unit.paths_queued()
            {
                unit.execute(false, true);
            }
        }

        if unit.path3_state() == PathState::Wait {
            unit.set_path3_state(PathState::Idle);
        }
    }

    /// VIF1 handoff: while VIF1 is gated waiting on GIF and PATH3 sits
    /// idle, nudge the VIF1 handler and decide whether this entry may keep
    /// running. Returns the action ending this entry, if any.
    fn vif_gate(
        &mut self,
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> Option<HandlerAction> {
        if unit.path3_state() != PathState::Idle || !self.vif1_vgw {
            return None;
        }

        if !sched.is_pending(IntChannel::Vif1) {
            sched.schedule(IntChannel::Vif1, 1);
        }

        // Loop if the GIF packet is empty (next packet pending) or masking
        // was lifted. VIF may re-mask PATH3 the instant it retriggers, so
        // this check has to come after the nudge.
        if !unit.path3_masked() || self.channel.qwc == 0 {
            return Some(self.reschedule(CYCLES_SHORT));
        }
        Some(HandlerAction::Idle)
    }

    /// One FIFO drain attempt from inside the handler. Returns the action
    /// ending this entry, if the FIFO state decides it.
    fn fifo_drain_step(
        &mut self,
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> Option<HandlerAction> {
        let leftover = self.fifo_read(unit, sched, true);
        if leftover != 0 {
            if !unit.path3_masked() || self.regs.stat.fqc < 16 {
                return Some(self.reschedule(leftover as i32 * CYCLE_BIAS));
            }
        } else if !unit.can_do_path3()
            && self.regs.stat.fqc == 16
            && (self.channel.qwc > 0 || !self.state.gspath3done)
        {
            if !unit.path3_masked() {
                return Some(self.reschedule(CYCLES_STALLED));
            }
            return Some(HandlerAction::Idle);
        }
        None
    }

    /// Top-level GIF DMA interrupt handler
    ///
    /// Re-entered once per scheduled event; dispatches to exactly one of
    /// path coordination, MFIFO drain, FIFO drain, or chain/direct transfer,
    /// then reports how to continue.
    pub fn interrupt(
        &mut self,
        ram: &[u8],
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> HandlerAction {
        log::trace!(
            "gif interrupt: qwc={} fqc={} apath={} oph={} path3={:?}",
            self.channel.qwc,
            self.regs.stat.fqc,
            self.regs.stat.apath,
            self.regs.stat.oph,
            unit.path3_state()
        );

        self.check_path_status(unit);

        if let Some(action) = self.vif_gate(unit, sched) {
            return action;
        }

        if self.dmac.mfd == MfifoSelect::Gif {
            return self.mfifo_interrupt(ram, unit, sched);
        }

        if self.fifo_enabled {
            if let Some(action) = self.fifo_drain_step(unit, sched) {
                return action;
            }
        }

        if unit.signal_pending() {
            log::debug!("PATH3 paused behind GS SIGNAL");
            return self.reschedule(CYCLES_STALLED);
        }

        // Double check: the FIFO drain may have ended the DMA under us
        self.check_path_status(unit);

        if unit.path3_state() == PathState::Idle
            && self.vif1_vgw
            && !sched.is_pending(IntChannel::Vif1)
        {
            sched.schedule(IntChannel::Vif1, 1);
        }

        if !self.channel.chcr.str() {
            return HandlerAction::Idle;
        }

        if self.channel.qwc > 0 || !self.state.gspath3done {
            if !self.dmac.dmae {
                log::warn!("GIF DMA masked, re-scheduling...");
                return self.reschedule(CYCLES_DMA_MASKED);
            }
            return self.dma_transfer(ram, unit, sched);
        }

        // End of DMA
        if !self.fifo_enabled {
            self.regs.stat.fqc = 0;
            self.regs.csr_fifo = FifoStatus::Empty;
        }
        self.state.gscycles = 0;
        self.channel.chcr.set_str(false);

        log::debug!(
            "GIF DMA end: fqc={} apath={} path3={:?}",
            self.regs.stat.fqc,
            self.regs.stat.apath,
            unit.path3_state()
        );
        HandlerAction::Complete
    }

    /// Kick the GIF channel (STR write)
    ///
    /// Seeds the chain-done flag from the channel mode and any preloaded
    /// descriptor, then falls straight into the interrupt handler.
    pub fn begin_dma(
        &mut self,
        ram: &[u8],
        unit: &mut dyn GifUnit,
        sched: &mut dyn DmacScheduler,
    ) -> HandlerAction {
        use crate::core::dmac::{TagId, TransferMode};

        log::debug!(
            "GIF DMA start: chcr=0x{:08X} madr=0x{:08X} qwc=0x{:X} tadr=0x{:08X}",
            self.channel.chcr.0,
            self.channel.madr,
            self.channel.qwc,
            self.channel.tadr
        );

        // Stale from the previous run on some titles; always reseed
        self.state.gspath3done = false;

        if !self.fifo_enabled {
            self.regs.stat.fqc |= 0x10;
            self.regs.csr_fifo = FifoStatus::Full;
        }

        if self.channel.chcr.mode() == TransferMode::Normal {
            // A plain run, not a chain: one segment and done
            self.state.gspath3done = true;
        }

        if self.channel.chcr.mode() == TransferMode::Chain && self.channel.qwc > 0 {
            let id = self.channel.chcr.tag_id();
            if id == TagId::Refe
                || id == TagId::End
                || (self.channel.chcr.tag_irq() && self.channel.chcr.tie())
            {
                self.state.gspath3done = true;
            }
        }

        self.interrupt(ram, unit, sched)
    }

    /// The MFIFO ring writer (SPR0) advanced its cursor
    ///
    /// Updates the write-cursor mirror and lifts the EMPTY latch so the next
    /// handler entry sees the new data.
    pub fn ring_written(&mut self, spr0_madr: u32) {
        self.spr0_madr = spr0_madr;
        self.state.gifstate.remove(GifState::EMPTY);
    }
}
