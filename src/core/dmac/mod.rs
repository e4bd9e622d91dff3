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

//! EE DMA Controller plumbing
//!
//! This module implements the pieces of the PS2 DMA controller (DMAC) that
//! the GIF channel shares with the rest of the machine: channel registers,
//! source-chain descriptor tags, the tag walker with its two-deep address
//! stack, and the interrupt scheduling interface.
//!
//! # Channel Registers
//!
//! Each EE DMA channel carries:
//! - **MADR**: current transfer address
//! - **TADR**: address of the next descriptor tag (chain mode)
//! - **QWC**: quadwords remaining in the current segment
//! - **CHCR**: control register (direction, mode, stack pointer, TIE, STR)
//! - **ASR0/ASR1**: the call/return tag-address stack
//!
//! # Source Chain Tags
//!
//! A descriptor tag occupies one quadword. The low 64 bits are decoded:
//!
//! ```text
//! Bits  | Field | Description
//! ------|-------|----------------------------------
//! 0-15  | QWC   | Quadwords to transfer
//! 26-27 | PCE   | Priority control (unused here)
//! 28-30 | ID    | Tag type (REFE/CNT/NEXT/REF/REFS/CALL/RET/END)
//! 31    | IRQ   | Interrupt request on this tag
//! 32-62 | ADDR  | Target address
//! 63    | SPR   | Scratchpad select
//! ```
//!
//! # References
//!
//! - [PS2TEK: DMAC](https://psi-rockin.github.io/ps2tek/#dmac)

use bincode::{Decode, Encode};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Bytes per quadword, the DMAC's only transfer unit
pub const QW_SIZE: u32 = 16;

/// Source-chain tag type (bits 28-30 of a descriptor tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TagId {
    /// Transfer the quadwords referenced by ADDR, then end
    Refe = 0,
    /// Transfer the quadwords following the tag, continue after them
    Cnt = 1,
    /// Transfer the quadwords following the tag, next tag at ADDR
    Next = 2,
    /// Transfer the quadwords referenced by ADDR, next tag follows this one
    Ref = 3,
    /// As REF, but honoring stall control
    Refs = 4,
    /// As NEXT, pushing the following tag address onto the ASR stack
    Call = 5,
    /// Transfer the quadwords following the tag, pop the next tag address
    Ret = 6,
    /// Transfer the quadwords following the tag, then end
    End = 7,
}

impl TagId {
    /// Decode a tag id from the three ID bits
    #[inline(always)]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 7 {
            0 => TagId::Refe,
            1 => TagId::Cnt,
            2 => TagId::Next,
            3 => TagId::Ref,
            4 => TagId::Refs,
            5 => TagId::Call,
            6 => TagId::Ret,
            _ => TagId::End,
        }
    }
}

/// One source-chain descriptor tag
///
/// Only the fields the DMAC decodes are kept: the low control word and the
/// target address word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTag {
    word0: u32,
    addr: u32,
}

impl DmaTag {
    /// Build a tag from its two decoded words
    pub fn new(word0: u32, addr: u32) -> Self {
        Self { word0, addr }
    }

    /// Quadword count (bits 0-15)
    #[inline(always)]
    pub fn qwc(&self) -> u32 {
        self.word0 & 0xFFFF
    }

    /// Tag type (bits 28-30)
    #[inline(always)]
    pub fn id(&self) -> TagId {
        TagId::from_bits(self.word0 >> 28)
    }

    /// IRQ request flag (bit 31)
    #[inline(always)]
    pub fn irq(&self) -> bool {
        (self.word0 & 0x8000_0000) != 0
    }

    /// Upper half of the control word, mirrored into CHCR.TAG
    #[inline(always)]
    pub fn upper(&self) -> u16 {
        (self.word0 >> 16) as u16
    }

    /// Target address (second word)
    #[inline(always)]
    pub fn addr(&self) -> u32 {
        self.addr
    }
}

/// Channel transfer mode (CHCR bits 2-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub enum TransferMode {
    #[default]
    Normal,
    Chain,
    Interleave,
}

/// Channel Control Register (Dn_CHCR)
///
/// Wrapped as a value type with named accessors so flag extraction stays
/// self-documenting:
/// - Bit 0: Direction
/// - Bits 2-3: Mode (0=normal, 1=chain, 2=interleave)
/// - Bits 4-5: Address stack pointer (ASP)
/// - Bit 6: TTE (transfer tag)
/// - Bit 7: TIE (tag interrupt enable)
/// - Bit 8: STR (start/busy)
/// - Bits 16-31: TAG (upper half of the most recent descriptor)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub struct Chcr(pub u32);

impl Chcr {
    /// Transfer mode (bits 2-3)
    #[inline(always)]
    pub fn mode(&self) -> TransferMode {
        match (self.0 >> 2) & 3 {
            0 => TransferMode::Normal,
            1 => TransferMode::Chain,
            _ => TransferMode::Interleave,
        }
    }

    /// Address stack pointer (bits 4-5)
    #[inline(always)]
    pub fn asp(&self) -> u32 {
        (self.0 >> 4) & 3
    }

    pub fn set_asp(&mut self, asp: u32) {
        self.0 = (self.0 & !0x30) | ((asp & 3) << 4);
    }

    /// Tag transfer enable (bit 6)
    #[inline(always)]
    pub fn tte(&self) -> bool {
        (self.0 & 0x40) != 0
    }

    /// Tag interrupt enable (bit 7)
    #[inline(always)]
    pub fn tie(&self) -> bool {
        (self.0 & 0x80) != 0
    }

    /// Start/busy flag (bit 8)
    #[inline(always)]
    pub fn str(&self) -> bool {
        (self.0 & 0x100) != 0
    }

    pub fn set_str(&mut self, running: bool) {
        if running {
            self.0 |= 0x100;
        } else {
            self.0 &= !0x100;
        }
    }

    /// Upper half of the most recent descriptor tag (bits 16-31)
    #[inline(always)]
    pub fn tag_upper(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn set_tag_upper(&mut self, upper: u16) {
        self.0 = (self.0 & 0xFFFF) | ((upper as u32) << 16);
    }

    /// Tag type of the most recent descriptor, from the TAG mirror
    #[inline(always)]
    pub fn tag_id(&self) -> TagId {
        TagId::from_bits((self.tag_upper() as u32) >> 12)
    }

    /// IRQ flag of the most recent descriptor, from the TAG mirror
    #[inline(always)]
    pub fn tag_irq(&self) -> bool {
        (self.tag_upper() & 0x8000) != 0
    }
}

/// One EE DMA channel's live register set
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode,
)]
pub struct DmaChannel {
    /// Transfer address register (Dn_MADR)
    pub madr: u32,

    /// Tag address register (Dn_TADR)
    pub tadr: u32,

    /// Quadwords remaining in the current segment (Dn_QWC)
    pub qwc: u32,

    /// Channel control register (Dn_CHCR)
    pub chcr: Chcr,

    /// Call stack slot 0 (Dn_ASR0)
    pub asr0: u32,

    /// Call stack slot 1 (Dn_ASR1)
    pub asr1: u32,
}

impl DmaChannel {
    /// Latch a freshly fetched descriptor: QWC from the tag, upper half
    /// mirrored into CHCR.TAG
    pub fn load_tag(&mut self, tag: DmaTag) {
        self.chcr.set_tag_upper(tag.upper());
        self.qwc = tag.qwc();
    }

    /// Account for transferred quadwords: advance MADR, shrink QWC
    ///
    /// After a CNT tag the next descriptor follows the data, so TADR tracks
    /// MADR while the segment drains. No-op when the channel is stopped.
    pub fn advance_source(&mut self, qwc: u32) {
        if self.chcr.str() {
            self.madr = self.madr.wrapping_add(qwc * QW_SIZE);
            self.qwc = self.qwc.wrapping_sub(qwc);
            if self.chcr.mode() == TransferMode::Chain && self.chcr.tag_id() == TagId::Cnt {
                self.tadr = self.madr;
            }
        }
    }

    /// Walk one source-chain descriptor
    ///
    /// Call after [`DmaChannel::load_tag`] with MADR already pointing at the
    /// tag's ADDR field. Updates MADR/TADR/ASRn per the tag type and returns
    /// `true` when this descriptor is the terminal one.
    pub fn follow_chain_tag(&mut self, id: TagId) -> bool {
        match id {
            TagId::Refe => {
                self.tadr = self.tadr.wrapping_add(QW_SIZE);
                true
            }
            TagId::Cnt => {
                self.madr = self.tadr.wrapping_add(QW_SIZE);
                self.tadr = self.madr;
                false
            }
            TagId::Next => {
                let next = self.madr;
                self.madr = self.tadr.wrapping_add(QW_SIZE);
                self.tadr = next;
                false
            }
            TagId::Ref | TagId::Refs => {
                self.tadr = self.tadr.wrapping_add(QW_SIZE);
                false
            }
            TagId::Call => {
                let next = self.madr;
                self.madr = self.tadr.wrapping_add(QW_SIZE);
                match self.chcr.asp() {
                    0 => self.asr0 = self.madr.wrapping_add(self.qwc * QW_SIZE),
                    1 => self.asr1 = self.madr.wrapping_add(self.qwc * QW_SIZE),
                    _ => {
                        log::warn!("DMA chain CALL with full address stack, ending transfer");
                        return true;
                    }
                }
                self.chcr.set_asp(self.chcr.asp() + 1);
                self.tadr = next;
                false
            }
            TagId::Ret => {
                self.madr = self.tadr.wrapping_add(QW_SIZE);
                match self.chcr.asp() {
                    2 => {
                        self.tadr = self.asr1;
                        self.chcr.set_asp(1);
                        false
                    }
                    1 => {
                        self.tadr = self.asr0;
                        self.chcr.set_asp(0);
                        false
                    }
                    // Empty stack: RET behaves as END
                    _ => true,
                }
            }
            TagId::End => {
                self.madr = self.tadr.wrapping_add(QW_SIZE);
                // TADR deliberately left alone
                true
            }
        }
    }
}

/// MFIFO drain channel selector (D_CTRL.MFD)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub enum MfifoSelect {
    #[default]
    None,
    Vif1,
    Gif,
}

/// Stall-control drain channel selector (D_CTRL.STD)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode,
)]
pub enum StallSelect {
    #[default]
    None,
    Vif1,
    Gif,
    Sif1,
}

/// Controller-wide DMAC registers shared with the GIF channel
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode,
)]
pub struct DmacRegisters {
    /// Which channel (if any) drains the MFIFO ring (D_CTRL.MFD)
    pub mfd: MfifoSelect,

    /// Which channel (if any) is the stall-control drain (D_CTRL.STD)
    pub std: StallSelect,

    /// Master DMA enable (D_CTRL.DMAE)
    pub dmae: bool,

    /// Stall address, written by the stall-control source channel (D_STADR)
    pub stadr: u32,

    /// MFIFO ring buffer base address (D_RBOR)
    pub rbor: u32,

    /// MFIFO ring buffer address mask (D_RBSR.RMSK); base + mask + 16 is
    /// one past the last byte of the ring
    pub rbsr: u32,
}

impl DmacRegisters {
    pub fn new() -> Self {
        Self {
            dmae: true,
            ..Default::default()
        }
    }
}

/// Bounds-checked view of a DMA source run in main memory
///
/// Returns `None` for addresses that do not resolve, which callers must
/// absorb as the hardware would (skip the segment, never retry forever).
#[inline(always)]
pub fn dma_source(ram: &[u8], addr: u32, qwc: u32) -> Option<&[u8]> {
    let start = (addr & !0xF) as usize;
    let len = qwc as usize * QW_SIZE as usize;
    let end = start.checked_add(len)?;
    if end > ram.len() {
        log::error!("DMA source out of bounds: 0x{:08X} ({} qw)", addr, qwc);
        return None;
    }
    Some(&ram[start..end])
}

/// Fetch and decode the descriptor tag at `addr`
pub fn read_dma_tag(ram: &[u8], addr: u32) -> Option<DmaTag> {
    let bytes = dma_source(ram, addr, 1)?;
    let word0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let taddr = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Some(DmaTag::new(word0, taddr))
}

/// DMAC interrupt channels the GIF engine touches
///
/// Values are the channel's bit position in the pending mask, matching the
/// EE's interrupt numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IntChannel {
    Vif1 = 1,
    Gif = 2,
    MfifoGif = 11,
}

bitflags! {
    /// Pending DMAC interrupt events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PendingChannels: u32 {
        const VIF1 = 1 << 1;
        const GIF = 1 << 2;
        const MFIFO_GIF = 1 << 11;
    }
}

impl IntChannel {
    #[inline(always)]
    fn flag(self) -> PendingChannels {
        match self {
            IntChannel::Vif1 => PendingChannels::VIF1,
            IntChannel::Gif => PendingChannels::GIF,
            IntChannel::MfifoGif => PendingChannels::MFIFO_GIF,
        }
    }

    #[inline(always)]
    fn slot(self) -> usize {
        match self {
            IntChannel::Vif1 => 0,
            IntChannel::Gif => 1,
            IntChannel::MfifoGif => 2,
        }
    }
}

/// Interface to the owning DMA controller and cycle scheduler
///
/// The GIF engine never blocks; it asks this interface to re-enter it after
/// a computed cycle delay and raises controller interrupt lines through it.
pub trait DmacScheduler {
    /// Is an event already pending on this channel?
    fn is_pending(&self, ch: IntChannel) -> bool;

    /// Cycle budget of the pending event (meaningful only while pending)
    fn cycle_budget(&self, ch: IntChannel) -> u32;

    /// Schedule the channel's handler to run after `cycles`
    fn schedule(&mut self, ch: IntChannel, cycles: i32);

    /// Drop a pending event without running it
    fn cancel(&mut self, ch: IntChannel);

    /// Raise the stall-interrupt line (SIS)
    fn raise_stall_irq(&mut self);

    /// Raise the MFIFO-empty interrupt line (MEIS)
    fn fire_mfifo_empty(&mut self);

    /// Raise the GIF channel's completion interrupt line (CIS2)
    fn raise_gif_irq(&mut self);
}

/// Pending-event bookkeeping for the DMAC interrupt channels
///
/// This is the thin adapter between the engine's returned actions and a host
/// cycle scheduler: the host clears a channel's pending bit with
/// [`DmacInterrupts::dispatch`] when its delay expires, calls the matching
/// handler, and applies the returned action.
///
/// # Examples
///
/// ```
/// use gifdma::core::dmac::{DmacInterrupts, DmacScheduler, IntChannel};
///
/// let mut ints = DmacInterrupts::new();
/// ints.schedule(IntChannel::Gif, 16);
/// assert!(ints.is_pending(IntChannel::Gif));
/// assert!(ints.dispatch(IntChannel::Gif));
/// assert!(!ints.is_pending(IntChannel::Gif));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DmacInterrupts {
    pending: PendingChannels,
    budget: [u32; 3],

    /// GIF channel completion interrupts raised
    pub gif_irqs: u32,

    /// Stall interrupts raised
    pub stall_irqs: u32,

    /// MFIFO-empty interrupts raised
    pub mfifo_empty_irqs: u32,
}

impl DmacInterrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// All currently pending channels
    pub fn pending_channels(&self) -> PendingChannels {
        self.pending
    }

    /// Clear a channel's pending bit for handler entry; returns whether an
    /// event was actually pending
    pub fn dispatch(&mut self, ch: IntChannel) -> bool {
        let was = self.pending.contains(ch.flag());
        self.pending.remove(ch.flag());
        was
    }
}

impl DmacScheduler for DmacInterrupts {
    fn is_pending(&self, ch: IntChannel) -> bool {
        self.pending.contains(ch.flag())
    }

    fn cycle_budget(&self, ch: IntChannel) -> u32 {
        self.budget[ch.slot()]
    }

    fn schedule(&mut self, ch: IntChannel, cycles: i32) {
        log::trace!("DMAC schedule {:?} in {} cycles", ch, cycles);
        self.pending.insert(ch.flag());
        self.budget[ch.slot()] = cycles as u32;
    }

    fn cancel(&mut self, ch: IntChannel) {
        self.pending.remove(ch.flag());
    }

    fn raise_stall_irq(&mut self) {
        log::debug!("DMAC stall interrupt");
        self.stall_irqs += 1;
    }

    fn fire_mfifo_empty(&mut self) {
        log::trace!("DMAC MFIFO empty interrupt");
        self.mfifo_empty_irqs += 1;
    }

    fn raise_gif_irq(&mut self) {
        log::debug!("DMAC GIF channel interrupt");
        self.gif_irqs += 1;
    }
}
