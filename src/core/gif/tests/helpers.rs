// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Shared helpers for GIF engine tests: a receiving-unit double that
//! simulates masking and backpressure, RAM builders, and a handler loop
//! that plays the role of the cycle scheduler.

use super::super::*;
use crate::core::config::CoreConfig;
use crate::core::dmac::{DmacInterrupts, TagId};

/// Receiving-unit double with scriptable masking and consumption
pub struct TestGifUnit {
    pub accept_path3: bool,
    pub masked: bool,
    pub state: PathState,
    pub signal: bool,
    pub queued: bool,

    /// Cap on quadwords consumed per offer (None = consume everything)
    pub consume_limit: Option<usize>,

    /// Every byte consumed, in order
    pub received: Vec<u8>,

    /// Arbiter kicks observed
    pub executes: usize,
}

impl TestGifUnit {
    pub fn new() -> Self {
        Self {
            accept_path3: true,
            masked: false,
            state: PathState::Idle,
            signal: false,
            queued: false,
            consume_limit: None,
            received: Vec::new(),
            executes: 0,
        }
    }

    pub fn received_qwc(&self) -> usize {
        self.received.len() / 16
    }
}

impl GifUnit for TestGifUnit {
    fn can_do_path3(&self) -> bool {
        self.accept_path3
    }

    fn path3_masked(&self) -> bool {
        self.masked
    }

    fn path3_state(&self) -> PathState {
        self.state
    }

    fn set_path3_state(&mut self, state: PathState) {
        self.state = state;
    }

    fn signal_pending(&self) -> bool {
        self.signal
    }

    fn paths_queued(&self) -> bool {
        self.queued
    }

    fn execute(&mut self, _flush_only: bool, _from_path_check: bool) {
        self.executes += 1;
    }

    fn transfer_packet_data(&mut self, _kind: GifTransferKind, data: &[u8]) -> usize {
        let take = match self.consume_limit {
            Some(qw) => data.len().min(qw * 16),
            None => data.len(),
        };
        self.received.extend_from_slice(&data[..take]);
        take
    }
}

/// Fresh engine + double + scheduler + 64KB of RAM, direct-transfer path
pub fn test_context() -> (GifDma, TestGifUnit, DmacInterrupts, Vec<u8>) {
    let mut gif = GifDma::new(&CoreConfig::default());
    gif.init();
    (gif, TestGifUnit::new(), DmacInterrupts::new(), vec![0u8; 0x10000])
}

/// As [`test_context`], with the packet-FIFO path enabled
pub fn fifo_context() -> (GifDma, TestGifUnit, DmacInterrupts, Vec<u8>) {
    let mut gif = GifDma::new(&CoreConfig {
        gif_fifo: true,
    });
    gif.init();
    (gif, TestGifUnit::new(), DmacInterrupts::new(), vec![0u8; 0x10000])
}

/// Write a descriptor tag at `addr`
pub fn write_tag(ram: &mut [u8], addr: u32, qwc: u16, id: TagId, irq: bool, target: u32) {
    let mut word0 = qwc as u32 | ((id as u32) << 28);
    if irq {
        word0 |= 0x8000_0000;
    }
    let at = addr as usize;
    ram[at..at + 4].copy_from_slice(&word0.to_le_bytes());
    ram[at + 4..at + 8].copy_from_slice(&target.to_le_bytes());
    ram[at + 8..at + 16].fill(0);
}

/// Fill `qwc` quadwords at `addr` with a recognizable per-byte pattern
pub fn fill_pattern(ram: &mut [u8], addr: u32, qwc: u32, seed: u8) {
    let at = addr as usize;
    for (i, byte) in ram[at..at + (qwc as usize) * 16].iter_mut().enumerate() {
        *byte = seed.wrapping_add(i as u8);
    }
}

/// The pattern [`fill_pattern`] writes, for comparison
pub fn pattern(qwc: u32, seed: u8) -> Vec<u8> {
    (0..qwc as usize * 16)
        .map(|i| seed.wrapping_add(i as u8))
        .collect()
}

/// Kick the channel and play scheduler until the engine settles
///
/// Applies each returned action, expires the pending event, and re-enters
/// the handler, exactly as the cycle scheduler would. Returns the terminal
/// action (`Complete` or `Idle`) and the number of handler entries taken.
pub fn run_dma(
    gif: &mut GifDma,
    ram: &[u8],
    unit: &mut TestGifUnit,
    ints: &mut DmacInterrupts,
    max_entries: usize,
) -> (HandlerAction, usize) {
    let action = gif.begin_dma(ram, unit, ints);
    run_from(gif, ram, unit, ints, action, max_entries)
}

/// Play scheduler from an already-returned action
pub fn run_from(
    gif: &mut GifDma,
    ram: &[u8],
    unit: &mut TestGifUnit,
    ints: &mut DmacInterrupts,
    mut action: HandlerAction,
    max_entries: usize,
) -> (HandlerAction, usize) {
    let mut entries = 0;
    while let HandlerAction::Reschedule { channel, .. } = action {
        assert!(
            entries < max_entries,
            "handler did not settle after {} entries",
            max_entries
        );
        apply_action(ints, action);
        ints.dispatch(channel);
        action = gif.interrupt(ram, unit, ints);
        entries += 1;
    }
    (action, entries)
}
