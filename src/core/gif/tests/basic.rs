// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Engine construction, reset, mirrors, and the path/state coordinator

use super::super::*;
use super::helpers::*;
use crate::core::config::CoreConfig;
use crate::core::dmac::TagId;
use crate::core::save_state::SaveState;

#[test]
fn test_init_resets_everything() {
    let (mut gif, mut unit, mut ints, _ram) = test_context();

    let qw = [0x55u8; 16];
    gif.fifo_write(&qw, 1);
    gif.state.gspath3done = true;
    gif.state.gscycles = 10;
    gif.state.gifstate = GifState::EMPTY;

    gif.init();

    assert_eq!(gif.regs.stat.fqc, 0);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Empty);
    assert_eq!(gif.state.gifstate, GifState::READY);
    assert!(!gif.state.gspath3done);
    assert_eq!(gif.state.gscycles, 0);
    assert_eq!(gif.fifo.read_index(), 0);
    assert_eq!(gif.fifo.write_index(), 0);

    // Reading the freshly reset FIFO is a no-op
    assert_eq!(gif.fifo_read(&mut unit, &mut ints, true), 0);
    assert!(unit.received.is_empty());
}

#[test]
fn test_csr_mirror_tracks_occupancy() {
    let (mut gif, _unit, _ints, _ram) = test_context();
    let qw = [0u8; 16 * 16];

    assert_eq!(gif.regs.csr_fifo, FifoStatus::Empty);

    gif.fifo_write(&qw, 1);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Normal);

    gif.fifo_write(&qw, 13);
    assert_eq!(gif.regs.stat.fqc, 14);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Normal);

    // Full is reported one early, like the hardware does
    gif.fifo_write(&qw, 1);
    assert_eq!(gif.regs.stat.fqc, 15);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Full);

    gif.fifo_write(&qw, 1);
    assert_eq!(gif.regs.stat.fqc, 16);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Full);
}

#[test]
fn test_normal_mode_transfer_completes() {
    let (mut gif, mut unit, mut ints, mut ram) = test_context();

    fill_pattern(&mut ram, 0x1000, 4, 0x10);
    gif.channel.madr = 0x1000;
    gif.channel.qwc = 4;
    gif.channel.chcr.0 = 0x100; // Normal mode, STR

    let (action, _) = run_dma(&mut gif, &ram, &mut unit, &mut ints, 16);

    assert_eq!(action, HandlerAction::Complete);
    apply_action(&mut ints, action);

    assert_eq!(unit.received, pattern(4, 0x10));
    assert!(!gif.channel.chcr.str());
    assert_eq!(gif.channel.qwc, 0);
    assert_eq!(gif.regs.stat.fqc, 0);
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Empty);
    assert_eq!(ints.gif_irqs, 1);
}

#[test]
fn test_fqc_mirror_during_and_after_dma() {
    let (mut gif, mut unit, mut ints, mut ram) = test_context();

    fill_pattern(&mut ram, 0x1000, 2, 0);
    gif.channel.madr = 0x1000;
    gif.channel.qwc = 2;
    gif.channel.chcr.0 = 0x100;

    let action = gif.begin_dma(&ram, &mut unit, &mut ints);

    // Non-FIFO mode fakes a full FIFO while the DMA runs
    assert!(matches!(action, HandlerAction::Reschedule { .. }));
    assert_eq!(gif.regs.csr_fifo, FifoStatus::Full);

    let (action, _) = run_from(&mut gif, &ram, &mut unit, &mut ints, action, 8);
    assert_eq!(action, HandlerAction::Complete);
    assert_eq!(gif.regs.stat.fqc, 0);
}

#[test]
fn test_interrupt_with_str_clear_is_idle() {
    let (mut gif, mut unit, mut ints, ram) = test_context();

    let action = gif.interrupt(&ram, &mut unit, &mut ints);

    assert_eq!(action, HandlerAction::Idle);
    assert!(unit.received.is_empty());
    assert_eq!(ints.gif_irqs, 0);
}

#[test]
fn test_coordinator_retires_apath3() {
    let (mut gif, mut unit, _ints, _ram) = test_context();

    gif.regs.stat.apath = 3;
    gif.regs.stat.oph = true;
    unit.queued = true;

    gif.check_path_status(&mut unit);

    assert_eq!(gif.regs.stat.apath, 0);
    assert!(!gif.regs.stat.oph);
    assert_eq!(unit.executes, 1);
}

#[test]
fn test_coordinator_leaves_other_paths_alone() {
    let (mut gif, mut unit, _ints, _ram) = test_context();

    gif.regs.stat.apath = 1;
    gif.regs.stat.oph = true;
    unit.queued = true;

    gif.check_path_status(&mut unit);

    assert_eq!(gif.regs.stat.apath, 1);
    assert!(gif.regs.stat.oph);
    assert_eq!(unit.executes, 0);
}

#[test]
fn test_coordinator_demotes_wait_to_idle() {
    let (mut gif, mut unit, _ints, _ram) = test_context();

    unit.state = PathState::Wait;
    gif.check_path_status(&mut unit);
    assert_eq!(unit.state, PathState::Idle);

    // Active paths stay active
    unit.state = PathState::Active;
    gif.check_path_status(&mut unit);
    assert_eq!(unit.state, PathState::Active);
}

#[test]
fn test_coordinator_no_kick_while_active() {
    let (mut gif, mut unit, _ints, _ram) = test_context();

    gif.regs.stat.apath = 3;
    unit.state = PathState::Active;
    unit.queued = true;

    gif.check_path_status(&mut unit);

    // APATH retires but the arbiter is not kicked mid-packet
    assert_eq!(gif.regs.stat.apath, 0);
    assert_eq!(unit.executes, 0);
}

#[test]
fn test_save_restore_mid_chain_is_bit_identical() {
    let (mut gif, mut unit, mut ints, mut ram) = test_context();

    // CNT(2) -> CNT(2) -> END(1)
    write_tag(&mut ram, 0x1000, 2, TagId::Cnt, false, 0);
    fill_pattern(&mut ram, 0x1010, 2, 0x20);
    write_tag(&mut ram, 0x1030, 2, TagId::Cnt, false, 0);
    fill_pattern(&mut ram, 0x1040, 2, 0x60);
    write_tag(&mut ram, 0x1060, 1, TagId::End, false, 0);
    fill_pattern(&mut ram, 0x1070, 1, 0xA0);

    gif.channel.tadr = 0x1000;
    gif.channel.qwc = 0;
    gif.channel.chcr.0 = (1 << 2) | 0x100; // Chain mode, STR

    // Run exactly one handler entry (first CNT segment moves)
    let action = gif.begin_dma(&ram, &mut unit, &mut ints);
    assert!(matches!(action, HandlerAction::Reschedule { .. }));

    // Snapshot, then finish the original
    let snapshot = SaveState::from_core(&gif);
    let baseline_prefix = unit.received.clone();
    let (action, _) = run_from(&mut gif, &ram, &mut unit, &mut ints, action, 16);
    assert_eq!(action, HandlerAction::Complete);

    // Restore into a fresh engine and finish from the snapshot
    let mut gif2 = GifDma::new(&CoreConfig::default());
    snapshot.apply(&mut gif2);
    let mut unit2 = TestGifUnit::new();
    unit2.received = baseline_prefix;
    let mut ints2 = crate::core::dmac::DmacInterrupts::new();

    let action2 = gif2.interrupt(&ram, &mut unit2, &mut ints2);
    let (action2, _) = run_from(&mut gif2, &ram, &mut unit2, &mut ints2, action2, 16);

    assert_eq!(action2, HandlerAction::Complete);
    assert_eq!(unit2.received, unit.received);
    assert_eq!(gif2.channel, gif.channel);
    assert_eq!(gif2.regs, gif.regs);
}
