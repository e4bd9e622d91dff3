// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! Register bitfield and memory access tests

use super::super::*;

#[test]
fn test_tag_decoding() {
    // QWC=0x20, ID=REF (3), IRQ set
    let tag = DmaTag::new(0xB000_0020, 0x0040_0000);

    assert_eq!(tag.qwc(), 0x20);
    assert_eq!(tag.id(), TagId::Ref);
    assert!(tag.irq());
    assert_eq!(tag.addr(), 0x0040_0000);
    assert_eq!(tag.upper(), 0xB000);
}

#[test]
fn test_tag_id_mapping() {
    assert_eq!(TagId::from_bits(0), TagId::Refe);
    assert_eq!(TagId::from_bits(1), TagId::Cnt);
    assert_eq!(TagId::from_bits(2), TagId::Next);
    assert_eq!(TagId::from_bits(3), TagId::Ref);
    assert_eq!(TagId::from_bits(4), TagId::Refs);
    assert_eq!(TagId::from_bits(5), TagId::Call);
    assert_eq!(TagId::from_bits(6), TagId::Ret);
    assert_eq!(TagId::from_bits(7), TagId::End);

    // Only the low three bits matter
    assert_eq!(TagId::from_bits(0xB), TagId::Ref);
}

#[test]
fn test_chcr_bits() {
    let mut chcr = Chcr(0);

    assert_eq!(chcr.mode(), TransferMode::Normal);
    assert!(!chcr.str());
    assert!(!chcr.tie());

    chcr.0 = 1 << 2;
    assert_eq!(chcr.mode(), TransferMode::Chain);

    chcr.0 = 2 << 2;
    assert_eq!(chcr.mode(), TransferMode::Interleave);

    chcr.0 = 0x100;
    assert!(chcr.str());
    chcr.set_str(false);
    assert!(!chcr.str());
    chcr.set_str(true);
    assert!(chcr.str());

    chcr.0 = 0x80;
    assert!(chcr.tie());
    chcr.0 = 0x40;
    assert!(chcr.tte());
}

#[test]
fn test_chcr_asp() {
    let mut chcr = Chcr(0);
    assert_eq!(chcr.asp(), 0);

    chcr.set_asp(1);
    assert_eq!(chcr.asp(), 1);
    chcr.set_asp(2);
    assert_eq!(chcr.asp(), 2);

    // Other bits stay untouched
    chcr.0 |= 0x100;
    chcr.set_asp(0);
    assert!(chcr.str());
    assert_eq!(chcr.asp(), 0);
}

#[test]
fn test_chcr_tag_mirror() {
    let mut chcr = Chcr(0x0000_0185);
    let tag = DmaTag::new(0xB000_0020, 0);

    chcr.set_tag_upper(tag.upper());

    assert_eq!(chcr.tag_upper(), 0xB000);
    assert_eq!(chcr.tag_id(), TagId::Ref);
    assert!(chcr.tag_irq());
    // Lower half untouched
    assert!(chcr.str());
    assert!(chcr.tie());
}

#[test]
fn test_load_tag() {
    let mut ch = DmaChannel::default();
    let tag = DmaTag::new(0x7000_0008, 0x1234_5670);

    ch.load_tag(tag);

    assert_eq!(ch.qwc, 8);
    assert_eq!(ch.chcr.tag_id(), TagId::End);
    assert!(!ch.chcr.tag_irq());
}

#[test]
fn test_dma_source_bounds() {
    let ram = vec![0u8; 0x1000];

    assert!(dma_source(&ram, 0, 16).is_some());
    assert!(dma_source(&ram, 0xFF0, 1).is_some());
    assert!(dma_source(&ram, 0xFF0, 2).is_none());
    assert!(dma_source(&ram, 0x1000, 1).is_none());
    assert!(dma_source(&ram, 0xFFFF_FFF0, 1).is_none());

    // Low four address bits are ignored
    let run = dma_source(&ram, 0x10F, 1).unwrap();
    assert_eq!(run.len(), 16);
}

#[test]
fn test_read_dma_tag() {
    let mut ram = vec![0u8; 0x1000];
    ram[0x100..0x104].copy_from_slice(&0x3000_0004u32.to_le_bytes());
    ram[0x104..0x108].copy_from_slice(&0x0000_0200u32.to_le_bytes());

    let tag = read_dma_tag(&ram, 0x100).unwrap();
    assert_eq!(tag.qwc(), 4);
    assert_eq!(tag.id(), TagId::Ref);
    assert!(!tag.irq());
    assert_eq!(tag.addr(), 0x200);

    assert!(read_dma_tag(&ram, 0x2000).is_none());
}

#[test]
fn test_interrupt_scheduling() {
    let mut ints = DmacInterrupts::new();

    assert!(!ints.is_pending(IntChannel::Gif));

    ints.schedule(IntChannel::Gif, 16);
    assert!(ints.is_pending(IntChannel::Gif));
    assert_eq!(ints.cycle_budget(IntChannel::Gif), 16);
    assert!(!ints.is_pending(IntChannel::MfifoGif));

    assert!(ints.dispatch(IntChannel::Gif));
    assert!(!ints.is_pending(IntChannel::Gif));
    assert!(!ints.dispatch(IntChannel::Gif));

    ints.schedule(IntChannel::MfifoGif, 4);
    ints.cancel(IntChannel::MfifoGif);
    assert!(!ints.is_pending(IntChannel::MfifoGif));
}

#[test]
fn test_interrupt_lines() {
    let mut ints = DmacInterrupts::new();

    ints.raise_gif_irq();
    ints.raise_stall_irq();
    ints.fire_mfifo_empty();
    ints.fire_mfifo_empty();

    assert_eq!(ints.gif_irqs, 1);
    assert_eq!(ints.stall_irqs, 1);
    assert_eq!(ints.mfifo_empty_irqs, 2);
}
