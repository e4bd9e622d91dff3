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

//! Save state serialization for the GIF DMA engine
//!
//! Snapshots are serialized with bincode for efficient binary encoding. A
//! snapshot carries:
//! - Metadata (timestamp)
//! - The engine freeze block (coarse state, chain-done flag, current-segment
//!   cycle count, full packet FIFO contents)
//! - Channel registers (MADR/TADR/QWC/CHCR/ASR0/ASR1)
//! - GIF register mirrors (STAT, CTRL, CSR FIFO field)
//! - Controller registers (MFD/STD/DMAE, STADR, ring base/mask)
//! - The VIF1 gate flag and the SPR0 write cursor
//!
//! Saving and restoring must reproduce bit-identical subsequent behavior.
//! The per-entry MFIFO cycle accumulator and the stall-control cycle memory
//! are deliberately not persistent; they reset on restore.
//!
//! # Version Compatibility
//!
//! Snapshots carry a version number and a freeze tag. Loading a snapshot
//! with a different version or tag fails with a typed error.
//!
//! # Example
//!
//! ```no_run
//! use gifdma::core::config::CoreConfig;
//! use gifdma::core::gif::GifDma;
//! use gifdma::core::save_state::SaveState;
//!
//! let mut gif = GifDma::new(&CoreConfig::default());
//! // ... run emulation ...
//!
//! let state = SaveState::from_core(&gif);
//! state.save_to_file("gif.state").unwrap();
//!
//! // Later: load and apply
//! let loaded = SaveState::load_from_file("gif.state").unwrap();
//! loaded.apply(&mut gif);
//! ```

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{config, Decode, Encode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::dmac::{DmaChannel, DmacRegisters};
use crate::core::error::{GifDmaError, Result};
use crate::core::gif::{GifDma, GifFifo, GifRegisters, GifState};

/// Save state version for compatibility checking
pub const SAVE_STATE_VERSION: u32 = 1;

/// Freeze tag identifying a GIF DMA state block
pub const FREEZE_TAG: &str = "GIFdma";

/// Save state metadata
#[derive(Serialize, Deserialize, Encode, Decode)]
#[bincode(encode_bounds = "", decode_bounds = "")]
pub struct SaveStateMetadata {
    /// Timestamp when the save state was created
    #[bincode(with_serde)]
    pub timestamp: DateTime<Utc>,
}

/// The engine's own freeze block
///
/// Kept in the on-disk order the hardware state has always been frozen in:
/// coarse state, chain-done flag, current-segment cycle count, FIFO.
#[derive(Serialize, Deserialize, Encode, Decode, PartialEq, Eq, Debug)]
pub struct GifDmaFreeze {
    /// Coarse engine state bits (READY / MFIFO EMPTY)
    pub gifstate: u8,

    /// No further chain descriptor remains
    pub gspath3done: bool,

    /// Cycle cost accumulated by the current segment
    pub gscycles: i32,

    /// Full packet FIFO: indices, storage, and the staging mirror
    pub fifo: GifFifo,
}

/// Complete GIF DMA engine save state
#[derive(Serialize, Deserialize, Encode, Decode)]
pub struct SaveState {
    /// Version number for compatibility checking
    pub version: u32,

    /// Freeze tag ("GIFdma")
    pub tag: String,

    /// Save state metadata
    pub metadata: SaveStateMetadata,

    /// Engine freeze block
    pub engine: GifDmaFreeze,

    /// GIF channel registers (D2)
    pub channel: DmaChannel,

    /// GIF register mirrors
    pub regs: GifRegisters,

    /// Controller-wide registers
    pub dmac: DmacRegisters,

    /// VIF1 STAT.VGW mirror
    pub vif1_vgw: bool,

    /// SPR0 MADR mirror (MFIFO write cursor)
    pub spr0_madr: u32,
}

impl SaveState {
    /// Capture a save state from the engine context
    pub fn from_core(gif: &GifDma) -> Self {
        Self {
            version: SAVE_STATE_VERSION,
            tag: FREEZE_TAG.to_string(),
            metadata: SaveStateMetadata {
                timestamp: Utc::now(),
            },
            engine: GifDmaFreeze {
                gifstate: gif.state.gifstate.bits(),
                gspath3done: gif.state.gspath3done,
                gscycles: gif.state.gscycles,
                fifo: gif.fifo.clone(),
            },
            channel: gif.channel.clone(),
            regs: gif.regs.clone(),
            dmac: gif.dmac.clone(),
            vif1_vgw: gif.vif1_vgw,
            spr0_madr: gif.spr0_madr,
        }
    }

    /// Restore this save state into the engine context
    ///
    /// The non-persistent cycle accumulators reset to zero; the packet-FIFO
    /// feature flag stays whatever the engine was created with.
    pub fn apply(&self, gif: &mut GifDma) {
        gif.state.gifstate = GifState::from_bits_truncate(self.engine.gifstate);
        gif.state.gspath3done = self.engine.gspath3done;
        gif.state.gscycles = self.engine.gscycles;
        gif.state.prevcycles = 0;
        gif.state.mfifocycles = 0;
        gif.fifo = self.engine.fifo.clone();
        gif.channel = self.channel.clone();
        gif.regs = self.regs.clone();
        gif.dmac = self.dmac.clone();
        gif.vif1_vgw = self.vif1_vgw;
        gif.spr0_madr = self.spr0_madr;
    }

    /// Serialize to bincode bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::encode_to_vec(self, config::standard())?)
    }

    /// Deserialize from bincode bytes, checking version and freeze tag
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (state, _): (SaveState, usize) =
            bincode::decode_from_slice(bytes, config::standard())?;

        if state.version != SAVE_STATE_VERSION {
            return Err(GifDmaError::IncompatibleVersion {
                expected: SAVE_STATE_VERSION,
                got: state.version,
            });
        }

        if state.tag != FREEZE_TAG {
            return Err(GifDmaError::FreezeTagMismatch {
                expected: FREEZE_TAG.to_string(),
                got: state.tag,
            });
        }

        Ok(state)
    }

    /// Save state to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let encoded = self.to_bytes()?;
        let mut file = File::create(path)?;
        file.write_all(&encoded)?;
        Ok(())
    }

    /// Load state from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CoreConfig;
    use crate::core::gif::FifoStatus;

    fn scrambled_core() -> GifDma {
        let mut gif = GifDma::new(&CoreConfig::default());
        gif.init();
        gif.state.gifstate = GifState::EMPTY;
        gif.state.gspath3done = true;
        gif.state.gscycles = 42;
        gif.channel.madr = 0x0012_3400;
        gif.channel.tadr = 0x0012_5600;
        gif.channel.qwc = 7;
        gif.channel.chcr.0 = 0x0000_0105;
        gif.regs.stat.fqc = 5;
        gif.regs.stat.imt = true;
        gif.regs.csr_fifo = FifoStatus::Normal;
        gif.dmac.stadr = 0x8000;
        gif.dmac.rbor = 0x1000;
        gif.dmac.rbsr = 0xFFF;
        gif.vif1_vgw = true;
        gif.spr0_madr = 0x1800;
        let qw = [0xAB_u8; 16];
        gif.fifo_write(&qw, 1);
        gif
    }

    #[test]
    fn test_round_trip_bytes() {
        let gif = scrambled_core();
        let state = SaveState::from_core(&gif);

        let bytes = state.to_bytes().unwrap();
        let decoded = SaveState::from_bytes(&bytes).unwrap();

        let mut restored = GifDma::new(&CoreConfig::default());
        decoded.apply(&mut restored);

        assert_eq!(restored.state.gifstate, gif.state.gifstate);
        assert_eq!(restored.state.gspath3done, gif.state.gspath3done);
        assert_eq!(restored.state.gscycles, gif.state.gscycles);
        assert_eq!(restored.fifo, gif.fifo);
        assert_eq!(restored.channel, gif.channel);
        assert_eq!(restored.regs, gif.regs);
        assert_eq!(restored.dmac, gif.dmac);
        assert_eq!(restored.vif1_vgw, gif.vif1_vgw);
        assert_eq!(restored.spr0_madr, gif.spr0_madr);
    }

    #[test]
    fn test_accumulators_not_persistent() {
        let mut gif = scrambled_core();
        gif.state.prevcycles = 99;
        gif.state.mfifocycles = 7;

        let state = SaveState::from_core(&gif);
        state.apply(&mut gif);

        assert_eq!(gif.state.prevcycles, 0);
        assert_eq!(gif.state.mfifocycles, 0);
    }

    #[test]
    fn test_version_check() {
        let gif = scrambled_core();
        let mut state = SaveState::from_core(&gif);
        state.version = 999;

        let bytes = bincode::encode_to_vec(&state, config::standard()).unwrap();
        match SaveState::from_bytes(&bytes) {
            Err(GifDmaError::IncompatibleVersion { expected, got }) => {
                assert_eq!(expected, SAVE_STATE_VERSION);
                assert_eq!(got, 999);
            }
            other => panic!("expected version error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_freeze_tag_check() {
        let gif = scrambled_core();
        let mut state = SaveState::from_core(&gif);
        state.tag = "VIFdma".to_string();

        let bytes = bincode::encode_to_vec(&state, config::standard()).unwrap();
        assert!(matches!(
            SaveState::from_bytes(&bytes),
            Err(GifDmaError::FreezeTagMismatch { .. })
        ));
    }

    #[test]
    fn test_save_load_file() {
        let gif = scrambled_core();
        let state = SaveState::from_core(&gif);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gif.state");

        state.save_to_file(&path).unwrap();
        let loaded = SaveState::load_from_file(&path).unwrap();

        assert_eq!(loaded.version, SAVE_STATE_VERSION);
        assert_eq!(loaded.tag, FREEZE_TAG);
        assert_eq!(loaded.engine, state.engine);
    }
}
