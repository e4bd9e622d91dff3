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

//! Core emulation components
//!
//! This module contains the GIF DMA subsystem and its supporting plumbing:
//! - DMAC channel registers, descriptor tags, and chain walking
//! - GIF engine (PATH3 DMA, packet FIFO, MFIFO ring, interrupt handler)
//! - Save state serialization
//! - Runtime configuration

pub mod config;
pub mod dmac;
pub mod error;
pub mod gif;
pub mod save_state;

// Re-export commonly used types
pub use config::CoreConfig;
pub use dmac::{DmaChannel, DmacInterrupts, DmacScheduler, IntChannel};
pub use error::{GifDmaError, Result};
pub use gif::{GifDma, GifUnit, HandlerAction};
pub use save_state::SaveState;
