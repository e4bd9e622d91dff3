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

//! PlayStation 2 GIF DMA engine core library
//!
//! This library emulates the EE DMA path that feeds display-list packets to
//! the Graphics Interface (GIF) over PATH3: plain and chain-mode transfers,
//! the shared-memory MFIFO ring, the small hardware packet FIFO, and the
//! interrupt-driven timing model that games depend on.
//!
//! The renderer, the CPU cycle scheduler, and the VIF1/SPR0 channels are not
//! part of this crate; they are reached through the `GifUnit` and
//! `DmacScheduler` traits at the crate boundary.
//!
//! # Example
//!
//! ```
//! use gifdma::core::config::CoreConfig;
//! use gifdma::core::gif::GifDma;
//!
//! let mut gif = GifDma::new(&CoreConfig::default());
//! gif.init();
//! ```

pub mod core;
