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

//! Runtime configuration
//!
//! The engine accepts a single feature flag from external configuration:
//! whether PATH3 DMA goes through the emulated hardware packet FIFO or is
//! handed to the GIF in one piece. The flag is latched at engine creation
//! and read-only afterwards.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Core engine configuration
///
/// # Examples
///
/// ```
/// use gifdma::core::config::CoreConfig;
///
/// let cfg = CoreConfig::from_toml("gif_fifo = true").unwrap();
/// assert!(cfg.gif_fifo);
/// assert!(!CoreConfig::default().gif_fifo);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Emulate the GIF packet FIFO on PATH3 transfers
    ///
    /// When disabled (the default, matching most titles), DMA packets are
    /// handed straight to the GIF and only the FQC/CSR mirrors are faked.
    /// A few titles poll the FIFO count and need the staged path.
    pub gif_fifo: bool,
}

impl CoreConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
