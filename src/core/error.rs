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

/// GIF DMA engine error types
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GifDmaError>;

/// Main error type for the crate
///
/// The DMA engine itself never fails: unmapped addresses, saturated FIFOs,
/// and stall conditions are absorbed into emulated hardware behavior and
/// diagnostic logging. Errors only surface from the save-state and
/// configuration I/O paths.
#[derive(Error, Debug)]
pub enum GifDmaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Save state encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Save state decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Incompatible save state version: expected {expected}, got {got}")]
    IncompatibleVersion { expected: u32, got: u32 },

    #[error("Save state freeze tag mismatch: expected {expected:?}, got {got:?}")]
    FreezeTagMismatch { expected: String, got: String },

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
}
