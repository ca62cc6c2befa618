// Copyright 2024 Saptak Santra
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

//! Error types

use std::fmt;

/// Crate error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PvError {
    /// Bit index at or beyond the change set length
    IndexOutOfBounds { index: usize, len: usize },

    /// Serialized change set failed validation
    InvalidChangeSet(String),

    /// Queue was closed before the operation could complete
    Closed,

    /// Queue is at its bound and the caller asked not to block
    Full,

    /// Queue is empty and the caller asked not to block
    Empty,

    /// Blocking operation gave up after its deadline
    Timeout,
}

impl fmt::Display for PvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PvError::IndexOutOfBounds { index, len } => {
                write!(f, "Index out of bounds: {index} >= {len}")
            }
            PvError::InvalidChangeSet(msg) => write!(f, "Invalid change set: {msg}"),
            PvError::Closed => write!(f, "Queue closed"),
            PvError::Full => write!(f, "Queue full"),
            PvError::Empty => write!(f, "Queue empty"),
            PvError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for PvError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, PvError>;
