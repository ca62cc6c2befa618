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

//! pvcore - core primitives of a Process Variable protocol engine
//!
//! - [`ChangeSet`]: which fields of a structured value changed, walked in
//!   ascending order by delta encoders.
//! - [`HandoffQueue`]: blocking, optionally bounded FIFO between I/O and
//!   processing threads.
//! - [`fmt`]: escaping and indentation helpers for diagnostics.
//! - [`instance_snapshot`]: live instance counts for leak hunting.

pub mod change_set;
pub mod error;
pub mod fmt;
pub mod handoff;
pub mod instance;
pub mod prelude;


pub use change_set::*;
pub use error::*;
pub use handoff::*;
pub use instance::instance_snapshot;
