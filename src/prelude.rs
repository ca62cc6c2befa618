//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use pvcore::prelude::*;
//! ```

pub use crate::change_set::ChangeSet;
pub use crate::error::{PvError, Result};
pub use crate::fmt::{escape, Describe, IndentWriter};
pub use crate::handoff::{HandoffQueue, PopError, PushError, QueueState};
pub use crate::instance::instance_snapshot;
