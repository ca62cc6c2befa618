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

//! Live instance counters for leak diagnostics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counter of live instances of one type
pub struct InstanceCounter {
    name: &'static str,
    live: AtomicUsize,
}

impl InstanceCounter {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            live: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub(crate) fn acquire(&self) {
        self.live.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn release(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current number of live instances
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

pub(crate) static CHANGE_SETS: InstanceCounter = InstanceCounter::new("ChangeSet");
pub(crate) static HANDOFF_QUEUES: InstanceCounter = InstanceCounter::new("HandoffQueue");

static TRACKED: [&InstanceCounter; 2] = [&CHANGE_SETS, &HANDOFF_QUEUES];

/// Snapshot of live instance counts keyed by type name.
///
/// Values are read one counter at a time and may be mutually inconsistent
/// while other threads are constructing or dropping instances.
pub fn instance_snapshot() -> BTreeMap<&'static str, usize> {
    TRACKED
        .iter()
        .map(|counter| (counter.name(), counter.live()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_acquire_release() {
        let counter = InstanceCounter::new("Probe");
        counter.acquire();
        counter.acquire();
        assert_eq!(counter.live(), 2);
        counter.release();
        assert_eq!(counter.live(), 1);
    }

    #[test]
    fn test_snapshot_lists_tracked_types() {
        let snapshot = instance_snapshot();
        assert!(snapshot.contains_key("ChangeSet"));
        assert!(snapshot.contains_key("HandoffQueue"));
    }
}
