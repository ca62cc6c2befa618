#![allow(dead_code, unused_imports)]

use pvcore::{ChangeSet, HandoffQueue};
use std::{fs::File, thread, time::Instant};

#[cfg(feature = "profiling")]
use tracing_subscriber::{self, prelude::*};

const FIELDS: usize = 96;

#[cfg(feature = "profiling")]
#[tracing::instrument(skip(queue))]
fn profile_pipeline(queue: &HandoffQueue<ChangeSet>, producers: usize, count: usize) -> usize {
    thread::scope(|s| {
        let handles: Vec<_> = (0..producers)
            .map(|p| {
                s.spawn(move || {
                    let _span = tracing::info_span!("producer", id = p).entered();
                    for i in 0..count {
                        if i % 10_000 == 0 {
                            tracing::info!("Producer {} at {}/{}", p, i, count);
                        }
                        let delta = ChangeSet::from_indices([i % FIELDS, (i * 31) % FIELDS], FIELDS);
                        if queue.push(delta).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect();

        let consumer = s.spawn(|| {
            let _span = tracing::info_span!("consumer").entered();
            queue.iter().map(|delta| delta.count()).sum::<usize>()
        });

        for handle in handles {
            let _ = handle.join();
        }
        queue.close();
        consumer.join().unwrap_or(0)
    })
}

#[cfg(feature = "profiling")]
fn main() -> std::io::Result<()> {
    // Set up tracing subscriber to write to a file
    let file = File::create("trace.json")?;
    let (non_blocking, _guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .with_thread_ids(true)
        .json()
        .init();

    println!("Warming up...");
    {
        let _span = tracing::info_span!("warmup").entered();
        let queue = HandoffQueue::new(64);
        profile_pipeline(&queue, 1, 1_000);
    }

    for bound in [1, 64, 0] {
        println!("Profiling 4 producers, bound {bound}...");
        let queue = HandoffQueue::new(bound);
        let start = Instant::now();
        let fields = profile_pipeline(&queue, 4, 50_000);
        println!("{fields} changed fields handed off in {:?}", start.elapsed());
    }
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_handoff binary requires --features profiling");
}
