//! Stress test - queue and executor
//!
//! Hammers `BoundedSlotQueue` from several producers and consumers, then
//! pushes a large number of tasks through an executor and back.
//!
//! Usage: stress [items] [threads]

use corun::{BoundedSlotQueue, Executor, ExecutorConfig, Task};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

fn main() {
    corun::init_logging();
    println!("=== corun Stress Test ===\n");

    let (items, threads) = parse_args(std::env::args().skip(1));

    queue_stress(items, threads);
    executor_stress(items / 10);

    println!("\n=== Stress Test Complete ===");
}

/// `[items] [threads]`; unparsable values fall back to defaults and the
/// thread count is at least 1
fn parse_args(mut args: impl Iterator<Item = String>) -> (u64, u64) {
    let items = args.next().and_then(|s| s.parse().ok()).unwrap_or(1_000_000);
    let threads = args.next().and_then(|s| s.parse().ok()).unwrap_or(4u64).max(1);
    (items, threads)
}

/// Each value pushed must be popped exactly once
fn queue_stress(items: u64, threads: u64) {
    println!("--- queue: {} items, {}p/{}c ---", items, threads, threads);

    let queue = Arc::new(BoundedSlotQueue::new(1024));
    let per_producer = items / threads;
    let total = per_producer * threads;
    let popped = Arc::new(AtomicU64::new(0));
    let sum = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let producers: Vec<_> = (0..threads)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    let mut value = p * per_producer + i;
                    loop {
                        match queue.try_push(value) {
                            Ok(()) => break,
                            Err(full) => {
                                value = full.into_inner();
                                thread::yield_now();
                            }
                        }
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let popped = Arc::clone(&popped);
            let sum = Arc::clone(&sum);
            thread::spawn(move || {
                while popped.load(Ordering::Relaxed) < total {
                    match queue.try_pop() {
                        Some(v) => {
                            sum.fetch_add(v, Ordering::Relaxed);
                            popped.fetch_add(1, Ordering::Relaxed);
                        }
                        None => thread::yield_now(),
                    }
                }
            })
        })
        .collect();

    for h in producers.into_iter().chain(consumers) {
        h.join().expect("stress thread panicked");
    }

    let elapsed = start.elapsed();
    let expected = total * total.saturating_sub(1) / 2;
    let got = sum.load(Ordering::Relaxed);

    println!("Popped:     {}", popped.load(Ordering::Relaxed));
    println!("Sum check:  {}", if got == expected { "ok" } else { "MISMATCH" });
    println!("Time:       {:?}", elapsed);
    println!("Throughput: {:.0} items/sec", total as f64 / elapsed.as_secs_f64());
}

/// Tasks hop onto the executor and finish there
fn executor_stress(tasks: u64) {
    println!("\n--- executor: {} tasks ---", tasks);

    let executor = match Executor::with_config(ExecutorConfig::from_env()) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("invalid executor config: {}", e);
            return;
        }
    };
    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let handle = executor.handle();
            let completed = Arc::clone(&completed);
            Task::spawn(async move {
                handle.hop().await;
                completed.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    let mut cancelled = 0u64;
    for task in handles {
        if task.try_sync_wait().is_err() {
            cancelled += 1;
        }
    }

    let elapsed = start.elapsed();
    println!("Completed:  {}", completed.load(Ordering::Relaxed));
    println!("Cancelled:  {}", cancelled);
    println!("Executed:   {}", executor.executed());
    println!("Time:       {:?}", elapsed);
    println!("Throughput: {:.0} tasks/sec", tasks as f64 / elapsed.as_secs_f64());

    if let Err(e) = executor.shutdown() {
        eprintln!("executor shutdown failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_zero_threads_clamped() {
        assert_eq!(parse_args(args(&["100", "0"])), (100, 1));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse_args(args(&[])), (1_000_000, 4));
        assert_eq!(parse_args(args(&["x", "y"])), (1_000_000, 4));
    }

    #[test]
    fn test_fewer_items_than_threads() {
        let (items, threads) = parse_args(args(&["3", "8"]));
        queue_stress(items, threads);
    }
}
