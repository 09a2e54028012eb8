//! Randomized horizon-invariant checks
//!
//! Hammers one worker queue with a randomized operation mix and asserts
//! the structural invariants after every step: the derived horizon
//! identity, the count/sequence agreement, the per-priority bucket
//! accounting, and priority ordering under sorted inserts.

use hetsched::context::PrioritySpan;
use hetsched::data::{AccessMode, ResidencyHandle};
use hetsched::fifo::WorkerQueue;
use hetsched::task::{ArchKind, Codelet, Implementation, Task};
use hetsched::timing::{Clock, ManualClock};
use std::collections::HashSet;
use std::sync::Arc;

const SPAN: PrioritySpan = PrioritySpan { min: 0, max: 4 };
const ROUNDS: usize = 2_000;

fn codelet() -> Arc<Codelet> {
    Arc::new(Codelet::new(
        "chaos",
        vec![Implementation {
            arch: ArchKind::Cpu,
        }],
        Some("chaos".into()),
    ))
}

fn make_task(rng: &mut fastrand::Rng, id: u64, cl: &Arc<Codelet>) -> Task {
    let mut builder = Task::builder(id, Arc::clone(cl)).priority(rng.i32(0..=4));
    for buffer_id in 0..rng.usize(0..3) {
        let handle: Arc<ResidencyHandle> = if rng.bool() {
            Arc::new(ResidencyHandle::new(id * 10 + buffer_id as u64, 0))
        } else {
            Arc::new(ResidencyHandle::unmaterialized(id * 10 + buffer_id as u64))
        };
        builder = builder.buffer(handle, AccessMode::Read);
    }
    builder.build()
}

fn assert_invariants(queue: &WorkerQueue) {
    // exp_end == exp_start + exp_len, always
    let gap = (queue.exp_end_hint() - (queue.exp_start_hint() + queue.exp_len_hint())).abs();
    assert!(gap < 1e-6, "horizon identity broken, gap {}", gap);

    // exp_len never negative
    assert!(queue.exp_len_hint() >= 0.0);

    // ntasks == |sequence|
    let (ntasks, sequence_len) = queue.counted_len();
    assert_eq!(ntasks, sequence_len);

    // bucket p counts queued tasks with normalized priority >= p
    let priorities = queue.queued_priorities();
    let buckets = queue.bucket_counts();
    assert_eq!(buckets.len(), SPAN.bucket_count());
    for (p, &count) in buckets.iter().enumerate() {
        let expected = priorities
            .iter()
            .filter(|&&priority| SPAN.normalize(priority) >= p)
            .count();
        assert_eq!(count, expected, "bucket {} disagrees with the queue", p);
    }

    // sorted inserts keep priorities non-increasing head to tail
    assert!(
        priorities.windows(2).all(|pair| pair[0] >= pair[1]),
        "priority order violated: {:?}",
        priorities
    );
}

#[test]
fn test_invariants_hold_under_randomized_operations() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let clock = Arc::new(ManualClock::new());
    let queue = WorkerQueue::new(Arc::clone(&clock) as Arc<dyn Clock>, Some(SPAN));
    let cl = codelet();

    let mut next_id: u64 = 1;
    let mut pushed: HashSet<u64> = HashSet::new();
    let mut popped: Vec<Task> = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();

    for _ in 0..ROUNDS {
        match rng.usize(0..8) {
            // Commit a freshly-decided task (sorted insert)
            0 | 1 | 2 => {
                let task = make_task(&mut rng, next_id, &cl);
                pushed.insert(next_id);
                next_id += 1;
                let predicted = rng.f64() * 100.0;
                let transfer = if rng.bool() { rng.f64() * 20.0 } else { f64::NAN };
                queue.commit(task, predicted, transfer, true);
            }
            // Plain pop
            3 => {
                if let Some(task) = queue.pop_front() {
                    assert!(seen.insert(task.id), "task {} popped twice", task.id);
                    popped.push(task);
                }
            }
            // Data-aware pop
            4 => {
                if let Some(task) = queue.pop_first_ready(0) {
                    assert!(seen.insert(task.id), "task {} popped twice", task.id);
                    popped.push(task);
                }
            }
            // Run one previously-popped task through its hooks
            5 => {
                if let Some(task) = popped.pop() {
                    queue.pre_exec(&task);
                    clock.advance(rng.f64() * 10.0);
                    queue.post_exec();
                }
            }
            // Time passes
            6 => {
                clock.advance(rng.f64() * 50.0);
                queue.refresh();
            }
            // Rebalance: drain everything
            7 => {
                for task in queue.pop_all() {
                    assert!(seen.insert(task.id), "task {} drained twice", task.id);
                }
            }
            _ => unreachable!(),
        }

        assert_invariants(&queue);
    }

    // Drain the rest: every pushed task left the queue exactly once.
    for task in queue.pop_all() {
        assert!(seen.insert(task.id));
    }
    assert_eq!(seen.len() + queue.counted_len().1, pushed.len());
    assert!(seen.is_subset(&pushed));
    assert_invariants(&queue);
}

#[test]
fn test_exp_start_tracks_a_moving_clock() {
    let mut rng = fastrand::Rng::with_seed(7);
    let clock = Arc::new(ManualClock::new());
    let queue = WorkerQueue::new(Arc::clone(&clock) as Arc<dyn Clock>, None);
    let cl = codelet();

    for id in 0..200u64 {
        clock.advance(rng.f64() * 25.0);
        let task = Task::builder(id, Arc::clone(&cl)).build();
        queue.commit(task, rng.f64() * 10.0, f64::NAN, false);

        // Every mutating operation refreshed exp_start to at least now.
        assert!(queue.exp_start_hint() >= clock.now_us() - 1e-9);
        if rng.bool() {
            queue.pop_front();
        }
    }
}
