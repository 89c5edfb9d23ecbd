//! Deferred / Future 单元测试
//!
//! 测试填充语义、延续注册与分发、阻塞等待以及组合视图

use crate::deferred::{all_filled, first_filled, Deferred, Future, Timeout};
use crate::executor::{Executor, ExecutorRef, ImmediateExecutor, Job, PoolConfig, QueueExecutor, ThreadPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const LONG: Duration = Duration::from_secs(10);

/// An executor whose `submit` always panics.
struct RejectingExecutor;

impl Executor for RejectingExecutor {
    fn submit(
        &self,
        _job: Job,
    ) {
        panic!("executor refused the job");
    }
}

fn queue() -> (QueueExecutor, ExecutorRef) {
    let queue = QueueExecutor::new();
    let executor: ExecutorRef = Arc::new(queue.clone());
    (queue, executor)
}

fn pool(workers: usize) -> ExecutorRef {
    Arc::new(ThreadPool::with_config(
        PoolConfig::default()
            .with_workers(workers)
            .with_thread_name("deferred-test"),
    ))
}

#[cfg(test)]
mod fill_tests {
    use super::*;

    #[test]
    fn test_new_is_unfilled() {
        let d: Deferred<i32> = Deferred::new();
        assert!(!d.is_filled());
        assert_eq!(d.peek(), None);
    }

    #[test]
    fn test_second_fill_is_rejected() {
        let d = Deferred::new();
        assert!(d.fill("x"));
        assert!(!d.fill("y"));
        assert_eq!(d.peek(), Some("x"));
    }

    #[test]
    fn test_prefilled() {
        let d = Deferred::filled(3);
        assert!(d.is_filled());
        assert!(!d.fill(4));
        assert_eq!(d.peek(), Some(3));
    }

    #[test]
    fn test_clones_share_value() {
        let d = Deferred::new();
        let other = d.clone();
        assert!(other.fill(11));
        assert_eq!(d.peek(), Some(11));
        assert_eq!(d.future().peek(), Some(11));
    }

    #[test]
    fn test_debug() {
        let d = Deferred::filled(8);
        assert!(format!("{:?}", d).contains('8'));
        assert!(format!("{:?}", d.future()).contains("true"));
    }
}

#[cfg(test)]
mod upon_tests {
    use super::*;

    #[test]
    fn test_upon_before_fill_runs_after_fill() {
        let (queue, executor) = queue();
        let d = Deferred::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let s = seen.clone();
        d.upon_on(&executor, move |v: usize| {
            s.store(v, Ordering::SeqCst);
        });
        assert_eq!(d.pending_continuations(), 1);
        assert_eq!(queue.submitted(), 0);

        assert!(d.fill(5));
        assert_eq!(d.pending_continuations(), 0);
        assert_eq!(queue.submitted(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_upon_after_fill_is_still_submitted() {
        let (queue, executor) = queue();
        let d = Deferred::filled(1);
        let ran = Arc::new(AtomicUsize::new(0));

        let r = ran.clone();
        d.upon_on(&executor, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        // Not run on the registering thread.
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending(), 1);

        queue.run_until_idle();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_body_does_not_lose_later_continuations() {
        let (queue, executor) = queue();
        let immediate: ExecutorRef = Arc::new(ImmediateExecutor);
        let d = Deferred::new();
        let ran = Arc::new(AtomicUsize::new(0));

        d.upon_on(&immediate, |_: usize| panic!("boom"));
        let r = ran.clone();
        d.upon_on(&executor, move |v: usize| {
            r.fetch_add(v, Ordering::SeqCst);
        });

        assert!(d.fill(1));
        queue.run_until_idle();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(d.peek(), Some(1));
    }

    #[test]
    fn test_panicking_submit_does_not_reach_filler() {
        let (queue, executor) = queue();
        let rejecting: ExecutorRef = Arc::new(RejectingExecutor);
        let d = Deferred::new();
        let ran = Arc::new(AtomicUsize::new(0));

        d.upon_on(&rejecting, |_: usize| {});
        let r = ran.clone();
        d.upon_on(&executor, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert!(d.fill(2));
        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // Registration after the fill is contained the same way.
        d.upon_on(&rejecting, |_| {});
        assert!(d.is_filled());
    }

    #[test]
    fn test_every_continuation_gets_final_value_once() {
        let (queue, executor) = queue();
        let d = Deferred::new();
        let sum = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let sum = sum.clone();
            let calls = calls.clone();
            d.upon_on(&executor, move |v: usize| {
                sum.fetch_add(v, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        d.fill(10);
        d.fill(99);
        for _ in 0..2 {
            let sum = sum.clone();
            let calls = calls.clone();
            d.upon_on(&executor, move |v: usize| {
                sum.fetch_add(v, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.run_until_idle();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(sum.load(Ordering::SeqCst), 50);
        assert_eq!(queue.submitted(), 5);
    }

    #[test]
    fn test_concurrent_register_and_fill_loses_nothing() {
        const REGISTRARS: usize = 8;
        const PER_THREAD: usize = 200;
        let executor = pool(4);

        for round in 0..10 {
            let d = Deferred::new();
            let done = Deferred::new();
            let calls = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(REGISTRARS + 1));

            let registrars: Vec<_> = (0..REGISTRARS)
                .map(|_| {
                    let d = d.clone();
                    let done = done.clone();
                    let calls = calls.clone();
                    let barrier = barrier.clone();
                    let executor = executor.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        for _ in 0..PER_THREAD {
                            let calls = calls.clone();
                            let done = done.clone();
                            d.upon_on(&executor, move |v: usize| {
                                assert_eq!(v, round);
                                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                                if n == REGISTRARS * PER_THREAD {
                                    done.fill(());
                                }
                            });
                        }
                    })
                })
                .collect();

            barrier.wait();
            d.fill(round);

            for registrar in registrars {
                registrar.join().unwrap();
            }
            assert_eq!(done.wait(LONG), Some(()));
            assert_eq!(calls.load(Ordering::SeqCst), REGISTRARS * PER_THREAD);
        }
    }

    #[test]
    fn test_upon_on_shared_executor() {
        let d = Deferred::new();
        let done = Deferred::new();
        let done2 = done.clone();
        d.upon(move |v: i32| {
            done2.fill(v * 2);
        });
        d.fill(21);
        assert_eq!(done.wait(LONG), Some(42));
    }
}

#[cfg(test)]
mod wait_tests {
    use super::*;

    #[test]
    fn test_zero_timeout_on_filled() {
        let d = Deferred::filled("ready");
        assert_eq!(d.wait(Timeout::NOW), Some("ready"));
        assert_eq!(d.wait(Duration::ZERO), Some("ready"));
    }

    #[test]
    fn test_zero_timeout_on_unfilled() {
        let d: Deferred<u8> = Deferred::new();
        assert_eq!(d.wait(Timeout::NOW), None);
    }

    #[test]
    fn test_timeout_elapses() {
        let d: Deferred<u8> = Deferred::new();
        let start = Instant::now();
        assert_eq!(d.wait(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_wait_forever_wakes_on_fill() {
        let d = Deferred::new();
        let producer = d.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.fill(7u32);
        });

        assert_eq!(d.wait(Timeout::Forever), Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn test_many_waiters_wake() {
        let d = Deferred::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let d = d.clone();
                thread::spawn(move || d.wait(LONG))
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        d.fill(String::from("go"));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().as_deref(), Some("go"));
        }
    }

    #[test]
    fn test_wait_until_deadline() {
        let d: Deferred<u8> = Deferred::new();
        assert_eq!(d.wait_until(Instant::now() + Duration::from_millis(5)), None);
        d.fill(1);
        assert_eq!(d.wait_until(Instant::now()), Some(1));
    }

    #[test]
    fn test_timeout_conversions() {
        assert_eq!(Timeout::from(None), Timeout::Forever);
        assert_eq!(
            Timeout::from(Some(Duration::from_secs(1))),
            Timeout::After(Duration::from_secs(1))
        );
        assert!(Timeout::Forever.deadline().is_none());
        assert!(Timeout::After(Duration::MAX).deadline().is_none());
    }
}

#[cfg(test)]
mod future_tests {
    use super::*;

    #[test]
    fn test_every_is_lazy_and_not_cached() {
        let (queue, executor) = queue();
        let d = Deferred::new();
        let evaluations = Arc::new(AtomicUsize::new(0));

        let e = evaluations.clone();
        let doubled = d.future().every(move |v: u32| {
            e.fetch_add(1, Ordering::SeqCst);
            v * 2
        });

        let results = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let results = results.clone();
            doubled.upon_on(&executor, move |v| {
                results.fetch_add(v as usize, Ordering::SeqCst);
            });
        }
        assert_eq!(doubled.peek(), None);
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);

        d.fill(4);
        queue.run_until_idle();
        assert_eq!(results.load(Ordering::SeqCst), 16);
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);

        assert_eq!(doubled.peek(), Some(8));
        assert_eq!(doubled.wait(Timeout::NOW), Some(8));
        assert_eq!(evaluations.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_map_on() {
        let (queue, executor) = queue();
        let d = Deferred::new();
        let mapped = d.future().map_on(&executor, |v: i32| v.to_string());

        d.fill(12);
        assert!(!mapped.is_filled());
        queue.run_until_idle();
        assert_eq!(mapped.peek().as_deref(), Some("12"));
    }

    #[test]
    fn test_and_then_on() {
        let (queue, executor) = queue();
        let first = Deferred::new();
        let second = Deferred::new();

        let second_view = second.future();
        let chained = first
            .future()
            .and_then_on(&executor, move |v: i32| second_view.every(move |w: i32| v + w));

        first.fill(1);
        queue.run_until_idle();
        assert!(!chained.is_filled());

        second.fill(2);
        assert_eq!(chained.wait(LONG), Some(3));
    }

    #[test]
    fn test_and() {
        let a = Deferred::new();
        let b = Deferred::new();
        let both = a.future().and(&b.future());

        b.fill("b");
        assert!(!both.is_filled());
        a.fill(1);
        assert_eq!(both.peek(), Some((1, "b")));
    }

    #[test]
    fn test_ignored() {
        let d = Deferred::new();
        let unit = d.future().ignored();
        assert_eq!(unit.peek(), None);
        d.fill(vec![1, 2, 3]);
        assert_eq!(unit.peek(), Some(()));
    }

    #[test]
    fn test_filled_and_never() {
        assert_eq!(Future::filled(2).peek(), Some(2));
        let never: Future<u8> = Future::never();
        assert_eq!(never.wait(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_default_map_and_and_then() {
        let d = Deferred::new();
        let out = d
            .future()
            .map(|v: u8| v + 1)
            .and_then(|v| Future::filled(v * 10));
        d.fill(1);
        assert_eq!(out.wait(LONG), Some(20));
    }
}

#[cfg(test)]
mod collection_tests {
    use super::*;

    #[test]
    fn test_all_filled_preserves_order() {
        let inputs: Vec<Deferred<usize>> = (0..4).map(|_| Deferred::new()).collect();
        let all = all_filled(inputs.iter().map(Deferred::future));

        for i in [2, 0, 3] {
            inputs[i].fill(i * 10);
            assert!(!all.is_filled());
        }
        inputs[1].fill(10);
        assert_eq!(all.peek(), Some(vec![0, 10, 20, 30]));
    }

    #[test]
    fn test_all_filled_empty() {
        let all = all_filled(Vec::<Future<u8>>::new());
        assert_eq!(all.peek(), Some(Vec::new()));
    }

    #[test]
    fn test_first_filled() {
        let a = Deferred::new();
        let b = Deferred::new();
        let first = first_filled([a.future(), b.future()]);

        b.fill("b");
        a.fill("a");
        assert_eq!(first.peek(), Some("b"));
    }

    #[test]
    fn test_first_filled_empty_never_fills() {
        let first = first_filled(Vec::<Future<u8>>::new());
        assert_eq!(first.wait(Timeout::NOW), None);
    }
}
