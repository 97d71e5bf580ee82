use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bus_arbiter::{BusArbiter, Direction, PerDirection, Task, WakePolicy};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

// Pulls in the std critical-section implementation.
use critical_section as _;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type SharedArbiter = Arc<BusArbiter<CriticalSectionRawMutex>>;

const RUN_LIMIT: Duration = Duration::from_secs(10);

fn make_arbiter(capacity: usize, policy: WakePolicy) -> SharedArbiter {
    Arc::new(BusArbiter::new(NonZeroUsize::new(capacity).unwrap(), policy))
}

/// Occupants per direction as seen by the tasks themselves.
#[derive(Default)]
struct Occupants {
    outbound: AtomicUsize,
    inbound: AtomicUsize,
    violations: AtomicUsize,
}

impl Occupants {
    fn counter(&self, direction: Direction) -> &AtomicUsize {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    fn enter(&self, direction: Direction, capacity: usize) {
        let mine = self.counter(direction).fetch_add(1, Ordering::SeqCst) + 1;
        let theirs = self.counter(direction.opposite()).load(Ordering::SeqCst);
        if mine > capacity || theirs > 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn leave(&self, direction: Direction) {
        self.counter(direction).fetch_sub(1, Ordering::SeqCst);
    }
}

fn spawn_worker(
    bus: &SharedArbiter,
    occupants: &Arc<Occupants>,
    task: Task,
    work: Duration,
) -> JoinHandle<()> {
    let bus = bus.clone();
    let occupants = occupants.clone();
    tokio::spawn(async move {
        let slot = bus.acquire(task).await;
        occupants.enter(task.direction, bus.capacity());
        sleep(work).await;
        occupants.leave(task.direction);
        slot.release();
    })
}

async fn join_all(handles: Vec<JoinHandle<()>>) {
    let all = futures::future::join_all(handles);
    let results = timeout(RUN_LIMIT, all).await.expect("tasks stalled");
    for result in results {
        result.expect("task panicked");
    }
}

/// Polls `cond` until it holds.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(RUN_LIMIT, async {
        while !cond() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never held");
}

// ---------------------------------------------------------------------------
// Mixed traffic
// ---------------------------------------------------------------------------

async fn run_mixed_directions(policy: WakePolicy) {
    let bus = make_arbiter(3, policy);
    let occupants = Arc::new(Occupants::default());

    let mut handles = Vec::new();
    for i in 0..5u64 {
        let work = Duration::from_millis(2 + i);
        handles.push(spawn_worker(&bus, &occupants, Task::normal(Direction::Outbound), work));
        handles.push(spawn_worker(&bus, &occupants, Task::normal(Direction::Inbound), work));
    }

    let sampler = {
        let bus = bus.clone();
        tokio::spawn(async move {
            let mut bad = 0;
            for _ in 0..200 {
                if !bus.snapshot().is_consistent() {
                    bad += 1;
                }
                tokio::task::yield_now().await;
            }
            bad
        })
    };

    join_all(handles).await;
    assert_eq!(sampler.await.unwrap(), 0);
    assert_eq!(occupants.violations.load(Ordering::SeqCst), 0);

    let stats = bus.stats();
    assert_eq!(stats.admitted(), 10);
    assert!(stats.peak_occupancy <= 3);
    assert!(stats.direction_flips >= 1);
    assert!(bus.snapshot().is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_directions_never_share_the_bus() {
    for _ in 0..10 {
        run_mixed_directions(WakePolicy::OppositeOnDrain).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_directions_never_share_the_bus_either_on_drain() {
    for _ in 0..10 {
        run_mixed_directions(WakePolicy::EitherOnDrain).await;
    }
}

// ---------------------------------------------------------------------------
// Priority bias
// ---------------------------------------------------------------------------

/// Parks `outbound` normal tasks, then `inbound` normal tasks, then two
/// high-priority outbound tasks behind three held outbound slots, and frees
/// the slots. Returns every task with its wait, in admission order.
async fn run_priority_scenario(
    policy: WakePolicy,
    outbound: usize,
    inbound: usize,
) -> Vec<(Task, Duration)> {
    let bus = make_arbiter(3, policy);
    let order = Arc::new(Mutex::new(Vec::<(Task, Duration)>::new()));

    let spawn = |task: Task| {
        let bus = bus.clone();
        let order = order.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let slot = bus.acquire(task).await;
            order.lock().unwrap().push((task, started.elapsed()));
            slot.release();
        })
    };

    let held: Vec<_> = (0..3)
        .map(|_| bus.try_acquire(Task::normal(Direction::Outbound)).unwrap())
        .collect();

    let mut handles: Vec<_> =
        (0..outbound).map(|_| spawn(Task::normal(Direction::Outbound))).collect();
    wait_until(|| bus.snapshot().waiters[Direction::Outbound] == outbound).await;
    handles.extend((0..inbound).map(|_| spawn(Task::normal(Direction::Inbound))));
    wait_until(|| bus.snapshot().waiters[Direction::Inbound] == inbound).await;
    sleep(Duration::from_millis(5)).await;

    handles.extend((0..2).map(|_| spawn(Task::high(Direction::Outbound))));
    wait_until(|| bus.snapshot().high_waiters[Direction::Outbound] == 2).await;

    // One freed slot is enough: each high task hands it to the next.
    let mut held = held.into_iter();
    drop(held.next());
    wait_until(|| {
        bus.stats().admitted_high[Direction::Outbound] == 2 && bus.occupancy() == 2
    })
    .await;
    drop(held);

    join_all(handles).await;
    assert_eq!(bus.stats().admitted(), (3 + outbound + inbound + 2) as u64);

    let order = order.lock().unwrap();
    order.clone()
}

fn mean_wait(order: &[(Task, Duration)], task: Task) -> Duration {
    let waits: Vec<_> = order
        .iter()
        .filter(|(t, _)| *t == task)
        .map(|(_, w)| *w)
        .collect();
    waits.iter().sum::<Duration>() / waits.len() as u32
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn high_priority_tasks_wait_less() {
    let order = run_priority_scenario(WakePolicy::OppositeOnDrain, 3, 2).await;

    assert_eq!(order.len(), 7);
    assert!(order[..2].iter().all(|(t, _)| t.priority.is_high()));
    // Inbound goes next, then the normal outbound tasks.
    assert!(order[2..4].iter().all(|(t, _)| t.direction == Direction::Inbound));
    assert!(
        mean_wait(&order, Task::high(Direction::Outbound))
            < mean_wait(&order, Task::normal(Direction::Outbound))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn high_priority_tasks_wait_less_either_on_drain() {
    let order = run_priority_scenario(WakePolicy::EitherOnDrain, 6, 0).await;

    assert_eq!(order.len(), 8);
    assert!(order[..2].iter().all(|(t, _)| t.priority.is_high()));
    assert!(
        mean_wait(&order, Task::high(Direction::Outbound))
            < mean_wait(&order, Task::normal(Direction::Outbound))
    );
}

// ---------------------------------------------------------------------------
// Parked tasks stay parked
// ---------------------------------------------------------------------------

/// Counts how often the wrapped future gets polled.
struct CountPolls<F> {
    inner: F,
    polls: Arc<AtomicUsize>,
}

impl<F: Future + Unpin> Future for CountPolls<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Pin::new(&mut self.inner).poll(cx)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_waiters_do_not_spin_while_bus_is_held() {
    let bus = make_arbiter(1, WakePolicy::EitherOnDrain);
    let polls = Arc::new(AtomicUsize::new(0));
    let outbound = Task::normal(Direction::Outbound);

    let held = bus.try_acquire(outbound).unwrap();
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let bus = bus.clone();
            let polls = polls.clone();
            tokio::spawn(async move {
                let slot = CountPolls { inner: bus.acquire(outbound), polls }.await;
                slot.release();
            })
        })
        .collect();
    wait_until(|| bus.snapshot().waiters[Direction::Outbound] == 100).await;

    let before = polls.load(Ordering::SeqCst);
    sleep(Duration::from_millis(200)).await;
    let after = polls.load(Ordering::SeqCst);
    assert_eq!(before, 100);
    assert_eq!(after, before);

    drop(held);
    join_all(handles).await;
    assert_eq!(bus.stats().admitted(), 101);
}

// ---------------------------------------------------------------------------
// Same-direction overload
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_direction_overload_always_completes() {
    for round in 0..20u64 {
        let bus = make_arbiter(3, WakePolicy::EitherOnDrain);
        let occupants = Arc::new(Occupants::default());
        let direction = if round % 2 == 0 {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        let handles = (0..8u64)
            .map(|i| {
                let work = Duration::from_micros(200 * (1 + (i + round) % 4));
                spawn_worker(&bus, &occupants, Task::normal(direction), work)
            })
            .collect();
        join_all(handles).await;

        assert_eq!(bus.stats().admitted(), 8);
        assert_eq!(bus.snapshot().waiting(), 0);
        assert_eq!(occupants.violations.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stranded_waiters_are_freed_by_opposite_traffic() {
    let bus = make_arbiter(3, WakePolicy::OppositeOnDrain);
    let occupants = Arc::new(Occupants::default());
    let outbound = Task::normal(Direction::Outbound);

    let held: Vec<_> = (0..3).map(|_| bus.try_acquire(outbound).unwrap()).collect();
    let waiting: Vec<_> = (0..2)
        .map(|_| spawn_worker(&bus, &occupants, outbound, Duration::ZERO))
        .collect();
    wait_until(|| bus.snapshot().waiters[Direction::Outbound] == 2).await;

    drop(held);
    sleep(Duration::from_millis(50)).await;

    let snapshot = bus.snapshot();
    assert!(snapshot.is_idle());
    assert_eq!(snapshot.waiters, PerDirection::new(2, 0));
    assert_eq!(snapshot.high_waiters, PerDirection::new(0, 0));
    assert!(waiting.iter().all(|h| !h.is_finished()));

    let rescuer = spawn_worker(
        &bus,
        &occupants,
        Task::normal(Direction::Inbound),
        Duration::ZERO,
    );
    join_all(vec![rescuer]).await;
    join_all(waiting).await;

    assert_eq!(bus.stats().admitted(), 6);
    assert_eq!(occupants.violations.load(Ordering::SeqCst), 0);
}
