use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use throttled_queue::{Job, JobQueue, JobStatus, QueueOptions};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

const PATIENCE: Duration = Duration::from_secs(10);

/// Polls `cond` until it holds, failing the test if it takes too long.
async fn eventually(mut cond: impl FnMut() -> bool) {
    timeout(PATIENCE, async {
        while !cond() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never held");
}

async fn drained<T: Send + Sync + 'static>(queue: &JobQueue<T>) {
    timeout(PATIENCE, queue.wait_idle())
        .await
        .expect("queue never drained");
}

/// Tracks how many workers run at once and the most ever seen.
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn gauged_queue(max: usize, delay: Duration) -> (JobQueue<u32>, Arc<Gauge>) {
    let queue = JobQueue::new(QueueOptions::new(max)).unwrap();
    let gauge = Arc::new(Gauge::default());
    {
        let gauge = gauge.clone();
        queue.set_worker(move |_job| {
            let gauge = gauge.clone();
            async move {
                gauge.enter();
                sleep(delay).await;
                gauge.exit();
                Ok(())
            }
        });
    }
    (queue, gauge)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn without_worker_jobs_stay_waiting() {
    let queue = JobQueue::new(QueueOptions::new(2)).unwrap();

    let a = queue.enqueue_payload('a').unwrap().0;
    let b = queue.enqueue_payload('b').unwrap().0;
    let c = queue.enqueue_payload('c').unwrap().0;

    eventually(|| queue.working_count() == 2).await;
    // Give any wrongly-dispatched job a chance to move on.
    sleep(Duration::from_millis(50)).await;

    assert_eq!(a.status(), JobStatus::Waiting);
    assert_eq!(b.status(), JobStatus::Waiting);
    assert_eq!(c.status(), JobStatus::InQueue);
    assert_eq!(queue.job_order(c.id()), Some(1));
    assert_eq!(queue.waiting_count(), 1);
    assert_eq!(queue.working_count(), 2);
    assert_eq!(queue.count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn all_jobs_complete() {
    let queue = JobQueue::new(QueueOptions::new(2)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let counter = counter.clone();
        queue.set_worker(move |_job| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(()) }
        });
    }

    let jobs: Vec<_> = "abc"
        .chars()
        .map(|c| queue.enqueue_payload(c).unwrap().0)
        .collect();

    drained(&queue).await;

    assert!(jobs.iter().all(|j| j.status() == JobStatus::Complete));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(queue.count(), 0);
    assert!(queue.jobs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_job_is_contained() {
    let queue = JobQueue::new(QueueOptions::new(2)).unwrap();
    queue.set_worker(|job: Arc<Job<char>>| async move {
        if *job.payload() == 'b' {
            anyhow::bail!("b is broken");
        }
        Ok(())
    });

    let a = queue.enqueue_payload('a').unwrap().0;
    let b = queue.enqueue_payload('b').unwrap().0;
    let c = queue.enqueue_payload('c').unwrap().0;

    drained(&queue).await;

    assert_eq!(a.status(), JobStatus::Complete);
    assert_eq!(b.status(), JobStatus::Error);
    assert_eq!(c.status(), JobStatus::Complete);

    let stats = queue.stats();
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.total_complete, 2);
    assert_eq!(stats.total_error, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn working_set_never_exceeds_capacity() {
    let (queue, gauge) = gauged_queue(4, Duration::from_millis(2));

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let queue = queue.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut samples = 0;
            while !done.load(Ordering::SeqCst) {
                assert!(queue.working_count() <= 4);
                samples += 1;
                tokio::task::yield_now().await;
            }
            samples
        })
    };

    for n in 0..100 {
        queue.enqueue_payload(n).unwrap();
    }

    drained(&queue).await;
    done.store(true, Ordering::SeqCst);

    assert!(sampler.await.unwrap() > 0);
    assert!(gauge.peak() <= 4);
    assert_eq!(queue.stats().total_complete, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers() {
    let queue: JobQueue<usize> = JobQueue::new(QueueOptions::new(4)).unwrap();
    queue.set_worker(|_job| async { anyhow::Ok(()) });

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let queue = queue.clone();
        let done = done.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::SeqCst) {
                let jobs = queue.jobs();
                let unique: HashSet<_> = jobs.iter().map(|j| j.id()).collect();
                assert_eq!(unique.len(), jobs.len());
                tokio::task::yield_now().await;
            }
        })
    };

    // Producers are plain threads: enqueue doesn't need a runtime context.
    let producers: Vec<_> = (0..10)
        .map(|producer| {
            let queue = queue.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    queue.enqueue_payload(producer * 50 + n).unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    drained(&queue).await;
    done.store(true, Ordering::SeqCst);
    sampler.await.unwrap();

    let stats = queue.stats();
    assert_eq!(queue.count(), 0);
    assert_eq!(stats.total_jobs, 500);
    assert_eq!(stats.total_complete, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn status_transitions_follow_the_lifecycle() {
    use JobStatus::*;

    let queue = JobQueue::new(QueueOptions::new(3)).unwrap();
    queue.set_worker(|job: Arc<Job<u32>>| async move {
        if job.payload() % 3 == 0 {
            anyhow::bail!("multiple of three");
        }
        Ok(())
    });
    let mut events = queue.subscribe();

    let jobs: Vec<_> = (0..10)
        .map(|n| queue.enqueue_payload(n).unwrap().0)
        .collect();
    drained(&queue).await;

    let mut seen: HashMap<_, Vec<_>> = HashMap::new();
    while let Ok(change) = events.try_recv() {
        seen.entry(change.job_id).or_default().push((change.old, change.new));
    }

    for job in &jobs {
        let last = if job.payload() % 3 == 0 { Error } else { Complete };
        assert_eq!(
            seen[&job.id()],
            vec![
                (New, InQueue),
                (InQueue, Waiting),
                (Waiting, Running),
                (Running, last)
            ],
            "job {}",
            job.payload()
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enqueue_alone_starts_the_job() {
    let queue = JobQueue::new(QueueOptions::new(1)).unwrap();
    let started = Arc::new(Notify::new());
    {
        let started = started.clone();
        queue.set_worker(move |job: Arc<Job<()>>| {
            let started = started.clone();
            async move {
                assert_eq!(job.status(), JobStatus::Running);
                started.notify_one();
                Ok(())
            }
        });
    }

    queue.enqueue_payload(()).unwrap();

    timeout(PATIENCE, started.notified())
        .await
        .expect("job never started");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_backfills_capacity() {
    let queue = JobQueue::new(QueueOptions::new(1)).unwrap();
    let release = Arc::new(Notify::new());
    {
        let release = release.clone();
        queue.set_worker(move |job: Arc<Job<&'static str>>| {
            let release = release.clone();
            async move {
                if *job.payload() == "fails" {
                    release.notified().await;
                    anyhow::bail!("failed on purpose");
                }
                Ok(())
            }
        });
    }

    let fails = queue.enqueue_payload("fails").unwrap().0;
    let next = queue.enqueue_payload("next").unwrap().0;

    eventually(|| fails.status() == JobStatus::Running).await;
    assert_eq!(queue.job_order(next.id()), Some(1));

    release.notify_one();

    eventually(|| next.status() == JobStatus::Complete).await;
    assert_eq!(fails.status(), JobStatus::Error);
    drained(&queue).await;
    assert_eq!(queue.working_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_order_until_admitted() {
    let queue = JobQueue::new(QueueOptions::new(1)).unwrap();
    let job = Arc::new(Job::new(()));

    // Hold the queue's only slot with a job that never runs.
    queue.enqueue_payload(()).unwrap();
    eventually(|| queue.working_count() == 1).await;

    queue.enqueue(job.clone()).unwrap();
    assert_eq!(queue.job_order(job.id()), Some(1));

    let (other, _) = queue.enqueue_payload(()).unwrap();
    assert_eq!(queue.job_order(other.id()), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_order_is_gone_once_admitted() {
    let queue = JobQueue::new(QueueOptions::new(1)).unwrap();
    let (job, position) = queue.enqueue_payload(()).unwrap();
    assert_eq!(position, 1);

    eventually(|| queue.working_count() == 1).await;
    assert_eq!(queue.job_order(job.id()), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_capacity_behaves_like_one() {
    let (queue, gauge) = gauged_queue(0, Duration::from_millis(1));
    assert_eq!(queue.options().max_concurrent_jobs(), 1);

    for n in 0..20 {
        queue.enqueue_payload(n).unwrap();
    }

    drained(&queue).await;
    assert_eq!(gauge.peak(), 1);
    assert_eq!(queue.stats().total_complete, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_worker_ends_in_error() {
    let queue = JobQueue::new(QueueOptions::new(2)).unwrap();
    queue.set_worker(|job: Arc<Job<u32>>| async move {
        if *job.payload() == 1 {
            panic!("worker panicked on purpose");
        }
        Ok(())
    });

    let jobs: Vec<_> = (0..3)
        .map(|n| queue.enqueue_payload(n).unwrap().0)
        .collect();
    drained(&queue).await;

    let statuses: Vec<_> = jobs.iter().map(|j| j.status()).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Complete, JobStatus::Error, JobStatus::Complete]
    );
}
