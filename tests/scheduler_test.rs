use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use pardaaf_core::services::scheduler::{Job, JobScheduler};
use tokio::time::{sleep, Duration};

// Test job that counts executions
#[derive(Clone)]
struct CounterJob {
    name: String,
    schedule: String,
    counter: Arc<AtomicU32>,
}

impl CounterJob {
    fn new(name: &str, schedule: &str, counter: Arc<AtomicU32>) -> Self {
        Self {
            name: name.to_string(),
            schedule: schedule.to_string(),
            counter,
        }
    }
}

#[async_trait]
impl Job for CounterJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Test job that fails
#[derive(Clone)]
struct FailingJob {
    name: String,
    schedule: String,
    counter: Arc<AtomicU32>,
}

#[async_trait]
impl Job for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.counter.fetch_add(1, Ordering::SeqCst);
        Err("Intentional failure".into())
    }
}

#[tokio::test]
async fn test_scheduler_job_execution() {
    let scheduler = JobScheduler::new();
    let counter = Arc::new(AtomicU32::new(0));

    let job = CounterJob::new("test_job", "*/1 * * * * *", counter.clone());
    scheduler.register_job(Box::new(job)).await.unwrap();

    scheduler.start().await.unwrap();
    sleep(Duration::from_secs(3)).await;
    scheduler.stop().await.unwrap();

    let count = counter.load(Ordering::SeqCst);
    assert!(count >= 2, "Expected at least 2 executions, got {}", count);
}

#[tokio::test]
async fn test_scheduler_job_error_handling() {
    let scheduler = JobScheduler::new();
    let counter = Arc::new(AtomicU32::new(0));

    let job = FailingJob {
        name: "failing_job".to_string(),
        schedule: "*/1 * * * * *".to_string(),
        counter: counter.clone(),
    };
    scheduler.register_job(Box::new(job)).await.unwrap();

    scheduler.start().await.unwrap();
    sleep(Duration::from_secs(3)).await;
    scheduler.stop().await.unwrap();

    // The loop keeps scheduling attempts despite every one failing.
    let count = counter.load(Ordering::SeqCst);
    assert!(
        count >= 2,
        "Expected at least 2 execution attempts, got {}",
        count
    );
}

#[tokio::test]
async fn test_scheduler_job_status() {
    let scheduler = JobScheduler::new();
    let counter1 = Arc::new(AtomicU32::new(0));
    let counter2 = Arc::new(AtomicU32::new(0));

    let job1 = CounterJob::new("job1", "*/1 * * * * *", counter1);
    let job2 = CounterJob::new("job2", "*/2 * * * * *", counter2);

    scheduler.register_job(Box::new(job1)).await.unwrap();
    scheduler.register_job(Box::new(job2)).await.unwrap();

    let status_before = scheduler.get_job_status().await;
    assert_eq!(status_before.len(), 2);
    assert!(!status_before.get("job1").unwrap().is_active);
    assert!(!status_before.get("job2").unwrap().is_active);

    scheduler.start().await.unwrap();

    let status_after = scheduler.get_job_status().await;
    assert!(status_after.get("job1").unwrap().is_active);
    assert!(status_after.get("job2").unwrap().is_active);
    assert!(status_after.get("job1").unwrap().next_run.is_some());
    assert!(status_after.get("job2").unwrap().next_run.is_some());

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_scheduler_shutdown() {
    let scheduler = JobScheduler::new();
    let counter = Arc::new(AtomicU32::new(0));

    let job = CounterJob::new("shutdown_test", "*/1 * * * * *", counter.clone());
    scheduler.register_job(Box::new(job)).await.unwrap();

    scheduler.start().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let count_before_stop = counter.load(Ordering::SeqCst);
    scheduler.stop().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let count_after_stop = counter.load(Ordering::SeqCst);
    assert_eq!(
        count_before_stop, count_after_stop,
        "Job should not execute after shutdown"
    );
}

#[tokio::test]
async fn test_scheduler_invalid_cron() {
    let scheduler = JobScheduler::new();
    let counter = Arc::new(AtomicU32::new(0));

    let job = CounterJob::new("invalid_job", "invalid cron", counter);
    let result = scheduler.register_job(Box::new(job)).await;

    assert!(result.is_err(), "Should fail with invalid cron expression");
}

#[tokio::test]
async fn production_calendar_parses() {
    use pardaaf_core::services::backup::BackupCadence;
    use std::str::FromStr;

    let expressions = [
        "0 48 * * * *", // fx fetch, hourly at :48
        "0 0 19 * * *", // salary
        "0 0 9 * * *",  // notify sweep
    ];
    for expr in expressions {
        assert!(cron::Schedule::from_str(expr).is_ok(), "{}", expr);
    }
    for cadence in BackupCadence::ALL {
        assert!(cron::Schedule::from_str(cadence.schedule()).is_ok());
        assert!(cron::Schedule::from_str(cadence.cleanup_schedule()).is_ok());
    }
}
