//! Conformance suite shared by every storage backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use cronlock_core::{Clock, LockConfiguration, ManualClock, SystemClock};

use crate::accessor::StorageAccessor;
use crate::error::LockError;
use crate::lock::LockProvider;
use crate::storage::StorageBasedLockProvider;

/// Number of competing nodes in the concurrent acquisition test.
const CONTENDERS: usize = 8;

/// Hold time of the short locks in the wall-clock suite.
const SHORT_HOLD: Duration = Duration::from_millis(300);

/// Slack added to sleeps meant to outlast a [`SHORT_HOLD`].
const SLACK: Duration = Duration::from_millis(200);

struct Nodes {
    clock: ManualClock,
    a: StorageBasedLockProvider,
    b: StorageBasedLockProvider,
}

fn nodes(accessor: &Arc<dyn StorageAccessor>) -> Nodes {
    let clock = ManualClock::default();
    let a = StorageBasedLockProvider::new(Arc::clone(accessor))
        .with_clock(Arc::new(clock.clone()))
        .with_holder("node-a");
    let b = StorageBasedLockProvider::new(Arc::clone(accessor))
        .with_clock(Arc::new(clock.clone()))
        .with_holder("node-b");
    Nodes { clock, a, b }
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

fn config(clock: &ManualClock, name: &str, most: Duration, least: Duration) -> LockConfiguration {
    LockConfiguration::new(clock.now(), name, most, least)
        .unwrap_or_else(|e| panic!("test configuration must be valid: {e}"))
}

/// Run the full lock provider conformance suite against `accessor`.
///
/// Call this from your backend's test module with a fresh accessor.
///
/// # Errors
///
/// Returns an error if the backend fails; assertion failures panic.
pub async fn run_provider_conformance_tests(
    accessor: Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    test_first_acquisition(&accessor).await?;
    test_contention(&accessor).await?;
    test_stale_takeover(&accessor).await?;
    test_minimum_hold(&accessor).await?;
    test_idempotent_unlock(&accessor).await?;
    test_extend(&accessor).await?;
    test_extend_after_takeover(&accessor).await?;
    test_unlock_after_takeover(&accessor).await?;
    test_concurrent_acquisition(&accessor).await?;
    test_report_job_scenario(&accessor).await?;
    Ok(())
}

async fn test_first_acquisition(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("first");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);

    let lock = n.a.try_lock(&cfg).await?;
    assert!(lock.is_some(), "should acquire a never-seen lock");

    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(record.lock_until, cfg.lock_at_most_until());
    assert_eq!(record.locked_at, n.clock.now());
    assert_eq!(record.locked_by, "node-a");
    Ok(())
}

async fn test_contention(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("contention");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);

    let held = n.a.try_lock(&cfg).await?;
    assert!(held.is_some());

    n.clock.advance(TimeDelta::seconds(5));
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    assert!(
        n.b.try_lock(&cfg).await?.is_none(),
        "second acquire should fail while the lock is held"
    );
    assert!(
        n.a.try_lock(&cfg).await?.is_none(),
        "the same provider does not re-enter a held lock"
    );
    Ok(())
}

async fn test_stale_takeover(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("stale");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let _crashed = n.a.try_lock(&cfg).await?.expect("should acquire");

    n.clock.advance(TimeDelta::seconds(10));
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let taken = n.b.try_lock(&cfg).await?;
    assert!(taken.is_some(), "a lock whose lock_until passed is stale");

    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(record.locked_by, "node-b");
    assert_eq!(record.lock_until, cfg.lock_at_most_until());
    Ok(())
}

async fn test_minimum_hold(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("min-hold");
    let cfg = config(&n.clock, &name, Duration::from_secs(60), Duration::from_secs(5));
    let lock = n.a.try_lock(&cfg).await?.expect("should acquire");

    n.clock.advance(TimeDelta::seconds(1));
    lock.unlock().await?;

    let record = accessor.find(&name).await?.expect("record is kept");
    assert_eq!(record.lock_until, cfg.lock_at_least_until());

    n.clock.advance(TimeDelta::seconds(2));
    let retry = config(&n.clock, &name, Duration::from_secs(60), Duration::ZERO);
    assert!(
        n.b.try_lock(&retry).await?.is_none(),
        "lock must stay held until lock_at_least_until"
    );

    n.clock.advance(TimeDelta::seconds(2));
    let retry = config(&n.clock, &name, Duration::from_secs(60), Duration::ZERO);
    assert!(n.b.try_lock(&retry).await?.is_some());

    // Released after the floor: the record is freed at unlock time.
    let late_name = unique_name("late-unlock");
    let cfg = config(&n.clock, &late_name, Duration::from_secs(60), Duration::from_secs(5));
    let lock = n.a.try_lock(&cfg).await?.expect("should acquire");
    n.clock.advance(TimeDelta::seconds(20));
    lock.unlock().await?;
    let record = accessor.find(&late_name).await?.expect("record is kept");
    assert_eq!(record.lock_until, n.clock.now());
    let retry = config(&n.clock, &late_name, Duration::from_secs(60), Duration::ZERO);
    assert!(n.b.try_lock(&retry).await?.is_some());
    Ok(())
}

async fn test_idempotent_unlock(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("idempotent");
    let cfg = config(&n.clock, &name, Duration::from_secs(60), Duration::from_secs(5));
    let lock = n.a.try_lock(&cfg).await?.expect("should acquire");

    lock.unlock().await?;
    let once = accessor.find(&name).await?;

    n.clock.advance(TimeDelta::seconds(30));
    lock.unlock().await?;
    let twice = accessor.find(&name).await?;
    assert_eq!(once, twice, "second unlock must not change the record");
    Ok(())
}

async fn test_extend(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("extend");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let lock = n.a.try_lock(&cfg).await?.expect("should acquire");

    n.clock.advance(TimeDelta::seconds(5));
    let extended = lock
        .extend(Duration::from_secs(30), Duration::from_secs(2))
        .await?
        .expect("owner should be able to extend");
    let expected_until = n.clock.now() + TimeDelta::seconds(30);
    assert_eq!(extended.configuration().lock_at_most_until(), expected_until);

    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(record.lock_until, expected_until);

    assert!(
        matches!(
            lock.extend(Duration::from_secs(30), Duration::ZERO).await,
            Err(LockError::Released(_))
        ),
        "the replaced handle can not be extended again"
    );

    // Past the original lock_at_most_until the extension still holds.
    n.clock.advance(TimeDelta::seconds(10));
    let retry = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    assert!(n.b.try_lock(&retry).await?.is_none());

    extended.unlock().await?;
    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(record.lock_until, n.clock.now());
    Ok(())
}

async fn test_extend_after_takeover(
    accessor: &Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("extend-lost");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let stale = n.a.try_lock(&cfg).await?.expect("should acquire");

    n.clock.advance(TimeDelta::seconds(11));
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let _owner = n.b.try_lock(&cfg).await?.expect("takeover");

    assert!(
        stale
            .extend(Duration::from_secs(30), Duration::ZERO)
            .await?
            .is_none(),
        "a taken-over lock can not be extended"
    );

    // Expired but not taken over is not extendable either.
    let name = unique_name("extend-expired");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let expired = n.a.try_lock(&cfg).await?.expect("should acquire");
    n.clock.advance(TimeDelta::seconds(10));
    assert!(
        expired
            .extend(Duration::from_secs(30), Duration::ZERO)
            .await?
            .is_none()
    );
    Ok(())
}

async fn test_unlock_after_takeover(
    accessor: &Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("unlock-lost");
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let stale = n.a.try_lock(&cfg).await?.expect("should acquire");

    n.clock.advance(TimeDelta::seconds(11));
    let cfg = config(&n.clock, &name, Duration::from_secs(10), Duration::ZERO);
    let _owner = n.b.try_lock(&cfg).await?.expect("takeover");

    stale.unlock().await?;
    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(
        record.lock_until,
        cfg.lock_at_most_until(),
        "the stale holder must not release the new holder's lock"
    );
    Ok(())
}

async fn test_concurrent_acquisition(
    accessor: &Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    let clock = ManualClock::default();
    let name = unique_name("race");

    let mut handles = Vec::with_capacity(CONTENDERS);
    for node in 0..CONTENDERS {
        let provider = StorageBasedLockProvider::new(Arc::clone(accessor))
            .with_clock(Arc::new(clock.clone()))
            .with_holder(format!("node-{node}"));
        let cfg = config(&clock, &name, Duration::from_secs(60), Duration::ZERO);
        handles.push(tokio::spawn(async move {
            provider.try_lock(&cfg).await.map(|lock| lock.is_some())
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle
            .await
            .map_err(|e| LockError::Backend(e.to_string()))??
        {
            winners += 1;
        }
    }
    assert_eq!(winners, 1, "exactly one node should obtain the lock");
    Ok(())
}

async fn test_report_job_scenario(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let n = nodes(accessor);
    let name = unique_name("reportJob");
    let first = config(&n.clock, &name, Duration::from_secs(60), Duration::from_secs(5));
    n.clock.advance(TimeDelta::milliseconds(10));
    let second = config(&n.clock, &name, Duration::from_secs(60), Duration::from_secs(5));

    let winner = n.a.try_lock(&first).await?;
    let loser = n.b.try_lock(&second).await?;
    assert!(winner.is_some());
    assert!(loser.is_none());

    let record = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(record.lock_until, first.created_at() + TimeDelta::seconds(60));
    Ok(())
}

/// Run the lifecycle checks that hold for any clock the store may use.
///
/// Providers run on the [`SystemClock`] and assertions only compare
/// outcomes, never exact instants, so stores stamping records with their
/// own clock pass too. The suite sleeps for about two seconds in total.
///
/// # Errors
///
/// Returns an error if the backend fails; assertion failures panic.
pub async fn run_wall_clock_conformance_tests(
    accessor: Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    test_wall_clock_takeover(&accessor).await?;
    test_wall_clock_extend_and_floor(&accessor).await?;
    test_wall_clock_expired_extend(&accessor).await?;
    Ok(())
}

fn wall_clock_node(accessor: &Arc<dyn StorageAccessor>, holder: &str) -> StorageBasedLockProvider {
    StorageBasedLockProvider::new(Arc::clone(accessor))
        .with_clock(Arc::new(SystemClock))
        .with_holder(holder)
}

fn wall_clock_config(name: &str, most: Duration, least: Duration) -> LockConfiguration {
    LockConfiguration::new(SystemClock.now(), name, most, least)
        .unwrap_or_else(|e| panic!("test configuration must be valid: {e}"))
}

async fn test_wall_clock_takeover(accessor: &Arc<dyn StorageAccessor>) -> Result<(), LockError> {
    let a = wall_clock_node(accessor, "node-a");
    let b = wall_clock_node(accessor, "node-b");
    let name = unique_name("wall-takeover");

    let stale = a
        .try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
        .await?
        .expect("should acquire");
    assert!(
        b.try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
            .await?
            .is_none(),
        "second acquire should fail while the lock is held"
    );

    tokio::time::sleep(SHORT_HOLD + SLACK).await;
    let owner = b
        .try_lock(&wall_clock_config(&name, Duration::from_secs(60), Duration::ZERO))
        .await?;
    assert!(owner.is_some(), "an expired lock is taken over");

    let taken = accessor.find(&name).await?.expect("record should exist");
    assert_eq!(taken.locked_by, "node-b");
    assert!(taken.lock_until > taken.locked_at);

    assert!(
        stale
            .extend(Duration::from_secs(60), Duration::ZERO)
            .await?
            .is_none(),
        "a taken-over lock can not be extended"
    );
    stale.unlock().await?;
    assert_eq!(
        accessor.find(&name).await?,
        Some(taken),
        "the stale holder must not release the new holder's lock"
    );
    Ok(())
}

async fn test_wall_clock_extend_and_floor(
    accessor: &Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    let a = wall_clock_node(accessor, "node-a");
    let b = wall_clock_node(accessor, "node-b");
    let name = unique_name("wall-extend");

    let lock = a
        .try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
        .await?
        .expect("should acquire");
    let extended = lock
        .extend(Duration::from_secs(60), SHORT_HOLD)
        .await?
        .expect("owner should be able to extend");

    // Past the original hold the extension still excludes others.
    tokio::time::sleep(SHORT_HOLD + SLACK).await;
    assert!(
        b.try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
            .await?
            .is_none()
    );

    // Released before its minimum hold, the lock stays held until the floor.
    let floored = extended
        .extend(Duration::from_secs(60), SHORT_HOLD)
        .await?
        .expect("owner should be able to extend again");
    floored.unlock().await?;
    assert!(
        b.try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
            .await?
            .is_none(),
        "lock must stay held until lock_at_least_until"
    );

    tokio::time::sleep(SHORT_HOLD + SLACK).await;
    assert!(
        b.try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
            .await?
            .is_some()
    );
    Ok(())
}

async fn test_wall_clock_expired_extend(
    accessor: &Arc<dyn StorageAccessor>,
) -> Result<(), LockError> {
    let a = wall_clock_node(accessor, "node-a");
    let name = unique_name("wall-expired");

    let lock = a
        .try_lock(&wall_clock_config(&name, SHORT_HOLD, Duration::ZERO))
        .await?
        .expect("should acquire");
    tokio::time::sleep(SHORT_HOLD + SLACK).await;
    assert!(
        lock.extend(Duration::from_secs(60), Duration::ZERO)
            .await?
            .is_none(),
        "an expired lock can not be extended"
    );
    Ok(())
}
