//! # Scheduler service - live timers reconciled against scheduler rows.
//!
//! Each armed row owns one timer task. The task emits `SCHEDULER_EXECUTED` on the
//! [`EventBus`] every `interval` until its cancellation token fires.
//!
//! ## Architecture
//! ```text
//! load_from_db(id) ──► repo.find(id)
//!                        ├─ None                      → evict(id)            (row deleted)
//!                        ├─ on_master_only && !master → evict(id)            (not ours to run)
//!                        ├─ same def already armed    → no-op
//!                        └─ new/changed def           → evict(id) + arm(def)
//!
//! arm(def) ──► tokio::spawn(timer loop) with child CancellationToken
//!                 loop { select! { cancelled → exit, tick → bus.emit(SCHEDULER_EXECUTED) } }
//! ```
//!
//! ## Rules
//! - At most **one** timer per row id.
//! - The store is the source of truth: every load re-reads the row.
//! - All operations are idempotent (`remove` of an unknown id is a no-op).
//! - Timers are children of the node's runtime token; node shutdown stops them all.
//!   Once that token is cancelled no new timer is armed.
//! - `load_all` also evicts timers whose row is no longer in the table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ReconcileError;
use crate::events::{EventBus, EventDescriptor, ScheduledRun};
use crate::store::{Repository, Row};

/// Shortest interval a timer is armed with (shorter values are clamped).
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// A scheduler row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerDef {
    pub id: i64,
    /// Time between two firings.
    pub interval: Duration,
    /// Data carried by every `SCHEDULER_EXECUTED` event of this row.
    pub event_data: String,
    /// Only a master node arms this row.
    pub on_master_only: bool,
}

impl Row for SchedulerDef {
    fn id(&self) -> i64 {
        self.id
    }
}

/// Handle to an armed timer.
struct Timer {
    def: SchedulerDef,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Registry of live timers on this node.
pub struct SchedulerService {
    repo: Arc<dyn Repository<SchedulerDef>>,
    bus: Arc<EventBus>,
    executed: EventDescriptor<ScheduledRun>,
    runtime_token: CancellationToken,
    master: bool,
    timers: RwLock<HashMap<i64, Timer>>,
}

impl SchedulerService {
    /// Creates a service with no armed timers.
    pub fn new(
        repo: Arc<dyn Repository<SchedulerDef>>,
        bus: Arc<EventBus>,
        executed: EventDescriptor<ScheduledRun>,
        runtime_token: CancellationToken,
        master: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            bus,
            executed,
            runtime_token,
            master,
            timers: RwLock::new(HashMap::new()),
        })
    }

    /// Reads row `id` and arms, re-arms or evicts its timer to match.
    pub async fn load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        match self.repo.find(id).await? {
            Some(def) => self.apply(def).await,
            None => {
                debug!(scheduler = id, "row not found; treating as deleted");
                self.evict(id).await;
            }
        }
        Ok(())
    }

    /// Cancels and forgets the timer of row `id`, if armed.
    pub async fn remove(&self, id: i64) -> Result<(), ReconcileError> {
        self.evict(id).await;
        Ok(())
    }

    /// Evicts the timer of row `id` and loads the row again.
    pub async fn remove_and_load_from_db(&self, id: i64) -> Result<(), ReconcileError> {
        self.evict(id).await;
        self.load_from_db(id).await
    }

    /// Brings the timer set in line with the whole table: rows gone from the store are
    /// evicted, every present row is applied. Returns the number of armed timers afterwards.
    pub async fn load_all(&self) -> Result<usize, ReconcileError> {
        let rows = self.repo.all().await?;
        let present: HashSet<i64> = rows.iter().map(|d| d.id).collect();
        let stale: Vec<i64> = {
            let timers = self.timers.read().await;
            timers.keys().copied().filter(|id| !present.contains(id)).collect()
        };
        for id in stale {
            debug!(scheduler = id, "row gone from table; evicting");
            self.evict(id).await;
        }
        for def in rows {
            self.apply(def).await;
        }
        Ok(self.len().await)
    }

    /// Returns true if row `id` has an armed timer.
    pub async fn is_scheduled(&self, id: i64) -> bool {
        self.timers.read().await.contains_key(&id)
    }

    /// Returns the definition an armed timer runs with.
    pub async fn definition(&self, id: i64) -> Option<SchedulerDef> {
        self.timers.read().await.get(&id).map(|t| t.def.clone())
    }

    /// Sorted ids of armed timers.
    pub async fn scheduled_ids(&self) -> Vec<i64> {
        let timers = self.timers.read().await;
        let mut ids: Vec<i64> = timers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.timers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.timers.read().await.is_empty()
    }

    /// Cancels every timer and waits for the tasks to exit.
    pub async fn cancel_all(&self) {
        let timers: Vec<(i64, Timer)> = {
            let mut timers = self.timers.write().await;
            timers.drain().collect()
        };
        for (_, t) in &timers {
            t.cancel.cancel();
        }
        for (_, t) in timers {
            let _ = t.join.await;
        }
    }

    async fn apply(&self, def: SchedulerDef) {
        let id = def.id;
        if self.runtime_token.is_cancelled() {
            debug!(scheduler = id, "node is shutting down; timer not armed");
            self.evict(id).await;
            return;
        }
        if def.on_master_only && !self.master {
            debug!(scheduler = id, "master-only row skipped on non-master node");
            self.evict(id).await;
            return;
        }

        let replaced = {
            let mut timers = self.timers.write().await;
            if timers.get(&id).is_some_and(|t| t.def == def) {
                debug!(scheduler = id, "timer already armed with this definition");
                return;
            }
            let timer = self.arm(def);
            timers.insert(id, timer)
        };

        match replaced {
            Some(old) => {
                info!(scheduler = id, "timer re-armed with updated definition");
                old.cancel.cancel();
                let _ = old.join.await;
            }
            None => info!(scheduler = id, "timer armed"),
        }
    }

    fn arm(&self, def: SchedulerDef) -> Timer {
        let cancel = self.runtime_token.child_token();
        let join = tokio::spawn(run_timer(
            def.clone(),
            Arc::clone(&self.bus),
            self.executed.clone(),
            cancel.clone(),
        ));
        Timer { def, cancel, join }
    }

    async fn evict(&self, id: i64) {
        let removed = self.timers.write().await.remove(&id);
        if let Some(timer) = removed {
            timer.cancel.cancel();
            let _ = timer.join.await;
            info!(scheduler = id, "timer removed");
        }
    }
}

/// Timer loop of one row.
async fn run_timer(
    def: SchedulerDef,
    bus: Arc<EventBus>,
    executed: EventDescriptor<ScheduledRun>,
    token: CancellationToken,
) {
    let period = def.interval.max(MIN_INTERVAL);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let run = ScheduledRun {
                    scheduler_id: def.id,
                    event_data: def.event_data.clone(),
                    fired_at: SystemTime::now(),
                };
                let out = bus.emit(&executed, &run);
                debug!(scheduler = def.id, delivered = out.delivered, failed = out.failed, "scheduler fired");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRegistry;
    use crate::store::MemoryRepository;
    use std::sync::Mutex;

    struct Fixture {
        repo: Arc<MemoryRepository<SchedulerDef>>,
        bus: Arc<EventBus>,
        executed: EventDescriptor<ScheduledRun>,
        token: CancellationToken,
    }

    fn fixture() -> Fixture {
        let mut reg = EventRegistry::new();
        Fixture {
            repo: Arc::new(MemoryRepository::new("scheduler")),
            bus: Arc::new(EventBus::new()),
            executed: reg.register("SCHEDULER_EXECUTED"),
            token: CancellationToken::new(),
        }
    }

    fn service(f: &Fixture, master: bool) -> Arc<SchedulerService> {
        SchedulerService::new(
            f.repo.clone(),
            Arc::clone(&f.bus),
            f.executed.clone(),
            f.token.clone(),
            master,
        )
    }

    fn def(id: i64, secs: u64, data: &str) -> SchedulerDef {
        SchedulerDef {
            id,
            interval: Duration::from_secs(secs),
            event_data: data.to_string(),
            on_master_only: false,
        }
    }

    #[tokio::test]
    async fn test_add_twice_keeps_one_timer() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(5, 60, "nightly"));

        svc.load_from_db(5).await.unwrap();
        svc.load_from_db(5).await.unwrap();
        assert_eq!(svc.scheduled_ids().await, vec![5]);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(1, 60, "a"));
        svc.load_from_db(1).await.unwrap();

        svc.remove(999).await.unwrap();
        assert_eq!(svc.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_row_evicts() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(3, 60, "a"));
        svc.load_from_db(3).await.unwrap();

        f.repo.delete(3);
        svc.load_from_db(3).await.unwrap();
        assert!(!svc.is_scheduled(3).await);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_definition() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(7, 60, "old"));
        svc.load_from_db(7).await.unwrap();

        f.repo.upsert(def(7, 30, "new"));
        svc.remove_and_load_from_db(7).await.unwrap();
        let armed = svc.definition(7).await.expect("armed");
        assert_eq!(armed.event_data, "new");
        assert_eq!(armed.interval, Duration::from_secs(30));
        assert_eq!(svc.len().await, 1);
    }

    #[tokio::test]
    async fn test_master_only_rows_skipped_on_non_master() {
        let f = fixture();
        let worker = service(&f, false);
        let master = service(&f, true);
        f.repo.upsert(SchedulerDef {
            on_master_only: true,
            ..def(9, 60, "report")
        });

        worker.load_from_db(9).await.unwrap();
        master.load_from_db(9).await.unwrap();
        assert!(!worker.is_scheduled(9).await);
        assert!(master.is_scheduled(9).await);
        master.cancel_all().await;
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.set_unavailable(true);
        let err = svc.load_from_db(1).await.unwrap_err();
        assert_eq!(err.as_label(), "store_unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_emits_until_removed() {
        let f = fixture();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        f.bus.register_listener(&f.executed, move |run: &ScheduledRun| {
            sink.lock().unwrap().push(run.event_data.clone());
            Ok(())
        });

        let svc = service(&f, true);
        f.repo.upsert(def(1, 1, "tick"));
        svc.load_from_db(1).await.unwrap();

        time::sleep(Duration::from_millis(3_500)).await;
        svc.remove(1).await.unwrap();
        let count = fired.lock().unwrap().len();
        assert_eq!(count, 3);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.lock().unwrap().len(), count, "no firing after removal");
    }

    #[tokio::test]
    async fn test_load_all_evicts_deleted_rows() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(1, 60, "a"));
        f.repo.upsert(def(2, 60, "b"));
        assert_eq!(svc.load_all().await.unwrap(), 2);

        f.repo.delete(1);
        assert_eq!(svc.load_all().await.unwrap(), 1);
        assert_eq!(svc.scheduled_ids().await, vec![2]);

        f.repo.delete(2);
        assert_eq!(svc.load_all().await.unwrap(), 0);
        assert!(svc.is_empty().await);
    }

    #[tokio::test]
    async fn test_nothing_armed_after_shutdown() {
        let f = fixture();
        let svc = service(&f, true);
        f.token.cancel();
        svc.cancel_all().await;

        f.repo.upsert(def(4, 60, "late"));
        svc.load_from_db(4).await.unwrap();
        assert!(!svc.is_scheduled(4).await);
        assert_eq!(svc.load_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_runtime_token_stops_timers() {
        let f = fixture();
        let svc = service(&f, true);
        f.repo.upsert(def(1, 60, "a"));
        svc.load_all().await.unwrap();

        f.token.cancel();
        svc.cancel_all().await;
        assert!(svc.is_empty().await);
    }
}
