//! Polling driver
//!
//! Runs snapshot cycles on a fixed cadence as a cancellable task. The first
//! cycle runs as soon as the task starts; the next auto tick is scheduled
//! once a cycle completes, so cycles never overlap. A manual refresh that
//! arrives mid-cycle drops the in-flight cycle and starts a new one, which
//! keeps stale results from landing after fresher ones.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::PollingConfig,
    dashboard::orchestrator::SnapshotSource,
    utils::{now_millis, retry_with_backoff},
    DashboardSnapshot, DataplaneError, Result,
};

/// What the dashboard shows: the last good snapshot plus an error indicator
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    /// Last successfully assembled snapshot; kept across failed cycles
    pub snapshot: Option<Arc<DashboardSnapshot>>,

    /// Error from the most recent cycle, cleared on success
    pub last_error: Option<Arc<DataplaneError>>,

    /// A cycle is in flight
    pub is_fetching: bool,

    /// Cycles failed since the last success
    pub consecutive_failures: u32,

    /// Millisecond epoch of the last successful cycle
    pub last_success: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Refresh,
    SetAutoRefresh(bool),
}

/// Spawns polling tasks over a snapshot source
pub struct Poller;

impl Poller {
    /// Start polling `source`; the task lives until the handle is shut down or dropped
    pub fn spawn(source: Arc<dyn SnapshotSource>, config: &PollingConfig) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(DashboardState::default());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let task = PollTask {
            source,
            config: config.clone(),
            auto_refresh: config.auto_refresh,
            state_tx,
            commands: commands_rx,
            token: token.clone(),
        };

        info!(
            interval_ms = config.interval_ms,
            auto_refresh = config.auto_refresh,
            "Starting dashboard poller"
        );

        PollerHandle {
            state_rx,
            commands: commands_tx,
            token,
            task: Some(tokio::spawn(task.run())),
        }
    }
}

/// Control handle for a running poller
pub struct PollerHandle {
    state_rx: watch::Receiver<DashboardState>,
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Current dashboard state
    pub fn state(&self) -> DashboardState {
        self.state_rx.borrow().clone()
    }

    /// Watch dashboard state changes
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state_rx.clone()
    }

    /// Run a cycle now, superseding any cycle in flight
    pub fn refresh(&self) -> Result<()> {
        self.command(Command::Refresh)
    }

    /// Enable or disable the fixed-interval tick
    pub fn set_auto_refresh(&self, enabled: bool) -> Result<()> {
        self.command(Command::SetAutoRefresh(enabled))
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| DataplaneError::internal("Poller is not running"))
    }

    /// Cancel the task and any pending tick or retry, then wait for it to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Poller task ended abnormally");
            }
        }
        info!("Dashboard poller stopped");
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct PollTask {
    source: Arc<dyn SnapshotSource>,
    config: PollingConfig,
    auto_refresh: bool,
    state_tx: watch::Sender<DashboardState>,
    commands: mpsc::UnboundedReceiver<Command>,
    token: CancellationToken,
}

/// How an in-flight cycle ended
enum CycleEnd {
    Finished(Result<DashboardSnapshot>),
    Superseded,
    Stopped,
}

impl PollTask {
    async fn run(mut self) {
        let mut next_due = Some(Instant::now());

        loop {
            let due = next_due.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = self.token.cancelled() => break,
                command = self.commands.recv() => match command {
                    None => break,
                    Some(Command::Refresh) => {}
                    Some(Command::SetAutoRefresh(enabled)) => {
                        next_due = self.set_auto_refresh(enabled).then(|| Instant::now() + self.config.interval());
                        continue;
                    }
                },
                _ = sleep_until(due), if next_due.is_some() => {}
            }

            if !self.run_cycle().await {
                break;
            }

            next_due = self
                .auto_refresh
                .then(|| Instant::now() + self.config.interval());
        }

        self.state_tx.send_modify(|state| state.is_fetching = false);
        debug!("Poll task exiting");
    }

    fn set_auto_refresh(&mut self, enabled: bool) -> bool {
        if self.auto_refresh != enabled {
            info!(enabled, "Auto-refresh toggled");
        }
        self.auto_refresh = enabled;
        enabled
    }

    /// Run cycles until one finishes; false when the task must stop
    async fn run_cycle(&mut self) -> bool {
        loop {
            self.state_tx.send_modify(|state| state.is_fetching = true);

            match self.attempt().await {
                CycleEnd::Stopped => return false,
                CycleEnd::Superseded => {
                    debug!("Manual refresh superseded in-flight cycle");
                }
                CycleEnd::Finished(outcome) => {
                    self.publish(outcome);
                    return true;
                }
            }
        }
    }

    async fn attempt(&mut self) -> CycleEnd {
        let source = Arc::clone(&self.source);
        let retry = self.config.retry();
        let cycle = retry_with_backoff(|| source.fetch_snapshot(), retry, "dashboard_poll");
        tokio::pin!(cycle);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => return CycleEnd::Stopped,
                outcome = &mut cycle => return CycleEnd::Finished(outcome),
                command = self.commands.recv() => match command {
                    None => return CycleEnd::Stopped,
                    Some(Command::Refresh) => return CycleEnd::Superseded,
                    Some(Command::SetAutoRefresh(enabled)) => {
                        self.set_auto_refresh(enabled);
                    }
                },
            }
        }
    }

    fn publish(&self, outcome: Result<DashboardSnapshot>) {
        match outcome {
            Ok(snapshot) => {
                info!(
                    block = snapshot.current_block,
                    tps = snapshot.network_metrics.tps,
                    health = ?snapshot.network_metrics.health,
                    "Dashboard snapshot updated"
                );
                self.state_tx.send_modify(|state| {
                    state.snapshot = Some(Arc::new(snapshot));
                    state.last_error = None;
                    state.is_fetching = false;
                    state.consecutive_failures = 0;
                    state.last_success = Some(now_millis());
                });
            }
            Err(e) => {
                error!(category = e.category(), error = %e, "Dashboard cycle failed");
                self.state_tx.send_modify(|state| {
                    state.last_error = Some(Arc::new(e));
                    state.is_fetching = false;
                    state.consecutive_failures += 1;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BlockMetrics, NetworkHealth, NetworkMetrics, SwapActivity, TokenMetrics, TransactionMetrics,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn snapshot(block: u64) -> DashboardSnapshot {
        DashboardSnapshot {
            current_block: block,
            network_metrics: NetworkMetrics {
                block_height: block,
                tps: 1.0,
                avg_tps: 0.9,
                gas_price: 1.0,
                gas_price_history: vec![],
                avg_block_time: 2.0,
                pending_tx: 0,
                validator_count: 99,
                health: NetworkHealth::Excellent,
            },
            transaction_metrics: TransactionMetrics {
                total_transactions: 0,
                tps: 1.0,
                volume: 0.0,
                success_rate: 1.0,
            },
            block_metrics: BlockMetrics {
                avg_block_time: 2.0,
                blocks_per_minute: 30.0,
                last_block_time: 2.0,
            },
            token_metrics: TokenMetrics {
                current_gas_price: 1.0,
                gas_used24h: 0,
                token_pairs: vec![],
            },
            swap_activity: SwapActivity {
                total_swaps: 0,
                volume24h: 0.0,
            },
            recent_transactions: vec![],
            recent_blocks: vec![],
            last_updated: 0,
        }
    }

    /// Replays scripted failures, then succeeds with the call number as block height
    struct ScriptedSource {
        calls: AtomicU64,
        script: Mutex<VecDeque<DataplaneError>>,
        delay: Duration,
    }

    impl ScriptedSource {
        fn new(failures: Vec<DataplaneError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                script: Mutex::new(failures.into()),
                delay,
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch_snapshot(&self) -> Result<DashboardSnapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let failure = self.script.lock().pop_front();
            match failure {
                Some(e) => Err(e),
                None => Ok(snapshot(call)),
            }
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_is_immediate_then_fixed_interval() {
        let source = ScriptedSource::new(vec![], Duration::ZERO);
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());

        advance(10).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(handle.state().snapshot.unwrap().current_block, 1);

        advance(3000).await;
        assert_eq!(source.calls(), 2);
        advance(3000).await;
        assert_eq!(source.calls(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_with_backoff() {
        let failures = vec![
            DataplaneError::transport(Some(500), "boom"),
            DataplaneError::transport(None, "timeout"),
        ];
        let source = ScriptedSource::new(failures, Duration::ZERO);
        let started = Instant::now();
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());

        let mut states = handle.subscribe();
        let state = states.wait_for(|s| s.snapshot.is_some()).await.unwrap().clone();

        assert_eq!(source.calls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_error.is_none());
        assert!(!state.is_fetching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_surfaces_without_retry() {
        let source = ScriptedSource::new(vec![DataplaneError::Auth { status: 401 }], Duration::ZERO);
        let started = Instant::now();
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());

        let mut states = handle.subscribe();
        let state = states.wait_for(|s| s.last_error.is_some()).await.unwrap().clone();

        assert_eq!(source.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(state.last_error.unwrap().is_auth());
        assert_eq!(state.consecutive_failures, 1);
        assert!(state.snapshot.is_none());

        // next tick tries again
        advance(3100).await;
        assert_eq!(source.calls(), 2);
        assert!(handle.state().snapshot.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_keeps_last_good_snapshot() {
        let source = ScriptedSource::new(vec![], Duration::ZERO);
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());
        advance(10).await;
        assert_eq!(handle.state().snapshot.unwrap().current_block, 1);

        source.script.lock().push_back(DataplaneError::insufficient_data("no blocks"));
        source.script.lock().push_back(DataplaneError::insufficient_data("no blocks"));
        source.script.lock().push_back(DataplaneError::insufficient_data("no blocks"));
        source.script.lock().push_back(DataplaneError::insufficient_data("no blocks"));

        let mut states = handle.subscribe();
        let state = states.wait_for(|s| s.last_error.is_some()).await.unwrap().clone();
        assert_eq!(state.snapshot.unwrap().current_block, 1);
        assert_eq!(state.consecutive_failures, 1);
        // one first attempt plus three retries
        assert_eq!(source.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_when_auto_refresh_disabled() {
        let config = PollingConfig {
            auto_refresh: false,
            ..PollingConfig::default()
        };
        let source = ScriptedSource::new(vec![], Duration::ZERO);
        let handle = Poller::spawn(source.clone(), &config);

        advance(10_000).await;
        assert_eq!(source.calls(), 1);

        handle.refresh().unwrap();
        advance(10).await;
        assert_eq!(source.calls(), 2);

        handle.set_auto_refresh(true).unwrap();
        advance(3100).await;
        assert_eq!(source.calls(), 3);

        handle.set_auto_refresh(false).unwrap();
        advance(10_000).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_supersedes_in_flight_cycle() {
        let source = ScriptedSource::new(vec![], Duration::from_secs(10));
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());

        advance(1000).await;
        assert!(handle.state().is_fetching);
        handle.refresh().unwrap();

        let mut states = handle.subscribe();
        let state = states.wait_for(|s| s.snapshot.is_some()).await.unwrap().clone();

        // the first cycle never delivered
        assert_eq!(state.snapshot.unwrap().current_block, 2);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_drop_stop_polling() {
        let source = ScriptedSource::new(vec![], Duration::ZERO);
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());
        advance(10).await;
        handle.shutdown().await;
        advance(30_000).await;
        assert_eq!(source.calls(), 1);

        let source = ScriptedSource::new(vec![], Duration::ZERO);
        let handle = Poller::spawn(source.clone(), &PollingConfig::default());
        advance(10).await;
        drop(handle);
        advance(30_000).await;
        assert_eq!(source.calls(), 1);
    }
}
