//! Round-robin channel scanning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use airband_core::{Channel, ChannelBank, ChannelList, Result, Tuner};

/// The channel a scanner state refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub channel_id: u64,
    pub name: String,
    pub frequency_hz: u64,
}

impl From<&Channel> for ScanTarget {
    fn from(channel: &Channel) -> Self {
        ScanTarget {
            channel_id: channel.id(),
            name: channel.name.clone(),
            frequency_hz: channel.frequency_hz,
        }
    }
}

/// Observable scan loop state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    /// Not scanning.
    Idle,
    /// Retuning to the target and waiting for settle.
    Tuning(ScanTarget),
    /// Checking the target for activity.
    Listening(ScanTarget),
    /// Activity detected; holding on the channel until it clears.
    Holding(ScanTarget),
}

/// How often the hold loop re-checks an active channel.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How long to linger after a transmission ends, so replies on the same
/// channel are not scanned past.
const DWELL: Duration = Duration::from_secs(3);

/// Drives a [`Tuner`] around a bank of channels.
pub struct Scanner {
    tuner: Arc<dyn Tuner>,
    scanning: AtomicBool,
    state_tx: watch::Sender<ScanState>,
    poll_interval: Duration,
    dwell: Duration,
}

impl Scanner {
    pub fn new(tuner: Arc<dyn Tuner>) -> Scanner {
        Self::with_timing(tuner, POLL_INTERVAL, DWELL)
    }

    /// Construct with explicit poll and dwell intervals.
    pub fn with_timing(tuner: Arc<dyn Tuner>, poll_interval: Duration, dwell: Duration) -> Scanner {
        let (state_tx, _) = watch::channel(ScanState::Idle);
        Scanner {
            tuner,
            scanning: AtomicBool::new(false),
            state_tx,
            poll_interval,
            dwell,
        }
    }

    /// Subscribe to scan state changes.
    pub fn state(&self) -> watch::Receiver<ScanState> {
        self.state_tx.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Ask the scan loop to stop. Observed at the next loop boundary, so
    /// stopping can lag by up to one poll interval.
    pub fn stop(&self) {
        self.scanning.store(false, Ordering::SeqCst);
    }

    /// Scan the bank's channels round-robin until [`stop`](Self::stop).
    ///
    /// Bank ids are resolved against `channels` in bank insertion order;
    /// ids with no matching channel are skipped. Fewer than two resolved
    /// targets makes scanning pointless, so this returns immediately
    /// without setting the scanning flag. A tune failure aborts the scan
    /// and surfaces the error.
    pub async fn scan(&self, channels: &ChannelList, bank: &ChannelBank) -> Result<()> {
        let targets: Vec<ScanTarget> = bank
            .ids()
            .iter()
            .filter_map(|id| channels.get(*id))
            .map(ScanTarget::from)
            .collect();
        if targets.len() < 2 {
            debug!(resolved = targets.len(), "not enough scan targets, staying idle");
            return Ok(());
        }

        info!(targets = targets.len(), "scan started");
        self.scanning.store(true, Ordering::SeqCst);
        let mut index = 0usize;

        while self.is_scanning() {
            let target = &targets[index];
            let _ = self.state_tx.send(ScanState::Tuning(target.clone()));
            debug!(channel = %target.name, freq_hz = target.frequency_hz, "tuning");

            if let Err(e) = self.tuner.tune(target.frequency_hz).await {
                warn!(channel = %target.name, error = %e, "tune failed, aborting scan");
                self.scanning.store(false, Ordering::SeqCst);
                let _ = self.state_tx.send(ScanState::Idle);
                return Err(e);
            }

            let _ = self.state_tx.send(ScanState::Listening(target.clone()));
            while self.is_scanning() && self.tuner.signal_present() {
                let _ = self.state_tx.send(ScanState::Holding(target.clone()));
                // Wait out the transmission.
                while self.is_scanning() && self.tuner.signal_present() {
                    tokio::time::sleep(self.poll_interval).await;
                }
                if !self.is_scanning() {
                    break;
                }
                // Linger for a reply before moving on.
                tokio::time::sleep(self.dwell).await;
            }

            index = (index + 1) % targets.len();
        }

        info!("scan stopped");
        let _ = self.state_tx.send(ScanState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airband_core::{AudioHandler, SampleRateHandler, SignalHandler};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted tuner: records tune calls and answers signal-present
    /// queries from a queue.
    struct ScriptedTuner {
        tuned: Mutex<Vec<u64>>,
        signal_script: Mutex<Vec<bool>>,
        fail_on_tune: Mutex<Option<u64>>,
        stop_after_tunes: Option<(usize, Arc<AtomicBool>)>,
    }

    impl ScriptedTuner {
        fn new() -> ScriptedTuner {
            ScriptedTuner {
                tuned: Mutex::new(Vec::new()),
                signal_script: Mutex::new(Vec::new()),
                fail_on_tune: Mutex::new(None),
                stop_after_tunes: None,
            }
        }

        fn tuned(&self) -> Vec<u64> {
            self.tuned.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Tuner for ScriptedTuner {
        async fn tune(&self, freq_hz: u64) -> Result<()> {
            if *self.fail_on_tune.lock().unwrap() == Some(freq_hz) {
                return Err(airband_core::Error::NotConnected);
            }
            {
                let mut tuned = self.tuned.lock().unwrap();
                tuned.push(freq_hz);
                if let Some((limit, flag)) = &self.stop_after_tunes {
                    if tuned.len() >= *limit {
                        flag.store(false, Ordering::SeqCst);
                    }
                }
            }
            // Stand in for the settle delay; also yields so other test
            // tasks get scheduled between tunes.
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        }

        fn signal_present(&self) -> bool {
            self.signal_script.lock().unwrap().pop().unwrap_or(false)
        }

        fn set_max_gain(&self, _max_gain: u32) {}
        fn on_demodulated_audio(&self, _handler: AudioHandler) {}
        fn on_sample_rate_changed(&self, _handler: SampleRateHandler) {}
        fn on_signal_detected(&self, _handler: SignalHandler) {}
    }

    fn bank_of(channels: &[&Channel]) -> (ChannelList, ChannelBank) {
        let mut list = ChannelList::new();
        let mut bank = ChannelBank::new();
        for channel in channels {
            list.add((*channel).clone());
            bank.add(channel.id());
        }
        (list, bank)
    }

    fn scanner_with(tuner: Arc<ScriptedTuner>) -> Scanner {
        Scanner::with_timing(tuner, Duration::from_millis(10), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn fewer_than_two_targets_is_a_no_op() {
        let tuner = Arc::new(ScriptedTuner::new());
        let scanner = scanner_with(Arc::clone(&tuner));

        let ch = Channel::new("tower", 118_100_000, 10);
        let (list, bank) = bank_of(&[&ch]);

        scanner.scan(&list, &bank).await.unwrap();
        assert!(!scanner.is_scanning());
        assert!(tuner.tuned().is_empty(), "single-target bank must not tune");
    }

    #[tokio::test]
    async fn round_robin_order() {
        let mut tuner = ScriptedTuner::new();
        let stop_flag = Arc::new(AtomicBool::new(true));
        tuner.stop_after_tunes = Some((5, Arc::clone(&stop_flag)));
        let tuner = Arc::new(tuner);

        let a = Channel::new("a", 1_000, 10);
        let b = Channel::new("b", 2_000, 10);
        let c = Channel::new("c", 3_000, 10);
        let (list, bank) = bank_of(&[&a, &b, &c]);

        let scanner = Arc::new(scanner_with(Arc::clone(&tuner)));
        let scanner2 = Arc::clone(&scanner);
        let flag = Arc::clone(&stop_flag);
        let stopper = tokio::spawn(async move {
            while flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            scanner2.stop();
        });

        scanner.scan(&list, &bank).await.unwrap();
        stopper.await.unwrap();

        let tuned = tuner.tuned();
        assert!(tuned.len() >= 5);
        assert_eq!(&tuned[..5], &[1_000, 2_000, 3_000, 1_000, 2_000]);
    }

    #[tokio::test]
    async fn tune_failure_aborts_scan() {
        let tuner = Arc::new(ScriptedTuner::new());
        *tuner.fail_on_tune.lock().unwrap() = Some(2_000);

        let a = Channel::new("a", 1_000, 10);
        let b = Channel::new("b", 2_000, 10);
        let (list, bank) = bank_of(&[&a, &b]);

        let scanner = scanner_with(Arc::clone(&tuner));
        let mut state = scanner.state();

        let result = scanner.scan(&list, &bank).await;
        assert!(result.is_err());
        assert!(!scanner.is_scanning());
        assert_eq!(*state.borrow_and_update(), ScanState::Idle);
        // No retry: exactly one successful tune before the failure.
        assert_eq!(tuner.tuned(), vec![1_000]);
    }

    #[tokio::test]
    async fn holds_on_active_channel() {
        let tuner = Arc::new(ScriptedTuner::new());
        // signal_present pops from the back: active on the first two
        // polls of channel a, then clear.
        *tuner.signal_script.lock().unwrap() = vec![false, false, true, true];

        let a = Channel::new("a", 1_000, 10);
        let b = Channel::new("b", 2_000, 10);
        let (list, bank) = bank_of(&[&a, &b]);

        let scanner = Arc::new(scanner_with(Arc::clone(&tuner)));
        let mut state = scanner.state();

        let scan_task = {
            let scanner = Arc::clone(&scanner);
            tokio::spawn(async move { scanner.scan(&list, &bank).await })
        };

        // Observe the Holding state for channel a before stopping.
        let held = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                state.changed().await.unwrap();
                if let ScanState::Holding(target) = &*state.borrow() {
                    break target.name.clone();
                }
            }
        })
        .await
        .expect("scan never entered Holding");
        assert_eq!(held, "a");

        scanner.stop();
        scan_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unresolvable_bank_ids_are_skipped() {
        let tuner = Arc::new(ScriptedTuner::new());
        let scanner = scanner_with(Arc::clone(&tuner));

        let a = Channel::new("a", 1_000, 10);
        let b = Channel::new("b", 2_000, 10);
        let mut list = ChannelList::new();
        list.add(a.clone());
        list.add(b.clone());
        let mut bank = ChannelBank::new();
        bank.add(a.id());
        bank.add(9_999_999); // no such channel
        bank.add(b.id());
        // Two resolvable targets remain, but one of them is gone: delete
        // b and the bank falls below the minimum.
        list.delete(b.id());

        scanner.scan(&list, &bank).await.unwrap();
        assert!(tuner.tuned().is_empty());
    }
}
