// src/cellular.rs
//! LTE modem metadata collection
//!
//! The modem is queried through `qmicli` and its text output is scraped
//! here, behind [`CellularSource`], so nothing else in the crate depends on
//! the tool's output format. Observations are stored on their own and only
//! joined with GPS fixes at read time by nearest timestamp.

use crate::{
    config::LoggerConfig,
    error::Result,
    monitor::shutdown_signal,
    storage::TelemetryStore,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    io::Read,
    process::{Command, Stdio},
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;

/// GPS fixes older than this are not shown next to a cell observation
const GPS_FRESHNESS_SECS: i64 = 30;

/// Upper bound on a single modem query
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellularObservation {
    pub timestamp: DateTime<Utc>,
    pub cell_id: Option<String>,
    pub pci: Option<u32>,
    pub band: Option<String>,
    pub rsrp: Option<f64>, // dBm
    pub rsrq: Option<f64>, // dB
    pub snr: Option<f64>,  // dB
}

impl CellularObservation {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cell_id: None,
            pci: None,
            band: None,
            rsrp: None,
            rsrq: None,
            snr: None,
        }
    }

    /// True when the modem reported nothing worth storing
    pub fn is_empty(&self) -> bool {
        self.cell_id.is_none()
            && self.pci.is_none()
            && self.band.is_none()
            && self.rsrp.is_none()
            && self.rsrq.is_none()
            && self.snr.is_none()
    }
}

/// Anything that can report the current cellular signal
pub trait CellularSource {
    fn collect_cellular_metrics(&self) -> Option<CellularObservation>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalStrength {
    pub rsrp: Option<f64>,
    pub rsrq: Option<f64>,
    pub snr: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellLocation {
    pub cell_id: Option<String>,
    pub pci: Option<u32>,
    pub band: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SignalSection {
    Rsrp,
    Rsrq,
    Snr,
}

fn lte_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'lte':\s*'(-?\d+(?:\.\d+)?) dBm?'").expect("valid regex"))
}

fn quoted_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'(\d+)'").expect("valid regex"))
}

fn band_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"band (\d+)").expect("valid regex"))
}

/// Parse `qmicli --nas-get-signal-strength` output.
///
/// Values appear on `Network 'lte': '<n> dB'` lines beneath a section
/// header such as `RSRP:`.
pub fn parse_signal_strength(output: &str) -> SignalStrength {
    let mut signal = SignalStrength::default();
    let mut section = None;

    for line in output.lines() {
        let line = line.trim();

        if line.ends_with(':') && !line.contains('\'') {
            section = match line.trim_end_matches(':') {
                "RSRP" => Some(SignalSection::Rsrp),
                "RSRQ" => Some(SignalSection::Rsrq),
                "SNR" | "SINR (8)" => Some(SignalSection::Snr),
                _ => None,
            };
            continue;
        }

        let Some(current) = section else { continue };
        let Some(value) = lte_value_regex()
            .captures(line)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        else {
            continue;
        };

        match current {
            SignalSection::Rsrp => signal.rsrp = Some(value),
            SignalSection::Rsrq => signal.rsrq = Some(value),
            SignalSection::Snr => signal.snr = Some(value),
        }
    }

    signal
}

/// Parse `qmicli --nas-get-cell-location-info` output; the first (serving)
/// cell wins.
pub fn parse_cell_location(output: &str) -> CellLocation {
    let mut location = CellLocation::default();

    for line in output.lines() {
        if line.contains("Global Cell ID:") && location.cell_id.is_none() {
            location.cell_id = quoted_number_regex()
                .captures(line)
                .map(|caps| caps[1].to_string());
        } else if line.contains("Physical Cell ID:") && location.pci.is_none() {
            location.pci = quoted_number_regex()
                .captures(line)
                .and_then(|caps| caps[1].parse().ok());
        } else if line.contains("EUTRA Absolute RF Channel Number:") && location.band.is_none() {
            location.band = band_regex()
                .captures(line)
                .map(|caps| format!("B{}", &caps[1]));
        }
    }

    location
}

/// Queries a Qualcomm modem through `qmicli`
#[derive(Debug, Clone)]
pub struct QmiCellularSource {
    device: String,
}

impl QmiCellularSource {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    fn run_qmicli(&self, request: &str) -> Option<String> {
        run_with_deadline("qmicli", &["-d", self.device.as_str(), request], QUERY_TIMEOUT)
    }
}

/// Run a command and return its stdout, killing it once `limit` has passed
fn run_with_deadline(program: &str, args: &[&str], limit: Duration) -> Option<String> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            log::error!("Failed to run {}: {}", program, e);
            return None;
        }
    };

    let deadline = Instant::now() + limit;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                log::warn!("{} {} timed out after {:?}, killing it", program, args.join(" "), limit);
                if let Err(e) = child.kill() {
                    log::error!("Failed to kill {}: {}", program, e);
                }
                // reap the child so it does not linger as a zombie
                let _ = child.wait();
                return None;
            }
            Ok(None) => std::thread::sleep(POLL_STEP),
            Err(e) => {
                log::error!("Failed to wait for {}: {}", program, e);
                return None;
            }
        }
    };

    if !status.success() {
        log::debug!("{} {} exited with {}", program, args.join(" "), status);
        return None;
    }

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        if let Err(e) = stdout.read_to_end(&mut output) {
            log::error!("Failed to read {} output: {}", program, e);
            return None;
        }
    }

    Some(String::from_utf8_lossy(&output).into_owned())
}

impl CellularSource for QmiCellularSource {
    fn collect_cellular_metrics(&self) -> Option<CellularObservation> {
        let mut observation = CellularObservation::new(Utc::now());

        if let Some(output) = self.run_qmicli("--nas-get-signal-strength") {
            let signal = parse_signal_strength(&output);
            observation.rsrp = signal.rsrp;
            observation.rsrq = signal.rsrq;
            observation.snr = signal.snr;
        }

        if let Some(output) = self.run_qmicli("--nas-get-cell-location-info") {
            let location = parse_cell_location(&output);
            observation.cell_id = location.cell_id;
            observation.pci = location.pci;
            observation.band = location.band;
        }

        if observation.is_empty() {
            None
        } else {
            Some(observation)
        }
    }
}

/// Poll the modem until shutdown, storing every non-empty observation
pub async fn run_cellular_collector(config: &LoggerConfig) -> Result<()> {
    let store = TelemetryStore::open(&config.database_path)?;
    let source = Arc::new(QmiCellularSource::new(config.cell_device.clone()));
    log::info!(
        "Starting cellular collector on {} every {}s",
        config.cell_device,
        config.cell_poll_interval_secs
    );

    let result = collect_until_shutdown(
        source,
        &store,
        config.cell_poll_interval(),
        QUERY_TIMEOUT * 2,
        shutdown_signal(),
    )
    .await;

    store.close()?;
    log::info!("Cellular collector stopped");
    result
}

/// At most one query runs at a time; a tick that finds the previous query
/// still running is skipped.
async fn collect_until_shutdown<S, F>(
    source: Arc<S>,
    store: &TelemetryStore,
    interval: Duration,
    query_timeout: Duration,
    shutdown: F,
) -> Result<()>
where
    S: CellularSource + Send + Sync + 'static,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(interval);
    let mut in_flight: Option<JoinHandle<Option<CellularObservation>>> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = ticker.tick() => {}
        }

        if let Some(handle) = in_flight.take() {
            if !handle.is_finished() {
                log::warn!("Previous cellular query still running, skipping this poll");
                in_flight = Some(handle);
                continue;
            }
            log::debug!("Discarding late cellular result");
        }

        let source = Arc::clone(&source);
        let mut query = tokio::task::spawn_blocking(move || source.collect_cellular_metrics());
        let joined = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            joined = tokio::time::timeout(query_timeout, &mut query) => joined,
        };

        let observation = match joined {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => {
                log::error!("Cellular query task failed: {}", e);
                continue;
            }
            Err(_) => {
                log::warn!("Cellular query timed out");
                in_flight = Some(query);
                continue;
            }
        };

        let Some(observation) = observation else {
            continue;
        };

        store.insert_cell_observation(&observation)?;
        log_observation(store, &observation);
    }
}

fn log_observation(store: &TelemetryStore, observation: &CellularObservation) {
    let position = store
        .nearest_fix(observation.timestamp, ChronoDuration::seconds(GPS_FRESHNESS_SECS))
        .ok()
        .flatten()
        .map(|fix| format!("{:.5},{:.5}", fix.latitude, fix.longitude))
        .unwrap_or_else(|| "STALE/UNAVAILABLE".to_string());

    log::info!(
        "Cell: {} Band: {} RSRP: {:?}dBm RSRQ: {:?}dB SNR: {:?}dB @ GPS: {}",
        observation.cell_id.as_deref().unwrap_or("-"),
        observation.band.as_deref().unwrap_or("-"),
        observation.rsrp,
        observation.rsrq,
        observation.snr,
        position
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SIGNAL_OUTPUT: &str = "[/dev/cdc-wdm0] Successfully got signal strength
Current:
\tNetwork 'lte': '-68 dBm'
RSSI:
\tNetwork 'lte': '-68 dBm'
ECIO:
\tNetwork 'lte': '-2.5 dBm'
IO: '-106 dBm'
SINR (8): '9.0 dB'
RSRQ:
\tNetwork 'lte': '-9 dB'
SNR:
\tNetwork 'lte': '7.4 dB'
RSRP:
\tNetwork 'lte': '-95 dBm'
";

    const LOCATION_OUTPUT: &str = "[/dev/cdc-wdm0] Successfully got cell location info
Intrafrequency LTE Info
\tUE In Idle: 'no'
\tPLMN: '310410'
\tTracking Area Code: '11010'
\tGlobal Cell ID: '23482125'
\tEUTRA Absolute RF Channel Number: '5110' (E-UTRA band 12: 700 MHz Lower)
\tServing Cell ID: '362'
\tCell [0]:
\t\tPhysical Cell ID: '362'
\t\tRSRQ: '-9.0' dB
\tCell [1]:
\t\tPhysical Cell ID: '17'
";

    struct FixedSource(Option<CellularObservation>);

    impl CellularSource for FixedSource {
        fn collect_cellular_metrics(&self) -> Option<CellularObservation> {
            self.0.clone()
        }
    }

    #[test]
    fn test_signal_strength_parsing() {
        let signal = parse_signal_strength(SIGNAL_OUTPUT);

        assert_eq!(signal.rsrp, Some(-95.0));
        assert_eq!(signal.rsrq, Some(-9.0));
        assert_eq!(signal.snr, Some(7.4));
    }

    #[test]
    fn test_cell_location_parsing() {
        let location = parse_cell_location(LOCATION_OUTPUT);

        assert_eq!(location.cell_id.as_deref(), Some("23482125"));
        assert_eq!(location.pci, Some(362));
        assert_eq!(location.band.as_deref(), Some("B12"));
    }

    #[test]
    fn test_unrelated_output_yields_nothing() {
        assert_eq!(parse_signal_strength("error: couldn't open the QmiDevice"), SignalStrength::default());
        assert_eq!(parse_cell_location(""), CellLocation::default());
    }

    #[test]
    fn test_empty_observation() {
        let mut observation = CellularObservation::new(Utc::now());
        assert!(observation.is_empty());
        observation.rsrp = Some(-101.0);
        assert!(!observation.is_empty());
    }

    /// Blocks far longer than any poll interval and counts overlapping calls
    struct StuckSource {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CellularSource for StuckSource {
        fn collect_cellular_metrics(&self) -> Option<CellularObservation> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
            self.running.fetch_sub(1, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn test_stuck_query_is_not_stacked() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let source = Arc::new(StuckSource {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        });

        collect_until_shutdown(
            Arc::clone(&source),
            &store,
            Duration::from_millis(20),
            Duration::from_millis(50),
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .unwrap();

        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observations_are_stored() {
        let store = TelemetryStore::open_in_memory().unwrap();
        let mut observation = CellularObservation::new(Utc::now());
        observation.rsrp = Some(-95.0);
        let source = Arc::new(FixedSource(Some(observation)));

        collect_until_shutdown(
            source,
            &store,
            Duration::from_millis(10),
            Duration::from_secs(1),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        assert!(store.cell_observation_count().unwrap() >= 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_command_is_killed() {
        let started = Instant::now();

        let output = run_with_deadline("sleep", &["30"], Duration::from_millis(200));

        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_output_is_captured() {
        let output = run_with_deadline("echo", &["Physical Cell ID: '362'"], Duration::from_secs(5));
        assert_eq!(parse_cell_location(&output.unwrap()).pci, Some(362));
    }

    #[test]
    fn test_missing_command() {
        assert!(run_with_deadline("qmicli-does-not-exist", &[], Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_source_trait_object() {
        let sources: Vec<Box<dyn CellularSource>> = vec![
            Box::new(FixedSource(None)),
            Box::new(FixedSource(Some(CellularObservation::new(Utc::now())))),
        ];

        let collected: Vec<_> = sources.iter().filter_map(|s| s.collect_cellular_metrics()).collect();
        assert_eq!(collected.len(), 1);
    }
}
