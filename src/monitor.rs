// src/monitor.rs
//! Ingestion loop: serial line → fix → motion → store → geofences → notify

use crate::{
    config::LoggerConfig,
    error::{Result, TelemetryError},
    geofence::{GeofenceEngine, GeofenceEvent},
    gps::{nmea, EpochMerger, Fix, MotionState},
    notify::{notifier_for, Notifier},
    storage::TelemetryStore,
};
use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};

/// Log a progress line after this many stored fixes
const SUMMARY_INTERVAL: u64 = 20;

/// NMEA caps a sentence at 82 characters; anything this long without a line
/// ending is noise
const MAX_LINE_BYTES: usize = 1024;

/// Everything produced by one accepted sentence
#[derive(Debug, Clone, PartialEq)]
pub struct LineOutcome {
    pub fix: Fix,
    pub events: Vec<GeofenceEvent>,
}

/// Per-fix processing chain, owned by a single task
pub struct Pipeline {
    epoch: EpochMerger,
    motion: MotionState,
    geofences: GeofenceEngine,
    store: TelemetryStore,
    notifier: Box<dyn Notifier>,
    stored: u64,
}

impl Pipeline {
    pub fn new(store: TelemetryStore, geofences: GeofenceEngine, notifier: Box<dyn Notifier>) -> Self {
        Self {
            epoch: EpochMerger::new(),
            motion: MotionState::new(),
            geofences,
            store,
            notifier,
            stored: 0,
        }
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn geofences(&self) -> &GeofenceEngine {
        &self.geofences
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    /// Number of fixes stored since the pipeline started
    pub fn stored(&self) -> u64 {
        self.stored
    }

    pub fn into_store(self) -> TelemetryStore {
        self.store
    }

    /// Process one raw line using the current time to date GGA/GLL fixes
    pub fn process_line(&mut self, line: &str) -> Result<Option<LineOutcome>> {
        self.process_line_at(line, Utc::now())
    }

    /// Process one raw line. Auxiliary sentences only update the epoch;
    /// anything undecodable is ignored. Only store failures are errors.
    pub fn process_line_at(&mut self, line: &str, reference: DateTime<Utc>) -> Result<Option<LineOutcome>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(sentence) = nmea::decode_sentence(line, reference) else {
            log::debug!("Ignoring sentence: {}", line);
            return Ok(None);
        };

        match self.epoch.push(sentence) {
            Some(fix) => self.process_fix(fix),
            None => Ok(None),
        }
    }

    /// Enrich, persist and geofence a decoded fix
    pub fn process_fix(&mut self, fix: Fix) -> Result<Option<LineOutcome>> {
        if !fix.is_valid() {
            log::debug!("Discarding invalid fix ({})", fix.fix_description());
            return Ok(None);
        }

        let fix = self.motion.update(fix);
        self.store.insert_fix(&fix)?;
        self.stored += 1;

        if self.stored % SUMMARY_INTERVAL == 0 {
            log::info!(
                "Stored {} fixes, last {:.6},{:.6} speed {} total {:.2} km",
                self.stored,
                fix.latitude,
                fix.longitude,
                fix.speed
                    .map(|s| format!("{:.1} km/h", s))
                    .unwrap_or_else(|| "-".to_string()),
                self.motion.total_distance_km()
            );
        }

        let mut events = Vec::new();
        for crossing in self.geofences.evaluate(fix.longitude, fix.latitude) {
            let event = GeofenceEvent::from_crossing(&fix, crossing);
            self.store.insert_geofence_event(&event)?;
            log::warn!(
                "Geofence {}: {} at {:.5},{:.5}",
                event.event_type,
                event.boundary.as_deref().unwrap_or("-"),
                event.latitude,
                event.longitude
            );
            self.notifier.notify(&event);
            events.push(event);
        }

        Ok(Some(LineOutcome { fix, events }))
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl-C, shutting down"),
        _ = terminate => log::info!("Received SIGTERM, shutting down"),
    }
}

/// Limits applied to the read loop
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    pub read_timeout: Duration,
    pub max_consecutive_errors: u32,
}

impl ReadLimits {
    pub fn from_config(config: &LoggerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout(),
            max_consecutive_errors: config.max_consecutive_read_errors,
        }
    }
}

/// Feed lines from `reader` through the pipeline until `shutdown` resolves.
///
/// A timed-out read is not an error. End of input means the device went
/// away, which is fatal, as is a run of read errors past the limit. Runs of
/// bytes longer than `MAX_LINE_BYTES` without a newline are dropped.
pub async fn read_lines<R, S>(
    reader: &mut R,
    pipeline: &mut Pipeline,
    limits: ReadLimits,
    shutdown: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut buf = Vec::with_capacity(128);
    let mut consecutive_errors = 0u32;

    loop {
        // `buf` never reaches the cap here, so the limit is at least one byte
        let mut limited = (&mut *reader).take((MAX_LINE_BYTES - buf.len()) as u64);
        let read = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            read = tokio::time::timeout(limits.read_timeout, limited.read_until(b'\n', &mut buf)) => read,
        };

        match read {
            Err(_) => {
                log::debug!("No data within {:?}", limits.read_timeout);
            }
            Ok(Ok(0)) => {
                if !buf.is_empty() {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    pipeline.process_line(&line)?;
                }
                return Err(TelemetryError::Connection("GPS device closed the stream".to_string()));
            }
            Ok(Ok(_)) => {
                consecutive_errors = 0;
                // partial reads stay in `buf` until the newline arrives
                if buf.last() == Some(&b'\n') {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();
                    pipeline.process_line(&line)?;
                } else if buf.len() >= MAX_LINE_BYTES {
                    log::debug!("Discarding {} bytes with no line ending", buf.len());
                    buf.clear();
                }
            }
            Ok(Err(e)) => {
                consecutive_errors += 1;
                log::debug!("Serial read error ({} in a row): {}", consecutive_errors, e);
                if consecutive_errors > limits.max_consecutive_errors {
                    return Err(TelemetryError::Connection(format!(
                        "Giving up after {} consecutive read errors: {}",
                        consecutive_errors, e
                    )));
                }
            }
        }
    }
}

/// Pick the serial device, preferring a USB port with the configured vendor id
pub fn resolve_device(config: &LoggerConfig) -> String {
    let Some(vendor_id) = config.gps_vendor_id else {
        return config.gps_device.clone();
    };

    let ports = match tokio_serial::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Failed to list serial ports: {}", e);
            return config.gps_device.clone();
        }
    };

    ports
        .into_iter()
        .find(|port| matches!(&port.port_type, SerialPortType::UsbPort(usb) if usb.vid == vendor_id))
        .map(|port| {
            log::info!("Found GPS receiver {:04x} on {}", vendor_id, port.port_name);
            port.port_name
        })
        .unwrap_or_else(|| {
            log::warn!(
                "No USB port with vendor id {:04x}, using {}",
                vendor_id,
                config.gps_device
            );
            config.gps_device.clone()
        })
}

/// Connect to a GPS device via serial port
fn open_serial(port: &str, baudrate: u32, timeout: Duration) -> Result<SerialStream> {
    log::info!("Connecting to GPS on {} at {} baud", port, baudrate);

    let serial = tokio_serial::new(port, baudrate)
        .timeout(timeout)
        .open_native_async()
        .map_err(|e| TelemetryError::Connection(format!("Failed to open serial port {}: {}", port, e)))?;

    log::info!("Connected to {}", port);
    Ok(serial)
}

/// Run the ingestion loop until shutdown or a fatal error
pub async fn run(config: &LoggerConfig) -> Result<()> {
    let device = resolve_device(config);
    let store = TelemetryStore::open(&config.database_path)?;
    let geofences = GeofenceEngine::load(config.geofence_file.as_deref());
    let notifier = notifier_for(config.notification_url.as_deref())?;
    let mut pipeline = Pipeline::new(store, geofences, notifier);

    let result = match open_serial(&device, config.gps_baud_rate, config.read_timeout()) {
        Ok(serial) => {
            let mut reader = BufReader::new(serial);
            read_lines(&mut reader, &mut pipeline, ReadLimits::from_config(config), shutdown_signal()).await
        }
        Err(e) => Err(e),
    };

    let stored = pipeline.stored();
    let closed = pipeline.into_store().close();
    log::info!("GPS logger stopped after {} fixes", stored);

    // the loop's own error matters more than a failed close
    result.and(closed)
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TelemetryError::Other(format!("Failed to list serial ports: {}", e)))?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            match port.port_type {
                SerialPortType::UsbPort(usb) => println!(
                    "  {} - USB {:04x}:{:04x} {}",
                    port.port_name,
                    usb.vid,
                    usb.pid,
                    usb.product.unwrap_or_default()
                ),
                other => println!("  {} - {:?}", port.port_name, other),
            }
        }
    }

    Ok(())
}
