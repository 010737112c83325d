use anyhow::Result;
use chrono::{DateTime, Utc};
use evolve_core::{PatchOutcome, TelemetryConfig, runtime_dir};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

const OUTCOME_TAG: &str = " OUTCOME ";

/// Persists gate outcomes to `.evolve/observe.log` and optionally forwards
/// them to a telemetry endpoint.
pub struct Observer {
    log_path: PathBuf,
    telemetry: Option<TelemetrySink>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

struct TelemetrySink {
    endpoint: String,
    client: Client,
}

/// One line of the outcome log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: PatchOutcome,
}

impl Observer {
    pub fn new(workspace: &Path, telemetry_cfg: &TelemetryConfig) -> Result<Self> {
        let dir = runtime_dir(workspace);
        fs::create_dir_all(&dir)?;
        let telemetry = telemetry_sink(telemetry_cfg)?;
        Ok(Self {
            log_path: dir.join("observe.log"),
            telemetry,
            in_flight: Mutex::new(Vec::new()),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn record_outcome(&self, outcome: &PatchOutcome) -> Result<()> {
        self.append_log_line(&format!(
            "{}{OUTCOME_TAG}{}",
            Utc::now().to_rfc3339(),
            serde_json::to_string(outcome)?
        ))?;
        self.emit_telemetry(
            "telemetry.outcome",
            json!({
                "patch_id": outcome.patch_id,
                "status": outcome.status,
                "pre_toxicity": outcome.pre_toxicity,
                "post_toxicity": outcome.post_toxicity,
            }),
        )
    }

    /// Recorded outcomes, oldest first. Lines that are not outcome records
    /// are skipped.
    pub fn history(&self) -> Result<Vec<OutcomeRecord>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.log_path)?;
        Ok(raw.lines().filter_map(parse_outcome_line).collect())
    }

    fn append_log_line(&self, line: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    fn emit_telemetry(&self, name: &str, payload: serde_json::Value) -> Result<()> {
        let Some(sink) = &self.telemetry else {
            return Ok(());
        };

        let body = json!({
            "name": name,
            "at": Utc::now().to_rfc3339(),
            "payload": payload,
        });

        // Delivered off the caller's thread; `flush` waits for it.
        let client = sink.client.clone();
        let endpoint = sink.endpoint.clone();
        let log_path = self.log_path.clone();
        let handle = std::thread::spawn(move || {
            if let Err(err) = client.post(&endpoint).json(&body).send() {
                let line = format!("{} TELEMETRY_ERROR error={}", Utc::now().to_rfc3339(), err);
                let _ = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log_path)
                    .and_then(|mut f| writeln!(f, "{line}"));
            }
        });
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.push(handle);
        }
        Ok(())
    }

    /// Wait for pending telemetry deliveries. Each one is bounded by the
    /// client timeout. Short-lived callers must flush before exiting or the
    /// deliveries are lost with the process.
    pub fn flush(&self) {
        let pending = match self.in_flight.lock() {
            Ok(mut in_flight) => std::mem::take(&mut *in_flight),
            Err(_) => return,
        };
        for handle in pending {
            let _ = handle.join();
        }
    }
}

fn parse_outcome_line(line: &str) -> Option<OutcomeRecord> {
    let (at, body) = line.split_once(OUTCOME_TAG)?;
    let at = DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc);
    let outcome = serde_json::from_str(body).ok()?;
    Some(OutcomeRecord { at, outcome })
}

fn telemetry_sink(cfg: &TelemetryConfig) -> Result<Option<TelemetrySink>> {
    if !cfg.enabled {
        return Ok(None);
    }
    let Some(endpoint) = cfg.endpoint.clone() else {
        return Ok(None);
    };
    let client = Client::builder().timeout(Duration::from_secs(3)).build()?;
    Ok(Some(TelemetrySink { endpoint, client }))
}
