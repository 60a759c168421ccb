//! mmcli bus backend
//!
//! Production [`ModemBus`] implementation driving the ModemManager CLI as
//! child processes. Availability and the modem set are observed by polling
//! `mmcli -L -J` and diffing against the previous snapshot; message and call
//! arrival is detected the same way per present modem. Requests run as
//! one-shot `mmcli` invocations whose outcomes are reported back as
//! [`BusEvent`] completions.
//!
//! The diffing snapshot only shapes which notifications are synthesized; the
//! reactor re-synchronizes by listing, so a missed or duplicated
//! notification is harmless.

use crate::bus::{BusEvent, EventSender, ModemBus, OpResult};
use crate::error::{Error, Result};
use crate::modem::{
    CallRecord, CallState, ModemDescriptor, ModemState, SmsRecord, SmsState, StateChangeReason,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Backend settings.
#[derive(Debug, Clone)]
pub struct MmcliConfig {
    /// Path to the mmcli binary.
    pub mmcli: PathBuf,
    /// Poll interval for availability, modem, message, and call scans.
    pub poll_interval: Duration,
}

impl Default for MmcliConfig {
    fn default() -> Self {
        Self {
            mmcli: PathBuf::from("mmcli"),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug)]
enum Request {
    ListModems,
    Enable(String),
    ListMessages(String),
    DeleteMessage(String, String),
    ListCalls(String),
    Hangup(String, String),
    Accept(String, String),
    DeleteCall(String, String),
}

/// Handle implementing [`ModemBus`]; the worker task owns all child-process
/// interaction and pushes events to the reactor channel.
pub struct MmcliBus {
    tx: mpsc::UnboundedSender<Request>,
}

impl MmcliBus {
    /// Spawn the worker task and return the request handle.
    pub fn spawn(config: MmcliConfig, events: EventSender) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            Worker::new(config, events).run(rx).await;
        });
        Self { tx }
    }

    fn send(&self, req: Request) {
        // The worker only goes away at shutdown
        let _ = self.tx.send(req);
    }
}

impl ModemBus for MmcliBus {
    fn list_modems(&self) {
        self.send(Request::ListModems);
    }
    fn enable(&self, modem: &str) {
        self.send(Request::Enable(modem.to_string()));
    }
    fn list_messages(&self, modem: &str) {
        self.send(Request::ListMessages(modem.to_string()));
    }
    fn delete_message(&self, modem: &str, sms_path: &str) {
        self.send(Request::DeleteMessage(modem.to_string(), sms_path.to_string()));
    }
    fn list_calls(&self, modem: &str) {
        self.send(Request::ListCalls(modem.to_string()));
    }
    fn hangup(&self, modem: &str, call_path: &str) {
        self.send(Request::Hangup(modem.to_string(), call_path.to_string()));
    }
    fn accept(&self, modem: &str, call_path: &str) {
        self.send(Request::Accept(modem.to_string(), call_path.to_string()));
    }
    fn delete_call(&self, modem: &str, call_path: &str) {
        self.send(Request::DeleteCall(modem.to_string(), call_path.to_string()));
    }
}

struct Worker {
    config: MmcliConfig,
    events: EventSender,
    available: bool,
    /// Last observed modem states, for add/remove/state-change diffing.
    modems: HashMap<String, ModemState>,
    known_sms: HashMap<String, HashSet<String>>,
    known_calls: HashMap<String, HashSet<String>>,
}

impl Worker {
    fn new(config: MmcliConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            available: false,
            modems: HashMap::new(),
            known_sms: HashMap::new(),
            known_calls: HashMap::new(),
        }
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                req = requests.recv() => {
                    match req {
                        Some(req) => self.execute(req).await,
                        None => break,
                    }
                }
            }
        }
    }

    fn emit(&self, event: BusEvent) {
        let _ = self.events.send(event);
    }

    // ── Polling: availability, modem set, message/call arrival ──────

    async fn poll(&mut self) {
        match self.fetch_modem_paths().await {
            Ok(paths) => {
                if !self.available {
                    self.available = true;
                    let version = self.fetch_version().await;
                    self.emit(BusEvent::ServiceAppeared { version });
                }
                self.diff_modems(&paths).await;
                self.scan_stores().await;
            }
            Err(e) => {
                debug!(error = %e, "mmcli modem listing failed");
                if self.available {
                    self.available = false;
                    self.modems.clear();
                    self.known_sms.clear();
                    self.known_calls.clear();
                    self.emit(BusEvent::ServiceVanished);
                }
            }
        }
    }

    async fn diff_modems(&mut self, paths: &[String]) {
        let current: HashSet<&String> = paths.iter().collect();

        let removed: Vec<String> = self
            .modems
            .keys()
            .filter(|p| !current.contains(p))
            .cloned()
            .collect();
        for path in removed {
            self.modems.remove(&path);
            self.known_sms.remove(&path);
            self.known_calls.remove(&path);
            self.emit(BusEvent::ModemRemoved { path });
        }

        for path in paths {
            let desc = match self.fetch_modem(path).await {
                Ok(desc) => desc,
                Err(e) => {
                    warn!(modem = %path, error = %e, "fetching modem details failed");
                    continue;
                }
            };
            match self.modems.get(path) {
                None => {
                    self.modems.insert(path.clone(), desc.state);
                    self.emit(BusEvent::ModemAdded(desc));
                }
                Some(&old) if old != desc.state => {
                    self.modems.insert(path.clone(), desc.state);
                    self.emit(BusEvent::ModemStateChanged {
                        path: path.clone(),
                        old,
                        new: desc.state,
                        reason: StateChangeReason::Unknown,
                    });
                }
                Some(_) => {}
            }
        }
    }

    /// Synthesize message-added/call-added notifications for paths not seen
    /// before. The `received` flag is advisory only.
    async fn scan_stores(&mut self) {
        let modems: Vec<String> = self.modems.keys().cloned().collect();
        for modem in modems {
            if let Ok(sms_paths) = self.fetch_sms_paths(&modem).await {
                let known = self.known_sms.entry(modem.clone()).or_default();
                let fresh: Vec<String> = sms_paths
                    .iter()
                    .filter(|p| !known.contains(*p))
                    .cloned()
                    .collect();
                known.clear();
                known.extend(sms_paths);
                for sms_path in fresh {
                    self.emit(BusEvent::MessageAdded {
                        modem: modem.clone(),
                        sms_path,
                        received: true,
                    });
                }
            }

            if let Ok(call_paths) = self.fetch_call_paths(&modem).await {
                let known = self.known_calls.entry(modem.clone()).or_default();
                let fresh: Vec<String> = call_paths
                    .iter()
                    .filter(|p| !known.contains(*p))
                    .cloned()
                    .collect();
                known.clear();
                known.extend(call_paths);
                for call_path in fresh {
                    self.emit(BusEvent::CallAdded {
                        modem: modem.clone(),
                        call_path,
                    });
                }
            }
        }
    }

    // ── Request execution ───────────────────────────────────────────

    async fn execute(&mut self, req: Request) {
        match req {
            Request::ListModems => {
                let result = match self.fetch_modem_paths().await {
                    Ok(paths) => {
                        let mut descs = Vec::new();
                        let mut err = None;
                        for path in &paths {
                            match self.fetch_modem(path).await {
                                Ok(desc) => {
                                    self.modems.insert(path.clone(), desc.state);
                                    descs.push(desc);
                                }
                                Err(e) => {
                                    err = Some(e.to_string());
                                    break;
                                }
                            }
                        }
                        match err {
                            Some(e) => Err(e),
                            None => Ok(descs),
                        }
                    }
                    Err(e) => Err(e.to_string()),
                };
                self.emit(BusEvent::ModemsListed { result });
            }
            Request::Enable(modem) => {
                let result = self.run_op(&["-m", &modem, "-e"]).await;
                self.emit(BusEvent::EnableDone { modem, result });
            }
            Request::ListMessages(modem) => {
                let result = self.fetch_messages(&modem).await.map_err(|e| e.to_string());
                self.emit(BusEvent::MessagesListed { modem, result });
            }
            Request::DeleteMessage(modem, sms_path) => {
                let result = self
                    .run_op(&["-m", &modem, "--messaging-delete-sms", &sms_path])
                    .await;
                self.emit(BusEvent::MessageDeleted {
                    modem,
                    sms_path,
                    result,
                });
            }
            Request::ListCalls(modem) => {
                let result = self.fetch_calls(&modem).await.map_err(|e| e.to_string());
                self.emit(BusEvent::CallsListed { modem, result });
            }
            Request::Hangup(modem, call_path) => {
                let result = self.run_op(&["-m", &modem, "-o", &call_path, "--hangup"]).await;
                self.emit(BusEvent::HangupDone {
                    modem,
                    call_path,
                    result,
                });
            }
            Request::Accept(modem, call_path) => {
                let result = self.run_op(&["-m", &modem, "-o", &call_path, "--accept"]).await;
                self.emit(BusEvent::AcceptDone {
                    modem,
                    call_path,
                    result,
                });
            }
            Request::DeleteCall(modem, call_path) => {
                let result = self
                    .run_op(&["-m", &modem, "--voice-delete-call", &call_path])
                    .await;
                self.emit(BusEvent::CallDeleted {
                    modem,
                    call_path,
                    result,
                });
            }
        }
    }

    // ── mmcli invocation helpers ────────────────────────────────────

    async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let output = Command::new(&self.config.mmcli)
            .args(args)
            .arg("-J")
            .output()
            .await
            .map_err(|e| Error::Mmcli(format!("spawn failed: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Mmcli(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let value: Value = serde_json::from_slice(&output.stdout)?;
        Ok(value)
    }

    async fn run_op(&self, args: &[&str]) -> OpResult {
        let output = Command::new(&self.config.mmcli)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("spawn failed: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    async fn fetch_version(&self) -> String {
        let output = Command::new(&self.config.mmcli)
            .arg("--version")
            .output()
            .await;
        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout)
                .lines()
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string(),
            Err(_) => "unknown".to_string(),
        }
    }

    async fn fetch_modem_paths(&self) -> Result<Vec<String>> {
        let value = self.run_json(&["-L"]).await?;
        Ok(parse_path_list(&value, "modem-list"))
    }

    async fn fetch_modem(&self, path: &str) -> Result<ModemDescriptor> {
        let value = self.run_json(&["-m", path]).await?;
        parse_modem(&value, path)
    }

    async fn fetch_sms_paths(&self, modem: &str) -> Result<Vec<String>> {
        let value = self.run_json(&["-m", modem, "--messaging-list-sms"]).await?;
        Ok(parse_path_list(&value, "modem.messaging.sms"))
    }

    async fn fetch_messages(&self, modem: &str) -> Result<Vec<SmsRecord>> {
        let mut records = Vec::new();
        for path in self.fetch_sms_paths(modem).await? {
            let value = self.run_json(&["-s", &path]).await?;
            records.push(parse_sms(&value, &path));
        }
        Ok(records)
    }

    async fn fetch_call_paths(&self, modem: &str) -> Result<Vec<String>> {
        let value = self.run_json(&["-m", modem, "--voice-list-calls"]).await?;
        Ok(parse_path_list(&value, "modem.voice.call"))
    }

    async fn fetch_calls(&self, modem: &str) -> Result<Vec<CallRecord>> {
        let mut records = Vec::new();
        for path in self.fetch_call_paths(modem).await? {
            let value = self.run_json(&["-o", &path]).await?;
            records.push(parse_call(&value, &path));
        }
        Ok(records)
    }
}

// ── mmcli JSON parsing ──────────────────────────────────────────────

/// A top-level array of object paths, e.g. `{"modem-list": ["/org/..."]}`.
fn parse_path_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// mmcli uses `--` for unset string fields.
fn opt_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty() && *s != "--")
}

fn str_or_empty(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(opt_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_modem(value: &Value, path: &str) -> Result<ModemDescriptor> {
    let generic = value
        .pointer("/modem/generic")
        .ok_or_else(|| Error::Mmcli(format!("{}: no generic section in modem JSON", path)))?;

    let own_numbers = generic
        .get("own-numbers")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(opt_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ModemDescriptor {
        path: path.to_string(),
        state: ModemState::parse(
            generic.get("state").and_then(opt_str).unwrap_or("unknown"),
        ),
        own_numbers,
        equipment_id: str_or_empty(value, "/modem/generic/equipment-identifier"),
        manufacturer: str_or_empty(value, "/modem/generic/manufacturer"),
        model: str_or_empty(value, "/modem/generic/model"),
    })
}

fn parse_timestamp(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    value
        .pointer(pointer)
        .and_then(opt_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_sms(value: &Value, path: &str) -> SmsRecord {
    let data = value
        .pointer("/sms/content/data")
        .and_then(opt_str)
        .and_then(|s| hex::decode(s).ok())
        .unwrap_or_default();

    SmsRecord {
        path: path.to_string(),
        state: SmsState::parse(
            value
                .pointer("/sms/properties/state")
                .and_then(opt_str)
                .unwrap_or("unknown"),
        ),
        number: str_or_empty(value, "/sms/content/number"),
        text: str_or_empty(value, "/sms/content/text"),
        data,
        timestamp: parse_timestamp(value, "/sms/properties/timestamp"),
        discharge_timestamp: parse_timestamp(value, "/sms/properties/discharge-timestamp"),
    }
}

fn parse_call(value: &Value, path: &str) -> CallRecord {
    CallRecord {
        path: path.to_string(),
        state: CallState::parse(
            value
                .pointer("/call/properties/state")
                .and_then(opt_str)
                .unwrap_or("unknown"),
        ),
    }
}
