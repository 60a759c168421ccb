//! Integration tests for the smsfwd daemon
//!
//! These drive the reactor end-to-end from a real config file through a
//! recording bus, with forward targets backed by actual child processes.

use smsfwd::bus::{BusEvent, ModemBus};
use smsfwd::config::Config;
use smsfwd::identity::InstanceSet;
use smsfwd::modem::{CallRecord, CallState, ModemDescriptor, ModemState, SmsRecord, SmsState};
use smsfwd::reactor::Reactor;
use chrono::{TimeZone, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;

const MODEM: &str = "/org/freedesktop/ModemManager1/Modem/0";
const SMS: &str = "/org/freedesktop/ModemManager1/SMS/1";
const CALL: &str = "/org/freedesktop/ModemManager1/Call/1";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Req {
    ListModems,
    Enable(String),
    ListMessages(String),
    DeleteMessage(String, String),
    ListCalls(String),
    Hangup(String, String),
    Accept(String, String),
    DeleteCall(String, String),
}

/// Bus double that records every request issued by the reactor.
#[derive(Clone, Default)]
struct RecordingBus {
    reqs: Rc<RefCell<Vec<Req>>>,
}

impl RecordingBus {
    fn taken(&self) -> Vec<Req> {
        self.reqs.borrow_mut().drain(..).collect()
    }
}

impl ModemBus for RecordingBus {
    fn list_modems(&self) {
        self.reqs.borrow_mut().push(Req::ListModems);
    }
    fn enable(&self, modem: &str) {
        self.reqs.borrow_mut().push(Req::Enable(modem.to_string()));
    }
    fn list_messages(&self, modem: &str) {
        self.reqs.borrow_mut().push(Req::ListMessages(modem.to_string()));
    }
    fn delete_message(&self, modem: &str, sms_path: &str) {
        self.reqs
            .borrow_mut()
            .push(Req::DeleteMessage(modem.to_string(), sms_path.to_string()));
    }
    fn list_calls(&self, modem: &str) {
        self.reqs.borrow_mut().push(Req::ListCalls(modem.to_string()));
    }
    fn hangup(&self, modem: &str, call_path: &str) {
        self.reqs
            .borrow_mut()
            .push(Req::Hangup(modem.to_string(), call_path.to_string()));
    }
    fn accept(&self, modem: &str, call_path: &str) {
        self.reqs
            .borrow_mut()
            .push(Req::Accept(modem.to_string(), call_path.to_string()));
    }
    fn delete_call(&self, modem: &str, call_path: &str) {
        self.reqs
            .borrow_mut()
            .push(Req::DeleteCall(modem.to_string(), call_path.to_string()));
    }
}

fn enabled_modem(own: &str) -> ModemDescriptor {
    ModemDescriptor {
        path: MODEM.to_string(),
        state: ModemState::Enabled,
        own_numbers: vec![own.to_string()],
        equipment_id: "356938035643809".to_string(),
        manufacturer: "Quectel".to_string(),
        model: "EG25-G".to_string(),
    }
}

fn received_sms(text: &str) -> SmsRecord {
    SmsRecord {
        path: SMS.to_string(),
        state: SmsState::Received,
        number: "+4917012345678".to_string(),
        text: text.to_string(),
        data: Vec::new(),
        timestamp: Some(Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()),
        discharge_timestamp: Some(Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 5).unwrap()),
    }
}

fn reactor_from_yaml(yaml: &str, bus: RecordingBus) -> Reactor<RecordingBus> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("smsfwd.yaml");
    std::fs::write(&path, yaml).unwrap();
    let config = Config::load(&path).unwrap();
    let instances = InstanceSet::from_config(&config.instances).unwrap();
    Reactor::new(instances, bus)
}

/// Config file to forwarded document: a received SMS lands in the configured
/// command's capture file and the record is deleted afterwards.
#[test]
fn test_sms_forwarded_to_command_and_deleted() {
    let capture_dir = TempDir::new().unwrap();
    let out = capture_dir.path().join("forwarded.yaml");
    let yaml = format!(
        r#"
smsfwd:
  instances:
    - mid:
        n-own: "\\+49151"
      fwd:
        cmd: ["sh", "-c", "cat >> {}"]
"#,
        out.display()
    );

    let bus = RecordingBus::default();
    let mut reactor = reactor_from_yaml(&yaml, bus.clone());

    reactor.handle(BusEvent::ServiceAppeared {
        version: "1.20.0".to_string(),
    });
    assert_eq!(bus.taken(), vec![Req::ListModems]);

    reactor.handle(BusEvent::ModemsListed {
        result: Ok(vec![enabled_modem("+4915112345678")]),
    });
    assert_eq!(
        bus.taken(),
        vec![
            Req::ListMessages(MODEM.to_string()),
            Req::ListCalls(MODEM.to_string()),
        ]
    );

    reactor.handle(BusEvent::MessagesListed {
        modem: MODEM.to_string(),
        result: Ok(vec![received_sms("meter reading 42")]),
    });
    assert_eq!(
        bus.taken(),
        vec![Req::DeleteMessage(MODEM.to_string(), SMS.to_string())]
    );

    let captured = std::fs::read_to_string(&out).unwrap();
    assert!(captured.starts_with("--\n"));
    assert!(captured.contains("text: meter reading 42"));
    assert!(captured.contains("+4917012345678"));
    assert!(captured.contains("+4915112345678"));

    // Delete completion clears the in-flight guard without further requests
    reactor.handle(BusEvent::MessageDeleted {
        modem: MODEM.to_string(),
        sms_path: SMS.to_string(),
        result: Ok(()),
    });
    assert!(bus.taken().is_empty());
}

/// A modem whose own-numbers match no configured pattern is never inventoried.
#[test]
fn test_unmatched_modem_left_alone() {
    let yaml = r#"
smsfwd:
  instances:
    - mid:
        n-own: "\\+44"
      fwd:
        cmd: ["true"]
"#;
    let bus = RecordingBus::default();
    let mut reactor = reactor_from_yaml(yaml, bus.clone());

    reactor.handle(BusEvent::ServiceAppeared {
        version: "1.20.0".to_string(),
    });
    bus.taken();

    reactor.handle(BusEvent::ModemsListed {
        result: Ok(vec![enabled_modem("+4915112345678")]),
    });
    assert!(bus.taken().is_empty());

    // Store notifications for the unbound modem are ignored too
    reactor.handle(BusEvent::MessageAdded {
        modem: MODEM.to_string(),
        sms_path: SMS.to_string(),
        received: true,
    });
    assert!(bus.taken().is_empty());
}

/// An incoming call is hung up while ringing and its record deleted once
/// terminated; the accept path is never taken.
#[test]
fn test_incoming_call_rejected() {
    let yaml = r#"
smsfwd:
  instances:
    - fwd:
        cmd: ["true"]
"#;
    let bus = RecordingBus::default();
    let mut reactor = reactor_from_yaml(yaml, bus.clone());

    reactor.handle(BusEvent::ServiceAppeared {
        version: "1.20.0".to_string(),
    });
    reactor.handle(BusEvent::ModemsListed {
        result: Ok(vec![enabled_modem("+4915112345678")]),
    });
    bus.taken();

    reactor.handle(BusEvent::CallsListed {
        modem: MODEM.to_string(),
        result: Ok(vec![CallRecord {
            path: CALL.to_string(),
            state: CallState::RingingIn,
        }]),
    });
    assert_eq!(
        bus.taken(),
        vec![Req::Hangup(MODEM.to_string(), CALL.to_string())]
    );

    // Hangup completion triggers a re-listing round
    reactor.handle(BusEvent::HangupDone {
        modem: MODEM.to_string(),
        call_path: CALL.to_string(),
        result: Ok(()),
    });
    assert_eq!(bus.taken(), vec![Req::ListCalls(MODEM.to_string())]);

    reactor.handle(BusEvent::CallsListed {
        modem: MODEM.to_string(),
        result: Ok(vec![CallRecord {
            path: CALL.to_string(),
            state: CallState::Terminated,
        }]),
    });
    assert_eq!(
        bus.taken(),
        vec![Req::DeleteCall(MODEM.to_string(), CALL.to_string())]
    );
}

/// Service loss voids all state; the next appearance rebuilds it from a
/// fresh modem scan.
#[test]
fn test_service_bounce_resets_and_rescans() {
    let yaml = r#"
smsfwd:
  instances:
    - fwd:
        cmd: ["true"]
"#;
    let bus = RecordingBus::default();
    let mut reactor = reactor_from_yaml(yaml, bus.clone());

    reactor.handle(BusEvent::ServiceAppeared {
        version: "1.20.0".to_string(),
    });
    reactor.handle(BusEvent::ModemsListed {
        result: Ok(vec![enabled_modem("+4915112345678")]),
    });
    bus.taken();

    reactor.handle(BusEvent::ServiceVanished);
    assert!(bus.taken().is_empty());

    reactor.handle(BusEvent::ServiceAppeared {
        version: "1.20.0".to_string(),
    });
    assert_eq!(bus.taken(), vec![Req::ListModems]);

    // The same modem re-binds cleanly after the bounce
    reactor.handle(BusEvent::ModemsListed {
        result: Ok(vec![enabled_modem("+4915112345678")]),
    });
    assert_eq!(
        bus.taken(),
        vec![
            Req::ListMessages(MODEM.to_string()),
            Req::ListCalls(MODEM.to_string()),
        ]
    );
}

mod cli {
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_help_describes_daemon() {
        Command::cargo_bin("smsfwd")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Forward inbound SMS"));
    }

    #[test]
    fn test_missing_config_fails() {
        Command::cargo_bin("smsfwd")
            .unwrap()
            .args(["-c", "/nonexistent/smsfwd.yaml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("/nonexistent/smsfwd.yaml"));
    }
}
