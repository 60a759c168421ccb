//! Event reactor
//!
//! The top-level controller: tracks bus availability, maintains the active
//! modem set, binds discovered modems to configured instances, and drives
//! every inbound SMS and call through its fetch/classify/act/delete
//! lifecycle. All work runs on one task; every bus operation is issued
//! fire-and-forget and its completion consumed as a later [`BusEvent`].
//!
//! Listing is the single source of truth: added-notification payloads are
//! never trusted, the reactor re-synchronizes by listing after each one.
//! Overlapping listing rounds are tolerated via in-flight guards keyed by
//! record path, so a record observed twice is acted on once.

use crate::bus::{BusEvent, EventReceiver, ModemBus};
use crate::forward::ForwardDocument;
use crate::identity::InstanceSet;
use crate::modem::{CallState, ModemDescriptor, ModemState, SmsState};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Availability of the modem management service on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    AwaitingService,
    Available,
}

/// The live binding of one modem to one configured instance.
///
/// The own-number snapshot is read once at bind time; later modem property
/// changes do not re-route already-bound instances. There is exactly one
/// attachment per modem, held from successful match until removal.
struct Attachment {
    instance: usize,
    own_numbers: Vec<String>,
}

pub struct Reactor<B: ModemBus> {
    instances: InstanceSet,
    bus: B,
    service: ServiceState,
    /// Active modem set, keyed by bus path.
    modems: HashMap<String, ModemDescriptor>,
    /// One attachment per bound modem, keyed by modem path.
    attachments: HashMap<String, Attachment>,
    /// SMS paths with a delete request in flight. A record re-observed while
    /// its delete is pending is skipped, keeping forwarding at-most-once per
    /// observation window.
    pending_sms_deletes: HashSet<String>,
    /// Call paths with a hangup in flight.
    pending_hangups: HashSet<String>,
    /// Call paths with a delete in flight.
    pending_call_deletes: HashSet<String>,
}

impl<B: ModemBus> Reactor<B> {
    pub fn new(instances: InstanceSet, bus: B) -> Self {
        Self {
            instances,
            bus,
            service: ServiceState::AwaitingService,
            modems: HashMap::new(),
            attachments: HashMap::new(),
            pending_sms_deletes: HashSet::new(),
            pending_hangups: HashSet::new(),
            pending_call_deletes: HashSet::new(),
        }
    }

    /// Drain bus events until the channel closes.
    pub async fn run(mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("event channel closed, reactor stopping");
    }

    /// Process one bus event. Errors are contained per event; nothing here
    /// terminates the loop.
    pub fn handle(&mut self, event: BusEvent) {
        match event {
            BusEvent::ServiceAppeared { version } => self.on_service_appeared(&version),
            BusEvent::ServiceVanished => self.on_service_vanished(),
            BusEvent::ModemsListed { result } => match result {
                Ok(modems) => {
                    for desc in modems {
                        self.on_modem_added(desc);
                    }
                }
                Err(e) => error!(error = %e, "listing modems failed"),
            },
            BusEvent::ModemAdded(desc) => self.on_modem_added(desc),
            BusEvent::ModemRemoved { path } => self.on_modem_removed(&path),
            BusEvent::ModemStateChanged {
                path,
                old,
                new,
                reason,
            } => {
                // Observational only; inbound items are discovered via listing
                info!(modem = %path, old = %old, new = %new, reason = %reason, "modem state updated");
            }
            BusEvent::MessageAdded {
                modem,
                sms_path,
                received,
            } => {
                debug!(modem = %modem, sms = %sms_path, received, "message added");
                self.relist_messages(&modem);
            }
            BusEvent::MessagesListed { modem, result } => match result {
                Ok(records) => self.on_messages(&modem, records),
                Err(e) => error!(modem = %modem, error = %e, "listing messages failed"),
            },
            BusEvent::CallAdded { modem, call_path } => {
                debug!(modem = %modem, call = %call_path, "call added");
                self.relist_calls(&modem);
            }
            BusEvent::CallStateChanged {
                modem,
                call_path,
                old,
                new,
            } => {
                debug!(modem = %modem, call = %call_path, old = %old, new = %new, "call state updated");
                self.relist_calls(&modem);
            }
            BusEvent::CallsListed { modem, result } => match result {
                Ok(records) => self.on_calls(&modem, records),
                Err(e) => error!(modem = %modem, error = %e, "listing calls failed"),
            },
            BusEvent::EnableDone { modem, result } => {
                if let Err(e) = result {
                    error!(modem = %modem, error = %e, "enable failed");
                }
            }
            BusEvent::MessageDeleted {
                modem,
                sms_path,
                result,
            } => {
                self.pending_sms_deletes.remove(&sms_path);
                if let Err(e) = result {
                    // The record may be re-observed and re-forwarded on the
                    // next listing round (accepted at-least-once)
                    error!(modem = %modem, sms = %sms_path, error = %e, "message delete failed");
                }
            }
            BusEvent::HangupDone {
                modem,
                call_path,
                result,
            } => {
                self.pending_hangups.remove(&call_path);
                if let Err(e) = result {
                    error!(modem = %modem, call = %call_path, error = %e, "hangup failed");
                }
                // Re-list to observe the resulting terminated state
                self.relist_calls(&modem);
            }
            BusEvent::AcceptDone {
                modem,
                call_path,
                result,
            } => {
                // Structurally present; fixed policy never issues accepts
                if let Err(e) = result {
                    error!(modem = %modem, call = %call_path, error = %e, "accept failed");
                }
                self.relist_calls(&modem);
            }
            BusEvent::CallDeleted {
                modem,
                call_path,
                result,
            } => {
                self.pending_call_deletes.remove(&call_path);
                if let Err(e) = result {
                    error!(modem = %modem, call = %call_path, error = %e, "call delete failed");
                }
            }
        }
    }

    fn on_service_appeared(&mut self, version: &str) {
        if self.service != ServiceState::Available {
            info!(version = %version, "modem management service is available on the bus");
        }
        self.service = ServiceState::Available;
        // Initial scan: present modems are processed as freshly added
        self.bus.list_modems();
    }

    fn on_service_vanished(&mut self) {
        if self.service == ServiceState::Available {
            info!("modem management service not available on the bus");
        }
        self.service = ServiceState::AwaitingService;
        // The bus connection is gone; the active set and every in-flight
        // operation are invalidated
        self.modems.clear();
        self.attachments.clear();
        self.pending_sms_deletes.clear();
        self.pending_hangups.clear();
        self.pending_call_deletes.clear();
    }

    fn on_modem_added(&mut self, desc: ModemDescriptor) {
        info!(
            modem = %desc.path,
            equipment_id = %desc.equipment_id,
            manufacturer = %desc.manufacturer,
            model = %desc.model,
            "modem managed by the service"
        );

        if self.attachments.contains_key(&desc.path) {
            debug!(modem = %desc.path, "already bound, ignoring re-announcement");
            self.modems.insert(desc.path.clone(), desc);
            return;
        }

        let matched = self.instances.match_modem(&desc.own_numbers);
        self.modems.insert(desc.path.clone(), desc.clone());

        let instance = match matched {
            Some(idx) => idx,
            None => {
                info!(modem = %desc.path, "no matching instance, leaving unmanaged");
                return;
            }
        };

        // First match decides; a failed modem stays unmanaged
        if desc.state == ModemState::Failed {
            warn!(modem = %desc.path, "matching modem in failed state");
            return;
        }

        if desc.state == ModemState::Disabled {
            info!(modem = %desc.path, "enabling disabled target modem");
            self.bus.enable(&desc.path);
        }

        info!(modem = %desc.path, instance, "attaching to target modem");
        self.attach(&desc, instance);
    }

    /// Bind the modem: snapshot own-numbers and perform the initial
    /// inventory. Message/call notifications for this modem are routed from
    /// here on; no explicit unattachment exists, the binding lapses with the
    /// modem's removal.
    fn attach(&mut self, desc: &ModemDescriptor, instance: usize) {
        self.attachments.insert(
            desc.path.clone(),
            Attachment {
                instance,
                own_numbers: desc.own_numbers.clone(),
            },
        );
        self.bus.list_messages(&desc.path);
        self.bus.list_calls(&desc.path);
    }

    fn on_modem_removed(&mut self, path: &str) {
        info!(modem = %path, "modem unmanaged by the service");
        self.modems.remove(path);
        self.attachments.remove(path);
    }

    fn relist_messages(&mut self, modem: &str) {
        if self.attachments.contains_key(modem) {
            self.bus.list_messages(modem);
        } else {
            debug!(modem = %modem, "message event for unbound modem, ignoring");
        }
    }

    fn relist_calls(&mut self, modem: &str) {
        if self.attachments.contains_key(modem) {
            self.bus.list_calls(modem);
        } else {
            debug!(modem = %modem, "call event for unbound modem, ignoring");
        }
    }

    /// One message listing round: forward and delete every record in
    /// `received` state, in listing order.
    fn on_messages(&mut self, modem: &str, records: Vec<crate::modem::SmsRecord>) {
        let attachment = match self.attachments.get(modem) {
            Some(a) => a,
            None => return,
        };
        let instance = self.instances.get(attachment.instance);

        for record in records {
            if record.state != SmsState::Received {
                continue;
            }
            if self.pending_sms_deletes.contains(&record.path) {
                debug!(sms = %record.path, "delete in flight, skipping re-observed record");
                continue;
            }

            let doc = ForwardDocument::from_record(&record, &attachment.own_numbers);

            match doc.render() {
                Ok(rendered) => print!("{}", rendered),
                Err(e) => error!(sms = %record.path, error = %e, "document render failed"),
            }
            info!(modem = %modem, sms = %record.path, from = %record.number, "forwarding received message");

            // Delivery failure is fatal to this attempt only; the record is
            // deleted either way so a broken sink cannot cause a redelivery
            // loop
            if let Err(e) = instance.fwd.post(&doc) {
                warn!(sms = %record.path, error = %e, "forward failed, deleting anyway");
            }

            self.pending_sms_deletes.insert(record.path.clone());
            self.bus.delete_message(modem, &record.path);
        }
    }

    /// One call listing round: auto-reject ringing and active calls, delete
    /// terminated ones.
    fn on_calls(&mut self, modem: &str, records: Vec<crate::modem::CallRecord>) {
        if !self.attachments.contains_key(modem) {
            return;
        }

        for record in records {
            match record.state {
                // Policy: all incoming calls are rejected. The accept path
                // exists on the bus trait but is never taken.
                CallState::Active | CallState::RingingIn => {
                    if self.pending_hangups.insert(record.path.clone()) {
                        info!(modem = %modem, call = %record.path, state = %record.state, "hanging up call");
                        self.bus.hangup(modem, &record.path);
                    }
                }
                CallState::Terminated => {
                    if self.pending_call_deletes.insert(record.path.clone()) {
                        debug!(modem = %modem, call = %record.path, "deleting terminated call");
                        self.bus.delete_call(modem, &record.path);
                    }
                }
                _ => {}
            }
        }
    }

    #[cfg(test)]
    fn attachment_count(&self) -> usize {
        self.attachments.len()
    }
}
