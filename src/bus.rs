//! Bus interface boundary
//!
//! The modem management service is consumed as an opaque bus service:
//! requests are fire-and-forget from the reactor's perspective, and every
//! notification or request completion arrives as a [`BusEvent`] on a single
//! channel drained by the reactor loop. No ordering is guaranteed between
//! independent event sources.

use crate::modem::{CallRecord, CallState, ModemDescriptor, ModemState, SmsRecord, StateChangeReason};
use tokio::sync::mpsc;

/// Outcome of an asynchronous bus operation, surfaced to the log only.
pub type OpResult = std::result::Result<(), String>;

/// Outcome of a listing round.
pub type ListResult<T> = std::result::Result<Vec<T>, String>;

/// Channel used to deliver bus events to the reactor.
pub type EventSender = mpsc::UnboundedSender<BusEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BusEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Asynchronous notifications and request completions from the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// The management service appeared on the bus.
    ServiceAppeared { version: String },
    /// The management service left the bus; all subscriptions are void.
    ServiceVanished,

    ModemAdded(ModemDescriptor),
    ModemRemoved {
        path: String,
    },
    ModemStateChanged {
        path: String,
        old: ModemState,
        new: ModemState,
        reason: StateChangeReason,
    },

    /// A message appeared on a modem's store. The payload is advisory only;
    /// the reactor re-synchronizes by listing.
    MessageAdded {
        modem: String,
        sms_path: String,
        received: bool,
    },
    /// A call appeared on a modem.
    CallAdded {
        modem: String,
        call_path: String,
    },
    CallStateChanged {
        modem: String,
        call_path: String,
        old: CallState,
        new: CallState,
    },

    /// Completion of [`ModemBus::list_modems`].
    ModemsListed {
        result: ListResult<ModemDescriptor>,
    },
    /// Completion of [`ModemBus::list_messages`].
    MessagesListed {
        modem: String,
        result: ListResult<SmsRecord>,
    },
    /// Completion of [`ModemBus::list_calls`].
    CallsListed {
        modem: String,
        result: ListResult<CallRecord>,
    },
    /// Completion of [`ModemBus::enable`].
    EnableDone {
        modem: String,
        result: OpResult,
    },
    /// Completion of [`ModemBus::delete_message`].
    MessageDeleted {
        modem: String,
        sms_path: String,
        result: OpResult,
    },
    /// Completion of [`ModemBus::hangup`].
    HangupDone {
        modem: String,
        call_path: String,
        result: OpResult,
    },
    /// Completion of [`ModemBus::accept`].
    AcceptDone {
        modem: String,
        call_path: String,
        result: OpResult,
    },
    /// Completion of [`ModemBus::delete_call`].
    CallDeleted {
        modem: String,
        call_path: String,
        result: OpResult,
    },
}

/// Requests the reactor issues against the bus. All methods return
/// immediately; results come back as [`BusEvent`] completions.
pub trait ModemBus {
    /// Enumerate all currently-present modems (initial scan after the
    /// service appears).
    fn list_modems(&self);

    /// Ask the service to enable a disabled modem. Fire-and-forget; the
    /// reactor attaches without waiting for completion.
    fn enable(&self, modem: &str);

    fn list_messages(&self, modem: &str);
    fn delete_message(&self, modem: &str, sms_path: &str);

    fn list_calls(&self, modem: &str);
    fn hangup(&self, modem: &str, call_path: &str);
    fn accept(&self, modem: &str, call_path: &str);
    fn delete_call(&self, modem: &str, call_path: &str);
}
