//! Bus-side data model
//!
//! State enumerations and transient records for modems, SMS messages, and
//! voice calls as exposed by the modem management service. String forms match
//! the service's own state names (what `mmcli` prints).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modem lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModemState {
    Failed,
    Unknown,
    Initializing,
    Locked,
    Disabled,
    Disabling,
    Enabling,
    Enabled,
    Searching,
    Registered,
    Disconnecting,
    Connecting,
    Connected,
}

impl ModemState {
    /// Parse the service's state string, `Unknown` for anything unrecognized.
    pub fn parse(s: &str) -> Self {
        match s {
            "failed" => ModemState::Failed,
            "initializing" => ModemState::Initializing,
            "locked" => ModemState::Locked,
            "disabled" => ModemState::Disabled,
            "disabling" => ModemState::Disabling,
            "enabling" => ModemState::Enabling,
            "enabled" => ModemState::Enabled,
            "searching" => ModemState::Searching,
            "registered" => ModemState::Registered,
            "disconnecting" => ModemState::Disconnecting,
            "connecting" => ModemState::Connecting,
            "connected" => ModemState::Connected,
            _ => ModemState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModemState::Failed => "failed",
            ModemState::Unknown => "unknown",
            ModemState::Initializing => "initializing",
            ModemState::Locked => "locked",
            ModemState::Disabled => "disabled",
            ModemState::Disabling => "disabling",
            ModemState::Enabling => "enabling",
            ModemState::Enabled => "enabled",
            ModemState::Searching => "searching",
            ModemState::Registered => "registered",
            ModemState::Disconnecting => "disconnecting",
            ModemState::Connecting => "connecting",
            ModemState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ModemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason code attached to modem state-change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateChangeReason {
    Unknown,
    UserRequested,
    Suspend,
    Failure,
}

impl StateChangeReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "user-requested" => StateChangeReason::UserRequested,
            "suspend" => StateChangeReason::Suspend,
            "failure" => StateChangeReason::Failure,
            _ => StateChangeReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateChangeReason::Unknown => "unknown",
            StateChangeReason::UserRequested => "user-requested",
            StateChangeReason::Suspend => "suspend",
            StateChangeReason::Failure => "failure",
        }
    }
}

impl std::fmt::Display for StateChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SMS lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmsState {
    Unknown,
    Stored,
    Receiving,
    Received,
    Sending,
    Sent,
}

impl SmsState {
    pub fn parse(s: &str) -> Self {
        match s {
            "stored" => SmsState::Stored,
            "receiving" => SmsState::Receiving,
            "received" => SmsState::Received,
            "sending" => SmsState::Sending,
            "sent" => SmsState::Sent,
            _ => SmsState::Unknown,
        }
    }
}

/// Voice call lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallState {
    Unknown,
    Dialing,
    RingingOut,
    RingingIn,
    Active,
    Held,
    Waiting,
    Terminated,
}

impl CallState {
    pub fn parse(s: &str) -> Self {
        match s {
            "dialing" => CallState::Dialing,
            "ringing-out" => CallState::RingingOut,
            "ringing-in" => CallState::RingingIn,
            "active" => CallState::Active,
            "held" => CallState::Held,
            "waiting" => CallState::Waiting,
            "terminated" => CallState::Terminated,
            _ => CallState::Unknown,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Unknown => "unknown",
            CallState::Dialing => "dialing",
            CallState::RingingOut => "ringing-out",
            CallState::RingingIn => "ringing-in",
            CallState::Active => "active",
            CallState::Held => "held",
            CallState::Waiting => "waiting",
            CallState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// A bus-exposed modem object observed at discovery time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemDescriptor {
    /// Bus object path, the modem's identity for the daemon's lifetime.
    pub path: String,
    pub state: ModemState,
    pub own_numbers: Vec<String>,
    pub equipment_id: String,
    pub manufacturer: String,
    pub model: String,
}

/// One SMS record from a listing round. Transient: consumed once, then
/// deleted from the modem's store.
#[derive(Debug, Clone)]
pub struct SmsRecord {
    pub path: String,
    pub state: SmsState,
    /// Sender number.
    pub number: String,
    pub text: String,
    /// Raw payload for data SMS, empty for plain text.
    pub data: Vec<u8>,
    /// Request timestamp (when the SMSC accepted the message).
    pub timestamp: Option<DateTime<Utc>>,
    /// Delivery timestamp.
    pub discharge_timestamp: Option<DateTime<Utc>>,
}

/// One voice call record from a listing round.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub path: String,
    pub state: CallState,
}
