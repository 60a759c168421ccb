//! Forward sink
//!
//! Renders a received SMS into a structured YAML document and dispatches it:
//! the configured command is spawned with interpolated arguments and the
//! document is streamed to its stdin; each mailto address additionally gets
//! the document piped through sendmail. Delivery failures are fatal to the
//! single attempt only, never to the caller.

use crate::config::ForwardConfig;
use crate::error::{Error, Result};
use crate::modem::SmsRecord;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Document separator line written before each serialized document.
pub const DOC_SEPARATOR: &str = "--";

/// The structured record built from a received SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardDocument {
    pub sms: SmsBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsBody {
    pub from: String,
    /// Own-numbers of the receiving modem, snapshotted at attach time.
    pub to: Vec<String>,
    pub text: String,
    /// Raw payload, hex-encoded; absent for plain-text messages.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<String>,
    /// Request timestamp (SMSC acceptance).
    #[serde(rename = "ts-req")]
    pub ts_req: String,
    /// Delivery timestamp.
    #[serde(rename = "ts-del")]
    pub ts_del: String,
}

impl ForwardDocument {
    /// Build the document from a listed record and the attachment's
    /// own-number snapshot.
    pub fn from_record(record: &SmsRecord, own_numbers: &[String]) -> Self {
        Self {
            sms: SmsBody {
                from: record.number.clone(),
                to: own_numbers.to_vec(),
                text: record.text.clone(),
                data: if record.data.is_empty() {
                    None
                } else {
                    Some(hex::encode(&record.data))
                },
                ts_req: record
                    .timestamp
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                ts_del: record
                    .discharge_timestamp
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            },
        }
    }

    /// Separator line plus YAML serialization, as written to every sink.
    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("{}\n{}", DOC_SEPARATOR, yaml))
    }
}

/// Dispatches forward documents to the configured command and mail targets.
pub struct ForwardSink {
    mailto: Vec<String>,
    cmd: Vec<String>,
    sendmail: PathBuf,
}

impl ForwardSink {
    pub fn from_config(conf: &ForwardConfig) -> Self {
        Self {
            mailto: conf.mailto.clone(),
            cmd: conf.cmd.clone(),
            sendmail: conf.sendmail.clone(),
        }
    }

    /// Dispatch one document to all configured targets. The first failure is
    /// returned after every target has been attempted.
    pub fn post(&self, doc: &ForwardDocument) -> Result<()> {
        let payload = doc.render()?;
        let mut first_err: Option<Error> = None;

        if !self.cmd.is_empty() {
            let argv = render_template(&self.cmd, doc);
            if let Err(e) = pipe_to_child(&argv, &payload) {
                first_err.get_or_insert(e);
            }
        }

        for addr in &self.mailto {
            let argv = vec![
                self.sendmail.to_string_lossy().to_string(),
                addr.clone(),
            ];
            if let Err(e) = pipe_to_child(&argv, &payload) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn has_targets(&self) -> bool {
        !self.cmd.is_empty() || !self.mailto.is_empty()
    }
}

/// Interpolate `{sender}`, `{to}`, `{ts_req}`, `{ts_del}` placeholders into
/// each command argument. Unknown placeholders pass through verbatim.
pub fn render_template(args: &[String], doc: &ForwardDocument) -> Vec<String> {
    let to = doc.sms.to.join(",");
    args.iter()
        .map(|arg| {
            arg.replace("{sender}", &doc.sms.from)
                .replace("{to}", &to)
                .replace("{ts_req}", &doc.sms.ts_req)
                .replace("{ts_del}", &doc.sms.ts_del)
        })
        .collect()
}

/// Spawn argv, write the payload to its stdin, close the stream, and wait.
fn pipe_to_child(argv: &[String], payload: &str) -> Result<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::Forward("empty command".to_string()))?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Forward(format!("{}: spawn failed: {}", program, e)))?;

    // stdin is piped, so take() cannot fail
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Forward(format!("{}: no stdin", program)))?;

    let write_result = stdin
        .write_all(payload.as_bytes())
        .map_err(|e| Error::Forward(format!("{}: write failed: {}", program, e)));
    drop(stdin);

    let status = child
        .wait()
        .map_err(|e| Error::Forward(format!("{}: wait failed: {}", program, e)))?;

    write_result?;

    if !status.success() {
        return Err(Error::Forward(format!("{}: exited with {}", program, status)));
    }
    Ok(())
}
