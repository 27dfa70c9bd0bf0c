//! ConversationRelay WebSocket message types
//!
//! Inbound payloads are decoded into a closed [`InboundEvent`] enum. Decoding
//! never fails: unknown `type` values become [`InboundEvent::Unrecognized`] and
//! anything that does not have the expected shape becomes
//! [`InboundEvent::Malformed`], so the relay can log and carry on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum allowed size for a caller utterance (50 KB)
pub const MAX_VOICE_PROMPT_SIZE: usize = 50 * 1024;

/// Maximum allowed size for the heard prefix of an interrupted response (50 KB)
pub const MAX_UTTERANCE_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Twilio -> Server)
// =============================================================================

/// Wire shape of the message types the relay understands.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    #[serde(rename = "setup")]
    Setup {
        #[serde(rename = "callSid", default)]
        call_sid: Option<String>,
    },

    #[serde(rename = "prompt")]
    Prompt {
        #[serde(rename = "voicePrompt")]
        voice_prompt: String,
    },

    #[serde(rename = "interrupt")]
    Interrupt {
        #[serde(rename = "utteranceUntilInterrupt")]
        utterance_until_interrupt: String,
    },
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Call started; `call_sid` is trimmed and empty when absent
    Setup { call_sid: String },

    /// Transcribed caller utterance
    Prompt { voice_prompt: String },

    /// Caller spoke over the assistant; carries what they heard
    Interrupt { utterance_until_interrupt: String },

    /// Well-formed message with a `type` the relay does not handle
    Unrecognized { message_type: String },

    /// Payload that is not a valid message
    Malformed { reason: String },
}

impl InboundEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Setup { .. } => "setup",
            Self::Prompt { .. } => "prompt",
            Self::Interrupt { .. } => "interrupt",
            Self::Unrecognized { message_type } => message_type,
            Self::Malformed { .. } => "malformed",
        }
    }
}

fn malformed(reason: impl Into<String>) -> InboundEvent {
    InboundEvent::Malformed {
        reason: reason.into(),
    }
}

fn check_size(field: &str, value: &str, max: usize) -> Result<(), InboundEvent> {
    if value.len() > max {
        return Err(malformed(format!(
            "{field} too large: {} bytes (max: {max} bytes)",
            value.len()
        )));
    }
    Ok(())
}

/// Decode one raw socket payload.
pub fn parse_inbound(raw: &str) -> InboundEvent {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => return malformed(format!("invalid JSON: {e}")),
    };

    let message_type = match &value {
        Value::Object(map) => match map.get("type") {
            Some(Value::String(message_type)) => message_type.clone(),
            Some(_) => return malformed("'type' must be a string"),
            None => return malformed("missing 'type' field"),
        },
        _ => return malformed("payload must be a JSON object"),
    };

    if !matches!(message_type.as_str(), "setup" | "prompt" | "interrupt") {
        return InboundEvent::Unrecognized { message_type };
    }

    let wire: WireMessage = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => return malformed(format!("invalid {message_type} message: {e}")),
    };

    match wire {
        WireMessage::Setup { call_sid } => InboundEvent::Setup {
            call_sid: call_sid.unwrap_or_default().trim().to_string(),
        },
        WireMessage::Prompt { voice_prompt } => {
            if let Err(rejected) = check_size("voicePrompt", &voice_prompt, MAX_VOICE_PROMPT_SIZE) {
                return rejected;
            }
            InboundEvent::Prompt { voice_prompt }
        }
        WireMessage::Interrupt {
            utterance_until_interrupt,
        } => {
            if let Err(rejected) = check_size(
                "utteranceUntilInterrupt",
                &utterance_until_interrupt,
                MAX_UTTERANCE_SIZE,
            ) {
                return rejected;
            }
            InboundEvent::Interrupt {
                utterance_until_interrupt,
            }
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Twilio)
// =============================================================================

/// Outgoing WebSocket messages to ConversationRelay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    /// Text token to be spoken; `last` closes the current response
    #[serde(rename = "text")]
    Text { token: String, last: bool },
}

impl OutgoingMessage {
    pub fn token(token: impl Into<String>) -> Self {
        Self::Text {
            token: token.into(),
            last: false,
        }
    }

    /// Terminator sent exactly once per prompt.
    pub fn end_of_response() -> Self {
        Self::Text {
            token: String::new(),
            last: true,
        }
    }
}

/// Routes queued for the socket writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Close,
}
