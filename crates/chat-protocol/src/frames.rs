//! Inbound and outbound wire frames.
//!
//! Every frame is one discrete JSON-encoded message on the persistent
//! channel. Inbound frames carry a required `type` discriminator;
//! shapes are validated here at the parse boundary so malformed input
//! is rejected, never crashed on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::model::{ActivityStatus, HistoryMessage, ToolConfirmationRequest};

/// Inbound frame payload for an `activity` frame. The `id` names the
/// emitting agent; `step` is assigned client-side when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPayload {
    pub id: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub step: Option<usize>,
}

/// Server-to-client frame, discriminated by `type`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Chunk {
        message: String,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        agent_name: Option<String>,
        #[serde(default)]
        node_id: Option<String>,
    },
    Done,
    Stopped,
    Error {
        message: String,
    },
    Stats {
        data: Value,
    },
    SearchResults {
        data: Vec<Value>,
    },
    Activity {
        data: ActivityPayload,
    },
    ToolConfirmationRequest {
        data: ToolConfirmationRequest,
    },
    History {
        messages: Vec<HistoryMessage>,
    },
    #[serde(rename_all = "camelCase")]
    SessionChanged {
        #[serde(default)]
        session_id: Option<String>,
    },
    DownloadProgress {
        data: Value,
    },
    /// Keepalive/diagnostic frame with no visible effect.
    Status,
    /// Forward-compatibility catch-all; silently ignored.
    #[serde(other)]
    Unknown,
}

/// A user turn. Serialized without a `type` key, matching the server's
/// chat endpoint contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTurn {
    pub message: String,
    pub mode: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default)]
    pub skip_web_search: bool,
    #[serde(default)]
    pub thinking_mode: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Client-to-server control frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Stop,
    GetStats,
    #[serde(rename_all = "camelCase")]
    SetSession { session_id: String },
    #[serde(rename_all = "camelCase")]
    ToolConfirmationResponse { request_id: String, approved: bool },
}

/// Any client-to-server frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClientFrame {
    Control(ControlFrame),
    UserTurn(UserTurn),
}

impl From<ControlFrame> for ClientFrame {
    fn from(frame: ControlFrame) -> Self {
        Self::Control(frame)
    }
}

impl From<UserTurn> for ClientFrame {
    fn from(turn: UserTurn) -> Self {
        Self::UserTurn(turn)
    }
}

/// Parse one inbound frame. Unknown `type` values map to
/// [`ServerFrame::Unknown`]; structurally malformed input is an error.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame> {
    serde_json::from_str(text).map_err(|error| ProtocolError::MalformedFrame(error.to_string()))
}

/// Encode one outbound frame as JSON text.
pub fn encode_client_frame(frame: &ClientFrame) -> Result<String> {
    serde_json::to_string(frame).map_err(|error| ProtocolError::Encode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error(error: serde_json::Error) -> ProtocolError {
        ProtocolError::MalformedFrame(error.to_string())
    }

    #[test]
    fn parse_chunk_with_metadata() -> Result<()> {
        let frame = parse_server_frame(
            r#"{"type":"chunk","message":"He","mode":"chat","agentName":"writer","nodeId":"answer"}"#,
        )?;
        assert_eq!(
            frame,
            ServerFrame::Chunk {
                message: "He".to_string(),
                mode: Some("chat".to_string()),
                agent_name: Some("writer".to_string()),
                node_id: Some("answer".to_string()),
            }
        );
        Ok(())
    }

    #[test]
    fn parse_chunk_metadata_is_optional() -> Result<()> {
        let frame = parse_server_frame(r#"{"type":"chunk","message":"x"}"#)?;
        assert_eq!(
            frame,
            ServerFrame::Chunk {
                message: "x".to_string(),
                mode: None,
                agent_name: None,
                node_id: None,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_payload_free_frames() -> Result<()> {
        assert_eq!(parse_server_frame(r#"{"type":"done"}"#)?, ServerFrame::Done);
        assert_eq!(
            parse_server_frame(r#"{"type":"stopped"}"#)?,
            ServerFrame::Stopped
        );
        assert_eq!(
            parse_server_frame(r#"{"type":"status"}"#)?,
            ServerFrame::Status
        );
        assert_eq!(
            parse_server_frame(r#"{"type":"session_changed"}"#)?,
            ServerFrame::SessionChanged { session_id: None }
        );
        assert_eq!(
            parse_server_frame(r#"{"type":"session_changed","sessionId":"s2"}"#)?,
            ServerFrame::SessionChanged {
                session_id: Some("s2".to_string())
            }
        );
        Ok(())
    }

    #[test]
    fn parse_tool_confirmation_request() -> Result<()> {
        let frame = parse_server_frame(
            r#"{"type":"tool_confirmation_request","data":{"requestId":"r1","toolName":"shell","toolArgs":{"cmd":"ls"},"description":"list files"}}"#,
        )?;
        let ServerFrame::ToolConfirmationRequest { data } = frame else {
            return Err(ProtocolError::MalformedFrame(
                "expected tool confirmation request".to_string(),
            ));
        };
        assert_eq!(data.request_id, "r1");
        assert_eq!(data.tool_name, "shell");
        assert_eq!(
            data.tool_args.get("cmd").and_then(Value::as_str),
            Some("ls")
        );
        assert_eq!(data.description.as_deref(), Some("list files"));
        Ok(())
    }

    #[test]
    fn parse_activity_frame() -> Result<()> {
        let frame = parse_server_frame(
            r#"{"type":"activity","data":{"id":"researcher","status":"processing","message":"searching"}}"#,
        )?;
        assert_eq!(
            frame,
            ServerFrame::Activity {
                data: ActivityPayload {
                    id: "researcher".to_string(),
                    status: ActivityStatus::Processing,
                    message: "searching".to_string(),
                    step: None,
                }
            }
        );
        Ok(())
    }

    #[test]
    fn parse_history_frame() -> Result<()> {
        let frame = parse_server_frame(
            r#"{"type":"history","messages":[{"role":"user","content":"Hi"},{"role":"assistant","content":"Hello","timestamp":"2024-05-01T12:30:00Z"}]}"#,
        )?;
        let ServerFrame::History { messages } = frame else {
            return Err(ProtocolError::MalformedFrame(
                "expected history frame".to_string(),
            ));
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hello");
        Ok(())
    }

    #[test]
    fn parse_unknown_type_is_tolerated() -> Result<()> {
        let frame = parse_server_frame(r#"{"type":"telemetry_v2","data":{}}"#)?;
        assert_eq!(frame, ServerFrame::Unknown);
        Ok(())
    }

    #[test]
    fn parse_malformed_frames() {
        struct Case {
            name: &'static str,
            input: &'static str,
        }

        let cases = vec![
            Case {
                name: "not json",
                input: "not json at all",
            },
            Case {
                name: "missing type",
                input: r#"{"message":"hi"}"#,
            },
            Case {
                name: "type is not a string",
                input: r#"{"type":42}"#,
            },
            Case {
                name: "chunk missing message",
                input: r#"{"type":"chunk","nodeId":"answer"}"#,
            },
            Case {
                name: "error missing message",
                input: r#"{"type":"error"}"#,
            },
            Case {
                name: "activity wrong status",
                input: r#"{"type":"activity","data":{"id":"a","status":"sleeping","message":""}}"#,
            },
            Case {
                name: "history messages not a list",
                input: r#"{"type":"history","messages":{"role":"user"}}"#,
            },
            Case {
                name: "tool request missing id",
                input: r#"{"type":"tool_confirmation_request","data":{"toolName":"shell"}}"#,
            },
        ];

        for case in cases {
            let result = parse_server_frame(case.input);
            assert!(result.is_err(), "{}: expected an error", case.name);
        }
    }

    #[test]
    fn user_turn_encodes_without_type_key() -> Result<()> {
        let turn = UserTurn {
            message: "Hi".to_string(),
            mode: "chat".to_string(),
            attachments: Vec::new(),
            skip_web_search: false,
            thinking_mode: true,
            session_id: Some("s1".to_string()),
        };
        let text = encode_client_frame(&ClientFrame::UserTurn(turn))?;
        let value: Value = serde_json::from_str(&text).map_err(json_error)?;
        assert!(value.get("type").is_none());
        assert_eq!(value.get("message").and_then(Value::as_str), Some("Hi"));
        assert_eq!(value.get("sessionId").and_then(Value::as_str), Some("s1"));
        assert_eq!(
            value.get("thinkingMode").and_then(Value::as_bool),
            Some(true)
        );
        assert_eq!(
            value.get("skipWebSearch").and_then(Value::as_bool),
            Some(false)
        );
        Ok(())
    }

    #[test]
    fn control_frames_encode_type_discriminators() -> Result<()> {
        struct Case {
            frame: ControlFrame,
            expected_type: &'static str,
        }

        let cases = vec![
            Case {
                frame: ControlFrame::Stop,
                expected_type: "stop",
            },
            Case {
                frame: ControlFrame::GetStats,
                expected_type: "get_stats",
            },
            Case {
                frame: ControlFrame::SetSession {
                    session_id: "s2".to_string(),
                },
                expected_type: "set_session",
            },
            Case {
                frame: ControlFrame::ToolConfirmationResponse {
                    request_id: "r1".to_string(),
                    approved: true,
                },
                expected_type: "tool_confirmation_response",
            },
        ];

        for case in cases {
            let text = encode_client_frame(&ClientFrame::Control(case.frame))?;
            let value: Value = serde_json::from_str(&text).map_err(json_error)?;
            assert_eq!(
                value.get("type").and_then(Value::as_str),
                Some(case.expected_type)
            );
        }
        Ok(())
    }

    #[test]
    fn tool_confirmation_response_uses_camel_case_fields() -> Result<()> {
        let frame = ClientFrame::Control(ControlFrame::ToolConfirmationResponse {
            request_id: "r9".to_string(),
            approved: false,
        });
        let text = encode_client_frame(&frame)?;
        let value: Value = serde_json::from_str(&text).map_err(json_error)?;
        assert_eq!(value.get("requestId").and_then(Value::as_str), Some("r9"));
        assert_eq!(value.get("approved").and_then(Value::as_bool), Some(false));
        Ok(())
    }
}
