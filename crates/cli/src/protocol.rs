//! Gateway frames used by the WebSocket transport.
//!
//! Outbound: `{ "type": "req", "id", "method", "params" }`.
//! Inbound: `{ "type": "event", "event", "payload" }` and `{ "type": "res", "id", "ok", "error" }`.

use chatline::{TransportError, TransportEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct WsRequest<'a> {
    #[serde(rename = "type")]
    pub typ: &'static str,
    pub id: String,
    pub method: &'a str,
    pub params: serde_json::Value,
}

/// Any inbound frame; fields not used by a frame type are left at their defaults.
#[derive(Debug, Clone, Deserialize)]
struct WsFrame {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

pub fn request(id: u64, method: &str, params: serde_json::Value) -> Result<String, TransportError> {
    let req = WsRequest {
        typ: "req",
        id: id.to_string(),
        method,
        params,
    };
    serde_json::to_string(&req).map_err(|e| TransportError::Protocol(e.to_string()))
}

/// Map a text frame to a transport event. Frames the core does not care about yield None.
pub fn parse_frame(text: &str) -> Option<TransportEvent> {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("unparseable frame ({}): {}", e, text);
            return None;
        }
    };
    match frame.typ.as_str() {
        "event" => parse_event(&frame.event, &frame.payload),
        "res" if frame.ok == Some(false) => Some(TransportEvent::Error(TransportError::Protocol(
            frame.error.unwrap_or_else(|| "request failed".to_string()),
        ))),
        _ => None,
    }
}

fn parse_event(event: &str, payload: &serde_json::Value) -> Option<TransportEvent> {
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(|v| v.as_str())
            .map(String::from)
    };
    match event {
        "session" => field("sessionId").map(|id| TransportEvent::SessionId { id }),
        "answer.start" => field("id").map(|id| TransportEvent::Start { id }),
        "answer.chunk" => field("text").map(|text| TransportEvent::Chunk { text }),
        "answer.end" => field("id").map(|id| TransportEvent::End { id }),
        "error" => Some(TransportEvent::Error(TransportError::Protocol(
            field("message").unwrap_or_else(|| "gateway error".to_string()),
        ))),
        other => {
            log::debug!("ignoring gateway event {}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_answer_events() {
        assert_eq!(
            parse_frame(r#"{"type":"event","event":"answer.start","payload":{"id":"a1"}}"#),
            Some(TransportEvent::Start { id: "a1".into() })
        );
        assert_eq!(
            parse_frame(r#"{"type":"event","event":"answer.chunk","payload":{"text":"hi"}}"#),
            Some(TransportEvent::Chunk { text: "hi".into() })
        );
        assert_eq!(
            parse_frame(r#"{"type":"event","event":"session","payload":{"sessionId":"s1"}}"#),
            Some(TransportEvent::SessionId { id: "s1".into() })
        );
    }

    #[test]
    fn failed_response_is_an_error_event() {
        assert_eq!(
            parse_frame(r#"{"type":"res","id":"3","ok":false,"error":"busy"}"#),
            Some(TransportEvent::Error(TransportError::Protocol("busy".into())))
        );
        assert_eq!(parse_frame(r#"{"type":"res","id":"3","ok":true}"#), None);
    }

    #[test]
    fn malformed_frames_are_ignored() {
        assert_eq!(parse_frame("not json"), None);
        assert_eq!(
            parse_frame(r#"{"type":"event","event":"answer.chunk","payload":{}}"#),
            None
        );
    }

    #[test]
    fn request_shape() {
        let text = request(7, "ask", serde_json::json!({"message": "hi"})).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "req");
        assert_eq!(v["id"], "7");
        assert_eq!(v["method"], "ask");
        assert_eq!(v["params"]["message"], "hi");
    }
}
