// Relaymux Wire Codec — Nostr client↔relay frames (NIP-01).
//
// Every frame on the wire is a JSON array whose first element is a string
// tag. We decode into a typed `Frame` and reject anything whose shape
// doesn't match a known tag's arity; unknown-but-well-formed frames are
// dropped by the caller with a warning (forward-compatible per spec).

use serde_json::Value;

use crate::event::Filter;

/// A decoded Nostr protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// relay→client event delivery: `["EVENT", sub_id, event]`
    Event { sub_id: String, event: Value },
    /// client→relay publish: `["EVENT", event]`
    PublishEvent { event: Value },
    /// relay→client notice: `["NOTICE", text]`
    Notice { text: String },
    /// relay→client end of stored events: `["EOSE", sub_id]`
    Eose { sub_id: String },
    /// relay→client command result: `["OK", event_id, accepted, message?]`
    Ok { event_id: String, accepted: bool, message: Option<String> },
    /// client→relay subscribe: `["REQ", sub_id, filter, ...]`
    Req { sub_id: String, filters: Vec<Filter> },
    /// client→relay unsubscribe: `["CLOSE", sub_id]`
    Close { sub_id: String },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WireError {
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("empty frame array")]
    Empty,
    #[error("unknown tag: {0}")]
    UnknownTag(String),
    #[error("arity mismatch for tag '{tag}': {detail}")]
    Arity { tag: String, detail: String },
    #[error("malformed field: {0}")]
    Malformed(String),
}

impl Frame {
    /// Decode a raw text frame. Returns `Err` for anything that isn't a
    /// well-formed, known-tag Nostr message.
    pub fn decode(raw: &str) -> Result<Frame, WireError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| WireError::NotAnArray)?;
        let arr = value.as_array().ok_or(WireError::NotAnArray)?;
        if arr.is_empty() {
            return Err(WireError::Empty);
        }
        let tag = arr[0].as_str().ok_or_else(|| WireError::Malformed("tag must be a string".into()))?;

        match tag {
            "EVENT" => match arr.len() {
                2 => Ok(Frame::PublishEvent { event: arr[1].clone() }),
                3 => {
                    let sub_id = arr[1]
                        .as_str()
                        .ok_or_else(|| WireError::Malformed("EVENT sub_id must be a string".into()))?
                        .to_string();
                    Ok(Frame::Event { sub_id, event: arr[2].clone() })
                }
                n => Err(WireError::Arity { tag: tag.into(), detail: format!("expected 2 or 3 elements, got {n}") }),
            },
            "NOTICE" => {
                if arr.len() != 2 {
                    return Err(WireError::Arity { tag: tag.into(), detail: format!("expected 2 elements, got {}", arr.len()) });
                }
                let text = arr[1].as_str().ok_or_else(|| WireError::Malformed("NOTICE text must be a string".into()))?;
                Ok(Frame::Notice { text: text.to_string() })
            }
            "EOSE" => {
                if arr.len() != 2 {
                    return Err(WireError::Arity { tag: tag.into(), detail: format!("expected 2 elements, got {}", arr.len()) });
                }
                let sub_id = arr[1].as_str().ok_or_else(|| WireError::Malformed("EOSE sub_id must be a string".into()))?;
                Ok(Frame::Eose { sub_id: sub_id.to_string() })
            }
            "OK" => {
                if arr.len() < 3 || arr.len() > 4 {
                    return Err(WireError::Arity { tag: tag.into(), detail: format!("expected 3 or 4 elements, got {}", arr.len()) });
                }
                let event_id = arr[1].as_str().ok_or_else(|| WireError::Malformed("OK event_id must be a string".into()))?;
                let accepted = arr[2].as_bool().ok_or_else(|| WireError::Malformed("OK accepted must be a bool".into()))?;
                let message = arr.get(3).and_then(|v| v.as_str()).map(|s| s.to_string());
                Ok(Frame::Ok { event_id: event_id.to_string(), accepted, message })
            }
            "REQ" => {
                if arr.len() < 3 {
                    return Err(WireError::Arity { tag: tag.into(), detail: "REQ requires a sub_id and at least one filter".into() });
                }
                let sub_id = arr[1].as_str().ok_or_else(|| WireError::Malformed("REQ sub_id must be a string".into()))?;
                let mut filters = Vec::with_capacity(arr.len() - 2);
                for raw_filter in &arr[2..] {
                    let filter: Filter = serde_json::from_value(raw_filter.clone())
                        .map_err(|e| WireError::Malformed(format!("bad filter: {e}")))?;
                    filters.push(filter);
                }
                Ok(Frame::Req { sub_id: sub_id.to_string(), filters })
            }
            "CLOSE" => {
                if arr.len() != 2 {
                    return Err(WireError::Arity { tag: tag.into(), detail: format!("expected 2 elements, got {}", arr.len()) });
                }
                let sub_id = arr[1].as_str().ok_or_else(|| WireError::Malformed("CLOSE sub_id must be a string".into()))?;
                Ok(Frame::Close { sub_id: sub_id.to_string() })
            }
            other => Err(WireError::UnknownTag(other.to_string())),
        }
    }

    /// Encode back to the wire JSON-array form.
    pub fn encode(&self) -> String {
        let value = match self {
            Frame::Event { sub_id, event } => serde_json::json!(["EVENT", sub_id, event]),
            Frame::PublishEvent { event } => serde_json::json!(["EVENT", event]),
            Frame::Notice { text } => serde_json::json!(["NOTICE", text]),
            Frame::Eose { sub_id } => serde_json::json!(["EOSE", sub_id]),
            Frame::Ok { event_id, accepted, message } => match message {
                Some(m) => serde_json::json!(["OK", event_id, accepted, m]),
                None => serde_json::json!(["OK", event_id, accepted]),
            },
            Frame::Req { sub_id, filters } => {
                let mut arr = vec![Value::String("REQ".into()), Value::String(sub_id.clone())];
                for f in filters {
                    arr.push(serde_json::to_value(f).unwrap_or(Value::Null));
                }
                Value::Array(arr)
            }
            Frame::Close { sub_id } => serde_json::json!(["CLOSE", sub_id]),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_event_relay_to_client() {
        let raw = json!(["EVENT", "sub-a", {"id": "e1", "kind": 1}]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame, Frame::Event { sub_id: "sub-a".into(), event: json!({"id": "e1", "kind": 1}) });
    }

    #[test]
    fn decode_event_client_publish() {
        let raw = json!(["EVENT", {"id": "e1"}]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame, Frame::PublishEvent { event: json!({"id": "e1"}) });
    }

    #[test]
    fn decode_req_with_multiple_filters() {
        let raw = json!(["REQ", "sub-a", {"kinds": [1]}, {"kinds": [2]}]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        match frame {
            Frame::Req { sub_id, filters } => {
                assert_eq!(sub_id, "sub-a");
                assert_eq!(filters.len(), 2);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_non_array() {
        assert_eq!(Frame::decode("{}"), Err(WireError::NotAnArray));
    }

    #[test]
    fn decode_rejects_empty_array() {
        assert_eq!(Frame::decode("[]"), Err(WireError::Empty));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let raw = json!(["PING"]).to_string();
        assert_eq!(Frame::decode(&raw), Err(WireError::UnknownTag("PING".into())));
    }

    #[test]
    fn decode_rejects_close_arity_mismatch() {
        let raw = json!(["CLOSE"]).to_string();
        assert!(matches!(Frame::decode(&raw), Err(WireError::Arity { .. })));
    }

    #[test]
    fn ok_frame_roundtrips_without_optional_message() {
        let raw = json!(["OK", "e1", true]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn ok_frame_roundtrips_with_message() {
        let raw = json!(["OK", "e1", false, "duplicate"]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn close_frame_roundtrips() {
        let raw = json!(["CLOSE", "sub-a"]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn notice_frame_roundtrips() {
        let raw = json!(["NOTICE", "hello"]).to_string();
        let frame = Frame::decode(&raw).unwrap();
        assert_eq!(frame.encode(), raw);
    }
}
