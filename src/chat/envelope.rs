//! Envelope codec for chat frames.
//!
//! # Wire Format
//! ```text
//! client → gateway   ["<namespace>.<method>", {"request_id": ..}, [args..], {kwargs..}]
//! gateway → backend  [{meta..}, [args..], {kwargs..}]
//! gateway → client   ["hello", {}, {identity..}]
//!                    ["result", {"request_id": ..}, payload]
//! ```
//!
//! # Design Decisions
//! - Decoding is strict: any shape mismatch is a `MalformedEnvelope`
//! - `request_id` is kept as the client sent it and echoed verbatim
//! - Replies are built from owned values; nothing here touches the socket

use serde::ser::{Serialize, SerializeTuple, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON object as used for `meta`, `kwargs` and backend payloads.
pub type JsonObject = Map<String, Value>;

/// Namespace reserved for gateway-issued calls such as `authorize_connection`.
pub const RESERVED_NAMESPACE: &str = "tangle";

/// Ways a client frame can fail to decode.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame is not a JSON array")]
    NotAnArray,

    #[error("expected 4 elements, got {0}")]
    WrongArity(usize),

    #[error("method name must be a string")]
    MethodNotString,

    #[error("invalid method name '{0}'")]
    InvalidMethod(String),

    #[error("method '{0}' is in a reserved namespace")]
    ReservedMethod(String),

    #[error("meta must be an object")]
    MetaNotObject,

    #[error("meta.request_id is missing")]
    MissingRequestId,

    #[error("meta.request_id must be a string or an integer")]
    InvalidRequestId,

    #[error("args must be an array")]
    ArgsNotArray,

    #[error("kwargs must be an object")]
    KwargsNotObject,

    #[error("binary frames are not supported")]
    Binary,
}

/// Client-chosen correlation token for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(Value);

impl RequestId {
    fn parse(value: &Value) -> Result<Self, EnvelopeError> {
        match value {
            Value::String(_) => Ok(Self(value.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Self(value.clone())),
            _ => Err(EnvelopeError::InvalidRequestId),
        }
    }

    /// Key for the in-flight table. `"1"` and `1` are distinct ids.
    pub fn key(&self) -> String {
        self.0.to_string()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated `namespace.method` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodName(String);

impl MethodName {
    pub fn parse(name: &str) -> Result<Self, EnvelopeError> {
        let valid_segment = |s: &str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        };
        let namespace = name.split('.').next().unwrap_or_default();
        if !name.contains('.') || !name.split('.').all(valid_segment) {
            return Err(EnvelopeError::InvalidMethod(name.to_string()));
        }
        if namespace == RESERVED_NAMESPACE {
            return Err(EnvelopeError::ReservedMethod(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Backend path for this method: `chat.echo_message` → `/chat/echo_message`.
    pub fn backend_path(&self) -> String {
        format!("/{}", self.0.replace('.', "/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MethodName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded client call frame.
#[derive(Debug, Clone)]
pub struct ClientCall {
    pub method: MethodName,
    pub request_id: RequestId,
    /// Full client meta, `request_id` included.
    pub meta: JsonObject,
    pub args: Vec<Value>,
    pub kwargs: JsonObject,
}

/// Decode a client text frame into a call.
pub fn decode_call(text: &str) -> Result<ClientCall, EnvelopeError> {
    let frame: Value = serde_json::from_str(text)?;
    let Value::Array(items) = frame else {
        return Err(EnvelopeError::NotAnArray);
    };
    let [method, meta, args, kwargs]: [Value; 4] = items
        .try_into()
        .map_err(|items: Vec<Value>| EnvelopeError::WrongArity(items.len()))?;

    let Value::String(method) = method else {
        return Err(EnvelopeError::MethodNotString);
    };
    let method = MethodName::parse(&method)?;
    let Value::Object(meta) = meta else {
        return Err(EnvelopeError::MetaNotObject);
    };
    let request_id = meta
        .get("request_id")
        .ok_or(EnvelopeError::MissingRequestId)
        .and_then(RequestId::parse)?;
    let Value::Array(args) = args else {
        return Err(EnvelopeError::ArgsNotArray);
    };
    let Value::Object(kwargs) = kwargs else {
        return Err(EnvelopeError::KwargsNotObject);
    };

    Ok(ClientCall {
        method,
        request_id,
        meta,
        args,
        kwargs,
    })
}

/// Backend request body: `[meta, args, kwargs]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub meta: JsonObject,
    pub args: Vec<Value>,
    pub kwargs: JsonObject,
}

impl Serialize for CallEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.meta)?;
        tuple.serialize_element(&self.args)?;
        tuple.serialize_element(&self.kwargs)?;
        tuple.end()
    }
}

/// Frames the gateway sends to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// First frame of every authenticated session.
    Hello(JsonObject),
    /// Successful call result; only `request_id` is echoed in meta.
    Result { request_id: RequestId, payload: Value },
}

impl Reply {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> String {
        let frame = match self {
            Reply::Hello(identity) => Value::Array(vec![
                Value::from("hello"),
                Value::Object(JsonObject::new()),
                Value::Object(identity.clone()),
            ]),
            Reply::Result {
                request_id,
                payload,
            } => {
                let mut meta = JsonObject::new();
                meta.insert("request_id".to_string(), request_id.as_value().clone());
                Value::Array(vec![
                    Value::from("result"),
                    Value::Object(meta),
                    payload.clone(),
                ])
            }
        };
        frame.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_well_formed_call() {
        let call =
            decode_call(r#"["chat.echo_message", {"request_id": "1"}, ["some message"], {}]"#)
                .unwrap();
        assert_eq!(call.method.as_str(), "chat.echo_message");
        assert_eq!(call.request_id.as_value(), &json!("1"));
        assert_eq!(call.args, vec![json!("some message")]);
        assert!(call.kwargs.is_empty());
    }

    #[test]
    fn integer_request_ids_are_kept_distinct_from_strings() {
        let a = decode_call(r#"["chat.x", {"request_id": 1}, [], {}]"#).unwrap();
        let b = decode_call(r#"["chat.x", {"request_id": "1"}, [], {}]"#).unwrap();
        assert_ne!(a.request_id.key(), b.request_id.key());
    }

    #[test]
    fn rejects_bad_shapes() {
        let cases = [
            ("not json", "valid JSON"),
            (r#"{"a": 1}"#, "JSON array"),
            (r#"["chat.x", {"request_id": "1"}, []]"#, "expected 4"),
            (r#"[1, {"request_id": "1"}, [], {}]"#, "method name"),
            (r#"["chat.x", [], [], {}]"#, "meta must"),
            (r#"["chat.x", {}, [], {}]"#, "missing"),
            (r#"["chat.x", {"request_id": 1.5}, [], {}]"#, "string or an integer"),
            (r#"["chat.x", {"request_id": null}, [], {}]"#, "string or an integer"),
            (r#"["chat.x", {"request_id": "1"}, {}, {}]"#, "args"),
            (r#"["chat.x", {"request_id": "1"}, [], []]"#, "kwargs"),
        ];
        for (frame, expected) in cases {
            let err = decode_call(frame).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{frame}: {err} does not mention {expected}"
            );
        }
    }

    #[test]
    fn method_names_map_to_paths() {
        let method = MethodName::parse("chat.echo_message").unwrap();
        assert_eq!(method.backend_path(), "/chat/echo_message");
        let nested = MethodName::parse("rooms.v2.join-room").unwrap();
        assert_eq!(nested.backend_path(), "/rooms/v2/join-room");
    }

    #[test]
    fn rejects_unsafe_or_reserved_methods() {
        for name in ["echo", "chat.", ".echo", "chat..echo", "chat/../x.y", "chat.echo?x=1", ""] {
            assert!(
                matches!(MethodName::parse(name), Err(EnvelopeError::InvalidMethod(_))),
                "{name} accepted"
            );
        }
        assert!(matches!(
            MethodName::parse("tangle.authorize_connection"),
            Err(EnvelopeError::ReservedMethod(_))
        ));
    }

    #[test]
    fn call_envelope_serializes_as_triple() {
        let mut meta = JsonObject::new();
        meta.insert("connection_id".into(), json!("0"));
        let envelope = CallEnvelope {
            meta,
            args: vec![],
            kwargs: JsonObject::new(),
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!([{"connection_id": "0"}, [], {}])
        );
    }

    #[test]
    fn result_reply_echoes_only_request_id() {
        let call = decode_call(r#"["chat.x", {"request_id": "7", "extra": true}, [], {}]"#).unwrap();
        let reply = Reply::Result {
            request_id: call.request_id,
            payload: json!({"echo": "hi"}),
        };
        let frame: Value = serde_json::from_str(&reply.encode()).unwrap();
        assert_eq!(frame, json!(["result", {"request_id": "7"}, {"echo": "hi"}]));
    }

    #[test]
    fn hello_reply_carries_identity() {
        let identity = json!({"user_id": "user:1", "username": "John"});
        let Value::Object(identity) = identity else { unreachable!() };
        let frame: Value = serde_json::from_str(&Reply::Hello(identity).encode()).unwrap();
        assert_eq!(
            frame,
            json!(["hello", {}, {"user_id": "user:1", "username": "John"}])
        );
    }
}
