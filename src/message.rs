//! # DATA MODEL
//!
//! The header, config, protocol-error, and error-record types that the engine
//! reads out of (or writes into) framelet bodies, plus the conversation-id
//! allocator and the metrics record emitted once per connection.

use std::sync::atomic::{AtomicI64, Ordering};

/// ## PAYLOAD TYPE
///
/// Which of the three conversation shapes an [`EpoxyHeaders`] framelet
/// describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadType {
    Request = 0,
    Response = 1,
    Event = 2,
}

impl PayloadType {
    fn try_from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PayloadType::Request),
            1 => Some(PayloadType::Response),
            2 => Some(PayloadType::Event),
            _ => None,
        }
    }
}

/// ## EPOXY HEADERS
///
/// `error_code = 0` means the accompanying `PayloadData` is a user payload;
/// anything else means it is an [`ErrorRecord`] instead.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EpoxyHeaders {
    pub conversation_id: u64,
    pub payload_type: PayloadType,
    pub method_name: String,
    pub error_code: i32,
}

impl EpoxyHeaders {
    pub fn is_ok(&self) -> bool {
        self.error_code == 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 1 + 4 + self.method_name.len() + 4);
        out.extend_from_slice(&self.conversation_id.to_le_bytes());
        out.push(self.payload_type as u8);
        let name_bytes = self.method_name.as_bytes();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&self.error_code.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(bytes);
        let conversation_id = cursor.take_u64()?;
        let payload_type =
            PayloadType::try_from_byte(cursor.take_u8()?).ok_or(DecodeError::Malformed)?;
        let name_len = cursor.take_u32()? as usize;
        let method_name = cursor.take_utf8(name_len)?;
        let error_code = cursor.take_i32()?;
        Ok(Self {
            conversation_id,
            payload_type,
            method_name,
            error_code,
        })
    }
}

/// ## ERROR RECORD
///
/// The crate's own minimal polymorphic error shape: plain errors, internal
/// server errors, and aggregates of several underlying failures all collapse
/// to this one type, distinguished only by `error_code` and whether `inner`
/// is populated.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ErrorRecord {
    pub error_code: i32,
    pub message: String,
    pub inner: Vec<ErrorRecord>,
}

impl ErrorRecord {
    pub fn new(error_code: i32, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            inner: Vec::new(),
        }
    }

    /// The specific shape the engine constructs whenever a pending request is
    /// failed by teardown.
    pub fn transport_closed() -> Self {
        Self::new(
            TRANSPORT_ERROR_CODE,
            "Connection was closed before response was received",
        )
    }

    /// The shape used when a detached dispatch thread panics.
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_SERVER_ERROR_CODE, message)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.error_code.to_le_bytes());
        let msg_bytes = self.message.as_bytes();
        out.extend_from_slice(&(msg_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(msg_bytes);
        out.extend_from_slice(&(self.inner.len() as u32).to_le_bytes());
        for inner in &self.inner {
            out.extend_from_slice(&inner.encode());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(bytes);
        Self::decode_from(&mut cursor)
    }

    fn decode_from(cursor: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
        let error_code = cursor.take_i32()?;
        let msg_len = cursor.take_u32()? as usize;
        let message = cursor.take_utf8(msg_len)?;
        let inner_count = cursor.take_u32()?;
        let mut inner = Vec::with_capacity(inner_count as usize);
        for _ in 0..inner_count {
            inner.push(Self::decode_from(cursor)?);
        }
        Ok(Self {
            error_code,
            message,
            inner,
        })
    }
}

/// Reserved `error_code` values this crate assigns to its own synthetic errors;
/// user-domain error codes are the payload codec's business and never collide
/// with these by construction (the core only ever *writes* these two values).
pub const TRANSPORT_ERROR_CODE: i32 = -1;
pub const INTERNAL_SERVER_ERROR_CODE: i32 = -2;

/// ## MESSAGE
///
/// What the engine hands to (and receives from) the service host and the
/// caller of `request_response`/`fire_event`: either an opaque user payload
/// (never interpreted by the core) or a structured [`ErrorRecord`].
#[derive(Clone, Debug)]
pub enum Message {
    Payload(Vec<u8>),
    Error(ErrorRecord),
}

impl Message {
    pub fn payload(bytes: impl Into<Vec<u8>>) -> Self {
        Message::Payload(bytes.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Message::Error(_))
    }
}

/// ## PROTOCOL ERROR CODE
///
/// Numeric assignments owned by this crate (see DESIGN.md's Open Question
/// ledger: no preexisting wire survived to be preserved).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum ProtocolErrorCode {
    Ok = 0,
    InternalError = 1,
    ConnectionRejected = 2,
    ProtocolViolated = 3,
    ConversationIdUnknown = 4,
    MalformedData = 5,
}

impl ProtocolErrorCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ProtocolErrorCode::Ok),
            1 => Some(ProtocolErrorCode::InternalError),
            2 => Some(ProtocolErrorCode::ConnectionRejected),
            3 => Some(ProtocolErrorCode::ProtocolViolated),
            4 => Some(ProtocolErrorCode::ConversationIdUnknown),
            5 => Some(ProtocolErrorCode::MalformedData),
            _ => None,
        }
    }
}

/// ## PROTOCOL ERROR
#[derive(Clone, Debug)]
pub struct ProtocolError {
    pub error_code: ProtocolErrorCode,
    pub details: Option<ErrorRecord>,
}

impl ProtocolError {
    pub fn new(error_code: ProtocolErrorCode, details: Option<ErrorRecord>) -> Self {
        Self {
            error_code,
            details,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.error_code as i32).to_le_bytes());
        match &self.details {
            Some(details) => {
                out.push(1);
                out.extend_from_slice(&details.encode());
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(bytes);
        let raw_code = cursor.take_i32()?;
        let has_details = cursor.take_u8()? != 0;
        let details = if has_details {
            Some(ErrorRecord::decode_from(&mut cursor)?)
        } else {
            None
        };
        // An error_code this crate doesn't recognize is still a well-formed
        // ProtocolError framelet; the classifier is the layer that decides an
        // unrecognized code means HangUp rather than HandleProtocolError.
        let error_code = ProtocolErrorCode::from_i32(raw_code).unwrap_or(ProtocolErrorCode::Ok);
        Ok(Self {
            error_code,
            details,
        })
    }
}

/// ## CONNECTION SHUTDOWN REASON
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ConnectionShutdownReason {
    #[default]
    Unknown,
    ClientGraceful,
    ServerGraceful,
    ClientProtocolError,
    BondInternalError,
    ServiceInternalError,
    NetworkError,
}

/// ## CONNECTION METRICS
///
/// Created at connection construction, emitted exactly once at teardown
/// through [`crate::hooks::MetricsSink`].
#[derive(Clone, Debug)]
pub struct ConnectionMetrics {
    pub connection_id: String,
    pub local_endpoint: String,
    pub remote_endpoint: String,
    pub shutdown_reason: ConnectionShutdownReason,
    pub duration_millis: u64,
}

/// ## CONVERSATION ID ALLOCATOR
///
/// Client allocates odd ids starting at 1; server allocates even ids starting
/// at 2, via an atomic fetch-and-add of 2 on a signed counter so wraparound
/// past `i64::MAX` is detectable as exhaustion rather than silently flipping
/// to a negative, peer-colliding id.
pub struct ConversationIdAllocator {
    next: AtomicI64,
}

impl ConversationIdAllocator {
    pub fn for_role(role: Role) -> Self {
        let start = match role {
            Role::Client => 1,
            Role::Server => 2,
        };
        Self {
            next: AtomicI64::new(start),
        }
    }

    /// Returns `None` once the counter has wrapped past the signed-positive
    /// range, which fails the individual request rather than the connection.
    pub fn allocate(&self) -> Option<u64> {
        let id = self.next.fetch_add(2, Ordering::SeqCst);
        if id < 0 {
            None
        } else {
            Some(id as u64)
        }
    }
}

/// ## ROLE
///
/// Which side of the connection this engine instance is playing; governs
/// conversation-id parity and which half of the handshake table applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of framelet body")]
    Truncated,
    #[error("malformed framelet body")]
    Malformed,
    #[error("framelet body is not valid UTF-8")]
    InvalidUtf8,
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn take_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn take_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn take_utf8(&mut self, len: usize) -> Result<String, DecodeError> {
        String::from_utf8(self.take(len)?.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_round_trip() {
        let headers = EpoxyHeaders {
            conversation_id: 7,
            payload_type: PayloadType::Request,
            method_name: "Echo".into(),
            error_code: 0,
        };
        let decoded = EpoxyHeaders::decode(&headers.encode()).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn error_record_round_trips_with_nesting() {
        let record = ErrorRecord {
            error_code: 9,
            message: "outer".into(),
            inner: vec![ErrorRecord::new(3, "inner")],
        };
        let decoded = ErrorRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn protocol_error_round_trips_without_details() {
        let err = ProtocolError::new(ProtocolErrorCode::MalformedData, None);
        let decoded = ProtocolError::decode(&err.encode()).unwrap();
        assert_eq!(decoded.error_code, ProtocolErrorCode::MalformedData);
        assert!(decoded.details.is_none());
    }

    #[test]
    fn client_and_server_ids_have_disjoint_parity() {
        let client = ConversationIdAllocator::for_role(Role::Client);
        let server = ConversationIdAllocator::for_role(Role::Server);
        let client_ids: Vec<u64> = (0..4).map(|_| client.allocate().unwrap()).collect();
        let server_ids: Vec<u64> = (0..4).map(|_| server.allocate().unwrap()).collect();
        assert_eq!(client_ids, vec![1, 3, 5, 7]);
        assert_eq!(server_ids, vec![2, 4, 6, 8]);
    }

    #[test]
    fn allocation_is_strictly_increasing_and_disjoint() {
        let client = ConversationIdAllocator::for_role(Role::Client);
        let mut last = 0u64;
        for _ in 0..1000 {
            let id = client.allocate().unwrap();
            assert!(id > last);
            assert_eq!(id % 2, 1);
            last = id;
        }
    }
}
