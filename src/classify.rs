//! # FRAME CLASSIFIER
//!
//! A pure function mapping a decoded [`Frame`] to a [`Disposition`]. Never does
//! I/O, never mutates anything — it is the layer between the wire and the
//! engine's state machine, and is exercised directly in tests with hand-built
//! frames rather than through a live socket.

use crate::message::{EpoxyHeaders, PayloadType, ProtocolError, ProtocolErrorCode};
use crate::wire::{Frame, FrameletType};

/// ## DISPOSITION
///
/// The classifier's verdict on a decoded frame, plus whatever it extracted
/// from the frame's bodies along the way.
#[derive(Debug)]
pub enum Disposition {
    ProcessConfig,
    DeliverRequest(Delivery),
    DeliverResponse(Delivery),
    DeliverEvent(Delivery),
    SendProtocolError(ProtocolErrorCode),
    HandleProtocolError(ProtocolError),
    HangUp,
}

/// The headers, optional layer-data blob, and payload extracted from a
/// `[Headers, (LayerData,)? Payload]`-shaped frame.
#[derive(Debug)]
pub struct Delivery {
    pub headers: EpoxyHeaders,
    pub layer_data: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

/// Set on a peer-originated `ProtocolError` to mean "the peer is telling us it
/// rejected something *we* sent" — reflecting this back would ping-pong
/// forever, so the classifier maps it straight to `HangUp`.
const PEER_REPORTED_OUR_VIOLATION: ProtocolErrorCode = ProtocolErrorCode::ProtocolViolated;

/// ### CLASSIFY FRAME
pub fn classify(frame: Frame) -> Disposition {
    if frame.is_empty() {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    }

    if frame.len() == 1 {
        match frame[0].kind {
            FrameletType::EpoxyConfig => return Disposition::ProcessConfig,
            FrameletType::ProtocolError => {
                return classify_protocol_error(&frame[0].body);
            }
            _ => {}
        }
    }

    if has_duplicate_kinds(&frame) {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    }

    let Some(headers_body) = find_kind(&frame, FrameletType::EpoxyHeaders) else {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    };
    // EpoxyHeaders must be the first framelet of a data-bearing frame.
    if !matches!(frame[0].kind, FrameletType::EpoxyHeaders) {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    }
    let Some(payload) = find_kind(&frame, FrameletType::PayloadData) else {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    };
    if frame
        .iter()
        .any(|f| matches!(f.kind, FrameletType::Other(_)))
    {
        return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData);
    }

    let headers = match EpoxyHeaders::decode(headers_body) {
        Ok(headers) => headers,
        Err(_) => return Disposition::SendProtocolError(ProtocolErrorCode::MalformedData),
    };
    let layer_data = find_kind(&frame, FrameletType::LayerData).map(|b| b.to_vec());
    let delivery = Delivery {
        headers: headers.clone(),
        layer_data,
        payload: payload.to_vec(),
    };

    match headers.payload_type {
        PayloadType::Request => Disposition::DeliverRequest(delivery),
        PayloadType::Response => Disposition::DeliverResponse(delivery),
        PayloadType::Event => Disposition::DeliverEvent(delivery),
    }
}

fn classify_protocol_error(body: &[u8]) -> Disposition {
    match ProtocolError::decode(body) {
        Ok(error) if error.error_code == PEER_REPORTED_OUR_VIOLATION => Disposition::HangUp,
        Ok(error) if error.error_code == ProtocolErrorCode::Ok => Disposition::HangUp,
        Ok(error) => Disposition::HandleProtocolError(error),
        Err(_) => Disposition::HangUp,
    }
}

fn has_duplicate_kinds(frame: &Frame) -> bool {
    for (i, a) in frame.iter().enumerate() {
        for b in &frame[i + 1..] {
            if a.kind == b.kind && !matches!(a.kind, FrameletType::Other(_)) {
                return true;
            }
        }
    }
    false
}

fn find_kind(frame: &Frame, kind: FrameletType) -> Option<&[u8]> {
    frame
        .iter()
        .find(|f| f.kind == kind)
        .map(|f| f.body.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Framelet;

    fn headers(payload_type: PayloadType, conv: u64) -> Vec<u8> {
        EpoxyHeaders {
            conversation_id: conv,
            payload_type,
            method_name: "Echo".into(),
            error_code: 0,
        }
        .encode()
    }

    #[test]
    fn empty_frame_is_malformed() {
        let d = classify(vec![]);
        assert!(matches!(
            d,
            Disposition::SendProtocolError(ProtocolErrorCode::MalformedData)
        ));
    }

    #[test]
    fn single_config_framelet_processes_config() {
        let frame = vec![Framelet::new(FrameletType::EpoxyConfig, vec![])];
        assert!(matches!(classify(frame), Disposition::ProcessConfig));
    }

    #[test]
    fn request_without_payload_is_malformed() {
        let frame = vec![Framelet::new(
            FrameletType::EpoxyHeaders,
            headers(PayloadType::Request, 1),
        )];
        assert!(matches!(
            classify(frame),
            Disposition::SendProtocolError(ProtocolErrorCode::MalformedData)
        ));
    }

    #[test]
    fn payload_without_headers_is_malformed() {
        let frame = vec![Framelet::new(FrameletType::PayloadData, vec![1, 2, 3])];
        assert!(matches!(
            classify(frame),
            Disposition::SendProtocolError(ProtocolErrorCode::MalformedData)
        ));
    }

    #[test]
    fn duplicate_headers_is_malformed() {
        let frame = vec![
            Framelet::new(FrameletType::EpoxyHeaders, headers(PayloadType::Request, 1)),
            Framelet::new(FrameletType::EpoxyHeaders, headers(PayloadType::Request, 3)),
            Framelet::new(FrameletType::PayloadData, vec![]),
        ];
        assert!(matches!(
            classify(frame),
            Disposition::SendProtocolError(ProtocolErrorCode::MalformedData)
        ));
    }

    #[test]
    fn unknown_framelet_tag_is_malformed() {
        let frame = vec![
            Framelet::new(FrameletType::EpoxyHeaders, headers(PayloadType::Request, 1)),
            Framelet::new(FrameletType::PayloadData, vec![]),
            Framelet::new(FrameletType::Other(0xABCD), vec![1]),
        ];
        assert!(matches!(
            classify(frame),
            Disposition::SendProtocolError(ProtocolErrorCode::MalformedData)
        ));
    }

    #[test]
    fn request_with_payload_delivers() {
        let frame = vec![
            Framelet::new(FrameletType::EpoxyHeaders, headers(PayloadType::Request, 5)),
            Framelet::new(FrameletType::PayloadData, b"hi".to_vec()),
        ];
        match classify(frame) {
            Disposition::DeliverRequest(delivery) => {
                assert_eq!(delivery.headers.conversation_id, 5);
                assert_eq!(delivery.payload, b"hi");
                assert!(delivery.layer_data.is_none());
            }
            other => panic!("expected DeliverRequest, got {other:?}"),
        }
    }

    #[test]
    fn event_with_layer_data_delivers() {
        let frame = vec![
            Framelet::new(FrameletType::EpoxyHeaders, headers(PayloadType::Event, 2)),
            Framelet::new(FrameletType::LayerData, vec![0xAA]),
            Framelet::new(FrameletType::PayloadData, b"ping".to_vec()),
        ];
        match classify(frame) {
            Disposition::DeliverEvent(delivery) => {
                assert_eq!(delivery.layer_data, Some(vec![0xAA]));
            }
            other => panic!("expected DeliverEvent, got {other:?}"),
        }
    }

    #[test]
    fn self_inflicted_protocol_error_hangs_up() {
        let err = ProtocolError::new(ProtocolErrorCode::ProtocolViolated, None);
        let frame = vec![Framelet::new(FrameletType::ProtocolError, err.encode())];
        assert!(matches!(classify(frame), Disposition::HangUp));
    }

    #[test]
    fn other_protocol_error_is_handled() {
        let err = ProtocolError::new(ProtocolErrorCode::MalformedData, None);
        let frame = vec![Framelet::new(FrameletType::ProtocolError, err.encode())];
        assert!(matches!(
            classify(frame),
            Disposition::HandleProtocolError(_)
        ));
    }

    #[test]
    fn unparseable_protocol_error_hangs_up() {
        let frame = vec![Framelet::new(FrameletType::ProtocolError, vec![1])];
        assert!(matches!(classify(frame), Disposition::HangUp));
    }
}
