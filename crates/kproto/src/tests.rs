use crate::*;
use kpack::Decoder;
use kpack::Encoder;
use kpack::Tag;

fn encoded_u32(v: u32) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(v).unwrap();
    enc.into_bytes().unwrap()
}

fn sample_call() -> ProcedureCall {
    ProcedureCall::new("SpaceCenter", "Vessel_get_Name", vec![encoded_u32(7), encoded_u32(9)])
}

// ============================================================================
//  CALLS
// ============================================================================

#[test]
fn test_call_positions_follow_argument_order() {
    let call = sample_call();
    let positions: Vec<u32> = call.arguments().iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![0, 1]);
    assert_eq!(call.argument(1), Some(encoded_u32(9).as_slice()));
    assert_eq!(call.argument(2), None);
}

#[test]
fn test_call_bytes_are_deterministic() -> anyhow::Result<()> {
    assert_eq!(sample_call().to_bytes()?, sample_call().to_bytes()?);
    let decoded = ProcedureCall::from_bytes(&sample_call().to_bytes()?)?;
    assert_eq!(decoded, sample_call());
    Ok(())
}

#[test]
fn test_request_carries_batch() -> anyhow::Result<()> {
    let request = Request::new(vec![sample_call(), ProcedureCall::new("KRPC", "GetStatus", Vec::<Vec<u8>>::new())]);
    let decoded = Request::from_bytes(&request.to_bytes()?)?;
    assert_eq!(decoded.calls.len(), 2);
    assert_eq!(decoded.calls[1].procedure(), "GetStatus");
    assert!(decoded.calls[1].arguments().is_empty());
    Ok(())
}

#[test]
fn test_missing_field_is_named() {
    let mut enc = Encoder::new();
    enc.record_begin().unwrap();
    enc.variant_begin("service").unwrap();
    enc.str("KRPC").unwrap();
    enc.variant_end().unwrap();
    enc.record_end().unwrap();
    let bytes = enc.into_bytes().unwrap();

    let err = ProcedureCall::from_bytes(&bytes).unwrap_err();
    assert_eq!(err, Error::MissingField("procedure"));
}

// ============================================================================
//  RESPONSES
// ============================================================================

#[test]
fn test_response_with_typed_fault() -> anyhow::Result<()> {
    let response = Response::with_results(vec![
        ProcedureResult::value(encoded_u32(1)),
        ProcedureResult::fault(Fault::typed("KRPC", "ArgumentException", "bad arg")),
    ]);
    let decoded = Response::from_bytes(&response.to_bytes()?)?;
    decoded.expect_results(2)?;

    assert_eq!(decoded.results[0].0, Ok(encoded_u32(1)));
    let fault = decoded.results[1].0.clone().unwrap_err();
    assert_eq!(fault.service, "KRPC");
    assert_eq!(fault.name, "ArgumentException");
    assert_eq!(fault.description, "bad arg");
    Ok(())
}

#[test]
fn test_response_result_count_checked() {
    let response = Response::with_results(vec![ProcedureResult::value(Vec::new())]);
    assert!(matches!(response.expect_results(2), Err(Error::ProtocolViolation(_))));
}

#[test]
fn test_request_level_error() -> anyhow::Result<()> {
    let response = Response::with_error(Fault::message("malformed request"));
    let decoded = Response::from_bytes(&response.to_bytes()?)?;
    assert_eq!(decoded.error.map(|f| f.description), Some("malformed request".to_owned()));
    assert!(decoded.results.is_empty());
    Ok(())
}

#[test]
fn test_unknown_fields_are_skipped() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    enc.record_begin()?;
    enc.variant_begin("id")?;
    enc.u64(3)?;
    enc.variant_end()?;
    enc.variant_begin("added_in_a_later_version")?;
    enc.list_begin()?;
    enc.str("ignored")?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.record_end()?;
    let bytes = enc.into_bytes()?;

    assert_eq!(StreamInfo::from_bytes(&bytes)?, StreamInfo { id: 3 });
    Ok(())
}

// ============================================================================
//  STREAMS AND HANDSHAKE
// ============================================================================

#[test]
fn test_stream_update_roundtrip() -> anyhow::Result<()> {
    let update = StreamUpdate {
        results: vec![
            StreamResult { id: 1, result: ProcedureResult::value(encoded_u32(10)) },
            StreamResult { id: 2, result: ProcedureResult::fault(Fault::message("gone")) },
        ],
    };
    assert_eq!(StreamUpdate::from_bytes(&update.to_bytes()?)?, update);
    Ok(())
}

#[test]
fn test_handshake_messages() -> anyhow::Result<()> {
    let request = ConnectionRequest::rpc("telemetry");
    assert_eq!(ConnectionRequest::from_bytes(&request.to_bytes()?)?, request);

    let response = ConnectionResponse::rejected(ConnectionStatus::WrongType, "expected rpc");
    let decoded = ConnectionResponse::from_bytes(&response.to_bytes()?)?;
    assert_eq!(decoded.status, ConnectionStatus::WrongType);
    assert_eq!(decoded.message, "expected rpc");
    Ok(())
}

#[test]
fn test_services_lookup() -> anyhow::Result<()> {
    let services = Services {
        services: vec![ServiceInfo {
            name: "KRPC".into(),
            procedures: vec![ProcedureInfo {
                name: "GetStatus".into(),
                return_type: Some("KRPC.Status".into()),
                ..Default::default()
            }],
            enumerations: vec![EnumerationInfo {
                name: "GameScene".into(),
                values: vec![("SpaceCenter".into(), 0), ("Flight".into(), 1)],
            }],
            exceptions: vec!["ArgumentException".into()],
            ..Default::default()
        }],
    };
    let decoded = Services::from_bytes(&services.to_bytes()?)?;
    let krpc = decoded.find("KRPC").expect("service");
    assert_eq!(krpc.procedure("GetStatus").and_then(|p| p.return_type.clone()), Some("KRPC.Status".into()));
    assert_eq!(krpc.enumerations[0].values[1], ("Flight".to_owned(), 1));
    Ok(())
}

#[test]
fn test_trailing_bytes_rejected() -> anyhow::Result<()> {
    let mut bytes = StreamInfo { id: 1 }.to_bytes()?;
    bytes.push(Tag::Pad as u8);
    assert!(StreamInfo::from_bytes(&bytes).is_err());

    // a single message still decodes from a longer stream with the raw decoder
    let mut dec = Decoder::new(&bytes);
    assert_eq!(StreamInfo::decode(&mut dec)?.id, 1);
    Ok(())
}

// ============================================================================
//  FRAMING
// ============================================================================

#[test]
fn test_frame_header() -> anyhow::Result<()> {
    let framed = frame::encode(b"abc")?;
    assert_eq!(&framed[..4], &[3, 0, 0, 0]);
    assert_eq!(frame::payload_len([3, 0, 0, 0])?, 3);
    assert!(matches!(frame::payload_len(u32::MAX.to_le_bytes()), Err(Error::FrameTooLarge(_))));
    Ok(())
}

#[test]
fn test_stream_update_isolates_bad_results() -> anyhow::Result<()> {
    let mut enc = Encoder::new();
    enc.record_begin()?;
    enc.variant_begin("results")?;
    enc.list_begin()?;
    StreamResult { id: 1, result: ProcedureResult::value(encoded_u32(5)) }.encode(&mut enc)?;
    enc.str("not a stream result")?;
    StreamResult { id: 2, result: ProcedureResult::value(encoded_u32(6)) }.encode(&mut enc)?;
    enc.list_end()?;
    enc.variant_end()?;
    enc.record_end()?;
    let bytes = enc.into_bytes()?;

    assert!(StreamUpdate::from_bytes(&bytes).is_err());
    let each = StreamUpdate::decode_each(&bytes)?;
    assert_eq!(each.len(), 3);
    assert_eq!(each[0].as_ref().map(|r| r.id), Ok(1));
    assert!(each[1].is_err());
    assert_eq!(each[2].as_ref().map(|r| r.id), Ok(2));
    Ok(())
}
