#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for framing, record decoding and the protocol helpers
//! Tests boundary conditions, malformed input and error reporting

use std::sync::Arc;
use std::time::Duration;
use whoop_protocol::core::checksum::{crc32, crc8};
use whoop_protocol::core::constants::{CommandNumber, MetadataType, PacketType};
use whoop_protocol::core::packet::{Packet, MAX_PAYLOAD_LEN};
use whoop_protocol::core::records::{HeartRateRecord, MetadataRecord};
use whoop_protocol::error::{constants, FrameError, HandshakeError, ProtocolError};
use whoop_protocol::protocol::correlator::ResponseCorrelator;
use whoop_protocol::protocol::dispatcher::{clean_console_log, parse_version};
use whoop_protocol::protocol::handshake::{derive_session_secret, KeyDerivation};
use whoop_protocol::protocol::history::build_ack;
use whoop_protocol::service::session::RAW_HISTORY_REQUEST;
use whoop_protocol::transport::Channel;
use whoop_protocol::utils::timeout::{with_timeout, with_timeout_error};

// ============================================================================
// PACKET CODEC EDGE CASES
// ============================================================================

#[test]
fn test_checksum_check_values() {
    assert_eq!(crc8(b"123456789"), 0xF4);
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
}

#[test]
fn test_empty_payload_frame_is_not_decodable() {
    // Encodes to length 7, one below the smallest legal length field.
    let frame = Packet::command(CommandNumber::StartSession, Vec::new())
        .encode()
        .unwrap();
    assert_eq!(frame.len(), 11);
    assert_eq!(
        Packet::decode(&frame),
        Err(FrameError::LengthOutOfRange {
            length: 7,
            available: 11
        })
    );
}

#[test]
fn test_single_byte_payload_is_smallest_frame() {
    let packet = Packet::command(CommandNumber::GetBatteryLevel, vec![0x00]);
    let frame = packet.encode().unwrap();
    assert_eq!(frame.len(), 12);
    assert_eq!(&frame[1..3], &[0x08, 0x00]);
    assert_eq!(Packet::decode(&frame).unwrap(), packet);
}

#[test]
fn test_raw_history_request_is_a_valid_frame() {
    let packet = Packet::decode(&RAW_HISTORY_REQUEST).unwrap();
    assert_eq!(packet.packet_type, PacketType::Command.code());
    assert_eq!(packet.seq, 0x0E);
    assert_eq!(packet.cmd, CommandNumber::SendHistoricalData.code());
    assert_eq!(packet.payload, vec![0x00]);
}

#[test]
fn test_empty_buffer_is_short_frame() {
    assert_eq!(Packet::decode(&[]), Err(FrameError::ShortFrame(0)));
}

#[test]
fn test_bad_start_of_frame() {
    let mut frame = Packet::new(0x24, 0, 26, vec![1, 2, 3]).encode().unwrap();
    frame[0] = 0x55;
    assert_eq!(Packet::decode(&frame), Err(FrameError::BadSof(0x55)));
}

#[test]
fn test_length_beyond_buffer_is_rejected() {
    let frame = Packet::new(0x24, 0, 26, vec![9; 32]).encode().unwrap();
    let truncated = &frame[..frame.len() - 1];
    assert!(matches!(
        Packet::decode(truncated),
        Err(FrameError::LengthOutOfRange { .. })
    ));
}

#[test]
fn test_missing_trailing_crc_is_rejected() {
    // Header claims a 9-byte frame but only the body is present.
    let mut frame = vec![0xAA, 0x09, 0x00, crc8(&[0x09, 0x00])];
    frame.extend_from_slice(&[0x24, 0, 26, 1, 2]);
    assert_eq!(
        Packet::decode(&frame),
        Err(FrameError::LengthOutOfRange {
            length: 9,
            available: 9
        })
    );
}

#[test]
fn test_header_crc_checked_before_length() {
    let mut frame = Packet::new(0x24, 0, 26, vec![1]).encode().unwrap();
    frame[3] ^= 0xFF;
    assert!(matches!(
        Packet::decode(&frame),
        Err(FrameError::HeaderCrcMismatch { .. })
    ));
}

#[test]
fn test_max_payload_frames() {
    let packet = Packet::new(0x2F, 0, 1, vec![0x5A; MAX_PAYLOAD_LEN]);
    let frame = packet.encode().unwrap();
    assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), u16::MAX);
    assert_eq!(Packet::decode(&frame).unwrap().payload.len(), MAX_PAYLOAD_LEN);
}

#[test]
fn test_oversized_payload_rejected() {
    let packet = Packet::new(0x2F, 0, 1, vec![0; MAX_PAYLOAD_LEN + 1]);
    assert_eq!(
        packet.encode(),
        Err(FrameError::PayloadTooLarge(MAX_PAYLOAD_LEN + 1))
    );
}

#[test]
fn test_unknown_packet_type_still_decodes() {
    let packet = Packet::new(0x7F, 3, 0xEE, vec![1]);
    let decoded = Packet::decode(&packet.encode().unwrap()).unwrap();
    assert_eq!(decoded.kind(), Err(0x7F));
}

// ============================================================================
// RECORD DECODING EDGE CASES
// ============================================================================

#[test]
fn test_metadata_record_needs_fourteen_bytes() {
    let mut payload = vec![0u8; 14];
    payload[10..14].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    assert_eq!(MetadataRecord::parse(&payload).unwrap().trim, 0xDEAD_BEEF);
    assert_eq!(MetadataRecord::parse(&payload[..13]), None);
}

#[test]
fn test_heart_rate_record_ignores_truncated_rr_list() {
    let mut body = vec![0x2F, 0, 0];
    body.extend_from_slice(&[0; 1]);
    body.extend_from_slice(&1_700_000_000u32.to_le_bytes());
    body.extend_from_slice(&[0; 6]);
    body.push(72);
    body.push(3); // claims three intervals
    body.extend_from_slice(&800u16.to_le_bytes());

    let record = HeartRateRecord::parse(&body).unwrap();
    assert_eq!(record.unix, 1_700_000_000);
    assert_eq!(record.heart_rate, 72);
    assert!(record.rr_intervals.is_empty());
}

#[test]
fn test_heart_rate_record_too_short() {
    assert_eq!(HeartRateRecord::parse(&[0; 14]), None);
}

// ============================================================================
// DISPATCHER HELPER EDGE CASES
// ============================================================================

#[test]
fn test_console_log_shorter_than_prefix() {
    assert_eq!(clean_console_log(&[]), "");
    assert_eq!(clean_console_log(&[0; 7]), "");
    assert_eq!(clean_console_log(&[0; 8]), "");
}

#[test]
fn test_console_log_strips_noise() {
    let mut payload = vec![0u8; 7];
    payload.extend_from_slice(b"boot");
    payload.extend_from_slice(&[0x34, 0x00, 0x01]);
    payload.extend_from_slice(b" ok");
    payload.push(0x00);
    assert_eq!(clean_console_log(&payload), "boot ok");
}

#[test]
fn test_console_log_keeps_noise_cut_by_trailing_byte() {
    let mut payload = vec![0u8; 7];
    payload.extend_from_slice(b"hi");
    payload.extend_from_slice(&[0x34, 0x00, 0x01]);
    // The final 0x01 is the dropped trailing byte, so the triple is incomplete.
    assert_eq!(clean_console_log(&payload), "hi4\0");
}

#[test]
fn test_version_payload_too_short() {
    assert_eq!(parse_version(&[0; 66]), None);
    let (harvard, boylston) = parse_version(&[0; 67]).unwrap();
    assert_eq!(harvard, "0.0.0.0");
    assert_eq!(boylston, "0.0.0.0");
}

#[test]
fn test_ack_layout() {
    assert_eq!(build_ack(0), [1, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(build_ack(u32::MAX), [1, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
}

#[test]
fn test_metadata_codes() {
    assert_eq!(MetadataType::try_from(3), Ok(MetadataType::HistoryComplete));
    assert_eq!(MetadataType::try_from(4), Err(4));
}

#[test]
fn test_channel_uuid_lookup_ignores_case() {
    let upper = Channel::Data.uuid().to_ascii_uppercase();
    assert_eq!(Channel::from_uuid(&upper), Some(Channel::Data));
    assert_eq!(Channel::from_uuid("0000180f-0000-1000-8000-00805f9b34fb"), None);
}

// ============================================================================
// KEY DERIVATION EDGE CASES
// ============================================================================

#[test]
fn test_sixteen_byte_serial_derives_same_key_both_ways() {
    let serial = "0123456789ABCDEF";
    let padded = derive_session_secret(serial, KeyDerivation::PadTruncateReverse).unwrap();
    let reversed = derive_session_secret(serial, KeyDerivation::ReverseTruncated).unwrap();
    assert_eq!(padded.as_bytes(), reversed.as_bytes());
    assert_eq!(padded.as_bytes()[0], b'F');
}

#[test]
fn test_long_serial_is_truncated() {
    let secret =
        derive_session_secret("0123456789ABCDEFXYZ", KeyDerivation::PadTruncateReverse).unwrap();
    assert_eq!(secret.as_bytes()[0], b'F');
    assert_eq!(secret.as_bytes()[15], b'0');
}

#[test]
fn test_short_serial_is_zero_filled_before_reversal() {
    let secret = derive_session_secret("AB", KeyDerivation::PadTruncateReverse).unwrap();
    let mut expected = [0u8; 16];
    expected[14] = b'B';
    expected[15] = b'A';
    assert_eq!(secret.as_bytes(), &expected);
}

#[test]
fn test_empty_serial_rejected() {
    for derivation in [KeyDerivation::PadTruncateReverse, KeyDerivation::ReverseTruncated] {
        assert_eq!(
            derive_session_secret("", derivation).unwrap_err(),
            HandshakeError::MissingSerial
        );
    }
    assert_eq!(
        derive_session_secret("short", KeyDerivation::ReverseTruncated).unwrap_err(),
        HandshakeError::UnsupportedSerial(constants::ERR_SHORT_SERIAL)
    );
}

// ============================================================================
// CORRELATOR EDGE CASES
// ============================================================================

#[tokio::test]
async fn test_closed_correlator_still_yields_queued_packets() {
    let correlator = ResponseCorrelator::new("command");
    correlator.enqueue(Packet::new(0x24, 0, 26, vec![1]));
    correlator.close();

    assert_eq!(correlator.dequeue().await.unwrap().cmd, 26);
    assert_eq!(correlator.dequeue().await, None);

    correlator.reopen();
    assert!(!correlator.is_closed());
    assert_eq!(correlator.try_dequeue(), None);
}

#[tokio::test]
async fn test_close_wakes_suspended_waiter() {
    let correlator = Arc::new(ResponseCorrelator::new("metadata"));
    let waiter = {
        let correlator = Arc::clone(&correlator);
        tokio::spawn(async move { correlator.dequeue().await })
    };

    tokio::task::yield_now().await;
    correlator.close();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should be released")
        .unwrap();
    assert_eq!(result, None);
}

// ============================================================================
// TIMEOUT EDGE CASES
// ============================================================================

#[tokio::test]
async fn test_timeout_zero_duration() {
    let result = with_timeout(
        tokio::time::sleep(Duration::from_millis(10)),
        Duration::ZERO,
    )
    .await;
    assert!(result.is_none());
}

#[tokio::test]
async fn test_timeout_immediate_complete() {
    let result = with_timeout_error(async { Ok(42) }, Duration::from_secs(1)).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_exceeds_duration() {
    let result: whoop_protocol::Result<()> = with_timeout_error(
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        },
        Duration::from_millis(100),
    )
    .await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
}

// ============================================================================
// ERROR FORMATTING
// ============================================================================

#[test]
fn test_error_display_formatting() {
    let err = ProtocolError::from(FrameError::BodyCrcMismatch {
        expected: 0x1234_5678,
        calculated: 0x0000_00FF,
    });
    assert_eq!(
        err.to_string(),
        "Frame error: Body CRC32 mismatch: expected 0x12345678, calculated 0x000000FF"
    );

    let err = ProtocolError::from(HandshakeError::ShortChallenge(8));
    assert!(err.to_string().contains("8 bytes"));
}

#[test]
fn test_error_debug_formatting() {
    let err = FrameError::BadSof(0x55);
    assert_eq!(format!("{err:?}"), "BadSof(85)");
}
