//! Unit tests for FrameContext

use crate::frame::FrameContext;

#[test]
fn test_new_frame_starts_at_slot_zero() {
    let frame = FrameContext::new(2);
    assert_eq!(frame.slot(), 0);
    assert_eq!(frame.frame_number(), 0);
    assert_eq!(frame.frames_in_flight(), 2);
}

#[test]
fn test_advance_rotates_slot() {
    let mut frame = FrameContext::new(2);

    frame.advance();
    assert_eq!(frame.slot(), 1);
    assert_eq!(frame.frame_number(), 1);

    frame.advance();
    assert_eq!(frame.slot(), 0);
    assert_eq!(frame.frame_number(), 2);
}

#[test]
fn test_slot_is_frame_number_modulo_frames_in_flight() {
    let mut frame = FrameContext::new(3);
    for expected_frame in 1..=10u64 {
        frame.advance();
        assert_eq!(frame.frame_number(), expected_frame);
        assert_eq!(frame.slot() as u64, expected_frame % 3);
    }
}

#[test]
fn test_single_frame_in_flight_never_rotates() {
    let mut frame = FrameContext::new(1);
    frame.advance();
    frame.advance();
    assert_eq!(frame.slot(), 0);
    assert_eq!(frame.frame_number(), 2);
}

#[test]
#[should_panic(expected = "frames_in_flight")]
fn test_zero_frames_in_flight_panics() {
    let _ = FrameContext::new(0);
}
