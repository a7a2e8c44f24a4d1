#![no_main]
use libfuzzer_sys::fuzz_target;
use servo_core::ProtocolEvent;
use servo_core::codec::decode;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    match decode(&line) {
        ProtocolEvent::FeedbackAngle(v) => assert!(v.is_finite()),
        ProtocolEvent::Malformed { line, .. } | ProtocolEvent::Unrecognized(line) => {
            assert_eq!(line, line.trim());
        }
        ProtocolEvent::TargetReached | ProtocolEvent::Empty => {}
    }
});
