//! Transport Property Tests
//!
//! Backoff schedule and wire-frame classification, asserted on the public
//! surface without a live server.

use command_center_core::models::protocol::{classify_frame, AgentEvent, Frame, StreamChunk};
use command_center_core::services::backoff_delay_ms;

#[test]
fn test_backoff_schedule_matches_contract() {
    // delay = base × 2^min(attempt − 1, 4)
    let base = 5000;
    let expected = [5000, 10_000, 20_000, 40_000, 80_000, 80_000, 80_000];
    for (i, want) in expected.iter().enumerate() {
        let attempt = (i + 1) as u32;
        assert_eq!(backoff_delay_ms(base, attempt), *want, "attempt {}", attempt);
    }
}

#[test]
fn test_backoff_attempt_one_uses_base() {
    assert_eq!(backoff_delay_ms(1000, 1), 1000);
}

#[test]
fn test_backoff_cap_is_sixteen_times_base() {
    for attempt in 5..40 {
        assert_eq!(backoff_delay_ms(250, attempt), 4000);
    }
}

#[test]
fn test_event_vocabulary_classifies() {
    let frames = [
        r#"{"event":"taskStart","taskId":"A"}"#,
        r#"{"event":"stepProgress","taskId":"A","progress":10}"#,
        r#"{"event":"taskComplete","taskId":"A","result":{"summary":"ok"}}"#,
        r#"{"event":"taskError","taskId":"A","error":"boom"}"#,
        r#"{"event":"functionCallPartial","taskId":"A","functionName":"click","partialArgs":"{"}"#,
        r#"{"event":"planLog","taskId":"A","message":"Step 1: look"}"#,
        r#"{"event":"thoughtComplete","taskId":"A"}"#,
        r#"{"event":"intermediateResult","taskId":"A","result":{"content":"x"}}"#,
        r#"{"event":"apiKeyMissing"}"#,
    ];
    for raw in frames {
        match classify_frame(raw) {
            Ok(Frame::Agent(_)) => {}
            other => panic!("{} should classify as an agent event, got {:?}", raw, other),
        }
    }
}

#[test]
fn test_type_vocabulary_classifies() {
    let chat =
        classify_frame(r#"{"type":"chat_response_stream","task_id":"A","content":"hi","completed":true}"#)
            .unwrap();
    assert!(matches!(
        chat,
        Frame::Chunk(StreamChunk::ChatResponseStream { .. })
    ));

    let thought = classify_frame(
        r#"{"type":"ai_thought_stream","task_id":"A","content":"hmm","completed":false}"#,
    )
    .unwrap();
    assert!(matches!(
        thought,
        Frame::Chunk(StreamChunk::AiThoughtStream { .. })
    ));
}

#[test]
fn test_unrecognized_frames_are_violations() {
    for raw in [
        "",
        "plain text",
        "[]",
        r#"{"neither":"discriminator"}"#,
        r#"{"event":"launchMissiles"}"#,
        r#"{"type":"unknown_stream","task_id":"A"}"#,
    ] {
        assert!(classify_frame(raw).is_err(), "{} should be rejected", raw);
    }
}

#[test]
fn test_progress_field_tolerates_floats() {
    match classify_frame(r#"{"event":"stepProgress","taskId":"A","progress":33.3}"#).unwrap() {
        Frame::Agent(AgentEvent::StepProgress { progress, .. }) => {
            assert_eq!(progress, Some(33.3));
        }
        other => panic!("Expected StepProgress, got {:?}", other),
    }
}
