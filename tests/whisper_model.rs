#![cfg(feature = "whisper")]

//! Runs the real Whisper engine through the queue. Needs a ggml model file,
//! taken from `VOXQUEUE_TEST_MODEL` or the configured default path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use voxqueue::{ChannelSink, Config, Recognizer, SinkEvent, WhisperLoader};

fn find_model() -> Option<PathBuf> {
    let path = std::env::var_os("VOXQUEUE_TEST_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|| Config::default().engine.model_path);
    if path.exists() {
        Some(path)
    } else {
        eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
        eprintln!("║  NO WHISPER MODEL FOUND - SKIPPING MODEL TESTS               ║");
        eprintln!("║                                                              ║");
        eprintln!("║  Point VOXQUEUE_TEST_MODEL at a ggml model, e.g.             ║");
        eprintln!("║    VOXQUEUE_TEST_MODEL=ggml-tiny.bin cargo test              ║");
        eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
        None
    }
}

fn recognizer(model: &PathBuf) -> Recognizer {
    let loader = WhisperLoader { use_gpu: false };
    let recognizer = Recognizer::new(Arc::new(loader), &Config::default()).unwrap();
    assert!(recognizer.load_from_file(model, false).unwrap());
    recognizer
}

/// One second of a quiet 440 Hz tone at 44.1 kHz.
fn tone() -> Vec<f32> {
    (0..44100)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44100.0).sin() * 0.05)
        .collect()
}

#[test]
fn model_loads_and_reports_name() {
    let Some(model) = find_model() else {
        return;
    };
    let recognizer = recognizer(&model);
    assert!(recognizer.is_ready());
    let expected = model.file_stem().unwrap().to_string_lossy().to_string();
    assert_eq!(recognizer.model_name(), Some(expected));
}

#[test]
fn queued_jobs_complete_in_order() {
    let Some(model) = find_model() else {
        return;
    };
    let recognizer = recognizer(&model);
    let (sink, events) = ChannelSink::channel();
    let caller: voxqueue::CallerHandle = Arc::new(sink);

    for job_id in 0..3 {
        recognizer.submit_f32(caller.clone(), tone(), 44100, job_id, 0);
    }

    for expected in 0..3 {
        match events.recv_timeout(Duration::from_secs(120)).unwrap() {
            SinkEvent::Result(result) => {
                assert_eq!(result.job_id, expected);
                assert_eq!(result.text, result.text.trim());
                assert!(!result.text.contains("  "));
                for pair in result.words.windows(2) {
                    assert!(pair[0].start <= pair[1].start);
                }
            }
            other => panic!("Expected a result, got {:?}", other),
        }
    }
}

#[test]
fn stop_aborts_a_long_job() {
    let Some(model) = find_model() else {
        return;
    };
    let recognizer = recognizer(&model);
    let (sink, events) = ChannelSink::channel();
    let caller: voxqueue::CallerHandle = Arc::new(sink);

    let long: Vec<f32> = tone().repeat(20);
    recognizer.submit_f32(caller.clone(), long, 44100, 1, 0);
    std::thread::sleep(Duration::from_millis(200));
    recognizer.stop(&caller);

    recognizer.submit_f32(caller, tone(), 44100, 2, 0);
    match events.recv_timeout(Duration::from_secs(120)).unwrap() {
        SinkEvent::Result(result) => assert_eq!(result.job_id, 2),
        other => panic!("Expected the follow-up result, got {:?}", other),
    }
}
