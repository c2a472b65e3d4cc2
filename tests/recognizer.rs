//! End-to-end tests of the recognizer with the scripted engine.

use crossbeam_channel::{Receiver, unbounded};
use std::sync::Arc;
use std::time::Duration;
use voxqueue::engine::scripted::{InvocationProbe, segment_from_words};
use voxqueue::{
    CallerHandle, ChannelSink, Config, DropReason, RecognitionResult, Recognizer, ScriptedEngine,
    ScriptedLoader, SinkEvent, VoxError,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const MODEL: [u8; 256] = [0u8; 256];

/// Engine that names each job after its sample count, so results can be
/// matched to submissions.
fn echo_engine() -> ScriptedEngine {
    ScriptedEngine::with_responder(|pcm| {
        vec![segment_from_words(&format!("job {}", pcm.len()), 0)]
    })
}

fn recognizer_with<F>(factory: F) -> Recognizer
where
    F: Fn() -> ScriptedEngine + Send + Sync + 'static,
{
    let recognizer =
        Recognizer::new(Arc::new(ScriptedLoader::new(factory)), &Config::default()).unwrap();
    assert!(recognizer.load_from_buffer(&MODEL, false).unwrap());
    recognizer
}

fn channel_caller() -> (CallerHandle, Receiver<SinkEvent>) {
    let (sink, events) = ChannelSink::channel();
    (Arc::new(sink), events)
}

fn expect_result(events: &Receiver<SinkEvent>) -> RecognitionResult {
    match events.recv_timeout(TIMEOUT) {
        Ok(SinkEvent::Result(result)) => result,
        other => panic!("Expected a result, got {:?}", other),
    }
}

fn assert_silent(events: &Receiver<SinkEvent>) {
    if let Ok(event) = events.recv_timeout(Duration::from_millis(200)) {
        panic!("Expected no delivery, got {:?}", event);
    }
}

#[test]
fn single_job_round_trips_id_and_flag() {
    let recognizer = recognizer_with(|| {
        ScriptedEngine::new(vec![segment_from_words("Hello, world.", 0)])
    });
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller, vec![0.1; 16000], 16000, 42, 7);

    let result = expect_result(&events);
    assert_eq!(result.job_id, 42);
    assert_eq!(result.flag, 7);
    assert_eq!(result.text, "Hello, world.");
    let words: Vec<&str> = result.words.iter().map(|w| w.text.as_str()).collect();
    assert_eq!(words, vec!["hello", "world"]);
    assert_silent(&events);
}

#[test]
fn jobs_queued_behind_a_running_job_are_delivered_in_order() {
    let (gate_tx, gate_rx) = unbounded();
    let (started_tx, started_rx) = unbounded();
    let recognizer = recognizer_with(move || {
        echo_engine()
            .with_gate(gate_rx.clone())
            .with_start_signal(started_tx.clone())
    });
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 1000], 16000, 1, 0);
    assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 1000);

    // First job is blocked inside the engine; these three must queue up
    for (job_id, len) in [(2, 2000), (3, 3000), (4, 4000)] {
        recognizer.submit_f32(caller.clone(), vec![0.1; len], 16000, job_id, 0);
    }
    let deadline = std::time::Instant::now() + TIMEOUT;
    while recognizer.pending_jobs() < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(recognizer.pending_jobs(), 3);

    for _ in 0..4 {
        gate_tx.send(()).unwrap();
    }

    for (job_id, len) in [(1, 1000), (2, 2000), (3, 3000), (4, 4000)] {
        let result = expect_result(&events);
        assert_eq!(result.job_id, job_id);
        assert_eq!(result.text, format!("job {}", len));
        // Word lists never interleave between jobs
        let words: Vec<&str> = result.words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(words, vec!["job".to_string(), len.to_string()]);
    }
}

#[test]
fn concurrent_submitters_never_overlap_in_the_engine() {
    let probe = InvocationProbe::new();
    let engine_probe = probe.clone();
    let recognizer = Arc::new(recognizer_with(move || {
        echo_engine()
            .with_delay(Duration::from_millis(3))
            .with_probe(engine_probe.clone())
    }));
    let (caller, events) = channel_caller();

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let recognizer = recognizer.clone();
            let caller = caller.clone();
            std::thread::spawn(move || {
                for i in 0..5 {
                    recognizer.submit_f32(caller.clone(), vec![0.0; 160], 16000, t * 10 + i, 0);
                }
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }

    let mut per_thread_order: Vec<Vec<i32>> = vec![Vec::new(); 4];
    for _ in 0..20 {
        let result = expect_result(&events);
        per_thread_order[(result.job_id / 10) as usize].push(result.job_id);
    }

    assert_eq!(probe.calls(), 20);
    assert_eq!(probe.max_concurrent(), 1);
    // FIFO holds per submitting thread
    for (t, order) in per_thread_order.iter().enumerate() {
        let expected: Vec<i32> = (0..5).map(|i| t as i32 * 10 + i).collect();
        assert_eq!(order, &expected);
    }
}

#[test]
fn stop_aborts_running_job_and_clears_queue() {
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded();
    let recognizer = recognizer_with(move || {
        echo_engine()
            .with_gate(gate_rx.clone())
            .with_start_signal(started_tx.clone())
    });
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 500], 16000, 1, 0);
    started_rx.recv_timeout(TIMEOUT).unwrap();
    recognizer.submit_f32(caller.clone(), vec![0.1; 600], 16000, 2, 0);
    recognizer.submit_f32(caller.clone(), vec![0.1; 700], 16000, 3, 0);

    recognizer.stop(&caller);
    assert_eq!(recognizer.pending_jobs(), 0);
    assert_silent(&events);

    // A fresh submission still works: the queue is not poisoned
    recognizer.submit_f32(caller.clone(), vec![0.1; 800], 16000, 4, 0);
    assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 800);
    gate_tx.send(()).unwrap();

    let result = expect_result(&events);
    assert_eq!(result.job_id, 4);
    assert_eq!(result.text, "job 800");
    assert_silent(&events);
}

#[test]
fn stop_with_nothing_running_is_harmless() {
    let recognizer = recognizer_with(echo_engine);
    let (caller, events) = channel_caller();

    recognizer.stop(&caller);
    recognizer.submit_f32(caller, vec![0.1; 300], 16000, 8, 1);

    let result = expect_result(&events);
    assert_eq!((result.job_id, result.flag), (8, 1));
}

#[test]
fn submissions_are_resampled_before_the_engine_sees_them() {
    let recognizer = recognizer_with(echo_engine);
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 44100], 44100, 1, 0);
    recognizer.submit_pcm16(caller, vec![0x00, 0x40].repeat(8000), 8000, 2, 0);

    assert_eq!(expect_result(&events).text, "job 16000");
    assert_eq!(expect_result(&events).text, "job 16000");
}

#[test]
fn submission_without_model_is_dropped_with_reason() {
    let recognizer = Recognizer::new(
        Arc::new(ScriptedLoader::new(echo_engine)),
        &Config::default(),
    )
    .unwrap();
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller, vec![0.1; 160], 16000, 3, 9);

    match events.recv_timeout(TIMEOUT).unwrap() {
        SinkEvent::Dropped {
            job_id,
            flag,
            reason,
        } => {
            assert_eq!((job_id, flag), (3, 9));
            assert_eq!(reason, DropReason::ModelNotLoaded);
        }
        other => panic!("Expected Dropped, got {:?}", other),
    }
}

#[test]
fn empty_and_unresamplable_audio_is_dropped_but_queue_continues() {
    let recognizer = recognizer_with(echo_engine);
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![], 16000, 1, 0);
    recognizer.submit_pcm16(caller.clone(), vec![0x01], 16000, 2, 0);
    recognizer.submit_f32(caller.clone(), vec![0.1; 10], 0, 3, 0);
    recognizer.submit_f32(caller, vec![0.1; 100], 16000, 4, 0);

    for expected in [1, 2, 3] {
        match events.recv_timeout(TIMEOUT).unwrap() {
            SinkEvent::Dropped {
                job_id,
                reason: DropReason::Admission(_),
                ..
            } => assert_eq!(job_id, expected),
            other => panic!("Expected admission drop, got {:?}", other),
        }
    }
    assert_eq!(expect_result(&events).job_id, 4);
}

#[test]
fn engine_failure_drops_each_job_and_service_keeps_running() {
    let recognizer =
        recognizer_with(|| ScriptedEngine::new(vec![]).with_failure("status -1"));
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 100], 16000, 1, 0);
    recognizer.submit_f32(caller.clone(), vec![0.1; 100], 16000, 2, 0);
    for expected in [1, 2] {
        match events.recv_timeout(TIMEOUT).unwrap() {
            SinkEvent::Dropped {
                job_id,
                reason: DropReason::InferenceFailed(message),
                ..
            } => {
                assert_eq!(job_id, expected);
                assert!(message.contains("status -1"));
            }
            other => panic!("Expected inference failure, got {:?}", other),
        }
    }
    assert!(recognizer.is_ready());

    // A healthy model loaded afterwards serves the same caller
    let healthy = recognizer_with(echo_engine);
    healthy.submit_f32(caller, vec![0.1; 100], 16000, 3, 0);
    assert_eq!(expect_result(&events).text, "job 100");
}

#[test]
fn language_change_applies_to_later_jobs() {
    let probe = InvocationProbe::new();
    let engine_probe = probe.clone();
    let recognizer = recognizer_with(move || echo_engine().with_probe(engine_probe.clone()));
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 100], 16000, 1, 0);
    expect_result(&events);
    recognizer.set_language("RU");
    recognizer.submit_f32(caller, vec![0.1; 100], 16000, 2, 0);
    expect_result(&events);

    assert_eq!(probe.languages(), vec!["auto", "ru"]);
}

#[test]
fn forced_reload_waits_for_running_job() {
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded();
    let probe = InvocationProbe::new();
    let engine_probe = probe.clone();
    let recognizer = Arc::new(recognizer_with(move || {
        echo_engine()
            .with_gate(gate_rx.clone())
            .with_start_signal(started_tx.clone())
            .with_probe(engine_probe.clone())
    }));
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 100], 16000, 1, 0);
    started_rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(probe.active(), 1);

    let reloader = {
        let recognizer = recognizer.clone();
        std::thread::spawn(move || recognizer.load_from_buffer(&MODEL, true).unwrap())
    };
    assert!(reloader.join().unwrap());

    // The reload aborted the running job and only swapped engines after it returned
    assert_eq!(probe.active(), 0);
    assert!(recognizer.is_ready());
    assert_silent(&events);

    recognizer.submit_f32(caller, vec![0.1; 200], 16000, 2, 0);
    started_rx.recv_timeout(TIMEOUT).unwrap();
    drop(gate_tx);
    assert_eq!(expect_result(&events).job_id, 2);
}

#[test]
fn recognizer_drop_with_work_in_flight_shuts_down_cleanly() {
    let (_gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded();
    let recognizer = recognizer_with(move || {
        echo_engine()
            .with_gate(gate_rx.clone())
            .with_start_signal(started_tx.clone())
    });
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 100], 16000, 1, 0);
    started_rx.recv_timeout(TIMEOUT).unwrap();
    recognizer.submit_f32(caller, vec![0.1; 100], 16000, 2, 0);

    drop(recognizer);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn engine_panic_drops_the_job_and_queue_keeps_draining() {
    let (gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded();
    let recognizer = recognizer_with(move || {
        ScriptedEngine::with_responder(|pcm| {
            if pcm.len() == 111 {
                panic!("corrupt buffer");
            }
            vec![segment_from_words(&format!("job {}", pcm.len()), 0)]
        })
        .with_gate(gate_rx.clone())
        .with_start_signal(started_tx.clone())
    });
    let (caller, events) = channel_caller();

    recognizer.submit_f32(caller.clone(), vec![0.1; 111], 16000, 1, 0);
    assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 111);
    recognizer.submit_f32(caller, vec![0.1; 222], 16000, 2, 0);
    let deadline = std::time::Instant::now() + TIMEOUT;
    while recognizer.pending_jobs() < 1 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    drop(gate_tx);

    match events.recv_timeout(TIMEOUT).unwrap() {
        SinkEvent::Dropped {
            job_id,
            reason: DropReason::InferenceFailed(message),
            ..
        } => {
            assert_eq!(job_id, 1);
            assert!(message.contains("corrupt buffer"));
        }
        other => panic!("Expected the panicking job to be dropped, got {:?}", other),
    }
    let result = expect_result(&events);
    assert_eq!(result.job_id, 2);
    assert_eq!(result.text, "job 222");
    assert!(recognizer.is_ready());
}

#[test]
fn recognize_blocking_reports_abort_when_stopped() {
    let (_gate_tx, gate_rx) = unbounded::<()>();
    let (started_tx, started_rx) = unbounded();
    let recognizer = Arc::new(recognizer_with(move || {
        echo_engine()
            .with_gate(gate_rx.clone())
            .with_start_signal(started_tx.clone())
    }));

    let waiter = {
        let recognizer = recognizer.clone();
        std::thread::spawn(move || recognizer.recognize_blocking(vec![0.1; 400], 16000))
    };
    assert_eq!(started_rx.recv_timeout(TIMEOUT).unwrap(), 400);

    let (caller, _events) = channel_caller();
    recognizer.stop(&caller);

    assert!(matches!(waiter.join().unwrap(), Err(VoxError::Aborted)));
}
