mod support;

use scenecast::{
    CaptureMethod, ImageFormat, MemorySinkFactory, RenderConfig, RenderJob, ScenecastError,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{frame_payload, FakeBrowser, FakeScript};

fn config(duration_frames: u64, concurrency: usize) -> RenderConfig {
    RenderConfig {
        start_frame: 0,
        duration_frames,
        fps: 30,
        width: 640,
        height: 360,
        concurrency,
        capture_method: CaptureMethod::Screenshot,
        image_format: ImageFormat::Jpeg,
        jpeg_quality: 90,
        frame_render_timeout_ms: 5_000,
        settle_delay_ms: 0,
        raw_output: false,
        fail_on_page_errors: true,
        enable_frame_count_check: false,
        enable_hash_check: false,
        user_data: serde_json::Value::Null,
        video_component_type: None,
        extension_dir: None,
        scene_entry: PathBuf::from("dist"),
        temp_dir: PathBuf::from("scenecast-test-tmp"),
        output_path: None,
        headless: true,
        dev_mode: false,
    }
}

#[test]
fn single_worker_writes_every_frame_in_order() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(10, 1)).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(outcome.artifacts.len(), 1);
    assert_eq!(
        outcome.artifacts[0],
        PathBuf::from("scenecast-test-tmp/part 0-0-10.mkv")
    );
    assert_eq!(outcome.stats.frames_rendered, 10);

    let handles = sinks.handles();
    assert_eq!(handles.len(), 1);
    let state = handles[0].1.lock().unwrap();
    assert!(state.opened && state.ended && !state.killed);
    let expected: Vec<(u64, Vec<u8>)> = (0..10).map(|f| (f, frame_payload(f))).collect();
    assert_eq!(state.frames, expected);
}

#[test]
fn every_frame_lands_in_exactly_one_part_stream() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(12, 4)).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(outcome.artifacts.len(), 4);

    let mut seen = std::collections::BTreeMap::<u64, usize>::new();
    for (part, state) in sinks.handles() {
        let state = state.lock().unwrap();
        assert!(state.ended, "part {part} must finalize");
        // Strict order within the part.
        let frames: Vec<u64> = state.frames.iter().map(|(f, _)| *f).collect();
        let mut sorted = frames.clone();
        sorted.sort_unstable();
        assert_eq!(frames, sorted);
        for (frame, bytes) in &state.frames {
            assert_eq!(bytes, &frame_payload(*frame));
            *seen.entry(*frame).or_insert(0) += 1;
        }
    }
    assert_eq!(seen.len(), 12);
    assert!(seen.values().all(|&count| count == 1));
}

#[test]
fn start_frame_offsets_parts_and_artifacts() {
    let mut cfg = config(10, 3);
    cfg.start_frame = 100;
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(cfg).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(
        outcome.artifacts,
        vec![
            PathBuf::from("scenecast-test-tmp/part 0-100-103.mkv"),
            PathBuf::from("scenecast-test-tmp/part 1-103-106.mkv"),
            PathBuf::from("scenecast-test-tmp/part 2-106-110.mkv"),
        ]
    );
}

#[test]
fn concurrency_clamps_to_duration() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(2, 8)).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(outcome.artifacts.len(), 2);
    let handles = sinks.handles();
    assert_eq!(handles.len(), 2);
    for (_, state) in handles {
        assert_eq!(state.lock().unwrap().frames.len(), 1);
    }
}

#[test]
fn first_failure_aborts_peers_and_kills_every_encoder() {
    // Four parts of 25 frames; part 2 fails at its third frame (52).
    let script = FakeScript {
        fail_render_at: Some(52),
        frame_delay: Duration::from_millis(2),
        ..FakeScript::default()
    };
    let browser = FakeBrowser::new(script);
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(100, 4)).unwrap();

    let err = job.render_parts(&browser, &sinks).unwrap_err();
    assert!(matches!(err, ScenecastError::Page(_)));
    assert!(err.to_string().contains("injected render failure at frame 52"));

    let handles = sinks.handles();
    assert_eq!(handles.len(), 4);
    let mut total_frames = 0usize;
    for (part, state) in &handles {
        let state = state.lock().unwrap();
        assert!(
            state.ended || state.killed,
            "part {part} left its encoder alive"
        );
        total_frames += state.frames.len();
        if *part == 2 {
            assert!(state.killed, "the failing part must kill its encoder");
            assert_eq!(state.frames.len(), 2, "frames 50 and 51 only");
        }
    }
    assert!(
        total_frames < 100,
        "peers must stop early, wrote {total_frames} frames"
    );
}

#[test]
fn encoder_write_failure_fails_the_part() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new().fail_part_write_at(0, 3);
    let mut job = RenderJob::new(config(6, 1)).unwrap();

    let err = job.render_parts(&browser, &sinks).unwrap_err();
    assert!(matches!(err, ScenecastError::Encoder(_)));
    let handles = sinks.handles();
    let state = handles[0].1.lock().unwrap();
    assert!(state.killed);
    assert_eq!(state.frames.len(), 3);
}

#[test]
fn duplicate_consecutive_frames_fail_hash_verification() {
    let script = FakeScript {
        duplicate_frames: Some((5, 6)),
        ..FakeScript::default()
    };
    let browser = FakeBrowser::new(script);
    let sinks = MemorySinkFactory::new();
    let mut cfg = config(8, 2);
    cfg.enable_hash_check = true;
    let mut job = RenderJob::new(cfg).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    let err = outcome.hashes.check_consecutive(0, 8).unwrap_err();
    assert!(matches!(err, ScenecastError::Verification(_)));
    assert!(err.to_string().contains("frames 5 and 6"));
}

#[test]
fn duplicate_detection_spans_part_boundaries() {
    // Parts are [0,4) and [4,8); the duplicate pair straddles them.
    let script = FakeScript {
        duplicate_frames: Some((3, 4)),
        ..FakeScript::default()
    };
    let browser = FakeBrowser::new(script);
    let sinks = MemorySinkFactory::new();
    let mut cfg = config(8, 2);
    cfg.enable_hash_check = true;
    let mut job = RenderJob::new(cfg).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    let err = outcome.hashes.check_consecutive(0, 8).unwrap_err();
    assert!(err.to_string().contains("frames 3 and 4"));
}

#[test]
fn distinct_frames_pass_hash_verification() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut cfg = config(8, 2);
    cfg.enable_hash_check = true;
    let mut job = RenderJob::new(cfg).unwrap();

    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(outcome.hashes.len(), 8);
    outcome.hashes.check_consecutive(0, 8).unwrap();
}

#[test]
fn zero_frame_timeout_fails_immediately() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut cfg = config(3, 1);
    cfg.frame_render_timeout_ms = 0;
    let mut job = RenderJob::new(cfg).unwrap();

    let err = job.render_parts(&browser, &sinks).unwrap_err();
    match err {
        ScenecastError::FrameTimeout { frame, .. } => assert_eq!(frame, 0),
        other => panic!("expected frame timeout, got {other}"),
    }
}

#[test]
fn page_errors_are_fatal_only_when_configured() {
    let script = FakeScript {
        page_errors_at: Some((1, vec!["component exploded".into()])),
        ..FakeScript::default()
    };

    let browser = FakeBrowser::new(script.clone());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(4, 1)).unwrap();
    let err = job.render_parts(&browser, &sinks).unwrap_err();
    assert!(matches!(err, ScenecastError::Page(_)));
    assert!(err.to_string().contains("component exploded"));

    let browser = FakeBrowser::new(script);
    let sinks = MemorySinkFactory::new();
    let mut cfg = config(4, 1);
    cfg.fail_on_page_errors = false;
    let mut job = RenderJob::new(cfg).unwrap();
    let outcome = job.render_parts(&browser, &sinks).unwrap();
    assert_eq!(outcome.stats.frames_rendered, 4);
}

#[test]
fn broken_bundle_fails_the_part() {
    let script = FakeScript {
        broken_bundle: true,
        ..FakeScript::default()
    };
    let browser = FakeBrowser::new(script);
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(4, 1)).unwrap();

    let err = job.render_parts(&browser, &sinks).unwrap_err();
    assert!(err.to_string().contains("initialization entry"));
}

#[test]
fn pages_receive_per_part_init_records() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let mut job = RenderJob::new(config(10, 3)).unwrap();
    job.render_parts(&browser, &sinks).unwrap();

    let mut inits = browser.inits();
    inits.sort_by_key(|i| i.render_id);
    let render_ids: Vec<u64> = inits.iter().map(|i| i.render_id).collect();
    assert_eq!(render_ids, vec![0, 3, 6]);
    for init in &inits {
        assert_eq!(init.duration_frames, 10);
        assert_eq!(init.secret.len(), 32);
        assert_eq!(init.server_port, None);
        assert_eq!(inits[0].secret, init.secret);
    }
}

#[test]
fn progress_reports_reach_the_callback() {
    let browser = FakeBrowser::new(FakeScript::default());
    let sinks = MemorySinkFactory::new();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink_reports = Arc::clone(&reports);

    let mut cfg = config(10, 2);
    cfg.fps = 4;
    let mut job = RenderJob::new(cfg)
        .unwrap()
        .on_progress(move |report| sink_reports.lock().unwrap().push(report.clone()));
    job.render_parts(&browser, &sinks).unwrap();

    let reports = reports.lock().unwrap();
    assert!(!reports.is_empty());
    let last = reports.last().unwrap();
    assert_eq!(last.frames_done, 10);
    assert_eq!(last.frames_total, 10);
    assert_eq!(last.per_part.len(), 2);
    assert_eq!(last.per_part[0].frames_done, 5);
}
