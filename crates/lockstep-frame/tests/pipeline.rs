//! End-to-end frame pipeline scenarios on the software device.

use std::thread;
use std::time::Duration;

use lockstep_core::{ClearColor, EngineConfig, Extent2D, TimelineValue};
use lockstep_frame::FrameEngine;
use lockstep_gpu::{FaultPoint, GpuError, QueueMode, SoftDevice, SoftDeviceConfig};

fn device(mode: QueueMode) -> SoftDevice {
    SoftDevice::new(SoftDeviceConfig::default().with_mode(mode)).unwrap()
}

fn engine(mode: QueueMode, frames: usize) -> FrameEngine<SoftDevice> {
    let config = EngineConfig::default().with_frames_in_flight(frames);
    FrameEngine::new(device(mode), &config).unwrap()
}

#[test]
fn slots_rotate_without_blocking_when_gpu_keeps_up() {
    let mut engine = engine(QueueMode::Immediate, 3);
    let reports: Vec<_> = (0..10)
        .map(|_| engine.render_frame(ClearColor::CORNFLOWER).unwrap())
        .collect();

    let slots: Vec<_> = reports.iter().map(|r| r.slot).collect();
    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    assert!(reports.iter().all(|r| !r.blocked && r.presented));
    assert_eq!(reports[9].value, TimelineValue::new(10));

    let stats = engine.backend().control().stats();
    assert_eq!(stats.presents, 10);
    assert_eq!(stats.barrier_violations, 0);
    assert_eq!(stats.last_clear, Some(ClearColor::CORNFLOWER));
}

#[test]
fn cpu_blocks_when_it_runs_n_frames_ahead() {
    let mut engine = engine(QueueMode::Manual, 2);
    let control = engine.backend().control();

    engine.render_frame(ClearColor::BLACK).unwrap();
    engine.render_frame(ClearColor::BLACK).unwrap();
    assert_eq!(engine.in_flight().unwrap(), 2);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        control.complete_through(TimelineValue::new(1));
    });
    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    releaser.join().unwrap();

    assert_eq!(report.slot, 0);
    assert_eq!(report.value, TimelineValue::new(3));
    assert!(report.blocked);
    assert!(report.waited >= Duration::from_millis(20));
    assert_eq!(engine.stats().frames_blocked, 1);
}

#[test]
fn timed_out_wait_leaves_state_untouched() {
    let config = EngineConfig::default()
        .with_frames_in_flight(2)
        .with_frame_timeout(Duration::from_millis(5));
    let mut engine = FrameEngine::new(device(QueueMode::Manual), &config).unwrap();
    engine.render_frame(ClearColor::BLACK).unwrap();
    engine.render_frame(ClearColor::BLACK).unwrap();

    let err = engine.render_frame(ClearColor::BLACK).unwrap_err();
    assert!(matches!(err, GpuError::TimedOut { .. }));
    assert!(!err.is_fatal());
    assert!(!engine.is_poisoned());
    assert_eq!(engine.in_flight().unwrap(), 2);
    assert_eq!(engine.next_slot(), Some(0));
    assert_eq!(engine.last_signaled(), TimelineValue::new(2));

    engine.backend().control().complete_all();
    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(report.value, TimelineValue::new(3));
}

#[test]
fn failed_present_still_tracks_the_submitted_frame() {
    let mut engine = engine(QueueMode::Manual, 2);
    let control = engine.backend().control();
    control.inject_fault(FaultPoint::Present, GpuError::Other("present rejected".into()));

    let err = engine.render_frame(ClearColor::BLACK).unwrap_err();
    assert!(matches!(err, GpuError::Other(_)));
    assert!(!engine.is_poisoned());
    assert_eq!(engine.last_signaled(), TimelineValue::new(1));
    assert_eq!(engine.slot_values(), vec![TimelineValue::new(1), TimelineValue::ZERO]);
    assert_eq!(engine.in_flight().unwrap(), 1);
    assert_eq!(engine.next_slot(), Some(1));

    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    assert_eq!(report.slot, 1);
    assert_eq!(report.value, TimelineValue::new(2));
    assert!(!report.blocked);

    // Slot 0 still holds the unpresented frame's work.
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        control.complete_through(TimelineValue::new(1));
    });
    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    releaser.join().unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(report.value, TimelineValue::new(3));
    assert!(report.blocked);
}

#[test]
fn in_flight_never_exceeds_slot_count() {
    let mut engine = engine(
        QueueMode::Threaded {
            latency: Duration::from_millis(2),
        },
        3,
    );
    for _ in 0..20 {
        engine.render_frame(ClearColor::BLACK).unwrap();
        assert!(engine.in_flight().unwrap() <= 3);
    }
    engine.shutdown().unwrap();
}

#[test]
fn resize_drains_before_releasing_targets() {
    let mut engine = engine(QueueMode::Manual, 3);
    let control = engine.backend().control();
    engine.render_frame(ClearColor::BLACK).unwrap();
    engine.render_frame(ClearColor::BLACK).unwrap();

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        control.complete_all();
    });
    engine.on_resize(800, 600).unwrap();
    releaser.join().unwrap();

    assert_eq!(engine.extent(), Extent2D::new(800, 600));
    assert_eq!(engine.completed_value().unwrap(), TimelineValue::new(2));
    assert_eq!(engine.stats().resizes, 1);

    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    assert_eq!(report.image_index, 0);
    assert_eq!(report.slot, 0);
}

#[test]
fn zero_sized_resize_is_clamped() {
    let mut engine = engine(QueueMode::Immediate, 2);
    engine.on_resize(0, 720).unwrap();
    assert_eq!(engine.extent(), Extent2D::new(1, 720));
    engine.render_frame(ClearColor::BLACK).unwrap();
}

#[test]
fn resize_to_current_extent_is_a_no_op() {
    let mut engine = engine(QueueMode::Immediate, 2);
    let extent = engine.extent();
    engine.on_resize(extent.width, extent.height).unwrap();
    assert_eq!(engine.stats().resizes, 0);
}

#[test]
fn device_loss_poisons_until_reinitialized() {
    let mut engine = engine(QueueMode::Immediate, 2);
    engine.render_frame(ClearColor::BLACK).unwrap();
    engine
        .backend()
        .control()
        .inject_fault(FaultPoint::Submit, GpuError::DeviceLost("hung".to_string()));

    let err = engine.render_frame(ClearColor::BLACK).unwrap_err();
    assert!(err.is_fatal());
    assert!(engine.is_poisoned());
    assert_eq!(engine.last_signaled(), TimelineValue::new(1));
    assert_eq!(engine.next_slot(), Some(1));

    assert!(matches!(
        engine.render_frame(ClearColor::BLACK),
        Err(GpuError::DeviceLost(_))
    ));
    assert!(matches!(engine.on_resize(320, 240), Err(GpuError::DeviceLost(_))));

    engine.reinitialize(device(QueueMode::Immediate)).unwrap();
    assert!(!engine.is_poisoned());
    let report = engine.render_frame(ClearColor::BLACK).unwrap();
    assert_eq!(report.slot, 0);
    assert_eq!(report.value, TimelineValue::new(1));
}

#[test]
fn vsync_toggle_reaches_the_present_call() {
    let mut engine = engine(QueueMode::Immediate, 2);
    engine.render_frame(ClearColor::BLACK).unwrap();
    let vsynced = engine.backend().control().stats().last_present.unwrap();
    assert_eq!(vsynced.sync_interval, 1);
    assert!(!vsynced.allow_tearing);

    engine.set_vsync(false).unwrap();
    engine.render_frame(ClearColor::BLACK).unwrap();
    let uncapped = engine.backend().control().stats().last_present.unwrap();
    assert_eq!(uncapped.sync_interval, 0);
    assert!(uncapped.allow_tearing);
}
