//! Capture time-aligned depth + color pairs from a simulated camera.
//!
//! Usage: cargo run --example capture
//! Reads the RGBD_* environment variables for resolution and frame rates.

use rgbd_capture::mock::{MockDevice, MockDriver};
use rgbd_capture::{CaptureRequest, DeviceRegistry, DeviceSession, LatchedCapture, SessionConfig, StreamKind, StreamMask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Push frames for `kind` at `fps` until `stop` is set.
fn produce(device: Arc<MockDevice>, kind: StreamKind, fps: u32, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        let period = Duration::from_secs(1) / fps.max(1);
        let mut pixel = 0u8;
        while !stop.load(Ordering::Relaxed) {
            device.emit(kind, start.elapsed().as_micros() as u64, pixel);
            pixel = pixel.wrapping_add(1);
            thread::sleep(period);
        }
    })
}

fn main() {
    env_logger::init();

    let device = MockDevice::new("mock-0");
    let registry = DeviceRegistry::new(Arc::new(MockDriver::new(vec![device.clone()])));
    let config = SessionConfig::from_env();

    let mut session = match DeviceSession::open(&registry, config.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };

    println!("Device:    {} ({})", session.info().product_name, session.info().serial_number);
    println!("Color:     {:?}", config.color_mode());
    println!("Depth:     {:?}", config.depth_mode());
    println!("Tolerance: {:.3} ms", session.tolerance().millis());
    println!();

    let stop = Arc::new(AtomicBool::new(false));
    let producers = vec![
        produce(device.clone(), StreamKind::Depth, config.depth_fps.hz(), stop.clone()),
        produce(device.clone(), StreamKind::Color, config.color_fps.hz(), stop.clone()),
    ];

    let request = CaptureRequest::new(StreamMask::DEPTH_COLOR);
    let mut latch = LatchedCapture::new();
    for i in 0..10 {
        let capture = match session.capture(&request) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Capture failed: {}", e);
                break;
            }
        };
        let merged = latch.update(capture);
        let (Some(depth), Some(color)) = (merged.depth(), merged.color()) else {
            continue;
        };
        println!(
            "[{}] depth={:.3} ms  color={:.3} ms  skew={:+.3} ms  center depth={:?}",
            i,
            depth.timestamp_ms,
            color.timestamp_ms,
            color.timestamp_ms - depth.timestamp_ms,
            depth.image.sample_u16(depth.image.width / 2, depth.image.height / 2),
        );
    }

    let intrinsics = session.intrinsics();
    println!(
        "\nfocal color={:.1}px  focal depth={:.1}px  baseline={:.2}cm",
        intrinsics.focal_length_color, intrinsics.focal_length_depth, intrinsics.baseline
    );

    if let Err(e) = session.close() {
        eprintln!("Failed to close session: {}", e);
    }
    stop.store(true, Ordering::Relaxed);
    for p in producers {
        let _ = p.join();
    }
}
