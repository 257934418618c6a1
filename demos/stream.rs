//! Stream synchronized depth + infrared captures from a simulated camera.
//!
//! Usage: cargo run --example stream
//! Runs for five seconds, reporting the capture rate.

use rgbd_capture::mock::{MockDevice, MockDriver};
use rgbd_capture::{CaptureError, CaptureRequest, CaptureStream, DeviceRegistry, DeviceSession, SessionConfig, StreamKind, StreamMask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let device = MockDevice::new("mock-0");
    let registry = DeviceRegistry::new(Arc::new(MockDriver::new(vec![device.clone()])));

    let session = match DeviceSession::open(&registry, SessionConfig::from_env()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };
    let fps = session.config().depth_fps.hz();

    let stream = match CaptureStream::start(session, CaptureRequest::new(StreamMask::DEPTH_INFRARED)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start capture: {}", e);
            std::process::exit(1);
        }
    };

    // Depth and infrared share the sensor clock, so both are stamped together.
    let stop = Arc::new(AtomicBool::new(false));
    let producer = {
        let device = device.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let start = Instant::now();
            while !stop.load(Ordering::Relaxed) {
                let ts = start.elapsed().as_micros() as u64;
                device.emit(StreamKind::Depth, ts, 0x40);
                device.emit(StreamKind::Infrared, ts, 0x80);
                thread::sleep(Duration::from_secs(1) / fps);
            }
        })
    };

    println!("Streaming depth + infrared for 5 seconds...");

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    while start.elapsed() < Duration::from_secs(5) {
        match stream.recv_timeout(Duration::from_secs(2)) {
            Ok(capture) => {
                count += 1;
                if count % 30 == 1 {
                    if let (Some(depth), Some(ir)) = (capture.depth(), capture.infrared()) {
                        println!(
                            "depth={:<12.3} ir={:<12.3} {}x{}",
                            depth.timestamp_ms, ir.timestamp_ms, depth.image.width, depth.image.height
                        );
                    }
                }

                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(2) {
                    let elapsed = start.elapsed().as_secs_f64();
                    println!("--- {} captures in {:.1}s ({:.1} Hz) ---", count, elapsed, count as f64 / elapsed);
                    last_report = now;
                }
            }
            Err(CaptureError::Timeout) => {
                eprintln!("Timeout waiting for captures");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    stream.stop();
    stop.store(true, Ordering::Relaxed);
    let _ = producer.join();

    let elapsed = start.elapsed().as_secs_f64();
    println!("\nTotal: {} captures in {:.1}s ({:.1} Hz)", count, elapsed, count as f64 / elapsed);
}
