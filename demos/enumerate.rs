//! List the devices a driver reports.
//!
//! Uses the in-memory driver with two simulated cameras, one of which has no
//! infrared sensor.

use rgbd_capture::mock::{MockDevice, MockDriver};
use rgbd_capture::{DeviceRegistry, StreamKind};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let driver = MockDriver::new(vec![
        MockDevice::new("mock-0"),
        MockDevice::builder("mock-1").without_stream(StreamKind::Infrared).build(),
    ]);
    let registry = DeviceRegistry::new(Arc::new(driver));

    let devices = registry.list_devices();
    println!("Found {} device(s):", devices.len());
    for dev in &devices {
        println!(
            "  [{}] {} {} (vendor {:#06x})  Serial={}  Bus={} Addr={}  URI={}",
            dev.index,
            dev.vendor_name,
            dev.product_name,
            dev.vendor_id,
            dev.serial_number,
            dev.bus,
            dev.address,
            dev.connection
        );
    }
}
