//! Print Wii Remote events and motion state to stdout.
//!
//! Usage: cargo run --example monitor [--motion-plus]
//! Press HOME to stop.

use std::time::{Duration, Instant};
use wiimote::{Buttons, DataTypes, Event, Leds, Wiimote, WiimoteError};

fn main() {
    env_logger::init();

    let data_types = if std::env::args().any(|a| a == "--motion-plus") {
        DataTypes::MOTION_PLUS
    } else {
        DataTypes::ACCELEROMETER
    };

    let wiimote = match Wiimote::start(data_types) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to open Wii Remote: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = wiimote.set_leds(Leds::LED1) {
        eprintln!("Failed to set LEDs: {}", e);
    }

    println!("Monitoring {:?} (HOME to stop)...", data_types);

    let start = Instant::now();
    let mut samples: u64 = 0;
    let mut last_print = Instant::now();

    loop {
        match wiimote.recv_event_timeout(Duration::from_secs(2)) {
            Ok(Event::ButtonsChanged(buttons)) => {
                println!("buttons: {:?}", buttons);
                if buttons.contains(Buttons::HOME) {
                    break;
                }
            }
            Ok(Event::AccelerationChanged(_)) | Ok(Event::OrientationChanged) => {
                samples += 1;
                let now = Instant::now();
                if now.duration_since(last_print) >= Duration::from_millis(250) {
                    let a = wiimote.acceleration();
                    println!(
                        "acc=[{:+.3}, {:+.3}, {:+.3}]  pitch={:+7.1}  roll={:+7.1}  yaw={:+7.1}  still={}",
                        a[0], a[1], a[2],
                        wiimote.orientation_pitch(),
                        wiimote.orientation_roll(),
                        wiimote.orientation_yaw(),
                        wiimote.is_still(),
                    );
                    last_print = now;
                }
            }
            Ok(Event::BatteryChanged(level)) => println!("battery: {}/255", level),
            Ok(Event::BatteryEmpty(empty)) => println!("battery empty: {}", empty),
            Ok(Event::MotionPlusStateChanged(state)) => println!("MotionPlus: {:?}", state),
            Ok(Event::CalibrationAbandoned) => {
                eprintln!("Controller never sent its calibration");
                break;
            }
            Ok(Event::DeviceError(e)) => {
                eprintln!("Device error: {}", e);
                break;
            }
            Err(WiimoteError::Timeout) => {
                if wiimote.phase() != wiimote::Phase::Ready {
                    eprintln!("Still waiting for calibration...");
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} motion updates in {:.1}s ({:.1} Hz)",
        samples,
        elapsed,
        samples as f64 / elapsed
    );

    if let Err(e) = wiimote.stop() {
        eprintln!("Failed to stop cleanly: {}", e);
    }
}
