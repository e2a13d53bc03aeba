// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands that do not start the preview loop

use genmai_capture::backends::buttons::enumerate_input_devices;
use genmai_capture::backends::camera::{enumerate_devices, supported_formats};
use genmai_capture::config::Config;

/// List video capture devices and input devices
pub fn list_devices(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_devices();

    if cameras.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Available cameras:");
        println!();
        for (index, camera) in cameras.iter().enumerate() {
            let marker = if camera.path == config.camera_device {
                " (configured)"
            } else {
                ""
            };
            println!("  [{}] {} - {}{}", index, camera.card, camera.path, marker);
            println!("      Driver: {}", camera.driver);

            let formats = supported_formats(&camera.path);
            if !formats.is_empty() {
                println!("      Formats: {}", formats.join(", "));
            }
            println!();
        }
    }

    let inputs = enumerate_input_devices();
    if inputs.is_empty() {
        println!("No input devices found (check permissions on /dev/input).");
        return Ok(());
    }

    println!("Input devices:");
    println!();
    for input in &inputs {
        let marker = if input.name == config.button_device_name {
            " (button panel)"
        } else {
            ""
        };
        println!("  {} - {}{}", input.path.display(), input.name, marker);
    }

    if !inputs.iter().any(|i| i.name == config.button_device_name) {
        println!();
        println!(
            "Button panel '{}' not found; capture will run without hardware buttons.",
            config.button_device_name
        );
    }

    Ok(())
}
