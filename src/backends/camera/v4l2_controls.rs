// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera control interface
//!
//! Raw `VIDIOC_*` ioctls for the few controls the capture station touches:
//! wide dynamic range on the sensor subdevice and autofocus on the video node.

use super::types::{AutofocusMode, CameraControls};
use crate::errors::CameraError;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use tracing::{debug, info, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs (Camera Class) =====

/// Continuous auto focus enable
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
/// Wide dynamic range (sensor HDR) enable
pub const V4L2_CID_WIDE_DYNAMIC_RANGE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 21;
/// Start a single autofocus sweep
pub const V4L2_CID_AUTO_FOCUS_START: u32 = V4L2_CID_CAMERA_CLASS_BASE + 28;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
const V4L2_CTRL_FLAG_INACTIVE: u32 = 0x0010;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
// where dir: 2=READ, 1=WRITE, 3=READ|WRITE

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

// ===== V4L2 ioctl Structures =====

/// V4L2 control get/set structure
#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

/// V4L2 query control structure (kernel layout, only `flags` is read)
#[repr(C)]
#[allow(dead_code)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Flags of a V4L2 control as reported by `VIDIOC_QUERYCTRL`
#[derive(Debug, Clone, Copy)]
pub struct ControlInfo {
    pub flags: u32,
}

impl ControlInfo {
    /// Check if control is disabled
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }

    /// Check if control is inactive (value cannot be changed)
    pub fn is_inactive(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_INACTIVE != 0
    }
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result =
        unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL as _, &mut qctrl as *mut V4l2Queryctrl) };

    if result < 0 {
        return None;
    }

    Some(ControlInfo { flags: qctrl.flags })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_G_CTRL as _, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), CameraError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(device_path)
        .map_err(|e| CameraError::ControlFailed(format!("{}: {}", device_path, e)))?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL as _, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(
            device_path,
            control_id,
            value,
            ?errno,
            "Failed to set V4L2 control"
        );
        return Err(CameraError::ControlFailed(format!(
            "{}: control {:#x}: {}",
            device_path, control_id, errno
        )));
    }

    // Check if the driver accepted our value
    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

/// Turn on the sensor's wide dynamic range mode
///
/// Must run before streaming starts; the sensor only picks the HDR readout
/// mode up on the next stream-on.
pub fn enable_wide_dynamic_range(subdevice_path: &str) -> Result<(), CameraError> {
    set_control(subdevice_path, V4L2_CID_WIDE_DYNAMIC_RANGE, 1)?;

    match get_control(subdevice_path, V4L2_CID_WIDE_DYNAMIC_RANGE) {
        Some(0) => warn!(subdevice = subdevice_path, "Sensor kept wide dynamic range off"),
        _ => info!(subdevice = subdevice_path, "Wide dynamic range enabled"),
    }
    Ok(())
}

/// Apply autofocus controls to a video node
///
/// V4L2 has no speed control; the requested speed is only logged.
pub fn apply_autofocus(device_path: &str, controls: &CameraControls) -> Result<(), CameraError> {
    match controls.autofocus_mode {
        AutofocusMode::Continuous => set_control(device_path, V4L2_CID_FOCUS_AUTO, 1)?,
        AutofocusMode::Manual => set_control(device_path, V4L2_CID_FOCUS_AUTO, 0)?,
        AutofocusMode::Auto => {
            set_control(device_path, V4L2_CID_FOCUS_AUTO, 0)?;
            match query_control(device_path, V4L2_CID_AUTO_FOCUS_START) {
                Some(info) if !info.is_disabled() && !info.is_inactive() => {
                    set_control(device_path, V4L2_CID_AUTO_FOCUS_START, 1)?
                }
                _ => debug!(device_path, "No single-shot autofocus trigger"),
            }
        }
    }

    debug!(
        device_path,
        mode = ?controls.autofocus_mode,
        speed = ?controls.autofocus_speed,
        "Autofocus controls applied"
    );
    Ok(())
}
