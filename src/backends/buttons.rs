// SPDX-License-Identifier: GPL-3.0-only

//! Front-panel hardware buttons
//!
//! The panel shows up as an evdev keyboard. Only a fixed allow-list of key
//! codes is meaningful; everything else the device reports is dropped.
//!
//! ```text
//! evdev device ──► raw KEY events ──► ButtonMap::resolve ──► ButtonEvent
//!                                                    │
//!                                named_events() ◄────┘ (drops unresolved)
//!                                        │
//!                                     listen() ──► tracing log record
//! ```

use crate::errors::ButtonError;
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// One key event from the button device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonEvent {
    /// Raw device key code
    pub code: u16,
    /// Logical button name, `None` when the code is not on the allow-list
    pub name: Option<String>,
    /// Key value (1 = press, 0 = release, 2 = autorepeat)
    pub value: i32,
}

/// A button event whose code resolved to a configured name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedButtonEvent {
    pub name: String,
    pub value: i32,
}

/// Allow-list mapping device key codes to button names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonMap {
    names: BTreeMap<u16, String>,
}

impl ButtonMap {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        Self {
            names: codes
                .into_iter()
                .map(|(code, name)| (code, name.into()))
                .collect(),
        }
    }

    /// Look up the name for a key code
    pub fn name(&self, code: u16) -> Option<&str> {
        self.names.get(&code).map(String::as_str)
    }

    /// Build a [`ButtonEvent`] from a raw key code and value
    pub fn resolve(&self, code: u16, value: i32) -> ButtonEvent {
        ButtonEvent {
            code,
            name: self.name(code).map(str::to_string),
            value,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Input device summary for `list`
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub path: PathBuf,
    pub name: String,
}

/// Enumerate evdev input devices
pub fn enumerate_input_devices() -> Vec<InputDeviceInfo> {
    let mut devices: Vec<InputDeviceInfo> = evdev::enumerate()
        .map(|(path, device)| InputDeviceInfo {
            path,
            name: device.name().unwrap_or("unknown").to_string(),
        })
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// Handle to the opened button device
pub struct ButtonSource {
    device: evdev::Device,
    path: PathBuf,
    map: ButtonMap,
}

impl ButtonSource {
    /// Find the input device with the given name and open it
    pub fn open(device_name: &str, map: ButtonMap) -> Result<Self, ButtonError> {
        let (path, device) = evdev::enumerate()
            .find(|(_, device)| device.name() == Some(device_name))
            .ok_or_else(|| ButtonError::DeviceNotFound(device_name.to_string()))?;

        info!(
            name = device_name,
            path = %path.display(),
            buttons = map.len(),
            "Opened button device"
        );

        Ok(Self { device, path, map })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Turn the device into a lazy, unbounded stream of key events
    ///
    /// The stream ends only when reading the device fails.
    pub fn into_events(
        self,
    ) -> Result<impl Stream<Item = ButtonEvent> + Send + 'static, ButtonError> {
        let path = self.path;
        let map = self.map;
        let mut events = self
            .device
            .into_event_stream()
            .map_err(|e| ButtonError::OpenFailed(format!("{}: {}", path.display(), e)))?;

        Ok(async_stream::stream! {
            loop {
                match events.next_event().await {
                    Ok(event) => {
                        if event.event_type() == evdev::EventType::KEY {
                            yield map.resolve(event.code(), event.value());
                        }
                    }
                    Err(e) => {
                        let err = ButtonError::ReadFailed(format!("{}: {}", path.display(), e));
                        warn!(error = %err, "Button event stream ended");
                        break;
                    }
                }
            }
        })
    }
}

/// Keep only events whose code resolved to a button name
pub fn named_events<S>(events: S) -> impl Stream<Item = NamedButtonEvent>
where
    S: Stream<Item = ButtonEvent>,
{
    events.filter_map(|event| async move {
        match event.name {
            Some(name) => Some(NamedButtonEvent {
                name,
                value: event.value,
            }),
            None => None,
        }
    })
}

/// Consume button events forever, logging each named one
///
/// Returns the number of named events seen once the source ends.
pub async fn listen<S>(events: S) -> usize
where
    S: Stream<Item = ButtonEvent>,
{
    let named = named_events(events);
    futures::pin_mut!(named);

    let mut count = 0;
    while let Some(event) = named.next().await {
        info!(name = %event.name, value = event.value, "Button event");
        count += 1;
    }

    debug!(count, "Button listener finished");
    count
}
