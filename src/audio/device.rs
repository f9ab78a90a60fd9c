//! PipeWire node lookup
//!
//! Resolves a configured device identifier (node id or node name) against the
//! live registry so a bad identifier fails at startup instead of silently
//! routing to the default device.

use super::AudioError;
use log::debug;
use pipewire as pw;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Represents an audio device node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub media_class: String,
}

/// Which way audio flows through a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Whether a node's `media.class` can serve this direction
    fn accepts(self, media_class: &str) -> bool {
        match self {
            Direction::Input => media_class == "Audio/Source" || media_class == "Audio/Duplex",
            Direction::Output => media_class == "Audio/Sink" || media_class == "Audio/Duplex",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

impl AudioDevice {
    fn matches(&self, identifier: &str) -> bool {
        match identifier.parse::<u32>() {
            Ok(id) => self.id == id,
            Err(_) => self.name == identifier,
        }
    }
}

/// Pick the device named by `identifier` out of an enumerated node list
pub fn find_device<'a>(
    devices: &'a [AudioDevice],
    identifier: &str,
    direction: Direction,
) -> Result<&'a AudioDevice, AudioError> {
    let identifier = identifier.trim();
    devices
        .iter()
        .filter(|device| direction.accepts(&device.media_class))
        .find(|device| device.matches(identifier))
        .ok_or_else(|| AudioError::DeviceNotFound {
            identifier: identifier.to_string(),
            direction,
        })
}

/// Resolve `identifier` to a live PipeWire node serving `direction`
pub fn resolve_device(identifier: &str, direction: Direction) -> Result<AudioDevice, AudioError> {
    let devices = list_devices()?;
    debug!("PipeWire reported {} audio nodes", devices.len());
    find_device(&devices, identifier, direction).cloned()
}

/// Enumerate audio nodes currently registered with PipeWire
pub fn list_devices() -> Result<Vec<AudioDevice>, AudioError> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire main loop: {}", e)))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire context: {}", e)))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| AudioError::Backend(format!("Failed to connect to PipeWire: {}", e)))?;

    let registry = core
        .get_registry_rc()
        .map_err(|e| AudioError::Backend(format!("Failed to get PipeWire registry: {}", e)))?;

    let devices: Rc<RefCell<Vec<AudioDevice>>> = Rc::new(RefCell::new(Vec::new()));

    let _registry_listener = registry
        .add_listener_local()
        .global({
            let devices = devices.clone();
            move |global| {
                if global.type_ != pw::types::ObjectType::Node {
                    return;
                }
                let Some(props) = global.props else { return };
                let Some(media_class) = props.get("media.class") else {
                    return;
                };
                if !media_class.starts_with("Audio/") {
                    return;
                }

                let name = props.get("node.name").unwrap_or_default().to_string();
                let description = props
                    .get("node.description")
                    .unwrap_or(name.as_str())
                    .to_string();

                devices.borrow_mut().push(AudioDevice {
                    id: global.id,
                    name,
                    description,
                    media_class: media_class.to_string(),
                });
            }
        })
        .register();

    // Round-trip with the server so every existing global has been announced
    let done = Rc::new(Cell::new(false));
    let pending = core
        .sync(0)
        .map_err(|e| AudioError::Backend(format!("Failed to sync with PipeWire: {}", e)))?;

    let _core_listener = core
        .add_listener_local()
        .done({
            let done = done.clone();
            let mainloop_weak = mainloop.downgrade();
            move |id, seq| {
                if id == pw::core::PW_ID_CORE && seq == pending {
                    done.set(true);
                    if let Some(mainloop) = mainloop_weak.upgrade() {
                        mainloop.quit();
                    }
                }
            }
        })
        .register();

    while !done.get() {
        mainloop.run();
    }

    let devices = devices.borrow().clone();
    Ok(devices)
}
