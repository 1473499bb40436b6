//! Scripted input. A script is a TOML file of events which are replayed into the mux on their
//! own thread, as a platform's input callbacks would be.
//!
//! ```toml
//! [device]
//! id = 1
//! buttons = ["Tip Switch", "Barrel Switch"]
//!
//! [[event]]
//! kind = "gesture"
//! points = [[100.0, 100.0], [140.0, 120.0], [180.0, 100.0]]
//!
//! [[event]]
//! kind = "key"
//! action = "undo"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sketchbook_core::{
    mux::{
        stylus::{ButtonCapabilities, PacketBatch, StylusDevice},
        InputMux, MouseButtons,
    },
    units::SurfaceResolution,
};

use crate::shell::{Action, ShellEvent};

#[derive(serde::Deserialize, Copy, Clone, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    #[default]
    Left,
    Right,
    Middle,
}
impl From<Button> for MouseButtons {
    fn from(button: Button) -> Self {
        match button {
            Button::Left => MouseButtons::LEFT,
            Button::Right => MouseButtons::RIGHT,
            Button::Middle => MouseButtons::MIDDLE,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Device {
    pub id: u32,
    pub buttons: Vec<String>,
}
impl Default for Device {
    fn default() -> Self {
        Self {
            id: 0,
            buttons: vec!["Tip Switch".to_owned(), "Barrel Switch".to_owned()],
        }
    }
}
impl From<Device> for StylusDevice {
    fn from(Device { id, buttons }: Device) -> Self {
        StylusDevice { id, buttons }
    }
}

#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    MouseDown {
        #[serde(default)]
        button: Button,
        at: [f32; 2],
    },
    MouseMove {
        at: [f32; 2],
    },
    MouseUp {
        #[serde(default)]
        button: Button,
        at: [f32; 2],
    },
    StylusButton {
        index: usize,
        pressed: bool,
    },
    /// Packets are raw device samples, `stride` values each.
    StylusDown {
        #[serde(default)]
        packets: Vec<i32>,
    },
    StylusPackets {
        packets: Vec<i32>,
    },
    StylusUp {
        #[serde(default)]
        packets: Vec<i32>,
    },
    /// One pen gesture, as seen by both the digitizer and the emulated mouse.
    Gesture {
        #[serde(default)]
        button: Button,
        points: Vec<[f32; 2]>,
    },
    Key {
        action: Action,
    },
    Resize {
        width: u32,
        height: u32,
    },
    Wait {
        ms: u64,
    },
    Quit,
}

fn default_stride() -> usize {
    2
}

#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub device: Device,
    /// Properties per stylus packet. X and Y come first.
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default, rename = "event")]
    pub events: Vec<Event>,
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let string = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {path:?}"))?;
        Self::parse(&string).with_context(|| format!("parsing script {path:?}"))
    }
    pub fn parse(string: &str) -> anyhow::Result<Self> {
        let script: Self = toml::from_str(string)?;
        if script.stride < 2 {
            anyhow::bail!("stride {} can't hold X and Y", script.stride);
        }
        Ok(script)
    }
    /// Feed every event into `mux`, telling `notify` after each. Stops early if `notify`
    /// returns false.
    pub fn play(
        &self,
        mux: &InputMux,
        resolution: SurfaceResolution,
        mut notify: impl FnMut(ShellEvent) -> bool,
    ) {
        let device: StylusDevice = self.device.clone().into();
        let capability = |result: Result<(), _>| {
            if let Err(err) = result {
                log::error!("script stylus event failed: {err}");
            }
        };
        for event in &self.events {
            let shell_event = match event {
                Event::MouseDown { button, at } => {
                    mux.mouse_down((*button).into(), (*at).into());
                    ShellEvent::Invalidate
                }
                Event::MouseMove { at } => {
                    mux.mouse_move((*at).into());
                    ShellEvent::Invalidate
                }
                Event::MouseUp { button, at } => {
                    mux.mouse_up((*button).into(), (*at).into());
                    ShellEvent::Invalidate
                }
                Event::StylusButton { index, pressed } => {
                    capability(mux.stylus_button(&device, *index, *pressed));
                    ShellEvent::Invalidate
                }
                Event::StylusDown { packets } => {
                    capability(mux.stylus_down(&device, PacketBatch::new(packets, self.stride)));
                    ShellEvent::Invalidate
                }
                Event::StylusPackets { packets } => {
                    mux.stylus_packets(PacketBatch::new(packets, self.stride));
                    ShellEvent::Invalidate
                }
                Event::StylusUp { packets } => {
                    mux.stylus_up(PacketBatch::new(packets, self.stride));
                    ShellEvent::Invalidate
                }
                Event::Gesture { button, points } => {
                    if !self.gesture(mux, &device, resolution, *button, points, &mut notify) {
                        return;
                    }
                    continue;
                }
                Event::Key { action } => ShellEvent::Action(*action),
                Event::Resize { width, height } => ShellEvent::Resize {
                    width: *width,
                    height: *height,
                },
                Event::Wait { ms } => {
                    std::thread::sleep(std::time::Duration::from_millis(*ms));
                    continue;
                }
                Event::Quit => ShellEvent::Quit,
            };
            if !notify(shell_event) {
                return;
            }
        }
    }
    /// Play a gesture into both sources, stylus first as real digitizers tend to be.
    fn gesture(
        &self,
        mux: &InputMux,
        device: &StylusDevice,
        resolution: SurfaceResolution,
        button: Button,
        points: &[[f32; 2]],
        notify: &mut impl FnMut(ShellEvent) -> bool,
    ) -> bool {
        let Some((first, rest)) = points.split_first() else {
            return true;
        };
        let (last, middle) = match rest.split_last() {
            Some(split) => split,
            None => (first, &[][..]),
        };
        let packet = |point: &[f32; 2]| -> Vec<i32> {
            let mut packet = vec![0; self.stride];
            packet[..2].copy_from_slice(&to_himetric(resolution, *point));
            packet
        };
        let button_mask = MouseButtons::from(button);
        // The stylus can only express secondary strokes through its barrel button.
        let barrel = match button {
            Button::Right => ButtonCapabilities::resolve(device)
                .map_err(|err| log::error!("gesture can't use the barrel button: {err}"))
                .ok()
                .map(|capabilities| capabilities.barrel),
            Button::Left | Button::Middle => None,
        };

        let stylus = |step: &dyn Fn()| {
            if mux.is_stylus_enabled() {
                step();
            }
        };
        if let Some(index) = barrel {
            stylus(&|| {
                let _ = mux.stylus_button(device, index, true);
            });
        }
        stylus(&|| {
            if let Err(err) = mux.stylus_down(device, PacketBatch::new(&packet(first), self.stride))
            {
                log::error!("gesture stylus down failed: {err}");
            }
        });
        mux.mouse_down(button_mask, (*first).into());
        if !notify(ShellEvent::Invalidate) {
            return false;
        }
        for point in middle {
            stylus(&|| mux.stylus_packets(PacketBatch::new(&packet(point), self.stride)));
            mux.mouse_move((*point).into());
            if !notify(ShellEvent::Invalidate) {
                return false;
            }
        }
        stylus(&|| mux.stylus_up(PacketBatch::new(&packet(last), self.stride)));
        if let Some(index) = barrel {
            stylus(&|| {
                let _ = mux.stylus_button(device, index, false);
            });
        }
        mux.mouse_up(button_mask, (*last).into());
        notify(ShellEvent::Invalidate)
    }
}

/// Inverse of the digitizer mapping, rounded to whole device units.
fn to_himetric(resolution: SurfaceResolution, [x, y]: [f32; 2]) -> [i32; 2] {
    let convert = |px: f32, dpi: f32| {
        // f32 -> i32 saturates on overflow.
        #[allow(clippy::cast_possible_truncation)]
        let hm = (px * sketchbook_core::units::HIMETRIC_PER_IN / dpi).round() as i32;
        hm
    };
    [
        convert(x, resolution.x.into_dpi()),
        convert(y, resolution.y.into_dpi()),
    ]
}

/// Replay `script` on its own thread, forwarding notifications to the shell. The shell is
/// told to quit once the script ends.
pub fn spawn_delivery(
    script: Script,
    mux: Arc<InputMux>,
    resolution: SurfaceResolution,
    events: crossbeam::channel::Sender<ShellEvent>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("Input replay".to_owned())
        .spawn(move || {
            log::debug!("replaying {} events", script.events.len());
            script.play(&mux, resolution, |event| events.send(event).is_ok());
            let _ = events.send(ShellEvent::Quit);
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use sketchbook_core::{
        alert::{AlertKind, CountingAlert},
        stroke::Point,
        units::Resolution,
    };

    const SCRIPT: &str = r#"
stride = 3

[[event]]
kind = "gesture"
points = [[10.0, 10.0], [20.0, 15.0], [30.0, 10.0]]

[[event]]
kind = "gesture"
button = "right"
points = [[5.0, 40.0], [5.0, 41.0]]

[[event]]
kind = "key"
action = "next_page"

[[event]]
kind = "resize"
width = 640
height = 480

[[event]]
kind = "quit"
"#;

    fn mux() -> (InputMux, Arc<CountingAlert>) {
        let alerts = Arc::new(CountingAlert::default());
        (
            InputMux::new(alerts.clone(), SurfaceResolution::default()),
            alerts,
        )
    }

    #[test]
    fn parses() {
        let script = Script::parse(SCRIPT).unwrap();
        assert_eq!(script.stride, 3);
        assert_eq!(script.device, Device::default());
        assert_eq!(script.events.len(), 5);
        assert_eq!(
            script.events[2],
            Event::Key {
                action: Action::NextPage
            }
        );
        assert!(Script::parse("stride = 1").is_err());
        assert!(Script::parse("[[event]]\nkind = \"dance\"").is_err());
    }

    #[test]
    fn gestures_fuse_cleanly() {
        let script = Script::parse(SCRIPT).unwrap();
        let (mux, alerts) = mux();
        let mut events = Vec::new();
        script.play(&mux, SurfaceResolution::default(), |event| {
            events.push(event);
            true
        });

        // Both gestures arrived in both queues and agree.
        let first = mux.next_stroke().unwrap();
        assert!(first.completed);
        assert_eq!(first.buttons, MouseButtons::LEFT);
        assert_eq!(first.points.len(), 3);
        assert!(first.points[0].dist2(Point::new(10.0, 10.0)) < 0.01);
        mux.remove_stroke();

        let second = mux.next_stroke().unwrap();
        assert!(second.completed);
        assert_eq!(second.buttons, MouseButtons::RIGHT);
        mux.remove_stroke();
        assert_eq!(alerts.count(AlertKind::InputDesync), 0);

        assert_eq!(
            &events[events.len() - 3..],
            [
                ShellEvent::Action(Action::NextPage),
                ShellEvent::Resize {
                    width: 640,
                    height: 480
                },
                ShellEvent::Quit,
            ]
        );
    }

    #[test]
    fn stops_when_shell_hangs_up() {
        let script = Script::parse(SCRIPT).unwrap();
        let (mux, _) = mux();
        let mut count = 0;
        script.play(&mux, SurfaceResolution::default(), |_| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn himetric_inverse() {
        let resolution = SurfaceResolution {
            x: Resolution::Dpi(96.0),
            y: Resolution::Dpi(254.0),
        };
        assert_eq!(to_himetric(resolution, [96.0, 1.0]), [2540, 10]);
    }
}
