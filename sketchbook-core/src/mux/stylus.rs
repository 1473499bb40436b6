//! The digitizer side of the mux.
//!
//! Samples arrive in batches of packets, each packet a run of `stride` properties of which the
//! first two are X and Y in HIMETRIC.

use hashbrown::hash_map::Entry;

use super::{owned_stroke, InputMux, MouseButtons, PendingStroke, Ticket};
use crate::{stroke::Point, units::SurfaceResolution};

/// A digitizer device, as described by the platform.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StylusDevice {
    pub id: u32,
    /// Button names, in index order.
    pub buttons: Vec<String>,
}

/// Which of a device's buttons mean what.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ButtonCapabilities {
    pub barrel: usize,
}
impl ButtonCapabilities {
    /// Find the buttons by name. Matching is a case-sensitive substring search.
    pub fn resolve(device: &StylusDevice) -> Result<Self, CapabilityError> {
        let find = |name: &'static str| {
            device
                .buttons
                .iter()
                .position(|button| button.contains(name))
                .ok_or(CapabilityError::Missing {
                    device: device.id,
                    name,
                })
        };
        // A device without a tip isn't a pen. Contact comes from `stylus_down` and `stylus_up`,
        // so the tip's index is never needed.
        find("Tip")?;
        Ok(Self {
            barrel: find("Barrel")?,
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("stylus {device} has no button named like {name:?}")]
    Missing { device: u32, name: &'static str },
}

struct DeviceState {
    capabilities: ButtonCapabilities,
    pressed: Vec<bool>,
}
impl DeviceState {
    fn barrel(&self) -> bool {
        self.pressed
            .get(self.capabilities.barrel)
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub(super) struct StylusState {
    /// Resolved on first sight of each device, never re-resolved.
    devices: hashbrown::HashMap<u32, DeviceState>,
    pending: Option<Ticket>,
}
impl StylusState {
    pub(super) fn reset(&mut self) {
        self.pending = None;
    }
    fn device(&mut self, device: &StylusDevice) -> Result<&mut DeviceState, CapabilityError> {
        Ok(match self.devices.entry(device.id) {
            Entry::Occupied(state) => state.into_mut(),
            Entry::Vacant(vacant) => {
                let capabilities = ButtonCapabilities::resolve(device)?;
                log::debug!("stylus {} buttons: {capabilities:?}", device.id);
                vacant.insert(DeviceState {
                    capabilities,
                    pressed: vec![false; device.buttons.len()],
                })
            }
        })
    }
}

/// A borrowed run of packets.
#[derive(Copy, Clone, Debug)]
pub struct PacketBatch<'a> {
    data: &'a [i32],
    stride: usize,
}
impl<'a> PacketBatch<'a> {
    /// # Panics
    /// If `stride` is too short to hold a position.
    #[must_use]
    pub fn new(data: &'a [i32], stride: usize) -> Self {
        assert!(stride >= 2, "packet stride {stride} can't hold X and Y");
        Self { data, stride }
    }
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.data.len() / self.stride
    }
    /// Packet positions in logical pixels.
    pub fn positions(&self, resolution: SurfaceResolution) -> impl Iterator<Item = Point> + 'a {
        self.data
            .chunks_exact(self.stride)
            .map(move |packet| resolution.himetric_to_logical([packet[0], packet[1]]).into())
    }
}

/// Append, skipping any point identical to the one before it.
fn extend_deduped(points: &mut Vec<Point>, new: impl Iterator<Item = Point>) {
    for point in new {
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
}

impl InputMux {
    pub fn stylus_button(
        &self,
        device: &StylusDevice,
        index: usize,
        pressed: bool,
    ) -> Result<(), CapabilityError> {
        let mut inner = self.inner.lock();
        if !inner.stylus_enabled {
            return Ok(());
        }
        let state = inner.stylus.device(device)?;
        match state.pressed.get_mut(index) {
            Some(button) => *button = pressed,
            None => log::warn!("stylus {} has no button {index}", device.id),
        }
        Ok(())
    }
    /// The stylus touched down. Holding the barrel button makes this a secondary stroke.
    ///
    /// # Panics
    /// If a stylus stroke is already underway.
    pub fn stylus_down(
        &self,
        device: &StylusDevice,
        packets: PacketBatch<'_>,
    ) -> Result<(), CapabilityError> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if !inner.stylus_enabled {
            return Ok(());
        }
        let barrel = inner.stylus.device(device)?.barrel();
        assert!(
            inner.stylus.pending.is_none(),
            "stylus {} went down with a stroke already underway",
            device.id
        );

        let ticket = inner.ticket();
        let mut points = Vec::with_capacity(packets.packet_count());
        extend_deduped(&mut points, packets.positions(inner.resolution));
        inner.stylus_strokes.push_back(PendingStroke {
            ticket,
            buttons: if barrel {
                MouseButtons::RIGHT
            } else {
                MouseButtons::LEFT
            },
            points,
            completed: false,
        });
        inner.stylus.pending = Some(ticket);
        Ok(())
    }
    pub fn stylus_packets(&self, packets: PacketBatch<'_>) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if !inner.stylus_enabled {
            return;
        }
        let Some(ticket) = inner.stylus.pending else {
            log::debug!("stylus packets with no stroke underway, ignoring");
            return;
        };
        let resolution = inner.resolution;
        match owned_stroke(&mut inner.stylus_strokes, ticket) {
            Some(stroke) => extend_deduped(&mut stroke.points, packets.positions(resolution)),
            None => log::trace!("stylus stroke was taken by the consumer, discarding packets"),
        }
    }
    pub fn stylus_up(&self, packets: PacketBatch<'_>) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if !inner.stylus_enabled {
            return;
        }
        let Some(ticket) = inner.stylus.pending.take() else {
            log::warn!("stylus up with no stroke underway, ignoring");
            return;
        };
        let resolution = inner.resolution;
        if let Some(stroke) = owned_stroke(&mut inner.stylus_strokes, ticket) {
            extend_deduped(&mut stroke.points, packets.positions(resolution));
            stroke.completed = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{mux, pen};
    use super::*;
    use crate::{alert::AlertKind, units::Resolution};

    fn stylus_points(mux: &InputMux) -> Vec<Point> {
        let mut inner = mux.inner.lock();
        inner.stylus_strokes.pop_front().unwrap().points
    }

    #[test]
    fn dedupes_repeated_packets() {
        let (mux, _) = mux();
        mux.stylus_down(&pen(), PacketBatch::new(&[0, 0, 0, 0], 2))
            .unwrap();
        mux.stylus_packets(PacketBatch::new(&[0, 0, 3, 4, 3, 4, 3, 4], 2));
        mux.stylus_up(PacketBatch::new(&[3, 4, 0, 0], 2));
        assert_eq!(
            stylus_points(&mux),
            [
                Point::new(0.0, 0.0),
                Point::new(3.0, 4.0),
                Point::new(0.0, 0.0)
            ]
        );
    }

    #[test]
    fn stride_and_resolution() {
        let (mux, _) = mux();
        mux.set_resolution(SurfaceResolution {
            x: Resolution::Dpi(96.0),
            y: Resolution::Dpi(192.0),
        });
        // X, Y, pressure
        mux.stylus_down(&pen(), PacketBatch::new(&[2540, 1270, 900, 0, 0], 3))
            .unwrap();
        mux.stylus_up(PacketBatch::new(&[], 3));
        assert_eq!(stylus_points(&mux), [Point::new(96.0, 96.0)]);
    }

    #[test]
    fn barrel_is_secondary() {
        let (mux, _) = mux();
        mux.stylus_button(&pen(), 1, true).unwrap();
        mux.stylus_down(&pen(), PacketBatch::new(&[0, 0], 2)).unwrap();
        mux.stylus_up(PacketBatch::new(&[], 2));
        mux.stylus_button(&pen(), 1, false).unwrap();
        mux.stylus_down(&pen(), PacketBatch::new(&[5, 5], 2)).unwrap();
        mux.stylus_up(PacketBatch::new(&[], 2));

        let inner = mux.inner.lock();
        let buttons: Vec<_> = inner.stylus_strokes.iter().map(|s| s.buttons).collect();
        assert_eq!(buttons, [MouseButtons::RIGHT, MouseButtons::LEFT]);
    }

    #[test]
    fn capabilities_cached_per_device() {
        let (mux, _) = mux();
        mux.stylus_button(&pen(), 1, true).unwrap();
        // Same device, described differently. The first description sticks.
        let renamed = StylusDevice {
            buttons: vec!["A".to_owned(), "B".to_owned()],
            ..pen()
        };
        mux.stylus_down(&renamed, PacketBatch::new(&[0, 0], 2))
            .unwrap();
        let inner = mux.inner.lock();
        assert_eq!(inner.stylus_strokes[0].buttons, MouseButtons::RIGHT);
    }

    #[test]
    fn missing_capabilities() {
        let eraser_only = StylusDevice {
            id: 1,
            buttons: vec!["Eraser".to_owned()],
        };
        assert_eq!(
            ButtonCapabilities::resolve(&eraser_only),
            Err(CapabilityError::Missing {
                device: 1,
                name: "Tip"
            })
        );
        let lowercase = StylusDevice {
            id: 2,
            buttons: vec!["tip".to_owned(), "barrel".to_owned()],
        };
        assert!(ButtonCapabilities::resolve(&lowercase).is_err());
        let barrel_only = StylusDevice {
            id: 3,
            buttons: vec!["Barrel Switch".to_owned()],
        };
        assert!(matches!(
            ButtonCapabilities::resolve(&barrel_only),
            Err(CapabilityError::Missing { name: "Tip", .. })
        ));
        let reordered = StylusDevice {
            id: 4,
            buttons: vec!["Barrel Switch".to_owned(), "Tip Switch".to_owned()],
        };
        assert_eq!(
            ButtonCapabilities::resolve(&reordered),
            Ok(ButtonCapabilities { barrel: 0 })
        );

        let (mux, alerts) = mux();
        assert!(mux
            .stylus_down(&eraser_only, PacketBatch::new(&[0, 0], 2))
            .is_err());
        // Failed devices start nothing.
        assert_eq!(mux.queue_lengths(), [0, 0]);
        assert_eq!(alerts.count(AlertKind::InputDesync), 0);
    }

    #[test]
    fn packets_without_stroke_ignored() {
        let (mux, _) = mux();
        mux.stylus_packets(PacketBatch::new(&[1, 1], 2));
        mux.stylus_up(PacketBatch::new(&[1, 1], 2));
        assert_eq!(mux.queue_lengths(), [0, 0]);
    }

    #[test]
    #[should_panic = "already underway"]
    fn double_down() {
        let (mux, _) = mux();
        let _ = mux.stylus_down(&pen(), PacketBatch::new(&[0, 0], 2));
        let _ = mux.stylus_down(&pen(), PacketBatch::new(&[0, 0], 2));
    }
}
