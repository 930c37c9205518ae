//! Bodies: kinematic state, exchange ports, an optional drive and attached interactions.

use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use tracing::trace;

use crate::BodyId;
use crate::config::{DriveConfig, RadioConfig, SoundSourceConfig};
use crate::drive::DifferentialDrive;
use crate::error::{SensorError, SensorResult};
use crate::geometry::{Color, Pose, Texture, Vector, normalize_angle};
use crate::interaction::{
    GlobalInteraction, InteractionHandle, LocalInteraction, Owner, Peer, StepContext,
};
use crate::sensors::acoustic::SoundSource;
use crate::sensors::radio::{CommunicationLink, RadioTransceiver};

/// Convex polygonal outline with one texture per face.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hull {
    vertices: Vec<Vector>,
    textures: Vec<Texture>,
}

impl Hull {
    /// Face `i` runs from vertex `i` to vertex `i + 1` and is painted with `textures[i]`.
    pub fn new(vertices: Vec<Vector>, textures: Vec<Texture>) -> SensorResult<Self> {
        if vertices.len() < 3 {
            return Err(SensorError::InvalidConfig("a hull needs at least three vertices"));
        }
        if textures.len() != vertices.len() {
            return Err(SensorError::InvalidConfig("a hull needs one texture per face"));
        }
        if vertices.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
            return Err(SensorError::InvalidConfig("hull vertices must be finite"));
        }
        Ok(Self { vertices, textures })
    }

    /// Axis-aligned rectangle centred on the body, every face a single colour.
    pub fn rectangle(width: f64, height: f64, color: Color) -> SensorResult<Self> {
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self::new(
            vec![
                Vector::new(-hw, -hh),
                Vector::new(hw, -hh),
                Vector::new(hw, hh),
                Vector::new(-hw, hh),
            ],
            vec![vec![color]; 4],
        )
    }

    #[must_use]
    pub fn vertices(&self) -> &[Vector] {
        &self.vertices
    }

    #[must_use]
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    /// Vertices mapped through `pose`.
    pub fn world_vertices<'a>(&'a self, pose: &'a Pose) -> impl Iterator<Item = Vector> + 'a {
        self.vertices.iter().map(move |&v| pose.to_world(v))
    }

    /// Distance from the centre to the farthest vertex.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        self.vertices
            .iter()
            .map(|v| v.norm())
            .fold(0.0, f64::max)
    }
}

/// Kinematic and visual state of a body, read by every interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BodyState {
    pub pose: Pose,
    pub velocity: Vector,
    pub angular_speed: f64,
    pub radius: f64,
    pub height: f64,
    pub color: Color,
    /// Textured outline; circular monochrome bodies have none.
    pub hull: Option<Hull>,
}

impl Default for BodyState {
    fn default() -> Self {
        Self {
            pose: Pose::default(),
            velocity: Vector::ZERO,
            angular_speed: 0.0,
            radius: 8.5,
            height: 10.0,
            color: Color::GRAY,
            hull: None,
        }
    }
}

impl BodyState {
    #[must_use]
    pub fn at(position: Vector, heading: f64) -> Self {
        Self {
            pose: Pose::new(position, heading),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    #[must_use]
    pub fn with_height(mut self, height: f64) -> Self {
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Attach a hull and grow the radius to enclose it.
    #[must_use]
    pub fn with_hull(mut self, hull: Hull) -> Self {
        self.radius = self.radius.max(hull.bounding_radius());
        self.hull = Some(hull);
        self
    }
}

/// State other bodies may touch while exchanging with this one.
#[derive(Debug, Default)]
pub struct Ports {
    pub radio: Option<CommunicationLink>,
    pub speaker: Option<SoundSource>,
}

#[derive(Debug)]
struct LocalSlot {
    handle: InteractionHandle,
    interaction: Box<dyn LocalInteraction>,
}

#[derive(Debug)]
struct GlobalSlot {
    handle: InteractionHandle,
    interaction: Box<dyn GlobalInteraction>,
}

/// A robot or object: state plus everything attached to it.
#[derive(Debug, Default)]
pub struct Body {
    pub state: BodyState,
    pub ports: Ports,
    drive: Option<DifferentialDrive>,
    locals: Vec<LocalSlot>,
    globals: Vec<GlobalSlot>,
    next_handle: u32,
}

impl Body {
    #[must_use]
    pub fn new(state: BodyState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    fn allocate_handle(&mut self) -> InteractionHandle {
        let handle = InteractionHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Attach a local interaction and keep the list ordered by descending range.
    pub fn add_local<T: LocalInteraction>(&mut self, interaction: T) -> InteractionHandle {
        let handle = self.allocate_handle();
        self.locals.push(LocalSlot {
            handle,
            interaction: Box::new(interaction),
        });
        self.sort_local_interactions();
        handle
    }

    pub fn add_global<T: GlobalInteraction>(&mut self, interaction: T) -> InteractionHandle {
        let handle = self.allocate_handle();
        self.globals.push(GlobalSlot {
            handle,
            interaction: Box::new(interaction),
        });
        handle
    }

    /// Stable sort by descending range; equal ranges keep attachment order.
    pub fn sort_local_interactions(&mut self) {
        self.locals
            .sort_by(|a, b| b.interaction.range().total_cmp(&a.interaction.range()));
    }

    /// Local handles in evaluation order.
    pub fn local_handles(&self) -> impl Iterator<Item = InteractionHandle> + '_ {
        self.locals.iter().map(|slot| slot.handle)
    }

    pub fn global_handles(&self) -> impl Iterator<Item = InteractionHandle> + '_ {
        self.globals.iter().map(|slot| slot.handle)
    }

    /// Widest local range, if any local interaction is attached.
    #[must_use]
    pub fn max_local_range(&self) -> Option<f64> {
        self.locals.first().map(|slot| slot.interaction.range())
    }

    fn local_slot(&self, handle: InteractionHandle) -> SensorResult<&LocalSlot> {
        self.locals
            .iter()
            .find(|slot| slot.handle == handle)
            .ok_or(SensorError::UnknownInteraction(handle.0))
    }

    /// Borrow a local interaction as its concrete type.
    pub fn local<T: LocalInteraction>(&self, handle: InteractionHandle) -> SensorResult<&T> {
        let any: &dyn Any = &*self.local_slot(handle)?.interaction;
        any.downcast_ref::<T>()
            .ok_or(SensorError::InteractionTypeMismatch {
                handle: handle.0,
                expected: type_name::<T>(),
            })
    }

    /// Mutate a local interaction, then re-sort so range changes take effect.
    pub fn with_local_mut<T: LocalInteraction, R>(
        &mut self,
        handle: InteractionHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> SensorResult<R> {
        let slot = self
            .locals
            .iter_mut()
            .find(|slot| slot.handle == handle)
            .ok_or(SensorError::UnknownInteraction(handle.0))?;
        let any: &mut dyn Any = &mut *slot.interaction;
        let concrete = any
            .downcast_mut::<T>()
            .ok_or(SensorError::InteractionTypeMismatch {
                handle: handle.0,
                expected: type_name::<T>(),
            })?;
        let out = f(concrete);
        self.sort_local_interactions();
        trace!(handle = handle.0, "re-sorted local interactions");
        Ok(out)
    }

    pub fn global<T: GlobalInteraction>(&self, handle: InteractionHandle) -> SensorResult<&T> {
        let slot = self
            .globals
            .iter()
            .find(|slot| slot.handle == handle)
            .ok_or(SensorError::UnknownInteraction(handle.0))?;
        let any: &dyn Any = &*slot.interaction;
        any.downcast_ref::<T>()
            .ok_or(SensorError::InteractionTypeMismatch {
                handle: handle.0,
                expected: type_name::<T>(),
            })
    }

    pub fn global_mut<T: GlobalInteraction>(
        &mut self,
        handle: InteractionHandle,
    ) -> SensorResult<&mut T> {
        let slot = self
            .globals
            .iter_mut()
            .find(|slot| slot.handle == handle)
            .ok_or(SensorError::UnknownInteraction(handle.0))?;
        let any: &mut dyn Any = &mut *slot.interaction;
        any.downcast_mut::<T>()
            .ok_or(SensorError::InteractionTypeMismatch {
                handle: handle.0,
                expected: type_name::<T>(),
            })
    }

    /// Install a radio port and the transceiver that drives it.
    pub fn attach_radio(&mut self, config: &RadioConfig) -> SensorResult<InteractionHandle> {
        let transceiver = RadioTransceiver::new(config)?;
        self.ports.radio = Some(CommunicationLink::new());
        Ok(self.add_local(transceiver))
    }

    pub fn attach_speaker(&mut self, config: &SoundSourceConfig) -> SensorResult<()> {
        self.ports.speaker = Some(SoundSource::new(config)?);
        Ok(())
    }

    /// Install a differential drive anchored at the current pose.
    pub fn attach_drive(&mut self, config: DriveConfig) -> SensorResult<()> {
        let mut drive = DifferentialDrive::new(config)?;
        drive.reset_encoders(self.state.pose);
        self.drive = Some(drive);
        Ok(())
    }

    #[must_use]
    pub fn drive(&self) -> Option<&DifferentialDrive> {
        self.drive.as_ref()
    }

    pub fn drive_mut(&mut self) -> Option<&mut DifferentialDrive> {
        self.drive.as_mut()
    }

    /// Move the body instantly; the drive's encoders are reset to the new pose.
    pub fn teleport(&mut self, pose: Pose) {
        self.state.pose = pose;
        if let Some(drive) = &mut self.drive {
            drive.reset_encoders(pose);
        }
    }

    pub(crate) fn init_stage(&mut self, id: BodyId, ctx: &mut StepContext<'_>) {
        let Self {
            state,
            ports,
            locals,
            globals,
            ..
        } = self;
        let mut owner = Owner { id, state, ports };
        for slot in locals.iter_mut() {
            slot.interaction.init(&mut owner, ctx);
        }
        for slot in globals.iter_mut() {
            slot.interaction.init(&mut owner, ctx);
        }
    }

    /// Offer `other` to each local interaction, widest first, until one does not reach it.
    ///
    /// Returns the number of `object_step` calls made.
    pub(crate) fn interact_with(
        &mut self,
        id: BodyId,
        other: &mut Body,
        other_id: BodyId,
        ctx: &mut StepContext<'_>,
    ) -> usize {
        let Self {
            state,
            ports,
            locals,
            ..
        } = self;
        let dist_sq = (other.state.pose.position - state.pose.position).norm2();
        let mut owner = Owner { id, state, ports };
        let mut peer = Peer {
            id: other_id,
            state: &other.state,
            ports: &mut other.ports,
            distance: dist_sq.sqrt(),
        };
        let mut calls = 0;
        for slot in locals.iter_mut() {
            let reach = slot.interaction.range() + peer.state.radius;
            if dist_sq >= reach * reach {
                break;
            }
            slot.interaction.object_step(&mut owner, &mut peer, ctx);
            calls += 1;
        }
        calls
    }

    /// Run `walls_step` on each local interaction whose range crosses a wall, widest first.
    pub(crate) fn walls_stage(&mut self, id: BodyId, ctx: &mut StepContext<'_>) -> usize {
        let Self {
            state,
            ports,
            locals,
            ..
        } = self;
        let extent = ctx.world.extent();
        let position = state.pose.position;
        let mut owner = Owner { id, state, ports };
        let mut calls = 0;
        for slot in locals.iter_mut() {
            let r = slot.interaction.range();
            let reaches = position.x - r < 0.0
                || position.y - r < 0.0
                || position.x + r > extent.x
                || position.y + r > extent.y;
            if !reaches {
                break;
            }
            slot.interaction.walls_step(&mut owner, ctx);
            calls += 1;
        }
        calls
    }

    pub(crate) fn global_stage(&mut self, id: BodyId, ctx: &mut StepContext<'_>) {
        let Self {
            state,
            ports,
            globals,
            ..
        } = self;
        let mut owner = Owner { id, state, ports };
        for slot in globals.iter_mut() {
            slot.interaction.step(&mut owner, ctx);
        }
    }

    pub(crate) fn finalize_stage(&mut self, id: BodyId, ctx: &mut StepContext<'_>) {
        let Self {
            state,
            ports,
            locals,
            globals,
            ..
        } = self;
        let mut owner = Owner { id, state, ports };
        for slot in locals.iter_mut() {
            slot.interaction.finalize(&mut owner, ctx);
        }
        for slot in globals.iter_mut() {
            slot.interaction.finalize(&mut owner, ctx);
        }
    }

    pub(crate) fn control_stage(&mut self, ctx: &mut StepContext<'_>) {
        if let Some(drive) = &mut self.drive {
            drive.control_step(&mut self.state, ctx.dt, ctx.rng);
        }
    }

    /// Advance the pose by the current velocity and angular speed.
    pub(crate) fn integrate(&mut self, dt: f64) {
        let state = &mut self.state;
        state.pose.position += state.velocity * dt;
        state.pose.heading = normalize_angle(state.pose.heading + state.angular_speed * dt);
    }
}
