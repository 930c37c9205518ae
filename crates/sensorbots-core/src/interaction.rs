//! Staged evaluation contract shared by every sensor and actuator.
//!
//! Once per tick the arena calls, for each attached interaction, `init`, then
//! either `object_step` against every nearby body (local interactions) or a single
//! `step` (global interactions), then `walls_step` when the walls are in reach, and
//! finally `finalize`. Interactions only write their own state, except through the
//! exchange [`Ports`] of the owner and of the peer currently being evaluated.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::BodyId;
use crate::body::{BodyState, Ports};
use crate::geometry::{Color, Vector};
use crate::noise::SensorRng;

/// The four boundary walls, in drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallSide {
    /// `(0, 0)` to `(w, 0)`.
    South,
    /// `(w, 0)` to `(w, h)`.
    East,
    /// `(w, h)` to `(0, h)`.
    North,
    /// `(0, h)` to `(0, 0)`.
    West,
}

impl WallSide {
    pub const ALL: [Self; 4] = [Self::South, Self::East, Self::North, Self::West];

    /// Wall endpoints for a world spanning `[0, extent.x] × [0, extent.y]`.
    #[must_use]
    pub fn endpoints(self, extent: Vector) -> (Vector, Vector) {
        let (w, h) = (extent.x, extent.y);
        match self {
            Self::South => (Vector::new(0.0, 0.0), Vector::new(w, 0.0)),
            Self::East => (Vector::new(w, 0.0), Vector::new(w, h)),
            Self::North => (Vector::new(w, h), Vector::new(0.0, h)),
            Self::West => (Vector::new(0.0, h), Vector::new(0.0, 0.0)),
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::South => 0,
            Self::East => 1,
            Self::North => 2,
            Self::West => 3,
        }
    }
}

/// Read-only world queries available to interactions during a tick.
pub trait WorldQuery {
    /// Size of the rectangular world.
    fn extent(&self) -> Vector;

    /// Whether the boundary walls exist.
    fn has_walls(&self) -> bool;

    /// Ground colour under `point`.
    fn ground_color(&self, point: Vector) -> Color;

    /// Texture painted along a wall; empty textures are invisible.
    fn wall_texture(&self, side: WallSide) -> &[Color];
}

/// Per-tick evaluation context.
pub struct StepContext<'a> {
    /// Duration of the tick.
    pub dt: f64,
    /// The tick's single random source.
    pub rng: &'a mut SensorRng,
    pub world: &'a dyn WorldQuery,
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("dt", &self.dt)
            .field("extent", &self.world.extent())
            .finish()
    }
}

/// The body an interaction is attached to.
#[derive(Debug)]
pub struct Owner<'a> {
    pub id: BodyId,
    pub state: &'a BodyState,
    pub ports: &'a mut Ports,
}

/// Another body being evaluated against the owner.
#[derive(Debug)]
pub struct Peer<'a> {
    pub id: BodyId,
    pub state: &'a BodyState,
    pub ports: &'a mut Ports,
    /// Centre-to-centre distance from the owner.
    pub distance: f64,
}

/// Handle to an interaction attached to a body, unique within that body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InteractionHandle(pub(crate) u32);

impl InteractionHandle {
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Interaction evaluated against every body within `range`.
///
/// Within a body, local interactions are visited widest range first; a peer is
/// offered to each interaction in turn until one whose range no longer covers it.
pub trait LocalInteraction: Any + fmt::Debug {
    /// Maximum distance, from the owner's centre to the peer's edge, this interaction cares about.
    fn range(&self) -> f64;

    fn init(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {}

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        _peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
    }

    fn walls_step(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {}

    fn finalize(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {}
}

/// Interaction evaluated once per tick against the whole world.
pub trait GlobalInteraction: Any + fmt::Debug {
    fn init(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {}

    fn step(&mut self, owner: &mut Owner<'_>, ctx: &mut StepContext<'_>);

    fn finalize(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {}
}
