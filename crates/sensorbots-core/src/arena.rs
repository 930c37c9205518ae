//! Reference world: a bounded rectangle with optional walls, a ground field and a
//! body registry that drives the staged interaction protocol once per [`Arena::step`].

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::fmt;
use tracing::{debug, trace};

use sensorbots_index::{NeighborhoodIndex, UniformGridIndex};

use crate::BodyId;
use crate::body::Body;
use crate::config::SimConfig;
use crate::error::{SensorError, SensorResult, ensure_non_negative};
use crate::geometry::{Color, Pose, Texture, Vector};
use crate::interaction::{StepContext, WallSide, WorldQuery};
use crate::noise::SensorRng;

/// Simulation clock (ticks stepped since construction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Colour of the ground under the world.
#[derive(Debug, Clone, PartialEq)]
pub enum GroundField {
    Uniform(Color),
    /// Row-major image stretched over the whole world; row 0 lies along `y = 0`.
    Raster {
        width: usize,
        height: usize,
        pixels: Vec<Color>,
        /// Colour reported outside the world rectangle.
        outside: Color,
    },
}

impl Default for GroundField {
    fn default() -> Self {
        Self::Uniform(Color::WHITE)
    }
}

impl GroundField {
    pub fn raster(
        width: usize,
        height: usize,
        pixels: Vec<Color>,
        outside: Color,
    ) -> SensorResult<Self> {
        if width == 0 || height == 0 {
            return Err(SensorError::InvalidConfig("ground raster must not be empty"));
        }
        if pixels.len() != width * height {
            return Err(SensorError::InvalidConfig(
                "ground raster size does not match its dimensions",
            ));
        }
        Ok(Self::Raster {
            width,
            height,
            pixels,
            outside,
        })
    }

    /// Colour at `point` in a world of the given extent.
    #[must_use]
    pub fn sample(&self, point: Vector, extent: Vector) -> Color {
        match self {
            Self::Uniform(color) => *color,
            Self::Raster {
                width,
                height,
                pixels,
                outside,
            } => {
                if !(0.0..extent.x).contains(&point.x) || !(0.0..extent.y).contains(&point.y) {
                    return *outside;
                }
                let x = ((point.x / extent.x * *width as f64) as usize).min(width - 1);
                let y = ((point.y / extent.y * *height as f64) as usize).min(height - 1);
                pixels[y * width + x]
            }
        }
    }
}

/// Static surroundings shared by every body: extent, walls and ground.
#[derive(Debug, Clone, PartialEq)]
pub struct Surroundings {
    extent: Vector,
    walls: bool,
    ground: GroundField,
    wall_textures: [Texture; 4],
}

impl Surroundings {
    /// A world spanning `[0, extent.x] × [0, extent.y]` on white ground with untextured walls.
    #[must_use]
    pub fn new(extent: Vector, walls: bool) -> Self {
        Self {
            extent,
            walls,
            ground: GroundField::default(),
            wall_textures: Default::default(),
        }
    }

    #[must_use]
    pub fn with_ground(mut self, ground: GroundField) -> Self {
        self.ground = ground;
        self
    }

    pub fn set_ground(&mut self, ground: GroundField) {
        self.ground = ground;
    }

    #[must_use]
    pub fn ground(&self) -> &GroundField {
        &self.ground
    }

    /// Paint a wall; texel 0 lies at the wall's start point.
    pub fn set_wall_texture(&mut self, side: WallSide, texture: Texture) {
        self.wall_textures[side.index()] = texture;
    }
}

impl WorldQuery for Surroundings {
    fn extent(&self) -> Vector {
        self.extent
    }

    fn has_walls(&self) -> bool {
        self.walls
    }

    fn ground_color(&self, point: Vector) -> Color {
        self.ground.sample(point, self.extent)
    }

    fn wall_texture(&self, side: WallSide) -> &[Color] {
        if self.walls {
            &self.wall_textures[side.index()]
        } else {
            &[]
        }
    }
}

/// Counters for one completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub tick: Tick,
    pub bodies: usize,
    /// `object_step` calls made across all bodies.
    pub object_steps: usize,
    /// `walls_step` calls made across all bodies.
    pub walls_steps: usize,
}

/// Body registry plus the surroundings and random source it is stepped against.
pub struct Arena {
    config: SimConfig,
    tick: Tick,
    rng: SensorRng,
    surroundings: Surroundings,
    bodies: SlotMap<BodyId, Body>,
    /// Registration order; evaluation follows it.
    order: Vec<BodyId>,
    index: UniformGridIndex,
    positions: Vec<(f64, f64)>,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("tick", &self.tick)
            .field("extent", &self.surroundings.extent)
            .field("walls", &self.surroundings.walls)
            .field("body_count", &self.bodies.len())
            .finish()
    }
}

impl Arena {
    /// Build an empty arena; walls are painted with `wall_color` when enabled.
    pub fn new(config: SimConfig) -> SensorResult<Self> {
        config.validate()?;
        let extent = Vector::new(config.world_width, config.world_height);
        let mut surroundings = Surroundings::new(extent, config.walls)
            .with_ground(GroundField::Uniform(config.ground_color));
        if config.walls {
            for side in WallSide::ALL {
                surroundings.set_wall_texture(side, vec![config.wall_color]);
            }
        }
        let rng = SensorRng::from_optional_seed(config.rng_seed);
        let index = UniformGridIndex::new(config.index_cell_size);
        debug!(
            width = config.world_width,
            height = config.world_height,
            walls = config.walls,
            seed = ?config.rng_seed,
            "arena created"
        );
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            surroundings,
            bodies: SlotMap::with_key(),
            order: Vec::new(),
            index,
            positions: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// The arena's random source, for drawing initial placements.
    pub fn rng(&mut self) -> &mut SensorRng {
        &mut self.rng
    }

    #[must_use]
    pub fn surroundings(&self) -> &Surroundings {
        &self.surroundings
    }

    pub fn surroundings_mut(&mut self) -> &mut Surroundings {
        &mut self.surroundings
    }

    pub fn add_body(&mut self, body: Body) -> BodyId {
        let id = self.bodies.insert(body);
        self.order.push(id);
        debug!(?id, count = self.order.len(), "registered body");
        id
    }

    pub fn remove_body(&mut self, id: BodyId) -> SensorResult<Body> {
        let body = self.bodies.remove(id).ok_or(SensorError::UnknownBody)?;
        self.order.retain(|other| *other != id);
        debug!(?id, count = self.order.len(), "removed body");
        Ok(body)
    }

    pub fn body(&self, id: BodyId) -> SensorResult<&Body> {
        self.bodies.get(id).ok_or(SensorError::UnknownBody)
    }

    pub fn body_mut(&mut self, id: BodyId) -> SensorResult<&mut Body> {
        self.bodies.get_mut(id).ok_or(SensorError::UnknownBody)
    }

    /// Body handles in registration order.
    pub fn body_ids(&self) -> impl Iterator<Item = BodyId> + '_ {
        self.order.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Move a body instantly, resetting its drive encoders.
    pub fn teleport(&mut self, id: BodyId, pose: Pose) -> SensorResult<()> {
        self.body_mut(id)?.teleport(pose);
        Ok(())
    }

    /// Advance every body by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> SensorResult<StepReport> {
        ensure_non_negative(dt, "dt must be finite and non-negative")?;
        let next_tick = self.tick.next();
        let Self {
            bodies,
            order,
            index,
            positions,
            rng,
            surroundings,
            ..
        } = self;

        positions.clear();
        positions.extend(order.iter().filter_map(|&id| bodies.get(id)).map(|body| {
            let p = body.state.pose.position;
            (p.x, p.y)
        }));
        index.rebuild(positions)?;
        let max_radius = bodies
            .values()
            .map(|body| body.state.radius)
            .fold(0.0, f64::max);

        let mut ctx = StepContext {
            dt,
            rng,
            world: &*surroundings,
        };
        let mut report = StepReport {
            tick: next_tick,
            bodies: order.len(),
            object_steps: 0,
            walls_steps: 0,
        };

        for &id in order.iter() {
            if let Some(body) = bodies.get_mut(id) {
                body.init_stage(id, &mut ctx);
            }
        }

        for (dense, &id) in order.iter().enumerate() {
            let Some(max_range) = bodies.get(id).and_then(Body::max_local_range) else {
                continue;
            };
            let reach = max_range + max_radius;
            for candidate in index.sorted_neighbors(dense, reach * reach) {
                let other_id = order[candidate.index];
                let Some([body, other]) = bodies.get_disjoint_mut([id, other_id]) else {
                    continue;
                };
                report.object_steps += body.interact_with(id, other, other_id, &mut ctx);
            }
        }

        let walls = surroundings.has_walls();
        for &id in order.iter() {
            let Some(body) = bodies.get_mut(id) else {
                continue;
            };
            if walls {
                report.walls_steps += body.walls_stage(id, &mut ctx);
            }
            body.global_stage(id, &mut ctx);
            body.finalize_stage(id, &mut ctx);
            body.control_stage(&mut ctx);
        }

        for &id in order.iter() {
            if let Some(body) = bodies.get_mut(id) {
                body.integrate(dt);
            }
        }

        self.tick = next_tick;
        trace!(
            tick = next_tick.0,
            bodies = report.bodies,
            object_steps = report.object_steps,
            walls_steps = report.walls_steps,
            "arena step"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyState;
    use crate::interaction::{LocalInteraction, Owner, Peer};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        range: f64,
        log: Log,
    }

    impl LocalInteraction for Probe {
        fn range(&self) -> f64 {
            self.range
        }

        fn init(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
            self.log.borrow_mut().push(format!("{}:init", self.name));
        }

        fn object_step(
            &mut self,
            _owner: &mut Owner<'_>,
            peer: &mut Peer<'_>,
            _ctx: &mut StepContext<'_>,
        ) {
            self.log
                .borrow_mut()
                .push(format!("{}:object@{}", self.name, peer.distance));
        }

        fn walls_step(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
            self.log.borrow_mut().push(format!("{}:walls", self.name));
        }

        fn finalize(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
            self.log.borrow_mut().push(format!("{}:finalize", self.name));
        }
    }

    fn arena(walls: bool) -> Arena {
        Arena::new(SimConfig {
            world_width: 100.0,
            world_height: 100.0,
            walls,
            rng_seed: Some(1),
            ..SimConfig::default()
        })
        .expect("arena")
    }

    fn body_at(x: f64, y: f64) -> Body {
        Body::new(BodyState::at(Vector::new(x, y), 0.0).with_radius(1.0))
    }

    #[test]
    fn stages_run_in_protocol_order_and_peers_nearest_first() {
        let mut arena = arena(false);
        let log: Log = Rc::default();
        let mut observer = body_at(50.0, 50.0);
        observer.add_local(Probe {
            name: "wide",
            range: 30.0,
            log: Rc::clone(&log),
        });
        observer.add_local(Probe {
            name: "narrow",
            range: 5.0,
            log: Rc::clone(&log),
        });
        arena.add_body(observer);
        arena.add_body(body_at(70.0, 50.0));
        arena.add_body(body_at(53.0, 50.0));
        arena.add_body(body_at(90.0, 50.0));

        let report = arena.step(0.1).expect("step");
        assert_eq!(
            *log.borrow(),
            [
                "wide:init",
                "narrow:init",
                "wide:object@3",
                "narrow:object@3",
                "wide:object@20",
                "wide:finalize",
                "narrow:finalize",
            ]
        );
        assert_eq!(report.object_steps, 3);
        assert_eq!(report.walls_steps, 0);
        assert_eq!(report.tick, Tick(1));
        assert_eq!(arena.tick(), Tick(1));
    }

    #[test]
    fn walls_are_offered_only_to_interactions_that_reach_them() {
        let mut arena = arena(true);
        let log: Log = Rc::default();
        let mut body = body_at(10.0, 50.0);
        body.add_local(Probe {
            name: "long",
            range: 20.0,
            log: Rc::clone(&log),
        });
        body.add_local(Probe {
            name: "short",
            range: 5.0,
            log: Rc::clone(&log),
        });
        arena.add_body(body);
        let report = arena.step(0.1).expect("step");
        assert_eq!(report.walls_steps, 1);
        assert!(log.borrow().iter().any(|entry| entry == "long:walls"));
        assert!(!log.borrow().iter().any(|entry| entry == "short:walls"));
    }

    #[test]
    fn integration_moves_bodies_after_all_stages() {
        let mut arena = arena(false);
        let mut body = body_at(10.0, 10.0);
        body.state.velocity = Vector::new(5.0, 0.0);
        body.state.angular_speed = 1.0;
        let id = arena.add_body(body);
        arena.step(0.5).expect("step");
        let state = &arena.body(id).expect("body").state;
        assert_eq!(state.pose.position, Vector::new(12.5, 10.0));
        assert_eq!(state.pose.heading, 0.5);
    }

    #[test]
    fn rejects_negative_dt_and_unknown_bodies() {
        let mut arena = arena(false);
        assert!(arena.step(-0.1).is_err());
        assert!(arena.step(f64::NAN).is_err());
        let id = arena.add_body(body_at(1.0, 1.0));
        arena.remove_body(id).expect("remove");
        assert!(arena.is_empty());
        assert_eq!(arena.body(id).err(), Some(SensorError::UnknownBody));
        assert_eq!(arena.remove_body(id).err(), Some(SensorError::UnknownBody));
        assert_eq!(arena.step(0.0).expect("empty step").bodies, 0);
    }

    #[test]
    fn raster_ground_is_stretched_over_the_world() {
        let black = Color::BLACK;
        let white = Color::WHITE;
        let ground = GroundField::raster(2, 1, vec![black, white], Color::GRAY).expect("raster");
        let world = Surroundings::new(Vector::new(100.0, 40.0), true).with_ground(ground);
        assert_eq!(world.ground_color(Vector::new(10.0, 20.0)), black);
        assert_eq!(world.ground_color(Vector::new(60.0, 39.0)), white);
        assert_eq!(world.ground_color(Vector::new(-1.0, 20.0)), Color::GRAY);
        assert_eq!(world.ground_color(Vector::new(50.0, 40.0)), Color::GRAY);
        assert!(GroundField::raster(2, 2, vec![black], black).is_err());
    }

    #[test]
    fn walls_are_painted_only_when_enabled() {
        let walled = arena(true);
        for side in WallSide::ALL {
            assert_eq!(walled.surroundings().wall_texture(side), &[Color::GRAY][..]);
        }
        let open = arena(false);
        assert!(open.surroundings().wall_texture(WallSide::North).is_empty());
    }
}
