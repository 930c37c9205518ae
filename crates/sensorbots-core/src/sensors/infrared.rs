//! Infrared proximity sensor casting a fan of rays against bodies and walls.

use std::f64::consts::PI;
use std::fmt;
use std::rc::Rc;

use crate::body::BodyState;
use crate::config::InfraredSensorConfig;
use crate::error::{SensorError, SensorResult};
use crate::geometry::{Color, Vector};
use crate::interaction::{LocalInteraction, Owner, Peer, StepContext};
use crate::noise::SensorRng;

/// Parallel rays closer than this to a hull face never cross it.
const PARALLEL_EPSILON: f64 = 1e-8;

/// Turns the distance a ray measured into an activation.
///
/// `distance` is +∞ when the ray hit nothing and 0 when the sensor sits inside an
/// obstacle. Noise belongs in the response.
pub trait InfraredResponse: fmt::Debug {
    fn respond(&self, distance: f64, color: Color, rng: &mut SensorRng) -> f64;
}

/// Linear below 0.5, exponential decay beyond, then `×(0.97 + U(0, 0.06)) + U(0, 20)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProximityResponse;

impl InfraredResponse for ProximityResponse {
    fn respond(&self, distance: f64, _color: Color, rng: &mut SensorRng) -> f64 {
        let distance = distance.max(0.0);
        let base = if distance < 0.5 {
            -440.0 * distance + 2965.98144
        } else {
            4526.0 * (-0.9994 * distance).exp()
        };
        base * rng.jitter_factor(0.97, 0.06) + rng.uniform(20.0)
    }
}

/// Sensor with `ray_count` rays fanned over `[-aperture, +aperture]` around its axis.
///
/// Ray values are distances from the sensor, +∞ where nothing was hit. The
/// activation is the sum of the per-ray responses times `0.93 + U(0, 0.14)`.
#[derive(Debug, Clone)]
pub struct InfraredSensor {
    config: InfraredSensorConfig,
    responses: Vec<Rc<dyn InfraredResponse>>,
    ray_angles: Vec<f64>,
    interaction_range: f64,
    smart_radius: f64,
    smart_offset: Vector,
    absolute_position: Vector,
    absolute_orientation: f64,
    absolute_smart_position: Vector,
    ray_values: Vec<f64>,
    ray_colors: Vec<Color>,
    value: f64,
}

impl InfraredSensor {
    pub fn new(config: InfraredSensorConfig) -> SensorResult<Self> {
        Self::with_response(config, Rc::new(ProximityResponse))
    }

    /// Share one response between every ray.
    pub fn with_response(
        config: InfraredSensorConfig,
        response: Rc<dyn InfraredResponse>,
    ) -> SensorResult<Self> {
        let responses = vec![response; config.ray_count];
        Self::with_responses(config, responses)
    }

    /// One response per ray, in ray order.
    pub fn with_responses(
        config: InfraredSensorConfig,
        responses: Vec<Rc<dyn InfraredResponse>>,
    ) -> SensorResult<Self> {
        config.validate()?;
        if responses.len() != config.ray_count {
            return Err(SensorError::InvalidConfig("one infrared response per ray"));
        }
        let n = config.ray_count;
        let ray_angles = if n == 1 {
            vec![0.0]
        } else {
            (0..n)
                .map(|i| -config.aperture + i as f64 * 2.0 * config.aperture / (n - 1) as f64)
                .collect()
        };
        let range = config.range;
        let offset = config.offset;
        // Farthest point of the central ray from the body centre.
        let interaction_range = (offset.norm2() + range * range
            - 2.0 * offset.norm() * range * (PI - config.orientation + offset.angle()).cos())
        .max(0.0)
        .sqrt();
        let smart_radius = if n == 1 {
            range / 2.0
        } else {
            range * (1.25 - config.aperture.cos()).sqrt()
        };
        let smart_offset = Vector::from_angle(config.orientation) * (range / 2.0);
        Ok(Self {
            config,
            responses,
            ray_angles,
            interaction_range,
            smart_radius,
            smart_offset,
            absolute_position: Vector::ZERO,
            absolute_orientation: 0.0,
            absolute_smart_position: Vector::ZERO,
            ray_values: vec![f64::INFINITY; n],
            ray_colors: vec![Color::WHITE; n],
            value: 0.0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &InfraredSensorConfig {
        &self.config
    }

    #[must_use]
    pub fn ray_count(&self) -> usize {
        self.ray_angles.len()
    }

    /// Ray directions relative to the sensor axis.
    #[must_use]
    pub fn ray_angles(&self) -> &[f64] {
        &self.ray_angles
    }

    /// Radius of the circle around the middle of the central ray that bounds the fan.
    #[must_use]
    pub fn smart_radius(&self) -> f64 {
        self.smart_radius
    }

    #[must_use]
    pub fn absolute_position(&self) -> Vector {
        self.absolute_position
    }

    #[must_use]
    pub fn absolute_orientation(&self) -> f64 {
        self.absolute_orientation
    }

    #[must_use]
    pub fn absolute_smart_position(&self) -> Vector {
        self.absolute_smart_position
    }

    #[must_use]
    pub fn ray_values(&self) -> &[f64] {
        &self.ray_values
    }

    #[must_use]
    pub fn ray_colors(&self) -> &[Color] {
        &self.ray_colors
    }

    /// Distance along the central ray, capped at the range.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.ray_values[self.ray_values.len() / 2].min(self.config.range)
    }

    /// Activation computed at the end of the last tick.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    fn ray_direction(&self, ray: usize) -> Vector {
        Vector::from_angle(self.absolute_orientation + self.ray_angles[ray])
    }

    fn record(&mut self, ray: usize, distance: f64, color: Color) {
        if distance < self.ray_values[ray] {
            self.ray_values[ray] = distance;
            self.ray_colors[ray] = color;
        }
    }

    /// Cast every ray against a body's hull or bounding disc.
    pub fn cast_at_body(&mut self, body: &BodyState) {
        if self.config.height > body.height {
            return;
        }
        let reach = body.radius + self.smart_radius;
        if (body.pose.position - self.absolute_smart_position).norm2() > reach * reach {
            return;
        }
        let to_center = body.pose.position - self.absolute_position;
        let r2 = body.radius * body.radius;
        let hull = body.hull.as_ref().map(|hull| {
            let mut vertices: Vec<Vector> = hull.world_vertices(&body.pose).collect();
            if signed_area(&vertices) < 0.0 {
                vertices.reverse();
            }
            vertices
        });
        for ray in 0..self.ray_count() {
            let direction = self.ray_direction(ray);
            let sine = direction.cross(to_center) / to_center.norm().max(f64::MIN_POSITIVE);
            let normal2 = to_center.norm2() * sine * sine;
            if normal2 >= r2 {
                continue;
            }
            // The bounding disc lies entirely behind the sensor.
            if to_center.dot(direction) < 0.0 && to_center.norm2() > r2 {
                continue;
            }
            let distance = match &hull {
                Some(vertices) => ray_polygon_distance(
                    self.absolute_position,
                    direction * self.config.range,
                    vertices,
                ),
                None => ((to_center.norm2() - normal2).sqrt() - (r2 - normal2).sqrt()).max(0.0),
            };
            self.record(ray, distance, body.color);
        }
    }

    /// Cast every ray against the walls of a `[0, extent.x] × [0, extent.y]` world.
    pub fn cast_at_walls(&mut self, extent: Vector) {
        let smart = self.absolute_smart_position;
        let r = self.smart_radius;
        let clear_of_walls = smart.x - r > 0.0
            && smart.y - r > 0.0
            && smart.x + r < extent.x
            && smart.y + r < extent.y;
        if clear_of_walls {
            return;
        }
        let p = self.absolute_position;
        if p.x < 0.0 || p.y < 0.0 || p.x > extent.x || p.y > extent.y {
            self.ray_values.fill(0.0);
            self.ray_colors.fill(Color::WHITE);
            return;
        }
        let range = self.config.range;
        for ray in 0..self.ray_count() {
            let end = p + self.ray_direction(ray) * range;
            let along_x = if end.x < 0.0 {
                -p.x / (end.x - p.x)
            } else if end.x > extent.x {
                (extent.x - p.x) / (end.x - p.x)
            } else {
                f64::INFINITY
            };
            let along_y = if end.y < 0.0 {
                -p.y / (end.y - p.y)
            } else if end.y > extent.y {
                (extent.y - p.y) / (end.y - p.y)
            } else {
                f64::INFINITY
            };
            self.record(ray, along_x.min(along_y) * range, Color::WHITE);
        }
    }
}

fn signed_area(vertices: &[Vector]) -> f64 {
    let n = vertices.len();
    (0..n)
        .map(|i| vertices[i].cross(vertices[(i + 1) % n]))
        .sum::<f64>()
        * 0.5
}

/// Distance from `origin` to where the segment `origin + t·ray, t ∈ [0, 1]` enters a
/// counter-clockwise convex polygon, +∞ on a miss.
fn ray_polygon_distance(origin: Vector, ray: Vector, vertices: &[Vector]) -> f64 {
    let n = vertices.len();
    let mut entering: f64 = 0.0;
    let mut leaving: f64 = 1.0;
    for i in 0..n {
        let edge = vertices[(i + 1) % n] - vertices[i];
        let numerator = edge.cross(origin - vertices[i]);
        let denominator = -edge.cross(ray);
        if denominator.abs() < PARALLEL_EPSILON {
            if numerator < 0.0 {
                return f64::INFINITY;
            }
            continue;
        }
        let t = numerator / denominator;
        if denominator < 0.0 {
            entering = entering.max(t);
        } else {
            leaving = leaving.min(t);
        }
        if entering > leaving {
            return f64::INFINITY;
        }
    }
    (ray * entering).norm()
}

impl LocalInteraction for InfraredSensor {
    fn range(&self) -> f64 {
        self.interaction_range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        let pose = owner.state.pose;
        self.ray_values.fill(f64::INFINITY);
        self.ray_colors.fill(Color::WHITE);
        self.absolute_position = pose.to_world(self.config.offset);
        self.absolute_orientation = pose.heading + self.config.orientation;
        self.absolute_smart_position =
            self.absolute_position + self.smart_offset.rotated(pose.heading);
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        self.cast_at_body(peer.state);
    }

    fn walls_step(&mut self, _owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.cast_at_walls(ctx.world.extent());
    }

    fn finalize(&mut self, _owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        let mut total = 0.0;
        for ((response, &distance), &color) in self
            .responses
            .iter()
            .zip(&self.ray_values)
            .zip(&self.ray_colors)
        {
            total += response.respond(distance, color, ctx.rng);
        }
        self.value = total * ctx.rng.jitter_factor(0.93, 0.14);
    }
}
