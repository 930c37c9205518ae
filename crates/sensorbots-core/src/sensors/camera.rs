//! One-dimensional cameras: a single-field circular camera and a full-circle composite.

use std::f64::consts::{PI, TAU};
use std::fmt;
use std::rc::Rc;

use crate::body::BodyState;
use crate::config::{CameraConfig, CompositeCameraConfig};
use crate::error::{SensorError, SensorResult, ensure_non_negative, ensure_positive};
use crate::geometry::{Color, Pose, Vector, normalize_angle};
use crate::interaction::{LocalInteraction, Owner, Peer, StepContext, WallSide, WorldQuery};

/// Slack when snapping segment ends to pixel rays.
const ANGLE_EPSILON: f64 = 1e-9;

/// Per-pixel write performed when an object or wall covers a pixel.
pub trait PixelOperation: fmt::Debug {
    /// `depth` and `object_depth` are squared distances.
    fn apply(&self, depth: &mut f64, pixel: &mut Color, object_depth: f64, object_color: Color);
}

/// Keep the nearest surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthTest;

impl PixelOperation for DepthTest {
    fn apply(&self, depth: &mut f64, pixel: &mut Color, object_depth: f64, object_color: Color) {
        if object_depth < *depth {
            *depth = object_depth;
            *pixel = object_color;
        }
    }
}

/// Camera with `pixel_count` pixels spread over `[-half_fov, +half_fov]` around its axis.
///
/// Pixel 0 looks at `-half_fov` (clockwise edge); the depth buffer stores squared
/// distances and reads +∞ where nothing was seen.
#[derive(Debug, Clone)]
pub struct CircularCam {
    config: CameraConfig,
    absolute_position: Vector,
    absolute_orientation: f64,
    depth: Vec<f64>,
    image: Vec<Color>,
    pixel_operation: Rc<dyn PixelOperation>,
}

impl CircularCam {
    pub fn new(config: CameraConfig) -> SensorResult<Self> {
        config.validate()?;
        let n = config.pixel_count;
        Ok(Self {
            config,
            absolute_position: Vector::ZERO,
            absolute_orientation: 0.0,
            depth: vec![f64::INFINITY; n],
            image: vec![Color::BLACK; n],
            pixel_operation: Rc::new(DepthTest),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn set_range(&mut self, range: f64) -> SensorResult<()> {
        ensure_positive(range, "camera range must be positive")?;
        self.config.range = range;
        Ok(())
    }

    pub fn set_height(&mut self, height: f64) {
        self.config.height = height;
    }

    pub fn set_fog_conditions(
        &mut self,
        use_fog: bool,
        density: f64,
        light_threshold: Color,
    ) -> SensorResult<()> {
        ensure_non_negative(density, "fog_density must be non-negative")?;
        self.config.use_fog = use_fog;
        self.config.fog_density = density;
        self.config.light_threshold = light_threshold;
        Ok(())
    }

    pub fn set_pixel_operation(&mut self, operation: Rc<dyn PixelOperation>) {
        self.pixel_operation = operation;
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.depth.len()
    }

    /// Squared distance per pixel.
    #[must_use]
    pub fn depth_buffer(&self) -> &[f64] {
        &self.depth
    }

    #[must_use]
    pub fn image(&self) -> &[Color] {
        &self.image
    }

    /// Distance seen by pixel `index`.
    pub fn distance(&self, index: usize) -> SensorResult<f64> {
        self.depth
            .get(index)
            .map(|d| d.sqrt())
            .ok_or(SensorError::RayOutOfRange {
                index,
                len: self.depth.len(),
            })
    }

    pub fn color(&self, index: usize) -> SensorResult<Color> {
        self.image.get(index).copied().ok_or(SensorError::RayOutOfRange {
            index,
            len: self.image.len(),
        })
    }

    /// Viewing angle of pixel `index`, relative to the camera axis.
    #[must_use]
    pub fn pixel_angle(&self, index: usize) -> f64 {
        -self.config.half_field_of_view + index as f64 * self.pixel_step()
    }

    fn pixel_step(&self) -> f64 {
        2.0 * self.config.half_field_of_view / (self.pixel_count() - 1) as f64
    }

    #[must_use]
    pub fn absolute_position(&self) -> Vector {
        self.absolute_position
    }

    #[must_use]
    pub fn absolute_orientation(&self) -> f64 {
        self.absolute_orientation
    }

    /// Place the camera on its owner and clear both buffers.
    pub fn begin(&mut self, pose: &Pose) {
        self.absolute_position = pose.to_world(self.config.offset);
        self.absolute_orientation = pose.heading + self.config.angle_offset;
        self.depth.fill(f64::INFINITY);
        self.image.fill(Color::BLACK);
    }

    /// Project another body into the buffers.
    pub fn draw_body(&mut self, body: &BodyState) {
        if self.config.height > body.height {
            return;
        }
        if let Some(hull) = &body.hull {
            let vertices: Vec<Vector> = hull.world_vertices(&body.pose).collect();
            for (i, texture) in hull.textures().iter().enumerate() {
                let next = vertices[(i + 1) % vertices.len()];
                self.draw_textured_segment(vertices[i], next, texture);
            }
            return;
        }
        self.draw_disc(body.pose.position, body.radius, body.color);
    }

    fn draw_disc(&mut self, center: Vector, radius: f64, color: Color) {
        if radius <= 0.0 {
            return;
        }
        let to_center = center - self.absolute_position;
        let distance = to_center.norm();
        if distance == 0.0 {
            return;
        }
        let half = self.config.half_field_of_view;
        let angle = normalize_angle(to_center.angle() - self.absolute_orientation);
        let aperture = (radius / distance).atan();
        let (begin, end) = (angle - aperture, angle + aperture);
        if begin > half || end < -half {
            return;
        }
        let last = (self.pixel_count() - 1) as f64;
        let first_pixel = (last * 0.5 * (begin.max(-half) / half + 1.0)).floor() as usize;
        let last_pixel = (last * 0.5 * (end.min(half) / half + 1.0)).ceil() as usize;
        let last_pixel = last_pixel.min(self.pixel_count() - 1);
        let distance_sq = distance * distance;
        for i in first_pixel..=last_pixel {
            self.pixel_operation
                .apply(&mut self.depth[i], &mut self.image[i], distance_sq, color);
        }
    }

    /// Draw the textured segment `p0 → p1`; texel 0 lies at `p0`.
    pub fn draw_textured_segment(&mut self, p0: Vector, p1: Vector, texture: &[Color]) {
        if texture.is_empty() {
            return;
        }
        let half = self.config.half_field_of_view;
        let mut a = (p0 - self.absolute_position).rotated(-self.absolute_orientation);
        let mut b = (p1 - self.absolute_position).rotated(-self.absolute_orientation);
        let mut a_dir = a.angle();
        let mut b_dir = b.angle();
        let mut inverted = false;
        if a_dir > b_dir {
            std::mem::swap(&mut a_dir, &mut b_dir);
            std::mem::swap(&mut a, &mut b);
            inverted = !inverted;
        }
        // The segment crosses the backward axis: walk it the other way round.
        if b_dir - a_dir > PI {
            if a_dir < -half && b_dir > half {
                return;
            }
            std::mem::swap(&mut a_dir, &mut b_dir);
            std::mem::swap(&mut a, &mut b);
            if b_dir < -half {
                b_dir += TAU;
            } else {
                a_dir -= TAU;
            }
            inverted = !inverted;
        }
        if b_dir < -half || a_dir > half {
            return;
        }

        let step = self.pixel_step();
        let first = ((a_dir.max(-half) + half) / step - ANGLE_EPSILON).ceil().max(0.0);
        let last = ((b_dir.min(half) + half) / step + ANGLE_EPSILON).floor();
        if last < first {
            return;
        }
        let first = first as usize;
        let last = (last as usize).min(self.pixel_count() - 1);
        let segment = b - a;
        let texels = texture.len();
        for i in first..=last {
            let ray = Vector::from_angle(self.pixel_angle(i));
            let denominator = ray.cross(segment);
            if denominator == 0.0 {
                continue;
            }
            let lambda = a.cross(ray) / denominator;
            let (point, texel) = if lambda < 0.0 {
                (a, 0)
            } else if lambda >= 1.0 {
                (b, texels - 1)
            } else {
                let texel = ((lambda * texels as f64).floor() as usize).min(texels - 1);
                (a + segment * lambda, texel)
            };
            let texel = if inverted { texels - 1 - texel } else { texel };
            self.pixel_operation.apply(
                &mut self.depth[i],
                &mut self.image[i],
                point.norm2(),
                texture[texel],
            );
        }
    }

    /// Draw every non-empty wall texture.
    pub fn draw_walls(&mut self, world: &dyn WorldQuery) {
        let extent = world.extent();
        for side in WallSide::ALL {
            let (start, end) = side.endpoints(extent);
            self.draw_textured_segment(start, end, world.wall_texture(side));
        }
    }

    /// With fog enabled, dim the image by distance and cut light below the threshold.
    ///
    /// Without fog the image is left as drawn.
    pub fn end(&mut self) {
        let config = &self.config;
        if !config.use_fog {
            return;
        }
        for (pixel, depth) in self.image.iter_mut().zip(&self.depth) {
            if depth.is_finite() {
                *pixel = pixel.scaled(1.0 / (1.0 + config.fog_density * depth.sqrt()));
            }
            *pixel = pixel.thresholded(config.light_threshold);
        }
    }
}

impl LocalInteraction for CircularCam {
    fn range(&self) -> f64 {
        self.config.range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.begin(&owner.state.pose);
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        self.draw_body(peer.state);
    }

    fn walls_step(&mut self, _owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.draw_walls(ctx.world);
    }

    fn finalize(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.end();
    }
}

/// Two half-field cameras looking at `-π/2` and `+π/2`, fused into one 360° buffer.
///
/// After `finalize`, indices `[0, h)` hold the clockwise half and `[h, 2h)` the
/// counter-clockwise half, where `h` is the per-half pixel count.
#[derive(Debug, Clone)]
pub struct CompositeCamera {
    config: CompositeCameraConfig,
    halves: [CircularCam; 2],
    depth: Vec<f64>,
    image: Vec<Color>,
}

impl CompositeCamera {
    pub fn new(config: CompositeCameraConfig) -> SensorResult<Self> {
        config.validate()?;
        let halves = [
            CircularCam::new(config.half(-PI / 2.0))?,
            CircularCam::new(config.half(PI / 2.0))?,
        ];
        let n = config.half_pixel_count * 2;
        Ok(Self {
            config,
            halves,
            depth: vec![f64::INFINITY; n],
            image: vec![Color::BLACK; n],
        })
    }

    #[must_use]
    pub fn config(&self) -> &CompositeCameraConfig {
        &self.config
    }

    #[must_use]
    pub fn halves(&self) -> &[CircularCam; 2] {
        &self.halves
    }

    #[must_use]
    pub fn half_pixel_count(&self) -> usize {
        self.config.half_pixel_count
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.depth.len()
    }

    /// Change the range of both halves.
    ///
    /// When attached to a body, call through `Body::with_local_mut` so the owner
    /// re-sorts its local interactions.
    pub fn set_range(&mut self, range: f64) -> SensorResult<()> {
        for half in &mut self.halves {
            half.set_range(range)?;
        }
        self.config.range = range;
        Ok(())
    }

    pub fn set_height(&mut self, height: f64) {
        for half in &mut self.halves {
            half.set_height(height);
        }
        self.config.height = height;
    }

    pub fn set_fog_conditions(
        &mut self,
        use_fog: bool,
        density: f64,
        light_threshold: Color,
    ) -> SensorResult<()> {
        for half in &mut self.halves {
            half.set_fog_conditions(use_fog, density, light_threshold)?;
        }
        self.config.use_fog = use_fog;
        self.config.fog_density = density;
        self.config.light_threshold = light_threshold;
        Ok(())
    }

    pub fn set_pixel_operation(&mut self, operation: Rc<dyn PixelOperation>) {
        for half in &mut self.halves {
            half.set_pixel_operation(Rc::clone(&operation));
        }
    }

    /// Fused squared distances.
    #[must_use]
    pub fn depth_buffer(&self) -> &[f64] {
        &self.depth
    }

    #[must_use]
    pub fn image(&self) -> &[Color] {
        &self.image
    }

    pub fn distance(&self, index: usize) -> SensorResult<f64> {
        self.depth
            .get(index)
            .map(|d| d.sqrt())
            .ok_or(SensorError::RayOutOfRange {
                index,
                len: self.depth.len(),
            })
    }

    pub fn color(&self, index: usize) -> SensorResult<Color> {
        self.image.get(index).copied().ok_or(SensorError::RayOutOfRange {
            index,
            len: self.image.len(),
        })
    }

    pub fn begin(&mut self, pose: &Pose) {
        for half in &mut self.halves {
            half.begin(pose);
        }
    }

    pub fn draw_body(&mut self, body: &BodyState) {
        for half in &mut self.halves {
            half.draw_body(body);
        }
    }

    pub fn draw_walls(&mut self, world: &dyn WorldQuery) {
        for half in &mut self.halves {
            half.draw_walls(world);
        }
    }

    /// Finish both halves and concatenate their buffers.
    pub fn end(&mut self) {
        self.depth.clear();
        self.image.clear();
        for half in &mut self.halves {
            half.end();
            self.depth.extend_from_slice(half.depth_buffer());
            self.image.extend_from_slice(half.image());
        }
    }
}

impl LocalInteraction for CompositeCamera {
    fn range(&self) -> f64 {
        self.config.range
    }

    fn init(&mut self, owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.begin(&owner.state.pose);
    }

    fn object_step(
        &mut self,
        _owner: &mut Owner<'_>,
        peer: &mut Peer<'_>,
        _ctx: &mut StepContext<'_>,
    ) {
        self.draw_body(peer.state);
    }

    fn walls_step(&mut self, _owner: &mut Owner<'_>, ctx: &mut StepContext<'_>) {
        self.draw_walls(ctx.world);
    }

    fn finalize(&mut self, _owner: &mut Owner<'_>, _ctx: &mut StepContext<'_>) {
        self.end();
    }
}
