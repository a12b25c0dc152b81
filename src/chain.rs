use float_cmp::approx_eq;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    params::{BodyParams, Side},
    readout::{BodyPose, SegmentPose},
    types::Point,
};

/// Share of each correction applied to the tail (`stiffness`) versus the head
/// (`1 - stiffness`), and an overall damping of the correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stiffness {
    pub stiffness: f32,
    pub damping: f32,
}

impl Stiffness {
    pub fn from_params(params: &BodyParams) -> Self {
        Self {
            stiffness: params.stiffness,
            damping: params.damping,
        }
    }
}

impl Default for Stiffness {
    fn default() -> Self {
        Self {
            stiffness: 0.998,
            damping: 0.99,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    size: f32,
    pub head: Point,
    pub tail: Point,
}

impl Segment {
    pub fn new(size: f32, head: Point, tail: Point) -> Self {
        Self { size, head, tail }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn length(&self) -> f32 {
        self.head.distance(&self.tail)
    }

    /// Pulls head and tail towards a separation of `size`.
    pub fn relax(&mut self, stiffness: Stiffness) {
        let mut dx = self.head.x - self.tail.x;
        let mut dy = self.head.y - self.tail.y;
        let mut dist = dx.hypot(dy);

        // coincident points have no direction to correct along
        if dist <= f32::EPSILON {
            self.tail.x = self.head.x - self.size;
            self.tail.y = self.head.y;
            dx = self.size;
            dy = 0.0;
            dist = self.size;
        }

        let force = (0.5 - self.size / dist * 0.5) * stiffness.damping;
        let fx = force * dx;
        let fy = force * dy;

        self.tail.x += fx * stiffness.stiffness * 2.0;
        self.tail.y += fy * stiffness.stiffness * 2.0;
        self.head.x -= fx * (1.0 - stiffness.stiffness) * 2.0;
        self.head.y -= fy * (1.0 - stiffness.stiffness) * 2.0;
    }

    pub fn pose(&self) -> SegmentPose {
        SegmentPose {
            head: self.head,
            tail: self.tail,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chain {
    segments: Vec<Segment>,
    stiffness: Stiffness,
}

impl Chain {
    /// Segments are linked head to tail.
    pub fn from_segments(mut segments: Vec<Segment>, stiffness: Stiffness) -> Self {
        for i in 1..segments.len() {
            segments[i].head = segments[i - 1].tail;
        }

        Self {
            segments,
            stiffness,
        }
    }

    /// Scatters all points uniformly over `[0, extent]^2`.
    pub fn random<R: Rng + ?Sized>(
        segment_count: usize,
        size: f32,
        extent: f32,
        stiffness: Stiffness,
        rng: &mut R,
    ) -> Self {
        let mut random_point = || Point::new(rng.gen::<f32>() * extent, rng.gen::<f32>() * extent);

        let segments = (0..segment_count)
            .map(|_| Segment::new(size, random_point(), random_point()))
            .collect();

        Self::from_segments(segments, stiffness)
    }

    /// Laid out along the negative x axis from `origin`, already at rest.
    pub fn straight(segment_count: usize, size: f32, origin: Point, stiffness: Stiffness) -> Self {
        let segments = (0..segment_count)
            .map(|i| {
                let head = Point::new(origin.x - i as f32 * size, origin.y);
                let tail = Point::new(head.x - size, origin.y);
                Segment::new(size, head, tail)
            })
            .collect();

        Self::from_segments(segments, stiffness)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Pins the first head to `target` and relaxes the whole chain.
    pub fn update(&mut self, target: Point) {
        if let Some(first) = self.segments.first_mut() {
            first.head = target;
        }

        self.relax();
    }

    /// Relaxes every segment in order. Each head is re-seated on the preceding
    /// tail before relaxing, and the preceding tail follows the head afterwards.
    pub fn relax(&mut self) {
        for i in 0..self.segments.len() {
            if i > 0 {
                self.segments[i].head = self.segments[i - 1].tail;
            }

            self.segments[i].relax(self.stiffness);

            if i > 0 {
                self.segments[i - 1].tail = self.segments[i].head;
            }
        }
    }

    /// Largest relative deviation of any segment from its rest length.
    pub fn max_strain(&self) -> f32 {
        self.segments
            .iter()
            .map(|segment| (segment.length() - segment.size()).abs() / segment.size())
            .fold(0.0, f32::max)
    }

    pub fn is_settled(&self, tolerance: f32) -> bool {
        self.segments
            .iter()
            .all(|segment| approx_eq!(f32, segment.length(), segment.size(), epsilon = tolerance))
    }

    pub fn pose(&self) -> Vec<SegmentPose> {
        self.segments.iter().map(Segment::pose).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Limb {
    pub chain: Chain,
    pub parent_segment: usize,
    pub side: Side,
}

/// Spine chain following the locomotion target, with limb chains attached to
/// spine segments.
#[derive(Debug, Clone)]
pub struct Body {
    spine: Chain,
    limbs: Vec<Limb>,
    body_width: f32,
}

impl Body {
    pub fn new(spine: Chain, limbs: Vec<Limb>, body_width: f32) -> Self {
        Self {
            spine,
            limbs,
            body_width,
        }
    }

    pub fn random<R: Rng + ?Sized>(params: &BodyParams, rng: &mut R) -> Self {
        let stiffness = Stiffness::from_params(params);
        let spine = Chain::random(
            params.segment_count,
            params.segment_size,
            params.spawn_extent,
            stiffness,
            rng,
        );

        let limbs = params
            .limbs
            .iter()
            .map(|limb_params| Limb {
                chain: Chain::random(
                    limb_params.segment_count,
                    limb_params.segment_size,
                    params.spawn_extent,
                    stiffness,
                    rng,
                ),
                parent_segment: limb_params.parent_segment,
                side: limb_params.side,
            })
            .collect();

        Self::new(spine, limbs, params.body_width)
    }

    pub fn spine(&self) -> &Chain {
        &self.spine
    }

    pub fn limbs(&self) -> &[Limb] {
        &self.limbs
    }

    /// Point offset by half the body width from the head of a spine segment,
    /// perpendicular to it on the given side.
    pub fn attachment_point(&self, parent_segment: usize, side: Side) -> Option<Point> {
        let segment = self.spine.segments().get(parent_segment)?;
        let dx = segment.head.x - segment.tail.x;
        let dy = segment.head.y - segment.tail.y;
        let dist = dx.hypot(dy);

        if dist <= f32::EPSILON {
            return Some(segment.head);
        }

        let (nx, ny) = match side {
            Side::Left => (dy / dist, -dx / dist),
            Side::Right => (-dy / dist, dx / dist),
        };
        let offset = self.body_width / 2.0;

        Some(Point::new(
            segment.head.x + nx * offset,
            segment.head.y + ny * offset,
        ))
    }

    pub fn update(&mut self, target: Point) {
        self.spine.update(target);

        for i in 0..self.limbs.len() {
            let limb = &self.limbs[i];
            if let Some(anchor) = self.attachment_point(limb.parent_segment, limb.side) {
                self.limbs[i].chain.update(anchor);
            }
        }
    }

    pub fn pose(&self) -> BodyPose {
        BodyPose {
            spine: self.spine.pose(),
            limbs: self.limbs.iter().map(|limb| limb.chain.pose()).collect(),
        }
    }
}
