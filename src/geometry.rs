//! Rays, bounding boxes, rigid frames and ray/primitive tests.

use glam::{Affine3A, Vec2, Vec3};
use std::ops::{Add, Mul};

/// Default minimum ray distance. Secondary rays start here to avoid
/// re-intersecting the surface they left.
pub const RAY_EPS: f32 = 1e-4;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub tmin: f32,
    pub tmax: f32,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            tmin: RAY_EPS,
            tmax: f32::MAX,
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned bounding box. The default box is inverted-empty so that
/// `expand` works without a special first-point case.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }
}

impl Aabb {
    pub fn point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn expand(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Bound of the eight transformed corners.
    pub fn transform(&self, frame: &Affine3A) -> Aabb {
        let mut out = Aabb::default();
        for k in 0..8 {
            let corner = Vec3::new(
                if k & 1 == 0 { self.min.x } else { self.max.x },
                if k & 2 == 0 { self.min.y } else { self.max.y },
                if k & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand(frame.transform_point3(corner));
        }
        out
    }
}

/// Invert a rigid frame by transposing its rotation. `non_rigid` falls back
/// to the full affine inverse for frames carrying scale or shear.
pub fn inverse_frame(frame: &Affine3A, non_rigid: bool) -> Affine3A {
    if non_rigid {
        frame.inverse()
    } else {
        let rot = frame.matrix3.transpose();
        Affine3A {
            matrix3: rot,
            translation: -(rot * frame.translation),
        }
    }
}

/// Transform a direction and renormalize.
pub fn transform_direction(frame: &Affine3A, dir: Vec3) -> Vec3 {
    frame.transform_vector3(dir).normalize()
}

/// Slab test against a bounding box. `d_inv` is the precomputed signed
/// reciprocal of the ray direction, so axis-parallel rays resolve to
/// infinities instead of dividing by zero.
pub fn intersect_bbox(origin: Vec3, d_inv: Vec3, tmin: f32, tmax: f32, bbox: &Aabb) -> bool {
    let it_min = (bbox.min - origin) * d_inv;
    let it_max = (bbox.max - origin) * d_inv;
    let t0 = it_min.min(it_max).max_element().max(tmin);
    let t1 = it_min.max(it_max).min_element().min(tmax);
    // widen the far plane a ulp to keep edge-on boxes from being culled
    t0 <= t1 * 1.00000024
}

/// Moller-Trumbore ray/triangle test. Returns barycentric `uv` and the
/// ray distance. Degenerate triangles have a zero determinant and miss.
pub fn intersect_triangle(ray: &Ray, p0: Vec3, p1: Vec3, p2: Vec3) -> Option<(Vec2, f32)> {
    let edge1 = p1 - p0;
    let edge2 = p2 - p0;

    let pvec = ray.direction.cross(edge2);
    let det = edge1.dot(pvec);
    if det == 0.0 {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = ray.origin - p0;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < ray.tmin || t > ray.tmax {
        return None;
    }

    Some((Vec2::new(u, v), t))
}

/// Ray/line test treating the segment as a capped cylinder of linearly
/// interpolated radius. `uv.x` is the position along the segment, `uv.y`
/// the normalized distance from its axis.
pub fn intersect_line(ray: &Ray, p0: Vec3, p1: Vec3, r0: f32, r1: f32) -> Option<(Vec2, f32)> {
    let u = ray.direction;
    let v = p1 - p0;
    let w = ray.origin - p0;

    let a = u.dot(u);
    let b = u.dot(v);
    let c = v.dot(v);
    let d = u.dot(w);
    let e = v.dot(w);
    let det = a * c - b * b;
    // zero-length or parallel segment
    if det == 0.0 {
        return None;
    }

    let t = (b * e - c * d) / det;
    let s = (a * e - b * d) / det;
    if t < ray.tmin || t > ray.tmax {
        return None;
    }

    let s = s.clamp(0.0, 1.0);
    let pr = ray.at(t);
    let pl = p0 + v * s;
    let d2 = (pr - pl).length_squared();
    let r = r0 * (1.0 - s) + r1 * s;
    if d2 > r * r {
        return None;
    }

    Some((Vec2::new(s, (d2.sqrt() / r).min(1.0)), t))
}

/// Ray/point test treating the point as a small sphere of the given radius.
pub fn intersect_point(ray: &Ray, p: Vec3, r: f32) -> Option<(Vec2, f32)> {
    let w = p - ray.origin;
    let denom = ray.direction.dot(ray.direction);
    if denom == 0.0 {
        return None;
    }
    let t = w.dot(ray.direction) / denom;
    if t < ray.tmin || t > ray.tmax {
        return None;
    }
    let rp = ray.at(t);
    if (p - rp).length_squared() > r * r {
        return None;
    }
    Some((Vec2::ZERO, t))
}

/// Barycentric interpolation over a triangle.
pub fn interpolate_triangle<T>(p0: T, p1: T, p2: T, uv: Vec2) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    p0 * (1.0 - uv.x - uv.y) + p1 * uv.x + p2 * uv.y
}

/// Linear interpolation along a line element.
pub fn interpolate_line<T>(p0: T, p1: T, u: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    p0 * (1.0 - u) + p1 * u
}
