//! Sampling routines and BSDF building blocks shared by the shaders.

use glam::{Mat3, Vec3};
use std::f32::consts::PI;

/// Orthonormal basis with `v` as the z column.
// https://graphics.pixar.com/library/OrthonormalB/paper.pdf
pub fn basis_from_z(v: Vec3) -> Mat3 {
    let z = v.normalize();
    let sign = 1.0_f32.copysign(z.z);
    let a = -1.0 / (sign + z.z);
    let b = z.x * z.y * a;
    let x = Vec3::new(1.0 + sign * z.x * z.x * a, sign * b, -sign * z.x);
    let y = Vec3::new(b, sign + z.y * z.y * a, -z.y);
    Mat3::from_cols(x, y, z)
}

/// Cosine-weighted direction on the hemisphere around `normal`.
pub fn sample_hemisphere_cos(normal: Vec3, r1: f32, r2: f32) -> Vec3 {
    let z = r2.sqrt();
    let r = (1.0 - z * z).sqrt();
    let phi = 2.0 * PI * r1;
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), z);
    basis_from_z(normal) * local
}

/// Density of `sample_hemisphere_cos` for a given direction.
pub fn sample_hemisphere_cos_pdf(normal: Vec3, direction: Vec3) -> f32 {
    let cosine = normal.dot(direction);
    if cosine <= 0.0 {
        0.0
    } else {
        cosine / PI
    }
}

/// Reflect `w` about `n`. Both vectors point away from the surface.
pub fn reflect(w: Vec3, n: Vec3) -> Vec3 {
    -w + n * (2.0 * n.dot(w))
}

/// Component of `a` orthogonal to `b`, renormalized.
pub fn orthonormalize(a: Vec3, b: Vec3) -> Vec3 {
    (a - b * a.dot(b)).normalize()
}

/// Schlick approximation of the Fresnel reflectance at `f0`.
pub fn fresnel_schlick(f0: Vec3, normal: Vec3, outgoing: Vec3) -> Vec3 {
    if f0 == Vec3::ZERO {
        return Vec3::ZERO;
    }
    let cosine = normal.dot(outgoing);
    f0 + (Vec3::ONE - f0) * (1.0 - cosine.abs()).clamp(0.0, 1.0).powi(5)
}

/// GGX normal distribution. `roughness` is the microfacet alpha.
pub fn ggx_distribution(normal: Vec3, halfway: Vec3, roughness: f32) -> f32 {
    let cosine = normal.dot(halfway);
    if cosine <= 0.0 {
        return 0.0;
    }
    let alpha2 = roughness * roughness;
    let denom = cosine * cosine * (alpha2 - 1.0) + 1.0;
    alpha2 / (PI * denom * denom).max(f32::MIN_POSITIVE)
}

fn geometry_schlick_ggx(normal: Vec3, direction: Vec3, roughness: f32) -> f32 {
    let cosine = normal.dot(direction).max(0.0);
    let k = (roughness * roughness) / 8.0;
    cosine / (cosine * (1.0 - k) + k)
}

/// Smith masking-shadowing from the Schlick-GGX approximation.
pub fn geometry_smith(normal: Vec3, outgoing: Vec3, incoming: Vec3, roughness: f32) -> f32 {
    geometry_schlick_ggx(normal, outgoing, roughness)
        * geometry_schlick_ggx(normal, incoming, roughness)
}

/// Decode one sRGB channel to linear radiometric value.
pub fn srgb_to_linear(srgb: f32) -> f32 {
    if srgb <= 0.04045 {
        srgb / 12.92
    } else {
        ((srgb + 0.055) / 1.055).powf(2.4)
    }
}

/// Zero out non-finite contributions instead of poisoning the accumulator.
pub fn mask_nan(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::make_rng;

    #[test]
    fn basis_is_orthonormal() {
        for v in [Vec3::X, Vec3::Y, Vec3::Z, -Vec3::Z, Vec3::new(0.3, -0.7, 0.2)] {
            let m = basis_from_z(v);
            let (x, y, z) = (m.x_axis, m.y_axis, m.z_axis);
            assert!(x.dot(y).abs() < 1e-5);
            assert!(y.dot(z).abs() < 1e-5);
            assert!((x.length() - 1.0).abs() < 1e-5);
            assert!((z - v.normalize()).length() < 1e-5);
        }
    }

    #[test]
    fn hemisphere_samples_face_normal() {
        let normal = Vec3::new(0.2, 0.9, -0.1).normalize();
        let mut rng = make_rng(17, 5);
        for _ in 0..256 {
            let (r1, r2) = rng.rand2f();
            let dir = sample_hemisphere_cos(normal, r1, r2);
            assert!(normal.dot(dir) >= 0.0);
            assert!((dir.length() - 1.0).abs() < 1e-4);
            assert!(sample_hemisphere_cos_pdf(normal, dir) > 0.0);
        }
    }

    #[test]
    fn reflect_mirrors_about_normal() {
        let n = Vec3::Z;
        let wo = Vec3::new(1.0, 0.0, 1.0).normalize();
        let wi = reflect(wo, n);
        assert!((wi - Vec3::new(-1.0, 0.0, 1.0).normalize()).length() < 1e-5);
    }

    #[test]
    fn srgb_round_values() {
        assert!(srgb_to_linear(0.0).abs() < 1e-7);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        // mid grey decodes below its encoded value
        assert!(srgb_to_linear(0.5) < 0.25);
    }
}
