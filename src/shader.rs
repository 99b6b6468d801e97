//! Shaders: the recursive radiance estimator and the debug views.

use glam::{Vec3, Vec4};
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::bvh::intersect_scene_bvh;
use crate::error::Error;
use crate::geometry::{transform_direction, Ray};
use crate::rng::Pcg32;
use crate::sampling::{
    fresnel_schlick, geometry_smith, ggx_distribution, mask_nan, orthonormalize, reflect,
    sample_hemisphere_cos, sample_hemisphere_cos_pdf,
};
use crate::scene::Scene;

/// Origin offset for rays continuing through a surface.
const PASSTHROUGH_EPS: f32 = 1e-2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShaderType {
    #[default]
    Raytrace,
    Eyelight,
    Normal,
    Texcoord,
    Color,
}

impl FromStr for ShaderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "raytrace" => Ok(Self::Raytrace),
            "eyelight" => Ok(Self::Eyelight),
            "normal" => Ok(Self::Normal),
            "texcoord" => Ok(Self::Texcoord),
            "color" => Ok(Self::Color),
            other => Err(Error::UnknownShader(other.to_string())),
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raytrace => "raytrace",
            Self::Eyelight => "eyelight",
            Self::Normal => "normal",
            Self::Texcoord => "texcoord",
            Self::Color => "color",
        })
    }
}

/// Rendering options shared by the scheduler, the shaders and the BVH
/// builder.
#[derive(Clone, Debug)]
pub struct RaytraceParams {
    /// Image size along the longer film axis, in pixels.
    pub resolution: usize,
    pub shader: ShaderType,
    /// Pass count managed by the caller; each `trace_samples` adds one.
    pub samples: u32,
    /// Recursion depth cap.
    pub bounces: u32,
    /// Per-sample radiance clamp, preserving chromaticity.
    pub clamp: f32,
    pub seed: u64,
    /// Force the sequential scheduler.
    pub noparallel: bool,
}

impl Default for RaytraceParams {
    fn default() -> Self {
        Self {
            resolution: 720,
            shader: ShaderType::default(),
            samples: 512,
            bounces: 4,
            clamp: 10.0,
            seed: 961748941,
            noparallel: false,
        }
    }
}

/// Shader signature: radiance estimate plus coverage alpha for one ray.
pub type ShaderFunc = fn(&Scene, Ray, u32, &mut Pcg32, &RaytraceParams) -> Vec4;

/// Resolve the shader once per pass instead of per pixel.
pub fn get_shader(params: &RaytraceParams) -> ShaderFunc {
    match params.shader {
        ShaderType::Raytrace => shade_raytrace,
        ShaderType::Eyelight => shade_eyelight,
        ShaderType::Normal => shade_normal,
        ShaderType::Texcoord => shade_texcoord,
        ShaderType::Color => shade_color,
    }
}

/// Recursive path tracer over the scene's material classes.
fn shade_raytrace(
    scene: &Scene,
    ray: Ray,
    bounce: u32,
    rng: &mut Pcg32,
    params: &RaytraceParams,
) -> Vec4 {
    let isec = intersect_scene_bvh(scene, &ray, false, false);
    if !isec.hit {
        return scene.eval_environment(ray.direction).extend(1.0);
    }

    let instance = &scene.instances[isec.instance];
    let shape = &scene.shapes[instance.shape];
    let material = &scene.materials[instance.material];

    let outgoing = -ray.direction;
    let position = instance
        .frame
        .transform_point3(shape.eval_position(isec.element, isec.uv));
    let mut normal = transform_direction(&instance.frame, shape.eval_normal(isec.element, isec.uv));
    let texcoord = shape.eval_texcoord(isec.element, isec.uv);

    // face the shading frame toward the viewer; point sprites keep theirs
    if !shape.lines.is_empty() {
        normal = orthonormalize(outgoing, normal);
    } else if !shape.triangles.is_empty() && outgoing.dot(normal) < 0.0 {
        normal = -normal;
    }

    // scalar parameters sample in linear space, color in sRGB
    let color = material.color * scene.eval_texture(material.color_tex, texcoord, false);
    let specular = material.specular * scene.eval_texture(material.specular_tex, texcoord, true).x;
    let metallic = material.metallic * scene.eval_texture(material.metallic_tex, texcoord, true).x;
    let roughness =
        material.roughness * scene.eval_texture(material.roughness_tex, texcoord, true).x;
    let transmission =
        material.transmission * scene.eval_texture(material.transmission_tex, texcoord, true).x;
    let opacity_rgb = scene.eval_texture(material.opacity_tex, texcoord, true);
    let opacity =
        material.opacity * (opacity_rgb.x + opacity_rgb.y + opacity_rgb.z) / 3.0;

    let mut radiance = material.emission * scene.eval_texture(material.emission_tex, texcoord, false);

    if bounce >= params.bounces {
        return radiance.extend(1.0);
    }

    // stochastic transparency: continue the same ray behind the surface
    if opacity < 1.0 && rng.rand1f() > opacity {
        let next = Ray::new(position + ray.direction * PASSTHROUGH_EPS, ray.direction);
        return shade_raytrace(scene, next, bounce + 1, rng, params);
    }

    if transmission > 0.0 {
        // polished dielectric: russian roulette between mirror reflection
        // and straight-through transmission
        let fresnel = fresnel_schlick(color, normal, outgoing);
        if rng.rand1f() < fresnel.x {
            let incoming = reflect(outgoing, normal);
            let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
            radiance += mask_nan(rec.truncate());
        } else {
            let incoming = -outgoing;
            let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
            radiance += mask_nan(color * rec.truncate());
        }
    } else if metallic > 0.0 && roughness == 0.0 {
        // polished metal
        let incoming = reflect(outgoing, normal);
        let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
        radiance += mask_nan(fresnel_schlick(color, normal, outgoing) * rec.truncate());
    } else if metallic > 0.0 {
        // rough metal: deterministic reflection weighted by the microfacet
        // terms at the mirror halfway vector
        let incoming = reflect(outgoing, normal);
        let n_wo = normal.dot(outgoing);
        let n_wi = normal.dot(incoming);
        if n_wo > 0.0 && n_wi > 0.0 {
            let halfway = (incoming + outgoing).normalize();
            let fresnel = fresnel_schlick(color, halfway, outgoing);
            let d = ggx_distribution(normal, halfway, roughness);
            let g = geometry_smith(normal, outgoing, incoming, roughness);
            let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
            radiance += mask_nan(fresnel * d * g / (4.0 * n_wo * n_wi) * rec.truncate());
        }
    } else if specular > 0.0 {
        // rough plastic: one cosine sample feeds the diffuse lobe and a
        // dielectric microfacet lobe at f0 = 0.04
        let (r1, r2) = rng.rand2f();
        let incoming = sample_hemisphere_cos(normal, r1, r2);
        let pdf = sample_hemisphere_cos_pdf(normal, incoming);
        let n_wo = normal.dot(outgoing);
        let n_wi = normal.dot(incoming);
        if pdf > 0.0 && n_wo > 0.0 && n_wi > 0.0 {
            let halfway = (incoming + outgoing).normalize();
            let fresnel = fresnel_schlick(Vec3::splat(0.04), halfway, outgoing);
            let d = ggx_distribution(normal, halfway, roughness);
            let g = geometry_smith(normal, outgoing, incoming, roughness);
            let brdf = color / PI * (Vec3::ONE - fresnel)
                + fresnel * d * g / (4.0 * n_wo * n_wi);
            let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
            radiance += mask_nan(brdf * n_wi * rec.truncate() / pdf);
        }
    } else {
        // diffuse
        let (r1, r2) = rng.rand2f();
        let incoming = sample_hemisphere_cos(normal, r1, r2);
        let pdf = sample_hemisphere_cos_pdf(normal, incoming);
        if pdf > 0.0 {
            let rec = shade_raytrace(scene, Ray::new(position, incoming), bounce + 1, rng, params);
            radiance += mask_nan(
                color / PI * normal.dot(incoming).max(0.0) * rec.truncate() / pdf,
            );
        }
    }

    radiance.extend(1.0)
}

/// Headlight preview: albedo scaled by the view cosine.
fn shade_eyelight(
    scene: &Scene,
    ray: Ray,
    _bounce: u32,
    _rng: &mut Pcg32,
    _params: &RaytraceParams,
) -> Vec4 {
    let isec = intersect_scene_bvh(scene, &ray, false, false);
    if !isec.hit {
        return Vec4::ZERO;
    }
    let instance = &scene.instances[isec.instance];
    let shape = &scene.shapes[instance.shape];
    let material = &scene.materials[instance.material];
    let normal = transform_direction(&instance.frame, shape.eval_normal(isec.element, isec.uv));
    let color = material.color * normal.dot(-ray.direction).max(0.0);
    color.extend(1.0)
}

fn shade_normal(
    scene: &Scene,
    ray: Ray,
    _bounce: u32,
    _rng: &mut Pcg32,
    _params: &RaytraceParams,
) -> Vec4 {
    let isec = intersect_scene_bvh(scene, &ray, false, false);
    if !isec.hit {
        return Vec4::ZERO;
    }
    let instance = &scene.instances[isec.instance];
    let shape = &scene.shapes[instance.shape];
    let normal = transform_direction(&instance.frame, shape.eval_normal(isec.element, isec.uv));
    (normal * 0.5 + Vec3::splat(0.5)).extend(1.0)
}

fn shade_texcoord(
    scene: &Scene,
    ray: Ray,
    _bounce: u32,
    _rng: &mut Pcg32,
    _params: &RaytraceParams,
) -> Vec4 {
    let isec = intersect_scene_bvh(scene, &ray, false, false);
    if !isec.hit {
        return Vec4::ZERO;
    }
    let instance = &scene.instances[isec.instance];
    let shape = &scene.shapes[instance.shape];
    let texcoord = shape.eval_texcoord(isec.element, isec.uv);
    Vec4::new(texcoord.x.rem_euclid(1.0), texcoord.y.rem_euclid(1.0), 0.0, 1.0)
}

fn shade_color(
    scene: &Scene,
    ray: Ray,
    _bounce: u32,
    _rng: &mut Pcg32,
    _params: &RaytraceParams,
) -> Vec4 {
    let isec = intersect_scene_bvh(scene, &ray, false, false);
    if !isec.hit {
        return Vec4::ZERO;
    }
    let instance = &scene.instances[isec.instance];
    let material = &scene.materials[instance.material];
    material.color.extend(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_names_round_trip() {
        for shader in [
            ShaderType::Raytrace,
            ShaderType::Eyelight,
            ShaderType::Normal,
            ShaderType::Texcoord,
            ShaderType::Color,
        ] {
            assert_eq!(shader.to_string().parse::<ShaderType>().unwrap(), shader);
        }
        assert!(matches!(
            "pathtrace".parse::<ShaderType>(),
            Err(Error::UnknownShader(_))
        ));
    }
}
