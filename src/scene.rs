//! Scene graph: cameras, textures, shapes, materials, instances and
//! environments, stored in parallel arrays and addressed by index handles.

use glam::{Affine3A, Vec2, Vec3};

use crate::bvh::BvhTree;
use crate::error::{Error, Result};
use crate::geometry::{interpolate_line, interpolate_triangle, inverse_frame, Ray};
use crate::sampling::srgb_to_linear;

pub type CameraId = usize;
pub type TextureId = usize;
pub type ShapeId = usize;
pub type MaterialId = usize;
pub type InstanceId = usize;
pub type EnvironmentId = usize;

/// Sentinel for instance references that have not been set yet. Validation
/// rejects it the same way it rejects any out-of-range handle.
pub const INVALID_ID: usize = usize::MAX;

/// Perspective camera. `film` is the physical film extent in scene units,
/// `lens` the focal length. `aperture` and `focus` are carried for
/// completeness but not sampled by the integrator.
#[derive(Clone, Debug)]
pub struct Camera {
    pub frame: Affine3A,
    pub lens: f32,
    pub film: Vec2,
    pub aperture: f32,
    pub focus: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            frame: Affine3A::IDENTITY,
            lens: 0.050,
            film: Vec2::new(0.036, 0.024),
            aperture: 0.0,
            focus: f32::MAX,
        }
    }
}

/// A texture backed by exactly one of four pixel grids. Byte grids are
/// sRGB-encoded, float grids are linear. An empty texture samples white.
#[derive(Clone, Debug, Default)]
pub struct Texture {
    pub width: usize,
    pub height: usize,
    pub pixels_rgbf: Vec<Vec3>,
    pub pixels_rgbb: Vec<[u8; 3]>,
    pub pixels_scalarf: Vec<f32>,
    pub pixels_scalarb: Vec<u8>,
}

impl Texture {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn lookup(&self, i: usize, j: usize, ldr_as_linear: bool) -> Vec3 {
        let idx = j * self.width + i;
        if !self.pixels_rgbf.is_empty() {
            self.pixels_rgbf[idx]
        } else if !self.pixels_rgbb.is_empty() {
            let [r, g, b] = self.pixels_rgbb[idx];
            let c = Vec3::new(r as f32, g as f32, b as f32) / 255.0;
            if ldr_as_linear {
                c
            } else {
                Vec3::new(srgb_to_linear(c.x), srgb_to_linear(c.y), srgb_to_linear(c.z))
            }
        } else if !self.pixels_scalarf.is_empty() {
            Vec3::splat(self.pixels_scalarf[idx])
        } else if !self.pixels_scalarb.is_empty() {
            let s = self.pixels_scalarb[idx] as f32 / 255.0;
            Vec3::splat(if ldr_as_linear { s } else { srgb_to_linear(s) })
        } else {
            Vec3::ONE
        }
    }

    /// Tiled, bilinearly filtered lookup.
    pub fn eval(&self, uv: Vec2, ldr_as_linear: bool) -> Vec3 {
        if self.is_empty() {
            return Vec3::ONE;
        }
        let (w, h) = (self.width, self.height);

        // wrap into [0, size) including negative coordinates
        let mut s = uv.x.fract() * w as f32;
        if s < 0.0 {
            s += w as f32;
        }
        let mut t = uv.y.fract() * h as f32;
        if t < 0.0 {
            t += h as f32;
        }

        let i = (s as usize).min(w - 1);
        let j = (t as usize).min(h - 1);
        let ii = (i + 1) % w;
        let jj = (j + 1) % h;
        let u = s - i as f32;
        let v = t - j as f32;

        self.lookup(i, j, ldr_as_linear) * (1.0 - u) * (1.0 - v)
            + self.lookup(i, jj, ldr_as_linear) * (1.0 - u) * v
            + self.lookup(ii, j, ldr_as_linear) * u * (1.0 - v)
            + self.lookup(ii, jj, ldr_as_linear) * u * v
    }
}

/// Indexed shape holding at most one element kind. Attribute arrays are
/// parallel to `positions`; `radius` is required for lines and points.
#[derive(Clone, Debug, Default)]
pub struct Shape {
    pub triangles: Vec<[u32; 3]>,
    pub lines: Vec<[u32; 2]>,
    pub points: Vec<u32>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub radius: Vec<f32>,
    pub bvh: BvhTree,
}

impl Shape {
    pub fn num_elements(&self) -> usize {
        if !self.triangles.is_empty() {
            self.triangles.len()
        } else if !self.lines.is_empty() {
            self.lines.len()
        } else {
            self.points.len()
        }
    }

    /// Interpolated position at an element's barycentric coordinates.
    pub fn eval_position(&self, element: usize, uv: Vec2) -> Vec3 {
        if !self.triangles.is_empty() {
            let [a, b, c] = self.triangles[element];
            interpolate_triangle(
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
                uv,
            )
        } else if !self.lines.is_empty() {
            let [a, b] = self.lines[element];
            interpolate_line(self.positions[a as usize], self.positions[b as usize], uv.x)
        } else if !self.points.is_empty() {
            self.positions[self.points[element] as usize]
        } else {
            Vec3::ZERO
        }
    }

    /// Geometric normal: face normal for triangles, tangent for lines and
    /// a fixed +z for point sprites.
    pub fn eval_element_normal(&self, element: usize) -> Vec3 {
        if !self.triangles.is_empty() {
            let [a, b, c] = self.triangles[element];
            let p0 = self.positions[a as usize];
            let p1 = self.positions[b as usize];
            let p2 = self.positions[c as usize];
            (p1 - p0).cross(p2 - p0).normalize_or_zero()
        } else if !self.lines.is_empty() {
            let [a, b] = self.lines[element];
            (self.positions[b as usize] - self.positions[a as usize]).normalize_or_zero()
        } else if !self.points.is_empty() {
            Vec3::Z
        } else {
            Vec3::ZERO
        }
    }

    /// Shading normal, falling back to the element normal when the shape
    /// carries no per-vertex normals.
    pub fn eval_normal(&self, element: usize, uv: Vec2) -> Vec3 {
        if self.normals.is_empty() {
            return self.eval_element_normal(element);
        }
        if !self.triangles.is_empty() {
            let [a, b, c] = self.triangles[element];
            interpolate_triangle(
                self.normals[a as usize],
                self.normals[b as usize],
                self.normals[c as usize],
                uv,
            )
            .normalize()
        } else if !self.lines.is_empty() {
            let [a, b] = self.lines[element];
            interpolate_line(self.normals[a as usize], self.normals[b as usize], uv.x).normalize()
        } else if !self.points.is_empty() {
            self.normals[self.points[element] as usize].normalize()
        } else {
            Vec3::Z
        }
    }

    /// Interpolated texture coordinates; the barycentric `uv` itself when
    /// the shape has none.
    pub fn eval_texcoord(&self, element: usize, uv: Vec2) -> Vec2 {
        if self.texcoords.is_empty() {
            return uv;
        }
        if !self.triangles.is_empty() {
            let [a, b, c] = self.triangles[element];
            interpolate_triangle(
                self.texcoords[a as usize],
                self.texcoords[b as usize],
                self.texcoords[c as usize],
                uv,
            )
        } else if !self.lines.is_empty() {
            let [a, b] = self.lines[element];
            interpolate_line(self.texcoords[a as usize], self.texcoords[b as usize], uv.x)
        } else if !self.points.is_empty() {
            self.texcoords[self.points[element] as usize]
        } else {
            uv
        }
    }
}

/// Reflectance parameters, each optionally modulated by a texture.
#[derive(Clone, Debug)]
pub struct Material {
    pub emission: Vec3,
    pub color: Vec3,
    pub specular: f32,
    pub metallic: f32,
    pub ior: f32,
    pub transmission: f32,
    /// Microfacet alpha. `set_roughness` stores the square of the
    /// perceptual value handed to it.
    pub roughness: f32,
    pub opacity: f32,
    pub scattering: Vec3,
    pub scanisotropy: f32,
    pub trdepth: f32,
    pub thin: bool,
    pub emission_tex: Option<TextureId>,
    pub color_tex: Option<TextureId>,
    pub specular_tex: Option<TextureId>,
    pub metallic_tex: Option<TextureId>,
    pub transmission_tex: Option<TextureId>,
    pub roughness_tex: Option<TextureId>,
    pub opacity_tex: Option<TextureId>,
    pub scattering_tex: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            emission: Vec3::ZERO,
            color: Vec3::ZERO,
            specular: 0.0,
            metallic: 0.0,
            ior: 1.5,
            transmission: 0.0,
            roughness: 0.0,
            opacity: 1.0,
            scattering: Vec3::ZERO,
            scanisotropy: 0.0,
            trdepth: 0.01,
            thin: true,
            emission_tex: None,
            color_tex: None,
            specular_tex: None,
            metallic_tex: None,
            transmission_tex: None,
            roughness_tex: None,
            opacity_tex: None,
            scattering_tex: None,
        }
    }
}

/// Placement of a shape/material pair in the world. References are shared
/// indices; the referenced entities outlive the instance.
#[derive(Clone, Debug)]
pub struct Instance {
    pub frame: Affine3A,
    pub shape: ShapeId,
    pub material: MaterialId,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            frame: Affine3A::IDENTITY,
            shape: INVALID_ID,
            material: INVALID_ID,
        }
    }
}

/// Distant illumination: constant emission times an optional lat-long map.
#[derive(Clone, Debug)]
pub struct Environment {
    pub frame: Affine3A,
    pub emission: Vec3,
    pub emission_tex: Option<TextureId>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            frame: Affine3A::IDENTITY,
            emission: Vec3::ZERO,
            emission_tex: None,
        }
    }
}

#[derive(Default)]
pub struct Scene {
    pub cameras: Vec<Camera>,
    pub textures: Vec<Texture>,
    pub shapes: Vec<Shape>,
    pub materials: Vec<Material>,
    pub instances: Vec<Instance>,
    pub environments: Vec<Environment>,
    pub bvh: BvhTree,
}

impl Scene {
    pub fn add_camera(&mut self) -> CameraId {
        self.cameras.push(Camera::default());
        self.cameras.len() - 1
    }

    pub fn add_texture(&mut self) -> TextureId {
        self.textures.push(Texture::default());
        self.textures.len() - 1
    }

    pub fn add_shape(&mut self) -> ShapeId {
        self.shapes.push(Shape::default());
        self.shapes.len() - 1
    }

    pub fn add_material(&mut self) -> MaterialId {
        self.materials.push(Material::default());
        self.materials.len() - 1
    }

    pub fn add_instance(&mut self) -> InstanceId {
        self.instances.push(Instance::default());
        self.instances.len() - 1
    }

    pub fn add_environment(&mut self) -> EnvironmentId {
        self.environments.push(Environment::default());
        self.environments.len() - 1
    }

    pub fn set_camera_frame(&mut self, camera: CameraId, frame: Affine3A) {
        self.cameras[camera].frame = frame;
    }

    /// Set focal length and derive the film extent from an aspect ratio:
    /// the longer film axis equals `film`.
    pub fn set_lens(&mut self, camera: CameraId, lens: f32, aspect: f32, film: f32) {
        let cam = &mut self.cameras[camera];
        cam.lens = lens;
        cam.film = if aspect >= 1.0 {
            Vec2::new(film, film / aspect)
        } else {
            Vec2::new(film * aspect, film)
        };
    }

    pub fn set_focus(&mut self, camera: CameraId, aperture: f32, focus: f32) {
        let cam = &mut self.cameras[camera];
        cam.aperture = aperture;
        cam.focus = focus;
    }

    pub fn set_texture_rgbf(&mut self, texture: TextureId, width: usize, height: usize, pixels: Vec<Vec3>) {
        self.textures[texture] = Texture {
            width,
            height,
            pixels_rgbf: pixels,
            ..Texture::default()
        };
    }

    pub fn set_texture_rgbb(&mut self, texture: TextureId, width: usize, height: usize, pixels: Vec<[u8; 3]>) {
        self.textures[texture] = Texture {
            width,
            height,
            pixels_rgbb: pixels,
            ..Texture::default()
        };
    }

    pub fn set_texture_scalarf(&mut self, texture: TextureId, width: usize, height: usize, pixels: Vec<f32>) {
        self.textures[texture] = Texture {
            width,
            height,
            pixels_scalarf: pixels,
            ..Texture::default()
        };
    }

    pub fn set_texture_scalarb(&mut self, texture: TextureId, width: usize, height: usize, pixels: Vec<u8>) {
        self.textures[texture] = Texture {
            width,
            height,
            pixels_scalarb: pixels,
            ..Texture::default()
        };
    }

    pub fn set_triangles(&mut self, shape: ShapeId, triangles: Vec<[u32; 3]>) {
        self.shapes[shape].triangles = triangles;
    }

    pub fn set_lines(&mut self, shape: ShapeId, lines: Vec<[u32; 2]>) {
        self.shapes[shape].lines = lines;
    }

    pub fn set_points(&mut self, shape: ShapeId, points: Vec<u32>) {
        self.shapes[shape].points = points;
    }

    pub fn set_positions(&mut self, shape: ShapeId, positions: Vec<Vec3>) {
        self.shapes[shape].positions = positions;
    }

    pub fn set_normals(&mut self, shape: ShapeId, normals: Vec<Vec3>) {
        self.shapes[shape].normals = normals;
    }

    pub fn set_texcoords(&mut self, shape: ShapeId, texcoords: Vec<Vec2>) {
        self.shapes[shape].texcoords = texcoords;
    }

    pub fn set_radius(&mut self, shape: ShapeId, radius: Vec<f32>) {
        self.shapes[shape].radius = radius;
    }

    pub fn set_emission(&mut self, material: MaterialId, emission: Vec3, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.emission = emission;
        mat.emission_tex = tex;
    }

    pub fn set_color(&mut self, material: MaterialId, color: Vec3, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.color = color;
        mat.color_tex = tex;
    }

    pub fn set_specular(&mut self, material: MaterialId, specular: f32, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.specular = specular;
        mat.specular_tex = tex;
    }

    pub fn set_metallic(&mut self, material: MaterialId, metallic: f32, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.metallic = metallic;
        mat.metallic_tex = tex;
    }

    pub fn set_ior(&mut self, material: MaterialId, ior: f32) {
        self.materials[material].ior = ior;
    }

    pub fn set_transmission(&mut self, material: MaterialId, transmission: f32, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.transmission = transmission;
        mat.transmission_tex = tex;
    }

    /// Stores the squared perceptual roughness, i.e. the microfacet alpha.
    pub fn set_roughness(&mut self, material: MaterialId, roughness: f32, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.roughness = roughness * roughness;
        mat.roughness_tex = tex;
    }

    pub fn set_opacity(&mut self, material: MaterialId, opacity: f32, tex: Option<TextureId>) {
        let mat = &mut self.materials[material];
        mat.opacity = opacity;
        mat.opacity_tex = tex;
    }

    pub fn set_scattering(
        &mut self,
        material: MaterialId,
        scattering: Vec3,
        scanisotropy: f32,
        tex: Option<TextureId>,
    ) {
        let mat = &mut self.materials[material];
        mat.scattering = scattering;
        mat.scanisotropy = scanisotropy;
        mat.scattering_tex = tex;
    }

    pub fn set_thin(&mut self, material: MaterialId, thin: bool, trdepth: f32) {
        let mat = &mut self.materials[material];
        mat.thin = thin;
        mat.trdepth = trdepth;
    }

    pub fn set_instance_frame(&mut self, instance: InstanceId, frame: Affine3A) {
        self.instances[instance].frame = frame;
    }

    pub fn set_instance_shape(&mut self, instance: InstanceId, shape: ShapeId) {
        self.instances[instance].shape = shape;
    }

    pub fn set_instance_material(&mut self, instance: InstanceId, material: MaterialId) {
        self.instances[instance].material = material;
    }

    pub fn set_environment_frame(&mut self, environment: EnvironmentId, frame: Affine3A) {
        self.environments[environment].frame = frame;
    }

    pub fn set_environment_emission(
        &mut self,
        environment: EnvironmentId,
        emission: Vec3,
        tex: Option<TextureId>,
    ) {
        let env = &mut self.environments[environment];
        env.emission = emission;
        env.emission_tex = tex;
    }

    /// Sample a texture handle; `None` and empty textures are white.
    pub fn eval_texture(&self, texture: Option<TextureId>, uv: Vec2, ldr_as_linear: bool) -> Vec3 {
        match texture {
            Some(id) => self.textures[id].eval(uv, ldr_as_linear),
            None => Vec3::ONE,
        }
    }

    /// Total emission of all environments along a direction that escaped
    /// the scene.
    pub fn eval_environment(&self, direction: Vec3) -> Vec3 {
        let mut emission = Vec3::ZERO;
        for environment in &self.environments {
            let local = inverse_frame(&environment.frame, false).transform_vector3(direction);
            let mut texcoord = Vec2::new(
                local.z.atan2(local.x) / (2.0 * std::f32::consts::PI),
                local.y.clamp(-1.0, 1.0).acos() / std::f32::consts::PI,
            );
            if texcoord.x < 0.0 {
                texcoord.x += 1.0;
            }
            emission += environment.emission
                * self.eval_texture(environment.emission_tex, texcoord, false);
        }
        emission
    }

    /// Structural checks run before BVH construction. Degenerate geometry
    /// passes; dangling references and mismatched arrays do not.
    pub fn validate(&self) -> Result<()> {
        for (sid, shape) in self.shapes.iter().enumerate() {
            let populated = [
                !shape.triangles.is_empty(),
                !shape.lines.is_empty(),
                !shape.points.is_empty(),
            ];
            if populated.iter().filter(|&&p| p).count() > 1 {
                return Err(Error::MixedElements { shape: sid });
            }

            let count = shape.positions.len();
            for (attribute, len) in [
                ("normals", shape.normals.len()),
                ("texcoords", shape.texcoords.len()),
                ("radius", shape.radius.len()),
            ] {
                if len != 0 && len != count {
                    return Err(Error::AttributeMismatch {
                        shape: sid,
                        attribute,
                        got: len,
                        expected: count,
                    });
                }
            }

            if (!shape.lines.is_empty() || !shape.points.is_empty()) && shape.radius.is_empty() {
                return Err(Error::MissingRadius { shape: sid });
            }

            let check = |element: usize, vertex: u32| -> Result<()> {
                if vertex as usize >= count {
                    Err(Error::ElementOutOfRange {
                        shape: sid,
                        element,
                        vertex,
                        count,
                    })
                } else {
                    Ok(())
                }
            };
            for (e, t) in shape.triangles.iter().enumerate() {
                for &v in t {
                    check(e, v)?;
                }
            }
            for (e, l) in shape.lines.iter().enumerate() {
                for &v in l {
                    check(e, v)?;
                }
            }
            for (e, &p) in shape.points.iter().enumerate() {
                check(e, p)?;
            }
        }

        for (iid, instance) in self.instances.iter().enumerate() {
            if instance.shape >= self.shapes.len() {
                return Err(Error::MissingShape {
                    instance: iid,
                    shape: instance.shape,
                });
            }
            if instance.material >= self.materials.len() {
                return Err(Error::MissingMaterial {
                    instance: iid,
                    material: instance.material,
                });
            }
        }

        for (mid, material) in self.materials.iter().enumerate() {
            for tex in [
                material.emission_tex,
                material.color_tex,
                material.specular_tex,
                material.metallic_tex,
                material.transmission_tex,
                material.roughness_tex,
                material.opacity_tex,
                material.scattering_tex,
            ]
            .into_iter()
            .flatten()
            {
                if tex >= self.textures.len() {
                    return Err(Error::MissingTexture {
                        material: mid,
                        texture: tex,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Generate the camera ray through normalized image coordinates, jitter
/// included. `uv` has its origin at the top-left corner.
pub fn eval_camera(camera: &Camera, uv: Vec2) -> Ray {
    let q = Vec3::new(
        camera.film.x * (0.5 - uv.x),
        camera.film.y * (uv.y - 0.5),
        camera.lens,
    );
    let direction = (-q).normalize();
    Ray::new(
        camera.frame.transform_point3(Vec3::ZERO),
        camera.frame.transform_vector3(direction).normalize(),
    )
}
