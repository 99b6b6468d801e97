//! Offline CPU path tracer.
//!
//! The crate renders scenes of instanced triangle/line/point shapes with
//! textured materials and environment lights. Rendering is progressive:
//! build the scene through the builder API, call [`init_bvh`] once, then
//! [`init_state`] and one [`trace_samples`] per sample pass, reading the
//! running average from [`RenderState::image`] between passes.

pub mod bvh;
pub mod error;
pub mod geometry;
pub mod render;
pub mod rng;
pub mod sampling;
pub mod scene;
pub mod shader;

pub use bvh::{
    init_bvh, intersect_instance_bvh, intersect_scene_bvh, BvhNode, BvhTree, Intersection,
};
pub use error::{Error, Result};
pub use geometry::{Aabb, Ray};
pub use render::{init_state, trace_samples, Pixel, RenderState};
pub use scene::{
    eval_camera, Camera, CameraId, Environment, EnvironmentId, Instance, InstanceId, Material,
    MaterialId, Scene, Shape, ShapeId, Texture, TextureId,
};
pub use shader::{RaytraceParams, ShaderType};
