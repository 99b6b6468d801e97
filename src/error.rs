use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by scene validation, BVH construction and render setup.
///
/// Degenerate geometry (zero-area triangles, zero-length lines) is not an
/// error: the builder falls back to a midpoint split and traversal simply
/// never reports a hit for such primitives.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown shader `{0}`, expected raytrace/eyelight/normal/texcoord/color")]
    UnknownShader(String),

    #[error("image resolution must be positive")]
    InvalidResolution,

    #[error("camera {camera} has a zero-sized film")]
    EmptyFilm { camera: usize },

    #[error("camera {camera} does not exist")]
    MissingCamera { camera: usize },

    #[error("shape {shape}: element {element} references vertex {vertex} but only {count} vertices exist")]
    ElementOutOfRange {
        shape: usize,
        element: usize,
        vertex: u32,
        count: usize,
    },

    #[error("shape {shape}: {attribute} has {got} entries for {expected} vertices")]
    AttributeMismatch {
        shape: usize,
        attribute: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("shape {shape}: points and lines require a per-vertex radius")]
    MissingRadius { shape: usize },

    #[error("shape {shape}: more than one element kind is populated")]
    MixedElements { shape: usize },

    #[error("instance {instance} references shape {shape} which does not exist")]
    MissingShape { instance: usize, shape: usize },

    #[error("instance {instance} references material {material} which does not exist")]
    MissingMaterial { instance: usize, material: usize },

    #[error("material {material} references texture {texture} which does not exist")]
    MissingTexture { material: usize, texture: usize },
}
