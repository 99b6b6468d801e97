//! Progressive sample scheduler: per-pixel state, parallel row dispatch,
//! accumulation and cooperative cancellation.

use glam::{Vec2, Vec4};
use log::debug;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::rng::{make_rng, Pcg32};
use crate::scene::{eval_camera, CameraId, Scene};
use crate::shader::{get_shader, RaytraceParams};

/// Fixed master seed feeding the per-pixel stream table. Every run draws
/// the same streams, so renders are reproducible for a given params seed.
const STATE_SEED: u64 = 1301081;

#[derive(Clone, Debug, Default)]
pub struct Pixel {
    pub accumulated: Vec4,
    pub samples: u32,
    pub rng: Pcg32,
}

/// Running estimate of the image. `render[j * width + i]` always equals
/// `pixels[j * width + i].accumulated / samples` once a sample landed.
#[derive(Default)]
pub struct RenderState {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Pixel>,
    pub render: Vec<Vec4>,
}

impl RenderState {
    /// Current running-average frame, row-major.
    pub fn image(&self) -> &[Vec4] {
        &self.render
    }
}

/// Size the image to the camera aspect and seed one decorrelated RNG per
/// pixel: a master generator produces a 31-bit odd stream id for each.
pub fn init_state(
    state: &mut RenderState,
    scene: &Scene,
    camera: CameraId,
    params: &RaytraceParams,
) -> Result<()> {
    if params.resolution == 0 {
        return Err(Error::InvalidResolution);
    }
    let cam = scene
        .cameras
        .get(camera)
        .ok_or(Error::MissingCamera { camera })?;
    if cam.film.x <= 0.0 || cam.film.y <= 0.0 {
        return Err(Error::EmptyFilm { camera });
    }

    let (width, height) = if cam.film.x > cam.film.y {
        (
            params.resolution,
            (params.resolution as f32 * cam.film.y / cam.film.x).round() as usize,
        )
    } else {
        (
            (params.resolution as f32 * cam.film.x / cam.film.y).round() as usize,
            params.resolution,
        )
    };

    let mut master = make_rng(STATE_SEED, 1);
    state.width = width;
    state.height = height;
    state.render = vec![Vec4::ZERO; width * height];
    state.pixels = (0..width * height)
        .map(|_| Pixel {
            rng: make_rng(params.seed, (master.rand1i(1 << 31) / 2 + 1) as u64),
            ..Pixel::default()
        })
        .collect();
    Ok(())
}

/// Take exactly one more sample per pixel. Rows are sharded across the
/// rayon pool; each row is owned by a single worker, so pixel writes are
/// race-free. The optional `stop` flag is observed at row granularity and
/// leaves already-updated pixels consistent.
pub fn trace_samples(
    state: &mut RenderState,
    scene: &Scene,
    camera: CameraId,
    params: &RaytraceParams,
    stop: Option<&AtomicBool>,
) -> Result<()> {
    let cam = scene
        .cameras
        .get(camera)
        .ok_or(Error::MissingCamera { camera })?;
    if state.width == 0 || state.height == 0 {
        return Err(Error::InvalidResolution);
    }
    assert_eq!(state.pixels.len(), state.width * state.height);

    let start = Instant::now();
    let shader = get_shader(params);
    let (width, height) = (state.width, state.height);

    let row = |j: usize, pixels: &mut [Pixel], render: &mut [Vec4]| {
        for i in 0..width {
            let pixel = &mut pixels[i];
            // jitter comes first so the rng advances the same way on
            // every pass, parallel or not
            let (ju, jv) = pixel.rng.rand2f();
            let uv = Vec2::new(
                (i as f32 + ju) / width as f32,
                (j as f32 + jv) / height as f32,
            );
            let ray = eval_camera(cam, uv);
            let mut color = shader(scene, ray, 0, &mut pixel.rng, params);

            // rescale instead of clipping to keep chromaticity
            let peak = color.truncate().max_element();
            if peak > params.clamp {
                color = (color.truncate() * (params.clamp / peak)).extend(color.w);
            }

            pixel.accumulated += color;
            pixel.samples += 1;
            render[i] = pixel.accumulated / pixel.samples as f32;
        }
    };

    let stopped = |stop: Option<&AtomicBool>| stop.is_some_and(|s| s.load(Ordering::Relaxed));

    if params.noparallel {
        for (j, (pixels, render)) in state
            .pixels
            .chunks_mut(width)
            .zip(state.render.chunks_mut(width))
            .enumerate()
        {
            if stopped(stop) {
                break;
            }
            row(j, pixels, render);
        }
    } else {
        state
            .pixels
            .par_chunks_mut(width)
            .zip(state.render.par_chunks_mut(width))
            .enumerate()
            .for_each(|(j, (pixels, render))| {
                if stopped(stop) {
                    return;
                }
                row(j, pixels, render);
            });
    }

    debug!(
        "sample pass ({}x{}, {}) in {:?}",
        width,
        height,
        params.shader,
        start.elapsed()
    );
    Ok(())
}
