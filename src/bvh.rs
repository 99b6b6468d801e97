//! Two-level bounding volume hierarchy: one tree per shape, one tree over
//! instance world bounds, both stored as flat node arrays.

use glam::{Vec2, Vec3};
use log::{debug, info};
use rayon::prelude::*;
use std::time::Instant;

use crate::error::Result;
use crate::geometry::{
    intersect_bbox, intersect_line, intersect_point, intersect_triangle, inverse_frame, Aabb, Ray,
};
use crate::scene::{InstanceId, Scene, Shape};
use crate::shader::RaytraceParams;

/// Maximum primitives per leaf.
const MAX_LEAF_SIZE: usize = 4;

/// Traversal stack depth. With 4-wide leaves the tree depth stays far below
/// this for any realistic primitive count.
const STACK_SIZE: usize = 128;

/// Flat BVH node. Internal nodes point at two contiguous children at
/// `start..start + 2`; leaves index `num` entries of the primitive
/// permutation. `axis` is only meaningful for internal nodes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BvhNode {
    pub bbox: Aabb,
    pub start: u32,
    pub num: u16,
    pub axis: u8,
    pub internal: bool,
}

/// Packed tree plus the permutation mapping BVH-local primitive slots back
/// to element (or instance) indices.
#[derive(Clone, Debug, Default)]
pub struct BvhTree {
    pub nodes: Vec<BvhNode>,
    pub primitives: Vec<u32>,
}

/// Result of a ray/scene query.
#[derive(Clone, Copy, Debug, Default)]
pub struct Intersection {
    pub hit: bool,
    pub instance: InstanceId,
    pub element: usize,
    pub uv: Vec2,
    pub distance: f32,
}

fn partition_in_place(items: &mut [u32], pred: impl Fn(u32) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..items.len() {
        if pred(items[i]) {
            items.swap(mid, i);
            mid += 1;
        }
    }
    mid
}

/// Middle split: longest centroid axis, partition about the centroid-bbox
/// midpoint. Falls back to an even range split when every centroid lands on
/// one side (coincident clusters, degenerate primitives).
fn split_middle(primitives: &mut [u32], centers: &[Vec3]) -> (usize, u8) {
    let mut cbox = Aabb::default();
    for &p in primitives.iter() {
        cbox.expand(centers[p as usize]);
    }
    let size = cbox.size();
    let axis = if size.x >= size.y && size.x >= size.z {
        0
    } else if size.y >= size.z {
        1
    } else {
        2
    };
    let split = cbox.center()[axis];
    let mid = partition_in_place(primitives, |p| centers[p as usize][axis] < split);
    if mid == 0 || mid == primitives.len() {
        (primitives.len() / 2, axis as u8)
    } else {
        (mid, axis as u8)
    }
}

/// Top-down middle-split build over primitive bounds. Children are always
/// appended contiguously, so a node needs only one child offset.
fn build_bvh(bboxes: &[Aabb]) -> BvhTree {
    let mut tree = BvhTree {
        nodes: Vec::with_capacity((2 * bboxes.len()).max(1)),
        primitives: (0..bboxes.len() as u32).collect(),
    };
    let centers: Vec<Vec3> = bboxes.iter().map(Aabb::center).collect();

    tree.nodes.push(BvhNode::default());
    let mut queue = vec![(0usize, 0usize, bboxes.len())];
    while let Some((node_id, start, end)) = queue.pop() {
        let mut bbox = Aabb::default();
        for &p in &tree.primitives[start..end] {
            bbox = bbox.union(&bboxes[p as usize]);
        }

        if end - start > MAX_LEAF_SIZE {
            let (offset, axis) = split_middle(&mut tree.primitives[start..end], &centers);
            let mid = start + offset;
            let first_child = tree.nodes.len();
            tree.nodes.push(BvhNode::default());
            tree.nodes.push(BvhNode::default());
            tree.nodes[node_id] = BvhNode {
                bbox,
                start: first_child as u32,
                num: 2,
                axis,
                internal: true,
            };
            queue.push((first_child, start, mid));
            queue.push((first_child + 1, mid, end));
        } else {
            tree.nodes[node_id] = BvhNode {
                bbox,
                start: start as u32,
                num: (end - start) as u16,
                axis: 0,
                internal: false,
            };
        }
    }
    tree.nodes.shrink_to_fit();
    tree
}

/// Per-element bounds for whichever element kind the shape holds. Lines and
/// points grow their boxes by the per-vertex radius.
fn shape_bboxes(shape: &Shape) -> Vec<Aabb> {
    if !shape.triangles.is_empty() {
        shape
            .triangles
            .iter()
            .map(|&[a, b, c]| {
                let mut bbox = Aabb::point(shape.positions[a as usize]);
                bbox.expand(shape.positions[b as usize]);
                bbox.expand(shape.positions[c as usize]);
                bbox
            })
            .collect()
    } else if !shape.lines.is_empty() {
        shape
            .lines
            .iter()
            .map(|&[a, b]| {
                let (pa, ra) = (shape.positions[a as usize], shape.radius[a as usize]);
                let (pb, rb) = (shape.positions[b as usize], shape.radius[b as usize]);
                Aabb {
                    min: (pa - Vec3::splat(ra)).min(pb - Vec3::splat(rb)),
                    max: (pa + Vec3::splat(ra)).max(pb + Vec3::splat(rb)),
                }
            })
            .collect()
    } else if !shape.points.is_empty() {
        shape
            .points
            .iter()
            .map(|&p| {
                let (pos, r) = (shape.positions[p as usize], shape.radius[p as usize]);
                Aabb {
                    min: pos - Vec3::splat(r),
                    max: pos + Vec3::splat(r),
                }
            })
            .collect()
    } else {
        Vec::new()
    }
}

fn instance_bboxes(scene: &Scene) -> Vec<Aabb> {
    scene
        .instances
        .iter()
        .map(|instance| {
            let shape = &scene.shapes[instance.shape];
            match shape.bvh.nodes.first() {
                Some(root) if root.bbox.min.x <= root.bbox.max.x => {
                    root.bbox.transform(&instance.frame)
                }
                // empty shape: collapse to the instance origin
                _ => Aabb::point(instance.frame.translation.into()),
            }
        })
        .collect()
}

/// Validate the scene, then build every shape BVH and the instance-level
/// BVH on top. `progress` is invoked at stage boundaries; when omitted the
/// per-shape builds run on the rayon pool (unless `noparallel`).
pub fn init_bvh(
    scene: &mut Scene,
    params: &RaytraceParams,
    mut progress: Option<&mut dyn FnMut(&str, usize, usize)>,
) -> Result<()> {
    scene.validate()?;

    let start = Instant::now();
    let stages = scene.shapes.len() + 1;

    if params.noparallel || progress.is_some() {
        for idx in 0..scene.shapes.len() {
            if let Some(cb) = progress.as_deref_mut() {
                cb("build shape bvh", idx, stages);
            }
            let shape = &mut scene.shapes[idx];
            shape.bvh = build_bvh(&shape_bboxes(shape));
        }
    } else {
        scene
            .shapes
            .par_iter_mut()
            .for_each(|shape| shape.bvh = build_bvh(&shape_bboxes(shape)));
    }

    if let Some(cb) = progress.as_deref_mut() {
        cb("build scene bvh", stages - 1, stages);
    }
    scene.bvh = build_bvh(&instance_bboxes(scene));

    info!(
        "bvh built in {:?} ({} shapes, {} instances)",
        start.elapsed(),
        scene.shapes.len(),
        scene.instances.len()
    );
    debug!(
        "scene bvh: {} nodes over {} primitives",
        scene.bvh.nodes.len(),
        scene.bvh.primitives.len()
    );
    Ok(())
}

/// Walk one shape tree. Returns `(element, uv, distance)` of the nearest
/// hit within `[tmin, tmax]`, or the first hit found when `find_any`.
pub fn intersect_shape_bvh(
    shape: &Shape,
    ray: &Ray,
    find_any: bool,
) -> Option<(usize, Vec2, f32)> {
    let bvh = &shape.bvh;
    if bvh.nodes.is_empty() {
        return None;
    }

    let mut ray = *ray;
    let d_inv = ray.direction.recip();
    let d_neg = [d_inv.x < 0.0, d_inv.y < 0.0, d_inv.z < 0.0];

    let mut stack = [0u32; STACK_SIZE];
    let mut depth = 1usize;
    let mut hit = None;

    while depth > 0 {
        depth -= 1;
        let node = &bvh.nodes[stack[depth] as usize];
        if !intersect_bbox(ray.origin, d_inv, ray.tmin, ray.tmax, &node.bbox) {
            continue;
        }

        if node.internal {
            // descend the near child first: it sits on top of the stack
            if d_neg[node.axis as usize] {
                stack[depth] = node.start;
                stack[depth + 1] = node.start + 1;
            } else {
                stack[depth] = node.start + 1;
                stack[depth + 1] = node.start;
            }
            depth += 2;
        } else {
            let slots = node.start as usize..node.start as usize + node.num as usize;
            for &prim in &bvh.primitives[slots] {
                let prim = prim as usize;
                let result = if !shape.triangles.is_empty() {
                    let [a, b, c] = shape.triangles[prim];
                    intersect_triangle(
                        &ray,
                        shape.positions[a as usize],
                        shape.positions[b as usize],
                        shape.positions[c as usize],
                    )
                } else if !shape.lines.is_empty() {
                    let [a, b] = shape.lines[prim];
                    intersect_line(
                        &ray,
                        shape.positions[a as usize],
                        shape.positions[b as usize],
                        shape.radius[a as usize],
                        shape.radius[b as usize],
                    )
                } else if !shape.points.is_empty() {
                    let p = shape.points[prim] as usize;
                    intersect_point(&ray, shape.positions[p], shape.radius[p])
                } else {
                    None
                };
                if let Some((uv, distance)) = result {
                    // tighten the query so later nodes are culled early
                    ray.tmax = distance;
                    hit = Some((prim, uv, distance));
                    if find_any {
                        return hit;
                    }
                }
            }
        }
    }
    hit
}

/// Walk the instance tree, recursing into shape trees through each
/// instance's inverse frame. `non_rigid_frames` selects the full affine
/// inverse over the rigid transpose shortcut.
pub fn intersect_scene_bvh(
    scene: &Scene,
    ray: &Ray,
    find_any: bool,
    non_rigid_frames: bool,
) -> Intersection {
    let bvh = &scene.bvh;
    let mut intersection = Intersection::default();
    if bvh.nodes.is_empty() {
        return intersection;
    }

    let mut ray = *ray;
    let d_inv = ray.direction.recip();
    let d_neg = [d_inv.x < 0.0, d_inv.y < 0.0, d_inv.z < 0.0];

    let mut stack = [0u32; STACK_SIZE];
    let mut depth = 1usize;

    while depth > 0 {
        depth -= 1;
        let node = &bvh.nodes[stack[depth] as usize];
        if !intersect_bbox(ray.origin, d_inv, ray.tmin, ray.tmax, &node.bbox) {
            continue;
        }

        if node.internal {
            if d_neg[node.axis as usize] {
                stack[depth] = node.start;
                stack[depth + 1] = node.start + 1;
            } else {
                stack[depth] = node.start + 1;
                stack[depth + 1] = node.start;
            }
            depth += 2;
        } else {
            let slots = node.start as usize..node.start as usize + node.num as usize;
            for &prim in &bvh.primitives[slots] {
                let instance = &scene.instances[prim as usize];
                let inv = inverse_frame(&instance.frame, non_rigid_frames);
                let local_ray = Ray {
                    origin: inv.transform_point3(ray.origin),
                    direction: inv.transform_vector3(ray.direction),
                    tmin: ray.tmin,
                    tmax: ray.tmax,
                };
                if let Some((element, uv, distance)) =
                    intersect_shape_bvh(&scene.shapes[instance.shape], &local_ray, find_any)
                {
                    ray.tmax = distance;
                    intersection = Intersection {
                        hit: true,
                        instance: prim as usize,
                        element,
                        uv,
                        distance,
                    };
                    if find_any {
                        return intersection;
                    }
                }
            }
        }
    }
    intersection
}

/// Query a single instance, skipping the top-level tree.
pub fn intersect_instance_bvh(
    scene: &Scene,
    instance: InstanceId,
    ray: &Ray,
    find_any: bool,
    non_rigid_frames: bool,
) -> Intersection {
    let inst = &scene.instances[instance];
    let inv = inverse_frame(&inst.frame, non_rigid_frames);
    let local_ray = Ray {
        origin: inv.transform_point3(ray.origin),
        direction: inv.transform_vector3(ray.direction),
        tmin: ray.tmin,
        tmax: ray.tmax,
    };
    match intersect_shape_bvh(&scene.shapes[inst.shape], &local_ray, find_any) {
        Some((element, uv, distance)) => Intersection {
            hit: true,
            instance,
            element,
            uv,
            distance,
        },
        None => Intersection::default(),
    }
}
