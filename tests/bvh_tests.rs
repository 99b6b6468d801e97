use glam::{Affine3A, Vec2, Vec3};
use glint::bvh::{init_bvh, intersect_instance_bvh, intersect_scene_bvh};
use glint::geometry::{intersect_triangle, inverse_frame, Ray};
use glint::scene::Scene;
use glint::shader::RaytraceParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rand_vec3(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

/// Random triangle soup in a single shape + instance.
fn random_scene(rng: &mut StdRng, triangles: usize, frame: Affine3A) -> Scene {
    let mut scene = Scene::default();
    let shape = scene.add_shape();
    let mut positions = Vec::new();
    let mut elements = Vec::new();
    for t in 0..triangles {
        let base = rand_vec3(rng, 2.0);
        positions.push(base);
        positions.push(base + rand_vec3(rng, 0.7));
        positions.push(base + rand_vec3(rng, 0.7));
        let i = (t * 3) as u32;
        elements.push([i, i + 1, i + 2]);
    }
    scene.set_positions(shape, positions);
    scene.set_triangles(shape, elements);
    let material = scene.add_material();
    let instance = scene.add_instance();
    scene.set_instance_shape(instance, shape);
    scene.set_instance_material(instance, material);
    scene.set_instance_frame(instance, frame);
    scene
}

/// Reference answer: test every triangle of every instance.
fn brute_force(scene: &Scene, ray: &Ray) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for (iid, instance) in scene.instances.iter().enumerate() {
        let inv = inverse_frame(&instance.frame, false);
        let local = Ray {
            origin: inv.transform_point3(ray.origin),
            direction: inv.transform_vector3(ray.direction),
            tmin: ray.tmin,
            tmax: ray.tmax,
        };
        let shape = &scene.shapes[instance.shape];
        for (element, &[a, b, c]) in shape.triangles.iter().enumerate() {
            if let Some((_, t)) = intersect_triangle(
                &local,
                shape.positions[a as usize],
                shape.positions[b as usize],
                shape.positions[c as usize],
            ) {
                if best.map_or(true, |(_, _, bt)| t < bt) {
                    best = Some((iid, element, t));
                }
            }
        }
    }
    best
}

#[test]
fn traversal_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for round in 0..8 {
        let mut scene = random_scene(&mut rng, 10 + round * 12, Affine3A::IDENTITY);
        init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

        for _ in 0..200 {
            let ray = Ray::new(rand_vec3(&mut rng, 4.0), rand_vec3(&mut rng, 1.0).normalize());
            let reference = brute_force(&scene, &ray);
            let isec = intersect_scene_bvh(&scene, &ray, false, false);
            match reference {
                None => assert!(!isec.hit),
                Some((_, _, t)) => {
                    assert!(isec.hit);
                    assert!(
                        (isec.distance - t).abs() <= 1e-5 * t.max(1.0),
                        "bvh {} vs brute {}",
                        isec.distance,
                        t
                    );
                }
            }
        }
    }
}

#[test]
fn traversal_matches_brute_force_under_instance_frames() {
    let mut rng = StdRng::seed_from_u64(0xfeed);
    let frame = Affine3A::from_rotation_y(0.8) * Affine3A::from_translation(Vec3::new(1.0, -2.0, 3.0));
    let mut scene = random_scene(&mut rng, 60, frame);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    for _ in 0..200 {
        let ray = Ray::new(rand_vec3(&mut rng, 6.0), rand_vec3(&mut rng, 1.0).normalize());
        let reference = brute_force(&scene, &ray);
        let isec = intersect_scene_bvh(&scene, &ray, false, false);
        assert_eq!(isec.hit, reference.is_some());
        if let Some((_, _, t)) = reference {
            assert!((isec.distance - t).abs() <= 1e-4 * t.max(1.0));
        }
    }
}

#[test]
fn find_any_agrees_on_hit_presence() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut scene = random_scene(&mut rng, 40, Affine3A::IDENTITY);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    for _ in 0..200 {
        let ray = Ray::new(rand_vec3(&mut rng, 4.0), rand_vec3(&mut rng, 1.0).normalize());
        let nearest = intersect_scene_bvh(&scene, &ray, false, false);
        let any = intersect_scene_bvh(&scene, &ray, true, false);
        assert_eq!(nearest.hit, any.hit);
        if any.hit {
            // a shadow query may stop early but never below tmin
            assert!(any.distance >= ray.tmin);
        }
    }
}

#[test]
fn leaf_primitives_are_a_permutation() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 137;
    let mut scene = random_scene(&mut rng, n, Affine3A::IDENTITY);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    let mut primitives = scene.shapes[0].bvh.primitives.clone();
    primitives.sort_unstable();
    assert_eq!(primitives, (0..n as u32).collect::<Vec<_>>());
}

#[test]
fn ray_from_inside_a_closed_mesh_hits() {
    let mut scene = Scene::default();
    let shape = scene.add_shape();
    let positions = vec![
        Vec3::new(-1.0, -1.0, -1.0),
        Vec3::new(1.0, -1.0, -1.0),
        Vec3::new(1.0, 1.0, -1.0),
        Vec3::new(-1.0, 1.0, -1.0),
        Vec3::new(-1.0, -1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(-1.0, 1.0, 1.0),
    ];
    let triangles = vec![
        [0, 1, 2], [0, 2, 3], // -z
        [4, 6, 5], [4, 7, 6], // +z
        [0, 4, 5], [0, 5, 1], // -y
        [3, 2, 6], [3, 6, 7], // +y
        [0, 3, 7], [0, 7, 4], // -x
        [1, 5, 6], [1, 6, 2], // +x
    ];
    scene.set_positions(shape, positions);
    scene.set_triangles(shape, triangles);
    let material = scene.add_material();
    let instance = scene.add_instance();
    scene.set_instance_shape(instance, shape);
    scene.set_instance_material(instance, material);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..64 {
        let ray = Ray::new(Vec3::ZERO, rand_vec3(&mut rng, 1.0).normalize());
        let isec = intersect_scene_bvh(&scene, &ray, false, false);
        assert!(isec.hit, "ray from inside the cube must reach a wall");
        assert!(isec.distance >= 1.0 - 1e-4 && isec.distance <= 3.0f32.sqrt() + 1e-4);
    }
}

#[test]
fn empty_scene_reports_no_hit() {
    let mut scene = Scene::default();
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();
    let ray = Ray::new(Vec3::ZERO, Vec3::Z);
    assert!(!intersect_scene_bvh(&scene, &ray, false, false).hit);

    // shape with no elements is a valid placeholder
    let shape = scene.add_shape();
    let material = scene.add_material();
    let instance = scene.add_instance();
    scene.set_instance_shape(instance, shape);
    scene.set_instance_material(instance, material);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();
    assert!(!intersect_scene_bvh(&scene, &ray, false, false).hit);
}

#[test]
fn instance_query_matches_scene_query_for_single_instance() {
    let mut rng = StdRng::seed_from_u64(23);
    let frame = Affine3A::from_translation(Vec3::new(0.0, 0.5, -1.0));
    let mut scene = random_scene(&mut rng, 50, frame);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    for _ in 0..100 {
        let ray = Ray::new(rand_vec3(&mut rng, 4.0), rand_vec3(&mut rng, 1.0).normalize());
        let scene_isec = intersect_scene_bvh(&scene, &ray, false, false);
        let inst_isec = intersect_instance_bvh(&scene, 0, &ray, false, false);
        assert_eq!(scene_isec.hit, inst_isec.hit);
        if scene_isec.hit {
            assert_eq!(scene_isec.element, inst_isec.element);
            assert!((scene_isec.distance - inst_isec.distance).abs() < 1e-6);
        }
    }
}

#[test]
fn progress_callback_sees_every_stage() {
    let mut rng = StdRng::seed_from_u64(31);
    let mut scene = random_scene(&mut rng, 20, Affine3A::IDENTITY);
    let extra = scene.add_shape();
    scene.set_positions(extra, vec![Vec3::ZERO, Vec3::X, Vec3::Y]);
    scene.set_triangles(extra, vec![[0, 1, 2]]);

    let mut stages: Vec<(String, usize, usize)> = Vec::new();
    let mut callback = |name: &str, current: usize, total: usize| {
        stages.push((name.to_string(), current, total));
    };
    init_bvh(&mut scene, &RaytraceParams::default(), Some(&mut callback)).unwrap();

    assert_eq!(stages.len(), 3);
    assert!(stages[..2].iter().all(|(name, _, _)| name == "build shape bvh"));
    assert_eq!(stages[2].0, "build scene bvh");
    assert!(stages.iter().all(|&(_, current, total)| current < total));
}

#[test]
fn degenerate_primitives_never_hit() {
    let mut scene = Scene::default();
    let shape = scene.add_shape();
    // one real triangle, one zero-area sliver
    scene.set_positions(
        shape,
        vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::splat(5.0), Vec3::splat(5.0), Vec3::splat(5.0)],
    );
    scene.set_triangles(shape, vec![[0, 1, 2], [3, 4, 5]]);
    let material = scene.add_material();
    let instance = scene.add_instance();
    scene.set_instance_shape(instance, shape);
    scene.set_instance_material(instance, material);
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    let ray = Ray::new(Vec3::new(5.0, 5.0, 0.0), Vec3::Z);
    assert!(!intersect_scene_bvh(&scene, &ray, false, false).hit);

    let ray = Ray::new(Vec3::new(0.25, 0.25, -1.0), Vec3::Z);
    let isec = intersect_scene_bvh(&scene, &ray, false, false);
    assert!(isec.hit);
    assert_eq!(isec.element, 0);
}

#[test]
fn lines_and_points_are_intersectable() {
    let mut scene = Scene::default();
    let hair = scene.add_shape();
    scene.set_positions(hair, vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
    scene.set_lines(hair, vec![[0, 1]]);
    scene.set_radius(hair, vec![0.1, 0.1]);

    let dots = scene.add_shape();
    scene.set_positions(dots, vec![Vec3::new(0.0, 2.0, 0.0)]);
    scene.set_points(dots, vec![0]);
    scene.set_radius(dots, vec![0.25]);

    let material = scene.add_material();
    for shape in [hair, dots] {
        let instance = scene.add_instance();
        scene.set_instance_shape(instance, shape);
        scene.set_instance_material(instance, material);
    }
    init_bvh(&mut scene, &RaytraceParams::default(), None).unwrap();

    let isec = intersect_scene_bvh(&scene, &Ray::new(Vec3::new(0.5, 0.0, -2.0), Vec3::Z), false, false);
    assert!(isec.hit);
    assert_eq!(isec.instance, 0);
    assert!((isec.uv.x - 0.75).abs() < 1e-3);

    let isec = intersect_scene_bvh(&scene, &Ray::new(Vec3::new(0.0, 2.0, -2.0), Vec3::Z), false, false);
    assert!(isec.hit);
    assert_eq!(isec.instance, 1);
    assert_eq!(isec.uv, Vec2::ZERO);
}
