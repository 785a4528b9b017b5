//! Scene Builder Tests
//!
//! Tests for:
//! - Occluders-first dense ordering
//! - Instance attachment and scattering by name
//! - Default instance for meshes left without any
//! - Validation failures (unknown occluder, bad material index)
//! - Cache round-trip through the builder

use glam::{Mat4, Vec3};

use veldt::scene::builder::SceneBuilder;
use veldt::scene::material::Material;
use veldt::scene::mesh::{MeshData, MeshId, Vertex};
use veldt::VeldtError;

fn tri(name: &str) -> MeshData {
    let v = |p: [f32; 3]| Vertex {
        position: p,
        normal: [0.0, 1.0, 0.0],
        texcoord: [0.0, 0.0],
        tangent: [1.0, 0.0, 0.0],
    };
    MeshData::new(
        name,
        vec![v([0.0, 0.0, 0.0]), v([1.0, 0.0, 0.0]), v([0.0, 0.0, 1.0])],
        vec![0, 1, 2],
    )
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn occluders_move_to_the_front() {
    init_logging();
    let mut builder = SceneBuilder::new();
    builder
        .add_mesh(tri("fir"))
        .add_mesh(tri("terrain"))
        .add_mesh(tri("stone"))
        .set_occluders(&["terrain"]);

    let scene = builder.finish().unwrap();
    assert_eq!(scene.occluder_count, 1);
    assert_eq!(scene.meshes[0].name, "terrain");
    assert!(scene.meshes[0].occluder);
    assert!(scene.is_occluder(MeshId(0)));
    assert!(!scene.is_occluder(MeshId(1)));
    // Non-occluders keep their registration order.
    assert_eq!(scene.meshes[1].name, "fir");
    assert_eq!(scene.meshes[2].name, "stone");
}

#[test]
fn scatter_attaches_instances_with_scale() {
    let mut builder = SceneBuilder::new();
    builder.add_mesh(tri("fir"));
    let positions = vec![Vec3::new(1.0, 2.0, 3.0), Vec3::new(-4.0, 0.0, 9.0)];
    builder.scatter("fir", &positions, 0.05).unwrap();

    let scene = builder.finish().unwrap();
    let fir = &scene.meshes[0];
    assert_eq!(fir.instances.len(), 2);

    let world = fir.instances[1].world_matrix();
    let p = world.transform_point3(Vec3::ZERO);
    assert!((p - positions[1]).length() < 1e-6);
    let scaled = world.transform_vector3(Vec3::X);
    assert!((scaled.length() - 0.05).abs() < 1e-6);
}

#[test]
fn mesh_without_instances_gets_a_default_one() {
    init_logging();
    let mut builder = SceneBuilder::new();
    let mut terrain = tri("terrain");
    terrain.world = Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0));
    builder.add_mesh(terrain);

    let scene = builder.finish().unwrap();
    assert_eq!(scene.meshes[0].instances.len(), 1);
    assert_eq!(
        scene.meshes[0].instances[0].world_matrix(),
        Mat4::from_translation(Vec3::new(0.0, -2.0, 0.0))
    );
    assert_eq!(scene.total_instances(), 1);
}

#[test]
fn unknown_occluder_name_fails() {
    let mut builder = SceneBuilder::new();
    builder.add_mesh(tri("fir")).set_occluders(&["terrain"]);
    let err = builder.finish().unwrap_err();
    assert!(matches!(err, VeldtError::MeshNotFound(name) if name == "terrain"));
}

#[test]
fn instance_for_unknown_mesh_fails() {
    let mut builder = SceneBuilder::new();
    let err = builder.add_instance("ghost", Mat4::IDENTITY).unwrap_err();
    assert!(matches!(err, VeldtError::MeshNotFound(_)));
}

#[test]
fn out_of_range_material_index_fails() {
    let mut builder = SceneBuilder::new();
    let mut mesh = tri("fir");
    mesh.material_index = 5;
    builder.add_mesh(mesh).add_material(Material::new("bark", 0, 3));
    let err = builder.finish().unwrap_err();
    assert!(matches!(err, VeldtError::SceneBuild(_)));
}

#[test]
fn builder_cache_round_trip() {
    let mut builder = SceneBuilder::new();
    builder
        .add_mesh(tri("terrain"))
        .add_mesh(tri("fir"))
        .add_material(Material::new("grass", 0, 3));
    builder.scatter("fir", &[Vec3::ONE], 2.0).unwrap();

    let cache = builder.to_cache();
    let bytes = cache.encode();

    let rebuilt = SceneBuilder::from_cache(
        veldt::scene::cache::SceneCache::decode(&bytes).unwrap(),
        3,
    );
    let cache2 = rebuilt.to_cache();
    // Instances are not part of the persisted format; geometry, transforms
    // and tables survive byte-exactly.
    assert_eq!(cache2.meshes.len(), 2);
    assert_eq!(cache2.materials.len(), 1);
    assert_eq!(cache2.encode().len(), bytes.len());
}
