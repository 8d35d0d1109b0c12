//! Demo scene: a reflective sphere grid on a plane under a few lights.
//!
//! Pass a glTF file as the first argument to drop it into the scene.

use ember::resources::{model, Material, Mesh};
use ember::scene::{Entity, Light};
use ember::{EngineConfig, EngineResult};
use glam::Vec3;

fn main() -> EngineResult<()> {
    let model_path = std::env::args().nth(1);

    ember::window::run(EngineConfig::default(), move |engine| {
        let floor_material = push_material(
            engine,
            Material::new("floor")
                .with_albedo(Vec3::new(0.35, 0.35, 0.4))
                .with_reflectivity(0.05),
        );
        let glowing_material = push_material(
            engine,
            Material::new("glowing")
                .with_albedo(Vec3::new(0.1, 0.1, 0.1))
                .with_emissive(Vec3::new(2.5, 1.6, 0.4)),
        );

        let floor = engine.add_primitive_model(engine.plane_mesh, floor_material, "floor");
        let mut floor_entity = Entity::new("floor", floor);
        floor_entity.scale = Vec3::new(12.0, 1.0, 12.0);
        floor_entity.position.y = -1.0;
        engine.scene.entities.push(floor_entity);

        for row in 0..3 {
            let reflectivity = row as f32 / 2.0;
            let material = push_material(
                engine,
                Material::new(&format!("sphere row {row}"))
                    .with_albedo(Vec3::new(0.8, 0.3 + 0.2 * row as f32, 0.3))
                    .with_reflectivity(reflectivity),
            );
            let sphere = engine.add_primitive_model(
                engine.sphere_mesh,
                material,
                &format!("sphere {row}"),
            );
            for column in 0..3 {
                let name = format!("sphere {row}x{column}");
                let entity = Entity::new(&name, sphere).at(Vec3::new(
                    (column as f32 - 1.0) * 2.5,
                    0.0,
                    (row as f32 - 1.0) * 2.5,
                ));
                engine.scene.entities.push(entity);
            }
        }

        let cube_mesh = Mesh::create(engine.device(), &model::shaded_cube(0.5), "glow cube");
        engine.pools.meshes.push(cube_mesh);
        let cube_mesh_index = engine.pools.meshes.len() - 1;
        let glow_cube = engine.add_primitive_model(cube_mesh_index, glowing_material, "glow cube");
        engine
            .scene
            .entities
            .push(Entity::new("glow cube", glow_cube).at(Vec3::new(0.0, 2.0, 0.0)));

        engine
            .scene
            .lights
            .push(Light::directional(Vec3::new(1.0, 0.96, 0.9), Vec3::new(-0.4, -1.0, -0.3)));
        engine.scene.lights.push(Light::point(
            Vec3::new(0.2, 0.4, 1.0),
            Vec3::new(3.0, 1.5, 0.0),
            12.0,
        ));
        engine.scene.lights.push(Light::point(
            Vec3::new(1.0, 0.3, 0.2),
            Vec3::new(-3.0, 1.5, 0.0),
            12.0,
        ));

        engine.scene.camera.position = Vec3::new(0.0, 3.0, -9.0);
        engine.scene.camera.target = Vec3::new(0.0, 0.4, 0.0);

        if let Some(path) = &model_path {
            for model_index in engine.load_model(path)? {
                let name = format!("imported {model_index}");
                engine.scene.entities.push(Entity::new(&name, model_index));
            }
        }

        Ok(())
    })
}

fn push_material(engine: &mut ember::Engine, material: Material) -> usize {
    engine.pools.materials.push(material);
    engine.pools.materials.len() - 1
}
