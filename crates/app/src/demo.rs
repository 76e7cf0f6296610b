//! The PBR sphere scene.
//!
//! A sky sphere, a row of nine textured spheres and a 7x7 grid of red
//! spheres sweeping roughness along x and metallic along y. Textures are
//! treated as already resident; each gets the next descriptor index.

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use tracing::info;

use pbr_renderer::{ItemRole, RenderItemDesc, RenderScene, SceneResources};
use pbr_resources::{
    Light, MaterialConstants, MaterialLibrary, Mesh, MeshData, MeshRecipe, MeshRegistry,
    PassConstants, TextureChannels, TextureId, TextureRegistry,
};
use pbr_rhi::vertex::{IndexBufferView, Vertex, VertexBufferView};
use pbr_rhi::{Backend, HostVisibleBuffer};

/// Window size the projection is built for.
pub const VIEWPORT: (f32, f32) = (1280.0, 720.0);

const SKY_SCALE: f32 = 5000.0;
const GRID_SIZE: usize = 7;
const GRID_SPACING: f32 = 2.5;

/// Textured spheres: material name, texture set prefix, channels present, x offset.
const TEXTURED_SPHERES: [(&str, &str, &[Channel], f32); 9] = [
    ("sphere_rust", "ri", &METAL_ROUGH, 0.0),
    ("sphere_rock_copper", "rc", &METAL_ROUGH, -2.5),
    ("sphere_brick_modern", "bm1k", &TILED, -5.0),
    ("sphere_concrete_dirty", "cd1k", &TILED, -7.5),
    ("sphere_concrete_rough", "cr1k", &TILED, -10.0),
    ("sphere_grass_wild", "gw1k", &TILED, 2.5),
    ("sphere_metal_bare", "mb1k", &TILED_METAL, 5.0),
    ("sphere_soil_mud", "sm1k", &TILED, 7.5),
    ("sphere_stone_wall", "sw1k", &TILED, 10.0),
];

/// Channels of the metal/roughness texture sets.
const METAL_ROUGH: [Channel; 4] = [
    Channel::Diffuse,
    Channel::Metallic,
    Channel::Roughness,
    Channel::Normal,
];

/// Channels of the bare metal texture set.
const TILED_METAL: [Channel; 6] = [
    Channel::Diffuse,
    Channel::Specular,
    Channel::Metallic,
    Channel::Roughness,
    Channel::Normal,
    Channel::Displacement,
];

/// Channels of the tiled 1K texture sets.
const TILED: [Channel; 5] = [
    Channel::Diffuse,
    Channel::Specular,
    Channel::Roughness,
    Channel::Normal,
    Channel::Displacement,
];

#[derive(Clone, Copy, Debug)]
enum Channel {
    Diffuse,
    Specular,
    Metallic,
    Roughness,
    Normal,
    Displacement,
}

impl Channel {
    fn suffix(self) -> &'static str {
        match self {
            Channel::Diffuse => "diffuse",
            Channel::Specular => "specular",
            Channel::Metallic => "metallic",
            Channel::Roughness => "roughness",
            Channel::Normal => "normal",
            Channel::Displacement => "displacement",
        }
    }

    fn assign(self, channels: &mut TextureChannels, texture: TextureId) {
        let slot = match self {
            Channel::Diffuse => &mut channels.diffuse,
            Channel::Specular => &mut channels.specular,
            Channel::Metallic => &mut channels.metallic,
            Channel::Roughness => &mut channels.roughness,
            Channel::Normal => &mut channels.normal,
            Channel::Displacement => &mut channels.displacement,
        };
        *slot = Some(texture);
    }
}

/// The demo scene plus the memory backing its geometry.
pub struct Demo<B: Backend> {
    pub resources: SceneResources,
    pub environment: TextureId,
    /// Vertex and index memory; must outlive the renderer.
    pub geometry: Vec<B::Memory>,
}

/// Builds the scene for `frames_in_flight` frame slots, uploading sphere
/// geometry through `backend`.
pub fn build<B: Backend>(backend: &B, frames_in_flight: usize) -> Result<Demo<B>> {
    let mut textures = TextureRegistry::new();
    let mut next_descriptor = 0u32;
    let mut register = |textures: &mut TextureRegistry, name: &str| -> Result<TextureId> {
        let id = textures.register(name, next_descriptor)?;
        next_descriptor += 1;
        Ok(id)
    };

    let sky_box = register(&mut textures, "sky_box")?;
    let environment = register(&mut textures, "sky_env")?;

    let mut materials = MaterialLibrary::new(frames_in_flight);
    let sky_material = materials.create(
        "sky_box",
        MaterialConstants::default(),
        TextureChannels {
            diffuse: Some(sky_box),
            ..TextureChannels::NONE
        },
    )?;

    let mut textured = Vec::with_capacity(TEXTURED_SPHERES.len());
    for (name, prefix, channels, x) in TEXTURED_SPHERES {
        let mut set = TextureChannels::NONE;
        for &channel in channels {
            let texture = register(&mut textures, &format!("{}_{}", prefix, channel.suffix()))?;
            channel.assign(&mut set, texture);
        }
        let id = materials.create(name, MaterialConstants::default(), set)?;
        textured.push((name, id, x));
    }

    let mut red = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
    for i in 0..GRID_SIZE * GRID_SIZE {
        let mut properties = MaterialConstants::with_base(
            Vec3::new(1.0, 0.0, 0.0),
            1.0 - (i / GRID_SIZE) as f32 / (GRID_SIZE - 1) as f32,
            (i % GRID_SIZE) as f32 / (GRID_SIZE - 1) as f32,
        );
        properties.fresnel_r0 = Vec3::splat(0.04);
        let name = format!("sphere_red_{}", i);
        let id = materials.create(&name, properties, TextureChannels::NONE)?;
        red.push((name, id));
    }

    let mut geometry = Vec::new();
    let mut meshes = MeshRegistry::new();
    let sphere_data = MeshRecipe::Sphere {
        radius: 1.0,
        slices: 64,
        stacks: 32,
    }
    .build()?;
    let sky_mesh = meshes.register(upload_mesh(backend, "sky_box", &sphere_data, &mut geometry)?)?;
    let sphere_mesh = meshes.register(upload_mesh(backend, "sphere", &sphere_data, &mut geometry)?)?;

    let mut scene = RenderScene::new(frames_in_flight);
    scene.add_item(
        RenderItemDesc::new("sky_box", sky_mesh, "sphere", sky_material)
            .with_world(Mat4::from_scale(Vec3::splat(SKY_SCALE)))
            .with_role(ItemRole::Background),
        &materials,
        &meshes,
    )?;
    for (name, material, x) in textured {
        scene.add_item(
            RenderItemDesc::new(name, sphere_mesh, "sphere", material)
                .with_world(Mat4::from_translation(Vec3::new(x, 0.0, 0.0))),
            &materials,
            &meshes,
        )?;
    }
    for (i, (name, material)) in red.into_iter().enumerate() {
        let x = (i % GRID_SIZE) as f32 * GRID_SPACING - 3.0 * GRID_SPACING;
        let y = (i / GRID_SIZE) as f32 * -GRID_SPACING - GRID_SPACING;
        scene.add_item(
            RenderItemDesc::new(&name, sphere_mesh, "sphere", material)
                .with_world(Mat4::from_translation(Vec3::new(x, y, 0.0))),
            &materials,
            &meshes,
        )?;
    }

    info!(
        "Demo scene built: {} render items, {} materials, {} textures",
        scene.len(),
        materials.len(),
        textures.len()
    );

    Ok(Demo {
        resources: SceneResources {
            materials,
            meshes,
            textures,
            scene,
        },
        environment,
        geometry,
    })
}

/// Fills the pass constants with the demo camera and lights.
pub fn setup_pass(pass: &mut PassConstants) {
    let (width, height) = VIEWPORT;
    let (near_z, far_z) = (0.1, 100.0);
    let eye = Vec3::new(0.0, 0.0, -5.0);
    let view = Mat4::look_to_lh(eye, Vec3::Z, Vec3::Y);
    let proj = Mat4::perspective_lh(std::f32::consts::FRAC_PI_4, width / height, near_z, far_z);

    pass.set_camera(view, proj, eye);
    pass.set_viewport(width, height, near_z, far_z);

    let strength = Vec3::splat(0.25);
    let d = 0.57735;
    for (light, direction) in pass.lights.iter_mut().zip([
        Vec3::new(d, d, d),
        Vec3::new(d, -d, d),
        Vec3::new(-d, d, d),
        Vec3::new(-d, -d, d),
    ]) {
        *light = Light::directional(direction, strength);
    }
}

fn upload_mesh<B: Backend>(
    backend: &B,
    name: &str,
    data: &MeshData,
    geometry: &mut Vec<B::Memory>,
) -> Result<Mesh> {
    let vertex_bytes = data.vertex_bytes();
    let index_bytes = data.index_bytes();

    let vertices = upload(backend, vertex_bytes, &format!("{}_vertices", name))?;
    let indices = upload(backend, &index_bytes, &format!("{}_indices", name))?;

    let mesh = Mesh {
        name: name.to_string(),
        vertex_buffer: VertexBufferView {
            buffer: vertices.device_address(),
            offset: 0,
            size: vertex_bytes.len() as u64,
            stride: Vertex::size() as u32,
        },
        index_buffer: IndexBufferView {
            buffer: indices.device_address(),
            offset: 0,
            size: index_bytes.len() as u64,
            format: data.index_format(),
        },
        submeshes: vec![data.whole("sphere")],
    };
    geometry.push(vertices);
    geometry.push(indices);
    Ok(mesh)
}

fn upload<B: Backend>(backend: &B, bytes: &[u8], label: &str) -> Result<B::Memory> {
    let mut memory = backend
        .create_upload_memory(bytes.len() as u64, label)
        .with_context(|| format!("Failed to allocate '{}'", label))?;
    memory.mapped_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
    Ok(memory)
}

#[cfg(test)]
mod tests {
    use pbr_renderer::RenderLayer;
    use pbr_rhi::headless::HeadlessGpu;

    use super::*;

    #[test]
    fn test_scene_layout() {
        let gpu = HeadlessGpu::new();
        let demo = build(&gpu, 3).unwrap();
        let scene = &demo.resources.scene;

        assert_eq!(scene.len(), 1 + 9 + 49);
        assert_eq!(demo.resources.materials.len(), 1 + 9 + 49);
        assert_eq!(scene.layer(RenderLayer::Background).len(), 1);
        assert_eq!(scene.layer(RenderLayer::Opaque).len(), 1);
        assert_eq!(scene.layer(RenderLayer::OpaqueNoSpecular).len(), 2);
        assert_eq!(scene.layer(RenderLayer::OpaqueNoMetallic).len(), 6);
        assert_eq!(scene.layer(RenderLayer::OpaqueUntextured).len(), 49);
        assert_eq!(demo.geometry.len(), 4);
    }

    #[test]
    fn test_red_grid_parameters() {
        let gpu = HeadlessGpu::new();
        let demo = build(&gpu, 3).unwrap();
        let materials = &demo.resources.materials;

        let first = materials.get(materials.find("sphere_red_0").unwrap());
        assert_eq!(first.properties().metallic, 1.0);
        assert_eq!(first.properties().roughness, 0.0);

        let last = materials.get(materials.find("sphere_red_48").unwrap());
        assert_eq!(last.properties().metallic, 0.0);
        assert_eq!(last.properties().roughness, 1.0);

        let scene = &demo.resources.scene;
        let item = scene.get(scene.find("sphere_red_8").unwrap());
        assert_eq!(
            item.world().w_axis.truncate(),
            Vec3::new(-5.0, -5.0, 0.0)
        );
    }

    #[test]
    fn test_pass_lights() {
        let mut pass = PassConstants::default();
        setup_pass(&mut pass);
        assert_eq!(pass.lights[0].strength, Vec3::splat(0.25));
        assert!(
            pass.lights[3]
                .direction
                .abs_diff_eq(Vec3::new(-1.0, -1.0, 1.0).normalize(), 1e-5)
        );
        assert_eq!(pass.lights[4], Light::default());
        assert_eq!(pass.near_z, 0.1);
    }
}
