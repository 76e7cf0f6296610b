//! Layer-ordered draw recording.
//!
//! [`record_layers`] walks the scene's layers in [`RenderLayer::DRAW_ORDER`]
//! and records one indexed draw per render item. Constant addresses come
//! from the current frame slot, so every draw reads the copy that the update
//! step just wrote.

use tracing::trace;

use pbr_resources::{MaterialLibrary, MeshRegistry, TextureId, TextureRegistry};
use pbr_rhi::{Backend, DrawRecorder, RhiResult};

use crate::frame_resource::FrameResource;
use crate::render_item::{LayerPipelines, RenderLayer};
use crate::scene::RenderScene;

/// Per-frame dispatch settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchOptions {
    pub pipelines: LayerPipelines,
    /// Draw every layer with the wireframe pipeline.
    pub wireframe: bool,
    /// Cube map bound with every draw, if any.
    pub environment_texture: Option<TextureId>,
}

/// Records the draws for every layer. Returns the number of draws recorded.
///
/// Empty layers are skipped without binding their pipeline.
///
/// # Errors
///
/// Returns an error if a layer's pipeline cannot be bound.
pub fn record_layers<B, R>(
    recorder: &mut R,
    frame: &FrameResource<B>,
    scene: &RenderScene,
    materials: &MaterialLibrary,
    meshes: &MeshRegistry,
    textures: &TextureRegistry,
    options: &DispatchOptions,
) -> RhiResult<usize>
where
    B: Backend,
    R: DrawRecorder + ?Sized,
{
    let objects = frame.object_constants();
    let material_constants = frame.material_constants();
    let environment = options
        .environment_texture
        .map(|id| textures.descriptor_index(id));

    recorder.bind_pass_constants(frame.pass_constants().device_address(0));

    let mut draws = 0;
    for layer in RenderLayer::DRAW_ORDER {
        let items = scene.layer(layer);
        if items.is_empty() {
            continue;
        }

        recorder.set_pipeline(options.pipelines.get(layer, options.wireframe))?;

        for &id in items {
            let item = scene.get(id);
            let mesh = meshes.get(item.mesh());
            let submesh = &mesh.submeshes[item.submesh()];
            let material = materials.get(item.material());
            let diffuse = material
                .textures()
                .diffuse
                .map(|id| textures.descriptor_index(id));

            recorder.bind_geometry(&mesh.vertex_buffer, &mesh.index_buffer);
            recorder.bind_object_constants(objects.device_address(item.object_index()));
            recorder.bind_material_constants(
                material_constants.device_address(material.constant_index()),
            );
            recorder.bind_textures(environment, diffuse);
            recorder.draw_indexed(
                submesh.index_count,
                submesh.start_index,
                submesh.base_vertex,
            );
        }

        trace!("Recorded {} draw(s) for layer {}", items.len(), layer.name());
        draws += items.len();
    }
    Ok(draws)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use pbr_resources::{MaterialConstants, Mesh, MeshRecipe, TextureChannels};
    use pbr_rhi::PipelineId;
    use pbr_rhi::headless::{DrawCommand, HeadlessCommandList, HeadlessGpu};
    use pbr_rhi::vertex::{IndexBufferView, VertexBufferView};

    use super::*;
    use crate::frame_resource::FrameCapacities;
    use crate::render_item::ItemRole;
    use crate::scene::RenderItemDesc;

    struct Fixture {
        gpu: HeadlessGpu,
        scene: RenderScene,
        materials: MaterialLibrary,
        meshes: MeshRegistry,
        textures: TextureRegistry,
        environment: TextureId,
    }

    /// Three items added in reverse draw order: sky, untextured, textured.
    fn fixture() -> Fixture {
        let mut textures = TextureRegistry::new();
        let environment = textures.register("sky_cube", 0).unwrap();
        let diffuse = textures.register("brick_diffuse", 7).unwrap();
        let metallic = textures.register("brick_metallic", 8).unwrap();
        let specular = textures.register("brick_specular", 9).unwrap();

        let mut materials = MaterialLibrary::new(3);
        let sky = materials
            .create("sky", MaterialConstants::default(), TextureChannels::NONE)
            .unwrap();
        let red = materials
            .create(
                "red",
                MaterialConstants::with_base(Vec3::X, 0.0, 0.5),
                TextureChannels::NONE,
            )
            .unwrap();
        let brick = materials
            .create(
                "brick",
                MaterialConstants::default(),
                TextureChannels {
                    diffuse: Some(diffuse),
                    metallic: Some(metallic),
                    specular: Some(specular),
                    ..TextureChannels::NONE
                },
            )
            .unwrap();

        let data = MeshRecipe::Sphere {
            radius: 1.0,
            slices: 6,
            stacks: 4,
        }
        .build()
        .unwrap();
        let mut meshes = MeshRegistry::new();
        let sphere = meshes
            .register(Mesh {
                name: "sphere".into(),
                vertex_buffer: VertexBufferView {
                    buffer: 0xA000,
                    offset: 0,
                    size: data.vertex_bytes().len() as u64,
                    stride: 56,
                },
                index_buffer: IndexBufferView {
                    buffer: 0xB000,
                    offset: 0,
                    size: data.index_bytes().len() as u64,
                    format: data.index_format(),
                },
                submeshes: vec![data.whole("sphere")],
            })
            .unwrap();

        let mut scene = RenderScene::new(3);
        scene
            .add_item(
                RenderItemDesc::new("sky", sphere, "sphere", sky).with_role(ItemRole::Background),
                &materials,
                &meshes,
            )
            .unwrap();
        scene
            .add_item(
                RenderItemDesc::new("red", sphere, "sphere", red),
                &materials,
                &meshes,
            )
            .unwrap();
        scene
            .add_item(
                RenderItemDesc::new("brick", sphere, "sphere", brick),
                &materials,
                &meshes,
            )
            .unwrap();

        Fixture {
            gpu: HeadlessGpu::new(),
            scene,
            materials,
            meshes,
            textures,
            environment,
        }
    }

    fn record(f: &Fixture, options: &DispatchOptions) -> (FrameResource<HeadlessGpu>, Vec<DrawCommand>) {
        let mut frame = FrameResource::new(
            &f.gpu,
            0,
            FrameCapacities {
                materials: f.materials.constant_slots(),
                objects: f.scene.object_slots(),
            },
        )
        .unwrap();
        let mut list: HeadlessCommandList = f.gpu.begin_command_list(frame.allocator_mut()).unwrap();
        let draws = record_layers(
            &mut list,
            &frame,
            &f.scene,
            &f.materials,
            &f.meshes,
            &f.textures,
            options,
        )
        .unwrap();
        assert_eq!(draws, 3);
        let commands = list.commands().to_vec();
        (frame, commands)
    }

    #[test]
    fn test_layers_drawn_in_fixed_order() {
        let f = fixture();
        let (_, commands) = record(&f, &DispatchOptions::default());

        let pipelines: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::SetPipeline(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(
            pipelines,
            vec![
                PipelineId(RenderLayer::Opaque.index() as u32),
                PipelineId(RenderLayer::OpaqueUntextured.index() as u32),
                PipelineId(RenderLayer::Background.index() as u32),
            ]
        );
        assert!(matches!(commands[0], DrawCommand::BindPassConstants(_)));
    }

    #[test]
    fn test_bindings_use_slot_addresses() {
        let f = fixture();
        let options = DispatchOptions {
            environment_texture: Some(f.environment),
            ..DispatchOptions::default()
        };
        let (frame, commands) = record(&f, &options);

        let brick = f.scene.get(f.scene.find("brick").unwrap());
        let brick_material = f.materials.get(brick.material());
        let objects = frame.object_constants();
        let material_constants = frame.material_constants();

        // First layer drawn is Opaque, which only holds the brick sphere.
        assert_eq!(
            &commands[1..8],
            &[
                DrawCommand::SetPipeline(PipelineId(0)),
                DrawCommand::BindGeometry {
                    vertex_buffer: 0xA000,
                    index_buffer: 0xB000,
                },
                DrawCommand::BindObjectConstants(
                    objects.base_address() + (brick.object_index() * objects.stride()) as u64
                ),
                DrawCommand::BindMaterialConstants(
                    material_constants.base_address()
                        + (brick_material.constant_index() * material_constants.stride()) as u64
                ),
                DrawCommand::BindTextures {
                    environment: Some(0),
                    diffuse: Some(7),
                },
                DrawCommand::DrawIndexed {
                    index_count: f.meshes.get(brick.mesh()).submeshes[0].index_count,
                    start_index: 0,
                    base_vertex: 0,
                },
                DrawCommand::SetPipeline(PipelineId(3)),
            ]
        );
        assert_eq!(
            commands[0],
            DrawCommand::BindPassConstants(frame.pass_constants().base_address())
        );
    }

    #[test]
    fn test_untextured_item_binds_no_diffuse() {
        let f = fixture();
        let (_, commands) = record(&f, &DispatchOptions::default());
        let textures: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::BindTextures { .. }))
            .collect();
        assert_eq!(
            textures[1],
            &DrawCommand::BindTextures {
                environment: None,
                diffuse: None,
            }
        );
    }

    #[test]
    fn test_wireframe_uses_one_pipeline() {
        let f = fixture();
        let options = DispatchOptions {
            wireframe: true,
            ..DispatchOptions::default()
        };
        let (_, commands) = record(&f, &options);
        assert!(
            commands
                .iter()
                .filter_map(|c| match c {
                    DrawCommand::SetPipeline(p) => Some(*p),
                    _ => None,
                })
                .all(|p| p == PipelineId(7))
        );
    }
}
