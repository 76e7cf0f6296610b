//! Per-tick constant updates.
//!
//! Each frame slot keeps a private copy of every constant. Mutating an item
//! or material resets its dirty counter to K; every tick the update step
//! writes dirty entries into the current slot and decrements the counters,
//! so after K ticks all slots hold the latest values.

use tracing::trace;

use pbr_resources::{MaterialConstants, MaterialLibrary, ObjectConstants, PassConstants};
use pbr_rhi::HostVisibleBuffer;

use crate::scene::RenderScene;
use crate::upload_buffer::UploadBuffer;

/// Writes every dirty render item into `buffer`. Returns the number written.
pub fn update_object_constants<M: HostVisibleBuffer>(
    scene: &mut RenderScene,
    buffer: &mut UploadBuffer<ObjectConstants, M>,
) -> usize {
    let mut writes = 0;
    for item in scene.dirty_mut() {
        buffer.write(item.object_index(), &item.object_constants());
        item.mark_frame_updated();
        writes += 1;
    }
    if writes > 0 {
        trace!("Updated {} object constant(s)", writes);
    }
    writes
}

/// Writes every dirty material into `buffer`. Returns the number written.
pub fn update_material_constants<M: HostVisibleBuffer>(
    materials: &mut MaterialLibrary,
    buffer: &mut UploadBuffer<MaterialConstants, M>,
) -> usize {
    let mut writes = 0;
    for material in materials.dirty_mut() {
        buffer.write(material.constant_index(), &material.properties().to_gpu());
        material.mark_frame_updated();
        writes += 1;
    }
    if writes > 0 {
        trace!("Updated {} material constant(s)", writes);
    }
    writes
}

/// Writes the pass constants into `buffer`.
///
/// Pass constants change every tick, so they are written unconditionally.
pub fn update_pass_constants<M: HostVisibleBuffer>(
    pass: &PassConstants,
    buffer: &mut UploadBuffer<PassConstants, M>,
) -> usize {
    buffer.write(0, pass);
    1
}
