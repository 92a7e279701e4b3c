// Model upload: raw vertex/index arrays to device-local buffers
//
// Each mesh gets one vertex and one index buffer, filled once through a
// staging transfer and never mutated afterwards. The upload path is
// synchronous: it records every copy into a single one-shot command
// buffer, submits with a fresh fence, blocks until the fence signals, then
// frees the staging buffers. It never touches the per-frame fences or
// command buffers.

use ash::vk;
use std::sync::Arc;

use crate::backend::buffer::DeviceBuffer;
use crate::backend::command::{CommandBuffer, CommandPool};
use crate::backend::device::{LogicalDevice, Queue};
use crate::backend::sync::Fence;
use crate::error::RenderResult;

/// Raw mesh data as produced by a loader: positions, optional texture
/// coordinates, and a triangle index list
pub struct MeshData {
    pub positions: Vec<f32>,
    pub texture_coordinates: Option<Vec<f32>>,
    pub indices: Vec<u32>,
}

/// A named, ordered list of meshes
pub struct ModelData {
    pub id: String,
    pub meshes: Vec<MeshData>,
}

/// Device-local geometry for one mesh
pub struct GpuMesh {
    pub vertex_buffer: DeviceBuffer,
    pub index_buffer: DeviceBuffer,
    pub index_count: u32,
}

pub struct GpuModel {
    pub id: String,
    pub meshes: Vec<GpuMesh>,
}

/// True when any mesh in the set carries texture coordinates. Decides the
/// scene's vertex format.
pub fn has_texture_coordinates(models: &[ModelData]) -> bool {
    models
        .iter()
        .any(|m| m.meshes.iter().any(|mesh| mesh.texture_coordinates.is_some()))
}

/// Interleave per-vertex attributes to match the scene's vertex format:
/// position (3 floats), then texture coordinates (2 floats) when the
/// format is textured. Meshes without coordinates in a textured scene get
/// zero-filled coordinates so every vertex buffer matches the pipeline
/// stride.
fn interleave_vertices(
    positions: &[f32],
    texture_coordinates: Option<&[f32]>,
    textured: bool,
) -> Vec<f32> {
    if !textured {
        return positions.to_vec();
    }
    let vertex_count = positions.len() / 3;
    let mut interleaved = Vec::with_capacity(vertex_count * 5);
    for v in 0..vertex_count {
        interleaved.extend_from_slice(&positions[v * 3..v * 3 + 3]);
        match texture_coordinates {
            Some(uvs) => interleaved.extend_from_slice(&uvs[v * 2..v * 2 + 2]),
            None => interleaved.extend_from_slice(&[0.0, 0.0]),
        }
    }
    interleaved
}

/// Create a staging/destination pair, write `data` into the mapped staging
/// buffer, and record the copy. Returns (staging, destination).
fn stage_buffer(
    device: &Arc<LogicalDevice>,
    command_buffer: &CommandBuffer,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> RenderResult<(DeviceBuffer, DeviceBuffer)> {
    let size = data.len() as vk::DeviceSize;

    let mut staging = DeviceBuffer::new(
        device.clone(),
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let destination = DeviceBuffer::new(
        device.clone(),
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let mapped = staging.map()?;
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
    }
    staging.unmap();

    let region = vk::BufferCopy::builder().size(size).build();
    unsafe {
        device.device.cmd_copy_buffer(
            command_buffer.handle,
            staging.handle,
            destination.handle,
            &[region],
        );
    }

    Ok((staging, destination))
}

/// Upload all models to device-local memory, blocking until the transfer
/// completes. `textured` is the scene vertex format every mesh is
/// normalized to.
pub fn upload_models(
    device: &Arc<LogicalDevice>,
    pool: &Arc<CommandPool>,
    queue: &Queue,
    models: &[ModelData],
    textured: bool,
) -> RenderResult<Vec<GpuModel>> {
    let command_buffer = CommandBuffer::new(pool.clone(), true)?;
    command_buffer.begin()?;

    // Staging buffers stay alive until the fence confirms the copies ran
    let mut staging_buffers = Vec::new();
    let mut gpu_models = Vec::with_capacity(models.len());

    for model in models {
        log::info!("Uploading model [{}]", model.id);
        let mut meshes = Vec::with_capacity(model.meshes.len());
        for mesh in &model.meshes {
            if !textured && mesh.texture_coordinates.is_some() {
                log::warn!(
                    "Model [{}] has texture coordinates, but the scene vertex \
                     format is position-only; ignoring them",
                    model.id
                );
            }
            let vertices = interleave_vertices(
                &mesh.positions,
                mesh.texture_coordinates.as_deref(),
                textured,
            );

            let (vertex_staging, vertex_buffer) = stage_buffer(
                device,
                &command_buffer,
                bytemuck::cast_slice(&vertices),
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?;
            let (index_staging, index_buffer) = stage_buffer(
                device,
                &command_buffer,
                bytemuck::cast_slice(&mesh.indices),
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?;

            staging_buffers.push(vertex_staging);
            staging_buffers.push(index_staging);
            meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
            });
        }
        gpu_models.push(GpuModel {
            id: model.id.clone(),
            meshes,
        });
    }

    command_buffer.end()?;

    let fence = Fence::new(device.clone(), false)?;
    queue.submit(device, command_buffer.handle, None, None, fence.handle)?;
    fence.wait()?;

    drop(staging_buffers);
    Ok(gpu_models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_pass_through_unchanged() {
        let positions = [-0.5, -0.5, 0.0, 0.0, 0.5, 0.0, 0.5, -0.5, 0.0];
        let interleaved = interleave_vertices(&positions, None, false);
        assert_eq!(interleaved, positions);
    }

    #[test]
    fn texture_coordinates_interleave_per_vertex() {
        let positions = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let uvs = [0.1, 0.2, 0.3, 0.4];
        let interleaved = interleave_vertices(&positions, Some(&uvs), true);
        assert_eq!(
            interleaved,
            vec![1.0, 2.0, 3.0, 0.1, 0.2, 4.0, 5.0, 6.0, 0.3, 0.4]
        );
    }

    #[test]
    fn missing_coordinates_zero_filled_in_textured_format() {
        let positions = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let interleaved = interleave_vertices(&positions, None, true);
        assert_eq!(
            interleaved,
            vec![1.0, 2.0, 3.0, 0.0, 0.0, 4.0, 5.0, 6.0, 0.0, 0.0]
        );
    }

    #[test]
    fn coordinates_dropped_in_position_only_format() {
        let positions = [1.0, 2.0, 3.0];
        let uvs = [0.1, 0.2];
        let interleaved = interleave_vertices(&positions, Some(&uvs), false);
        assert_eq!(interleaved, positions);
    }

    #[test]
    fn any_textured_mesh_makes_the_scene_textured() {
        let plain = ModelData {
            id: "plain".to_string(),
            meshes: vec![MeshData {
                positions: vec![0.0; 3],
                texture_coordinates: None,
                indices: vec![0],
            }],
        };
        let textured = ModelData {
            id: "textured".to_string(),
            meshes: vec![MeshData {
                positions: vec![0.0; 3],
                texture_coordinates: Some(vec![0.0; 2]),
                indices: vec![0],
            }],
        };
        assert!(!has_texture_coordinates(std::slice::from_ref(&plain)));
        assert!(has_texture_coordinates(&[plain, textured]));
    }

    #[test]
    fn staging_size_matches_data_exactly() {
        let positions = [0.0_f32; 9];
        let interleaved = interleave_vertices(&positions, None, false);
        let bytes: &[u8] = bytemuck::cast_slice(&interleaved);
        assert_eq!(bytes.len(), 9 * std::mem::size_of::<f32>());
    }
}
