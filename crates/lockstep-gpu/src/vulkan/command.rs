//! Command pools and translation of recorded commands to Vulkan.

use crate::backend::Command;
use crate::error::{GpuError, Result};
use ash::vk;
use lockstep_core::ResourceState;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None) }?;

        Ok(Self { pool })
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::Other("driver returned no command buffer".to_string()))
    }

    /// Reset the command pool.
    ///
    /// # Safety
    /// No command buffer from this pool may be pending execution.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty()) }?;
        Ok(())
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Layouts, access masks and stages of one image barrier.
#[derive(Debug, Clone, Copy)]
pub struct BarrierMasks {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Map a state transition onto a Vulkan image barrier.
///
/// Render targets are cleared with transfer commands, so the render-target
/// state is `TRANSFER_DST_OPTIMAL`. The previous contents are discarded on
/// the way in.
pub fn barrier_masks(from: ResourceState, to: ResourceState) -> Result<BarrierMasks> {
    match (from, to) {
        (ResourceState::Present, ResourceState::RenderTarget) => Ok(BarrierMasks {
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            // Matches the stage the acquire semaphore is waited at
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (ResourceState::RenderTarget, ResourceState::Present) => Ok(BarrierMasks {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::empty(),
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        }),
        (from, to) => Err(GpuError::InvalidBarrier(format!(
            "no transition from {from:?} to {to:?}"
        ))),
    }
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Record `commands` into `cmd`, addressing swapchain `images` by index.
///
/// # Safety
/// The device and command buffer must be valid and `cmd` must be in the
/// initial state.
pub unsafe fn record_commands(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    images: &[vk::Image],
    commands: &[Command],
) -> Result<()> {
    let image = |index: usize| {
        images
            .get(index)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("no swapchain image {index}")))
    };

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cmd, &begin_info) }?;

    for command in commands {
        match *command {
            Command::Transition {
                image: index,
                from,
                to,
            } => {
                let masks = barrier_masks(from, to)?;
                let barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(masks.old_layout)
                    .new_layout(masks.new_layout)
                    .src_access_mask(masks.src_access)
                    .dst_access_mask(masks.dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image(index)?)
                    .subresource_range(color_range());
                unsafe {
                    device.cmd_pipeline_barrier(
                        cmd,
                        masks.src_stage,
                        masks.dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
            }
            Command::Clear {
                image: index,
                color,
            } => {
                let clear = vk::ClearColorValue { float32: color.0 };
                unsafe {
                    device.cmd_clear_color_image(
                        cmd,
                        image(index)?,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &clear,
                        &[color_range()],
                    );
                }
            }
        }
    }

    unsafe { device.end_command_buffer(cmd) }?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_target_transition_targets_transfer() {
        let masks = barrier_masks(ResourceState::Present, ResourceState::RenderTarget).unwrap();
        assert_eq!(masks.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn present_transition_makes_writes_available() {
        let masks = barrier_masks(ResourceState::RenderTarget, ResourceState::Present).unwrap();
        assert_eq!(masks.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(masks.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn identity_transition_is_rejected() {
        let err = barrier_masks(ResourceState::Present, ResourceState::Present).unwrap_err();
        assert!(matches!(err, GpuError::InvalidBarrier(_)));
    }
}
