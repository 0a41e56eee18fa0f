//! Vulkan backend.
//!
//! The frame timeline is one timeline semaphore signalled by an empty
//! submission after each frame's work. Each frame slot owns a command pool,
//! a command buffer and the binary semaphore its swapchain acquire signals;
//! each swapchain image owns the semaphore presentation waits on.

pub mod capabilities;
pub mod command;
pub mod context;
pub mod instance;
pub mod surface;
pub mod swapchain;
pub mod sync;

use ash::vk;
use lockstep_core::{Extent2D, TimelineValue};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Duration;

use crate::backend::{BackendInfo, Command, GpuBackend, PresentParams, WaitStatus};
use crate::error::{GpuError, Result};
use command::CommandPool;
use context::GpuContext;
use surface::SurfaceContext;
use swapchain::Swapchain;

/// Recording resources of one frame slot.
pub struct VulkanRecorder {
    slot: usize,
    pool: CommandPool,
    cmd: vk::CommandBuffer,
    image_available: vk::Semaphore,
}

impl VulkanRecorder {
    /// Slot this recorder belongs to.
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }
}

/// Windowed Vulkan backend.
pub struct VulkanBackend {
    surface: SurfaceContext,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: Swapchain,
    render_finished: Vec<vk::Semaphore>,
    timeline: vk::Semaphore,
    current_image: usize,
    vsync: bool,
    tearing_supported: bool,
    needs_rebuild: bool,
    // Dropped last; every handle above belongs to it.
    context: GpuContext,
}

/// Builder for creating a Vulkan backend.
pub struct VulkanBackendBuilder {
    app_name: String,
    enable_validation: bool,
    vsync: bool,
    extent: Extent2D,
}

impl Default for VulkanBackendBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lockstep".to_string(),
            enable_validation: cfg!(debug_assertions),
            vsync: true,
            extent: Extent2D::new(
                lockstep_core::constants::DEFAULT_WIDTH,
                lockstep_core::constants::DEFAULT_HEIGHT,
            ),
        }
    }
}

impl VulkanBackendBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Initial vsync preference.
    #[must_use]
    pub const fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Initial swapchain extent, used when the surface leaves it to us.
    #[must_use]
    pub const fn extent(mut self, extent: Extent2D) -> Self {
        self.extent = extent;
        self
    }

    /// Build the backend for a window.
    ///
    /// The window must outlive the backend.
    pub fn build<W>(self, window: &W) -> Result<VulkanBackend>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?
            .as_raw();

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;
        let instance = unsafe {
            instance::create_instance(&entry, &self.app_name, self.enable_validation, display)
        }?;

        let surface = match unsafe { SurfaceContext::new(&entry, &instance, display, window_handle) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let selected = match unsafe { instance::select_physical_device(&instance, &surface) } {
            Ok(selected) => selected,
            Err(e) => {
                unsafe {
                    surface.destroy();
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let context = match unsafe { GpuContext::new(entry, instance, selected) } {
            Ok(context) => context,
            Err((e, instance)) => {
                unsafe {
                    surface.destroy();
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        // From here on the context tears itself down; the surface still
        // has to go before it.
        let parts = match unsafe { SwapchainParts::new(&context, &surface, self.extent, self.vsync) } {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { surface.destroy() };
                drop(context);
                return Err(e);
            }
        };

        Ok(VulkanBackend {
            surface,
            swapchain_loader: parts.swapchain_loader,
            swapchain: parts.swapchain,
            render_finished: parts.render_finished,
            timeline: parts.timeline,
            current_image: 0,
            vsync: self.vsync,
            tearing_supported: parts.tearing_supported,
            needs_rebuild: false,
            context,
        })
    }
}

struct SwapchainParts {
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: Swapchain,
    render_finished: Vec<vk::Semaphore>,
    timeline: vk::Semaphore,
    tearing_supported: bool,
}

impl SwapchainParts {
    unsafe fn new(
        context: &GpuContext,
        surface: &SurfaceContext,
        extent: Extent2D,
        vsync: bool,
    ) -> Result<Self> {
        let device = context.device();
        let swapchain_loader = ash::khr::swapchain::Device::new(context.instance(), device);
        let caps = surface.capabilities(context.physical_device())?;
        let swapchain = unsafe {
            Swapchain::new(
                &swapchain_loader,
                surface.surface,
                &caps,
                extent,
                vsync,
                vk::SwapchainKHR::null(),
            )
        }?;

        let semaphores = unsafe { create_render_finished(device, swapchain.images.len()) }
            .and_then(|render_finished| {
                match unsafe { sync::create_timeline_semaphore(device) } {
                    Ok(timeline) => Ok((render_finished, timeline)),
                    Err(e) => {
                        unsafe { destroy_semaphores(device, &render_finished) };
                        Err(e)
                    }
                }
            });
        let (render_finished, timeline) = match semaphores {
            Ok(semaphores) => semaphores,
            Err(e) => {
                unsafe { swapchain.destroy(&swapchain_loader) };
                return Err(e);
            }
        };

        Ok(Self {
            swapchain_loader,
            swapchain,
            render_finished,
            timeline,
            tearing_supported: caps.supports_tearing(),
        })
    }
}

unsafe fn create_render_finished(device: &ash::Device, count: usize) -> Result<Vec<vk::Semaphore>> {
    let mut semaphores = Vec::with_capacity(count);
    for _ in 0..count {
        match unsafe { sync::create_semaphore(device) } {
            Ok(semaphore) => semaphores.push(semaphore),
            Err(e) => {
                unsafe { destroy_semaphores(device, &semaphores) };
                return Err(e);
            }
        }
    }
    Ok(semaphores)
}

unsafe fn destroy_semaphores(device: &ash::Device, semaphores: &[vk::Semaphore]) {
    for &semaphore in semaphores {
        unsafe { device.destroy_semaphore(semaphore, None) };
    }
}

impl VulkanBackend {
    /// The underlying GPU context.
    #[must_use]
    pub const fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Present mode the swapchain currently uses.
    #[must_use]
    pub const fn present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }

    fn image_index(index: usize) -> Result<u32> {
        u32::try_from(index)
            .map_err(|_| GpuError::InvalidState(format!("image index {index} out of range")))
    }
}

impl GpuBackend for VulkanBackend {
    type Recorder = VulkanRecorder;
    type Image = vk::Image;
    /// Waits go straight to the timeline semaphore.
    type Event = vk::Semaphore;

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: format!("Vulkan: {}", self.context.capabilities().device_name),
            tearing_supported: self.tearing_supported,
            vsync_requires_rebuild: true,
        }
    }

    fn create_recorder(&mut self, slot: usize) -> Result<VulkanRecorder> {
        let device = self.context.device();
        unsafe {
            let pool = CommandPool::new(
                device,
                self.context.queue_family(),
                vk::CommandPoolCreateFlags::TRANSIENT,
            )?;
            let cmd = match pool.allocate_command_buffer(device) {
                Ok(cmd) => cmd,
                Err(e) => {
                    pool.destroy(device);
                    return Err(e);
                }
            };
            let image_available = match sync::create_semaphore(device) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    pool.destroy(device);
                    return Err(e);
                }
            };
            Ok(VulkanRecorder {
                slot,
                pool,
                cmd,
                image_available,
            })
        }
    }

    fn destroy_recorder(&mut self, recorder: VulkanRecorder) {
        let device = self.context.device();
        unsafe {
            device.destroy_semaphore(recorder.image_available, None);
            recorder.pool.destroy(device);
        }
    }

    fn create_event(&mut self) -> Result<vk::Semaphore> {
        Ok(self.timeline)
    }

    fn destroy_event(&mut self, _event: vk::Semaphore) {}

    fn reset_recorder(&mut self, recorder: &mut VulkanRecorder) -> Result<()> {
        unsafe { recorder.pool.reset(self.context.device()) }
    }

    fn acquire_image(&mut self, recorder: &VulkanRecorder) -> Result<usize> {
        let (index, suboptimal) = unsafe {
            self.swapchain
                .acquire_next_image(&self.swapchain_loader, recorder.image_available)
        }?;
        if suboptimal {
            self.needs_rebuild = true;
        }
        self.current_image = index as usize;
        Ok(self.current_image)
    }

    fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }

    fn current_image_index(&self) -> usize {
        self.current_image
    }

    fn render_target(&self, index: usize) -> Result<vk::Image> {
        self.swapchain
            .images
            .get(index)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("no swapchain image {index}")))
    }

    fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    fn submit(
        &mut self,
        recorder: &mut VulkanRecorder,
        image_index: usize,
        commands: &[Command],
    ) -> Result<()> {
        let device = self.context.device();
        let render_finished = *self
            .render_finished
            .get(image_index)
            .ok_or_else(|| GpuError::InvalidState(format!("no swapchain image {image_index}")))?;

        unsafe {
            command::record_commands(device, recorder.cmd, &self.swapchain.images, commands)?;

            let command_buffers = [recorder.cmd];
            let wait_semaphores = [recorder.image_available];
            let wait_stages = [vk::PipelineStageFlags::TRANSFER];
            let signal_semaphores = [render_finished];
            let submit_info = vk::SubmitInfo::default()
                .command_buffers(&command_buffers)
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .signal_semaphores(&signal_semaphores);

            device.queue_submit(self.context.queue(), &[submit_info], vk::Fence::null())?;
        }
        Ok(())
    }

    fn present(&mut self, image_index: usize, params: PresentParams) -> Result<()> {
        let render_finished = *self
            .render_finished
            .get(image_index)
            .ok_or_else(|| GpuError::InvalidState(format!("no swapchain image {image_index}")))?;
        // The sync interval is baked into the present mode.
        tracing::trace!(
            "Presenting image {image_index} (interval {}, tearing {})",
            params.sync_interval,
            params.allow_tearing
        );
        let stale = unsafe {
            self.swapchain.present(
                &self.swapchain_loader,
                self.context.queue(),
                Self::image_index(image_index)?,
                render_finished,
            )
        }?;
        if stale {
            self.needs_rebuild = true;
        }
        Ok(())
    }

    fn signal(&mut self, value: TimelineValue) -> Result<()> {
        unsafe {
            sync::signal_timeline(
                self.context.device(),
                self.context.queue(),
                self.timeline,
                value,
            )
        }
    }

    fn completed_value(&self) -> Result<TimelineValue> {
        unsafe { sync::timeline_value(self.context.device(), self.timeline) }
    }

    fn wait_event(
        &self,
        event: &vk::Semaphore,
        value: TimelineValue,
        timeout: Duration,
    ) -> Result<WaitStatus> {
        unsafe { sync::wait_timeline(self.context.device(), *event, value, timeout) }
    }

    fn resize_swapchain(&mut self, extent: Extent2D) -> Result<Extent2D> {
        self.context.wait_idle()?;
        let device = self.context.device();
        let caps = self.surface.capabilities(self.context.physical_device())?;
        let swapchain = unsafe {
            Swapchain::new(
                &self.swapchain_loader,
                self.surface.surface,
                &caps,
                extent,
                self.vsync,
                self.swapchain.swapchain,
            )
        }?;
        let old = std::mem::replace(&mut self.swapchain, swapchain);
        unsafe { old.destroy(&self.swapchain_loader) };

        if self.render_finished.len() != self.swapchain.images.len() {
            let render_finished = unsafe { create_render_finished(device, self.swapchain.images.len()) }?;
            let old = std::mem::replace(&mut self.render_finished, render_finished);
            unsafe { destroy_semaphores(device, &old) };
        }

        self.tearing_supported = caps.supports_tearing();
        self.current_image = 0;
        self.needs_rebuild = false;
        let applied = self.swapchain.extent();
        tracing::debug!("Swapchain resized to {applied}");
        Ok(applied)
    }

    fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.context.wait_idle()
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let device = self.context.device();
        unsafe {
            let _ = device.device_wait_idle();
            destroy_semaphores(device, &self.render_finished);
            device.destroy_semaphore(self.timeline, None);
            self.swapchain.destroy(&self.swapchain_loader);
            self.surface.destroy();
        }
    }
}
