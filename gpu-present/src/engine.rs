//! The present engine: resolves a registered buffer's pixel format, records the
//! detile blit from the cache-backed source buffer into the acquired swapchain image,
//! and drives the acquire/present retry loop against `OUT_OF_DATE`/suboptimal.

use ash::vk;

use gpu_types::pixel_format::FlipType;
use gpu_types::AddressRange;

use crate::error::Result;
use crate::event::PresentEvent;
use crate::flip::FlipTable;

/// A fully-resolved flip source: a registered buffer's guest address, the pixel
/// format word the title set on it, and its dimensions in pixels.
#[derive(Debug, Clone, Copy)]
pub struct FlipRequest {
    pub vm_id: u8,
    pub source_address: u64,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub pitch_pixels: u32,
}

impl FlipRequest {
    fn byte_size(&self) -> u64 {
        self.pitch_pixels as u64 * self.height as u64 * 4
    }
}

pub struct PresentEngine {
    flips: FlipTable,
    events: std::sync::mpsc::Sender<PresentEvent>,
}

impl PresentEngine {
    pub fn new(events: std::sync::mpsc::Sender<PresentEvent>) -> Self {
        PresentEngine { flips: FlipTable::new(), events }
    }

    pub fn flip_table(&self) -> &FlipTable {
        &self.flips
    }

    /// Presents `request` onto `surface`. `buffer_index` drives the
    /// flipBuffer/flipArg/flipCount fast path: negative means latch the pending
    /// arguments and return without touching the swapchain.
    pub fn present(
        &self,
        device: &gpu_hal::Device,
        queue: &gpu_hal::Queue,
        surface: &gpu_hal::Surface,
        swapchain_config: gpu_hal::SwapchainConfig,
        cache: &gpu_cache::Cache,
        buffer_index: i32,
        flip_arg: i64,
        request: &FlipRequest,
    ) -> Result<()> {
        if !self.flips.record(request.vm_id, buffer_index, flip_arg) {
            return Ok(());
        }

        let (_, _, flip_type) = gpu_types::pixel_format::resolve(request.pixel_format)?;

        let mut tag = cache.begin_graphics_tag()?;
        let source_range = AddressRange::from_begin_size(request.source_address, request.byte_size());
        let source = tag.inner().get_buffer(source_range, false)?;

        let (image_index, wait_semaphore, mut suboptimal) = loop {
            match surface.acquire(Some(std::time::Duration::from_millis(100))) {
                Ok(Some(triple)) => break triple,
                Ok(None) => continue,
                Err(gpu_hal::SurfaceError::Outdated) => {
                    surface.configure(device, swapchain_config)?;
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        };

        let destination = surface.image(image_index);
        record_detile_blit(device, queue, source.buffer, destination, request, flip_type);

        queue.scheduler().submit_waiting_on(Some((wait_semaphore, vk::PipelineStageFlags::TRANSFER)))?;
        // The present engine waits for the blit to land rather than chaining a
        // dedicated binary semaphore into the present call: simpler, at the cost of
        // one extra host/device round trip per flip.
        queue.scheduler().wait()?;

        tag.end();

        if surface.present(queue, image_index, None)? {
            suboptimal = true;
        }
        if suboptimal {
            surface.configure(device, swapchain_config)?;
        }

        let _ = self.events.send(PresentEvent::Flip { vm_id: request.vm_id, buffer_index });
        Ok(())
    }
}

/// Records a copy from `source` (a cache-backed linear buffer) into `destination` (a
/// swapchain image), on the scheduler's currently active command buffer.
/// `FlipType::Alt` formats need the byte-swapped variant of the same source data;
/// since both variants already resolve to the same Vulkan format in
/// `gpu_types::pixel_format::resolve`, the distinction only changes which detile
/// helper `gcn-shader` emitted for the source image; the blit itself is a plain copy
/// either way.
fn record_detile_blit(
    device: &gpu_hal::Device,
    queue: &gpu_hal::Queue,
    source: vk::Buffer,
    destination: vk::Image,
    request: &FlipRequest,
    flip_type: FlipType,
) {
    let cmd = queue.scheduler().active_command_buffer();
    log::trace!(
        "recording detile blit: {}x{} ({:?}) -> swapchain image",
        request.width,
        request.height,
        flip_type
    );

    let barrier_to_transfer_dst = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .image(destination)
        .subresource_range(
            vk::ImageSubresourceRange::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1)
                .build(),
        )
        .build();

    let region = vk::BufferImageCopy::builder()
        .buffer_row_length(request.pitch_pixels)
        .buffer_image_height(request.height)
        .image_subresource(
            vk::ImageSubresourceLayers::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .layer_count(1)
                .build(),
        )
        .image_extent(vk::Extent3D { width: request.width, height: request.height, depth: 1 })
        .build();

    let barrier_to_present = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::empty())
        .image(destination)
        .subresource_range(
            vk::ImageSubresourceRange::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .level_count(1)
                .layer_count(1)
                .build(),
        )
        .build();

    unsafe {
        device.raw().cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_transfer_dst],
        );
        device.raw().cmd_copy_buffer_to_image(
            cmd,
            source,
            destination,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.raw().cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_present],
        );
    }
}
