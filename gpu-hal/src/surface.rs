//! Swapchain ownership: creation/recreation and acquire, with the `OUT_OF_DATE_KHR`/
//! `SURFACE_LOST_KHR`/suboptimal handling `gpu-present` (C8) drives its retry loop
//! from.

use std::sync::Arc;

use ash::vk;
use parking_lot::RwLock;

use crate::device::{Device, DeviceShared};
use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface out of date")]
    Outdated,
    #[error("surface lost")]
    Lost,
    #[error(transparent)]
    Device(#[from] Error),
}

#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
}

pub struct Swapchain {
    pub(crate) raw: vk::SwapchainKHR,
    functor: ash::extensions::khr::Swapchain,
    device: Arc<DeviceShared>,
    pub images: Vec<vk::Image>,
    pub config: SwapchainConfig,
    surface_semaphores: Vec<vk::Semaphore>,
    next_semaphore_index: usize,
}

impl Swapchain {
    unsafe fn release_resources(mut self, device: &ash::Device) -> Self {
        let _ = device.device_wait_idle();
        for semaphore in self.surface_semaphores.drain(..) {
            device.destroy_semaphore(semaphore, None);
        }
        self
    }
}

pub struct Surface {
    raw: vk::SurfaceKHR,
    functor: ash::extensions::khr::Surface,
    swapchain: RwLock<Option<Swapchain>>,
}

impl Surface {
    /// # Safety
    /// `raw` must be a valid `VkSurfaceKHR` created against this instance, owned by the
    /// caller for the lifetime of this `Surface`.
    pub unsafe fn from_raw(
        functor: ash::extensions::khr::Surface,
        raw: vk::SurfaceKHR,
    ) -> Self {
        Surface { raw, functor, swapchain: RwLock::new(None) }
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }

    /// (Re)creates the swapchain, releasing any prior one after the device goes idle.
    /// Called both on first configure and whenever `acquire` reports
    /// [`SurfaceError::Outdated`].
    pub fn configure(&self, device: &Device, config: SwapchainConfig) -> Result<(), SurfaceError> {
        let mut slot = self.swapchain.write();
        let old = slot.take().map(|sc| unsafe { sc.release_resources(&device.shared.raw) });

        let capabilities = unsafe {
            self.functor
                .get_physical_device_surface_capabilities(device.shared.physical_device, self.raw)
                .map_err(Error::from)?
        };
        let image_count = config
            .image_count
            .max(capabilities.min_image_count)
            .min(if capabilities.max_image_count == 0 { u32::MAX } else { capabilities.max_image_count });

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.raw)
            .min_image_count(image_count)
            .image_format(config.format)
            .image_color_space(config.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);
        if let Some(old_swapchain) = &old {
            create_info = create_info.old_swapchain(old_swapchain.raw);
        }

        let functor = device.shared.extension_fns.swapchain.clone();
        let raw = unsafe { functor.create_swapchain(&create_info, None).map_err(Error::from)? };
        let images = unsafe { functor.get_swapchain_images(raw).map_err(Error::from)? };

        let mut surface_semaphores = Vec::with_capacity(images.len());
        for _ in 0..images.len() {
            let info = vk::SemaphoreCreateInfo::builder();
            surface_semaphores.push(unsafe { device.shared.raw.create_semaphore(&info, None).map_err(Error::from)? });
        }

        if let Some(old_swapchain) = old {
            unsafe { old_swapchain.functor.destroy_swapchain(old_swapchain.raw, None) };
        }

        *slot = Some(Swapchain {
            raw,
            functor,
            device: Arc::clone(&device.shared),
            images,
            config,
            surface_semaphores,
            next_semaphore_index: 0,
        });
        Ok(())
    }

    pub fn unconfigure(&self, device: &Device) {
        if let Some(sc) = self.swapchain.write().take() {
            let sc = unsafe { sc.release_resources(&device.shared.raw) };
            unsafe { sc.functor.destroy_swapchain(sc.raw, None) };
        }
    }

    /// Acquires the next image, blocking up to `timeout`. Returns `(image_index,
    /// wait_semaphore, suboptimal)`. Callers must recreate the swapchain via
    /// [`Self::configure`] on [`SurfaceError::Outdated`] and retry.
    pub fn acquire(
        &self,
        timeout: Option<std::time::Duration>,
    ) -> Result<Option<(u32, vk::Semaphore, bool)>, SurfaceError> {
        let mut slot = self.swapchain.write();
        let sc = slot.as_mut().expect("acquire called before configure");

        let timeout_ns = timeout.map(|d| d.as_nanos() as u64).unwrap_or(u64::MAX);
        let wait_semaphore = sc.surface_semaphores[sc.next_semaphore_index];

        let (index, suboptimal) = match unsafe {
            sc.functor.acquire_next_image(sc.raw, timeout_ns, wait_semaphore, vk::Fence::null())
        } {
            Ok(pair) => pair,
            Err(vk::Result::TIMEOUT) => return Ok(None),
            Err(vk::Result::NOT_READY) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return Err(SurfaceError::Outdated)
            }
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => return Err(SurfaceError::Lost),
            Err(other) => return Err(Error::from(other).into()),
        };

        sc.next_semaphore_index = (sc.next_semaphore_index + 1) % sc.surface_semaphores.len();
        Ok(Some((index, wait_semaphore, suboptimal)))
    }

    pub fn image(&self, index: u32) -> vk::Image {
        self.swapchain.read().as_ref().expect("configured").images[index as usize]
    }

    /// Presents `image_index` on `queue`. `wait_semaphore`, if given, must be signaled
    /// (typically by the submission that recorded into this image) before the present
    /// engine may execute. Returns whether the present reported suboptimal, matching
    /// [`Self::acquire`]'s tri-state contract; callers reconfigure on `Outdated` and on
    /// a `true` suboptimal result.
    pub fn present(
        &self,
        queue: &crate::queue::Queue,
        image_index: u32,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> Result<bool, SurfaceError> {
        let slot = self.swapchain.read();
        let sc = slot.as_ref().expect("present called before configure");
        unsafe { queue.present(&sc.functor, sc.raw, image_index, wait_semaphore) }.map_err(|err| match err {
            Error::Outdated => SurfaceError::Outdated,
            Error::SurfaceLost => SurfaceError::Lost,
            other => SurfaceError::Device(other),
        })
    }
}
