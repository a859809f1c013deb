//! Per-process registration state: the buffer/buffer-attribute tables `registerBuffer`/
//! `registerBufferAttribute` write into, plus the pid → [`VmId`]
//! association the rest of the façade keys off of. Both tables are indexed by
//! `buffer.index`/`attr.attr_id` and bounds-checked against 10 entries.

use arrayvec::ArrayVec;
use gpu_types::VmId;

use crate::error::{DeviceError, Result};

const MAX_BUFFERS: usize = 10;
const MAX_BUFFER_ATTRIBUTES: usize = 10;

/// A registered flip source. `attr_id` indexes into
/// the same process's [`BufferAttribute`] table.
#[derive(Debug, Clone, Copy)]
pub struct Buffer {
    pub index: u32,
    pub attr_id: u32,
    pub address: u64,
}

/// Pixel layout for a registered [`Buffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferAttribute {
    pub attr_id: u32,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub tiling_mode: u32,
    pub pitch_pixels: u32,
}

/// One guest process's state under the façade: its VM id once `mapProcess` has run,
/// and its registered buffers/attributes.
#[derive(Default)]
pub struct ProcessState {
    vm_id: Option<VmId>,
    buffers: ArrayVec<Option<Buffer>, MAX_BUFFERS>,
    attributes: ArrayVec<Option<BufferAttribute>, MAX_BUFFER_ATTRIBUTES>,
}

impl ProcessState {
    pub fn new() -> Self {
        let mut buffers = ArrayVec::new();
        buffers.extend(std::iter::repeat(None).take(MAX_BUFFERS));
        let mut attributes = ArrayVec::new();
        attributes.extend(std::iter::repeat(None).take(MAX_BUFFER_ATTRIBUTES));
        ProcessState { vm_id: None, buffers, attributes }
    }

    pub fn vm_id(&self) -> Option<VmId> {
        self.vm_id
    }

    pub fn map(&mut self, vm_id: VmId) {
        self.vm_id = Some(vm_id);
    }

    pub fn unmap(&mut self) {
        self.vm_id = None;
    }

    pub fn register_buffer(&mut self, pid: u32, buffer: Buffer) -> Result<()> {
        let slot = self
            .buffers
            .get_mut(buffer.index as usize)
            .ok_or(DeviceError::TooManyBuffers { pid })?;
        if buffer.index as usize >= MAX_BUFFERS || buffer.attr_id as usize >= MAX_BUFFER_ATTRIBUTES {
            return Err(DeviceError::TooManyBuffers { pid });
        }
        *slot = Some(buffer);
        Ok(())
    }

    pub fn register_buffer_attribute(&mut self, pid: u32, attr: BufferAttribute) -> Result<()> {
        let slot = self
            .attributes
            .get_mut(attr.attr_id as usize)
            .ok_or(DeviceError::TooManyBufferAttributes { pid })?;
        *slot = Some(attr);
        Ok(())
    }

    /// Resolves a flip source: the registered buffer at `index` plus the attribute it
    /// points at, if both were registered.
    pub fn buffer(&self, pid: u32, index: u32) -> Result<(Buffer, BufferAttribute)> {
        let buffer =
            self.buffers.get(index as usize).copied().flatten().ok_or(DeviceError::UnregisteredBuffer { pid, index })?;
        let attribute = self
            .attributes
            .get(buffer.attr_id as usize)
            .copied()
            .flatten()
            .ok_or(DeviceError::UnregisteredBuffer { pid, index: buffer.attr_id })?;
        Ok((buffer, attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_a_buffer() {
        let mut process = ProcessState::new();
        process.register_buffer_attribute(0, BufferAttribute {
            attr_id: 2,
            pixel_format: 0x8000_2200,
            width: 1920,
            height: 1080,
            tiling_mode: 0,
            pitch_pixels: 1920,
        }).unwrap();
        process.register_buffer(0, Buffer { index: 3, attr_id: 2, address: 0x4000_0000 }).unwrap();

        let (buffer, attr) = process.buffer(0, 3).unwrap();
        assert_eq!(buffer.address, 0x4000_0000);
        assert_eq!(attr.width, 1920);
    }

    #[test]
    fn resolving_an_unregistered_index_is_an_error() {
        let process = ProcessState::new();
        assert!(matches!(process.buffer(7, 0), Err(DeviceError::UnregisteredBuffer { pid: 7, index: 0 })));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut process = ProcessState::new();
        let err = process.register_buffer(1, Buffer { index: 10, attr_id: 0, address: 0 });
        assert!(matches!(err, Err(DeviceError::TooManyBuffers { pid: 1 })));
    }
}
