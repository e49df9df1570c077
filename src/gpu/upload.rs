use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
/// Per-draw addressing record read by the conversion programs.
///
/// `layer` already includes the Z offset for volumetric sources.
pub struct LayerLevelOffset {
    pub layer: u32,
    pub level: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub multiplier: f32,
    pub _pad: [u32; 3],
}

impl LayerLevelOffset {
    pub fn new(layer: u32, level: u32, x_offset: u32, y_offset: u32, multiplier: f32) -> Self {
        Self {
            layer,
            level,
            x_offset,
            y_offset,
            multiplier,
            _pad: [0; 3],
        }
    }
}

pub const RECORD_SIZE: u64 = std::mem::size_of::<LayerLevelOffset>() as u64;

/// Uniform buffer holding one [`LayerLevelOffset`] slot per draw.
///
/// Slots are spaced by the device's dynamic-offset alignment so every draw in
/// a submission sees its own record. The buffer grows on demand and is never
/// shrunk.
pub struct UploadBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    stride: u32,
    capacity: u32,
}

impl UploadBuffer {
    pub fn new(device: &wgpu::Device, label: &'static str, capacity: u32) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment;
        let stride = (RECORD_SIZE as u32).div_ceil(align) * align;
        let capacity = capacity.max(1);
        Self {
            label,
            buffer: create_buffer(device, label, stride, capacity),
            stride,
            capacity,
        }
    }

    /// Makes room for `count` records. Bind groups referencing the old buffer
    /// must be rebuilt afterwards.
    pub fn reserve(&mut self, device: &wgpu::Device, count: u32) {
        if count <= self.capacity {
            return;
        }
        let capacity = count.next_power_of_two();
        tracing::debug!(
            label = self.label,
            old = self.capacity,
            new = capacity,
            "growing per-draw upload buffer"
        );
        self.buffer = create_buffer(device, self.label, self.stride, capacity);
        self.capacity = capacity;
    }

    /// Writes `record` into `slot` and returns the dynamic offset to bind it with.
    pub fn write(&self, queue: &wgpu::Queue, slot: u32, record: LayerLevelOffset) -> u32 {
        assert!(
            slot < self.capacity,
            "upload slot {slot} out of range ({})",
            self.capacity
        );
        let offset = slot * self.stride;
        queue.write_buffer(&self.buffer, offset as u64, bytemuck::bytes_of(&record));
        offset
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(RECORD_SIZE),
        })
    }
}

fn create_buffer(device: &wgpu::Device, label: &str, stride: u32, capacity: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: stride as u64 * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Bind group layout entry for the per-draw record.
pub fn layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: wgpu::BufferSize::new(RECORD_SIZE),
        },
        count: None,
    }
}
