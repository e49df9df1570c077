use std::sync::{MutexGuard, PoisonError};

use crate::gpu::context::GpuContext;
use crate::gpu::fullscreen::{FullscreenTrigger, Geometry, TriggerMode};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Bindings currently held on a [`GpuContext`], by slot.
pub struct BindingSlots {
    pub trigger: Option<TriggerMode>,
    pub pixel_program: Option<String>,
    pub shader_input: Option<String>,
    pub sampler: Option<String>,
    pub render_target: Option<String>,
}

impl BindingSlots {
    pub fn is_clear(&self) -> bool {
        *self == BindingSlots::default()
    }
}

/// Scoped acquisition of the context's binding slots.
///
/// A pass opens one scope, binds trigger, program, inputs and target through
/// it, and records its draws with [`BindingScope::draw`]. Dropping the scope
/// releases every GPU object it holds and clears all slots, whichever way the
/// pass returns.
///
/// The scope holds the slot lock for its whole lifetime, so only one pass at a
/// time owns the context. Never open a second scope on the same thread while
/// one is alive.
pub struct BindingScope<'a> {
    slots: MutexGuard<'a, BindingSlots>,
    trigger: Option<(&'a FullscreenTrigger, TriggerMode)>,
    pipeline: Option<(wgpu::RenderPipeline, Geometry)>,
    inputs: Option<wgpu::BindGroup>,
    target: Option<wgpu::TextureView>,
}

impl<'a> BindingScope<'a> {
    pub fn acquire(ctx: &'a GpuContext) -> Self {
        let mut slots = ctx.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        if !slots.is_clear() {
            tracing::warn!(?slots, "stale bindings found on context; clearing");
            *slots = BindingSlots::default();
        }
        Self {
            slots,
            trigger: None,
            pipeline: None,
            inputs: None,
            target: None,
        }
    }

    pub fn bind_trigger(&mut self, trigger: &'a FullscreenTrigger, mode: TriggerMode) {
        self.trigger = Some((trigger, mode));
        self.slots.trigger = Some(mode);
    }

    pub fn bind_program(&mut self, label: &str, pipeline: wgpu::RenderPipeline, geometry: Geometry) {
        self.pipeline = Some((pipeline, geometry));
        self.slots.pixel_program = Some(label.to_string());
    }

    /// Binds the bind group holding the shader inputs. `sampler` names the
    /// sampler it contains, if any.
    pub fn bind_inputs(&mut self, label: &str, group: wgpu::BindGroup, sampler: Option<&str>) {
        self.inputs = Some(group);
        self.slots.shader_input = Some(label.to_string());
        self.slots.sampler = sampler.map(str::to_string);
    }

    pub fn set_render_target(&mut self, label: &str, view: wgpu::TextureView) {
        self.target = Some(view);
        self.slots.render_target = Some(label.to_string());
    }

    /// Records one full-screen draw into the current render target.
    ///
    /// Viewport and scissor cover `width`×`height`; `depth_slice` selects the
    /// slice of a volumetric target and is forwarded to the trigger.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dynamic_offset: Option<u32>,
        width: u32,
        height: u32,
        depth_slice: Option<u32>,
    ) {
        let (Some((trigger, mode)), Some((pipeline, geometry)), Some(inputs), Some(target)) = (
            self.trigger,
            self.pipeline.as_ref(),
            self.inputs.as_ref(),
            self.target.as_ref(),
        ) else {
            panic!("draw issued with incomplete bindings");
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("fullscreen_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        match dynamic_offset {
            Some(offset) => pass.set_bind_group(0, inputs, &[offset]),
            None => pass.set_bind_group(0, inputs, &[]),
        }
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        pass.set_scissor_rect(0, 0, width, height);
        trigger.draw(&mut pass, *geometry, mode, depth_slice.unwrap_or(0));
    }
}

impl Drop for BindingScope<'_> {
    fn drop(&mut self) {
        self.target = None;
        self.inputs = None;
        self.pipeline = None;
        self.trigger = None;
        *self.slots = BindingSlots::default();
    }
}
