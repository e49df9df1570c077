#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// How the trigger replicates its geometry.
pub enum TriggerMode {
    /// One draw into a 2D target.
    Flat,
    /// One draw per depth slice of a volumetric target; the slice index reaches
    /// the pixel program as the flat `slice` varying.
    Volumetric,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Geometry {
    /// Single oversized triangle covering the viewport.
    Triangle,
    /// Two triangles exactly covering the viewport, with [0,1] texcoords.
    Quad,
}

impl Geometry {
    fn entry_point(self) -> &'static str {
        match self {
            Geometry::Triangle => "vs_triangle",
            Geometry::Quad => "vs_quad",
        }
    }

    fn vertex_count(self) -> u32 {
        match self {
            Geometry::Triangle => 3,
            Geometry::Quad => 6,
        }
    }
}

/// Vertex stage shared by every full-screen pass.
pub struct FullscreenTrigger {
    module: wgpu::ShaderModule,
}

impl FullscreenTrigger {
    pub fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fullscreen_trigger"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX_SRC.into()),
        });
        Self { module }
    }

    pub fn vertex_state(&self, geometry: Geometry) -> wgpu::VertexState<'_> {
        wgpu::VertexState {
            module: &self.module,
            entry_point: Some(geometry.entry_point()),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }
    }

    /// Issues the draw for `geometry`. In volumetric mode `slice` selects the
    /// instance so the pixel program can address the matching source slice.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, geometry: Geometry, mode: TriggerMode, slice: u32) {
        let instance = match mode {
            TriggerMode::Flat => {
                debug_assert_eq!(slice, 0, "flat draws have no depth slices");
                0
            }
            TriggerMode::Volumetric => slice,
        };
        pass.draw(0..geometry.vertex_count(), instance..instance + 1);
    }
}

fn primitive_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

/// Builds a render pipeline pairing the trigger's `geometry` with the pixel
/// program `fragment_src` (entry point `fs_main`) writing into `format`.
pub fn create_program(
    device: &wgpu::Device,
    trigger: &FullscreenTrigger,
    label: &str,
    fragment_src: &str,
    layout: &wgpu::BindGroupLayout,
    geometry: Geometry,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_VARYINGS}{fragment_src}").into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: trigger.vertex_state(geometry),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: primitive_state(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Fragment-side declaration of the trigger's outputs; prepended to every pixel program.
pub const FULLSCREEN_VARYINGS: &str = r#"
struct FullscreenOut {
    @builtin(position) position: vec4<f32>,
    @location(0) texcoord: vec2<f32>,
    @location(1) @interpolate(flat) slice: u32,
};
"#;

const FULLSCREEN_VERTEX_SRC: &str = r#"
struct FullscreenOut {
    @builtin(position) position: vec4<f32>,
    @location(0) texcoord: vec2<f32>,
    @location(1) @interpolate(flat) slice: u32,
};

@vertex
fn vs_triangle(@builtin(vertex_index) vid: u32, @builtin(instance_index) iid: u32) -> FullscreenOut {
    // (0,0) (2,0) (0,2) in texcoord space covers the [0,1]^2 viewport.
    let uv = vec2<f32>(f32((vid << 1u) & 2u), f32(vid & 2u));
    var out: FullscreenOut;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.texcoord = uv;
    out.slice = iid;
    return out;
}

@vertex
fn vs_quad(@builtin(vertex_index) vid: u32, @builtin(instance_index) iid: u32) -> FullscreenOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let uv = corners[vid];
    var out: FullscreenOut;
    out.position = vec4<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 0.0, 1.0);
    out.texcoord = uv;
    out.slice = iid;
    return out;
}
"#;
