use std::{collections::HashMap, sync::OnceLock};

use bytemuck::{cast_slice, Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{
    error::{Result, SimError},
    kernel::Kernel,
    texture::TextureShape,
};

const WORKGROUP_SIZE: u32 = 8;
const DUMMY_SIZE: u64 = 16;

/// Uniform block shared by every entry point in `gpu.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Params {
    width: u32,
    height: u32,
    qubits: u32,
    comps: u32,
    in_len: [u32; 3],
    nan_bits: u32,
    args: [u32; 4],
}

/// Initialize the global GPU context.
///
/// This will happen automatically the first time a GPU engine is built,
/// but this can be called to preempt that work at a more appropriate time.
pub fn initialize_gpu() -> Result<()> {
    get_gpu().map(|_| ())
}
fn get_gpu() -> Result<&'static GpuContext> {
    GPU_CONTEXT
        .get_or_init(|| pollster::block_on(GpuContext::new()))
        .as_ref()
        .map_err(Clone::clone)
}

/// The global GPU context.
/// Includes the initialized device and one compiled pipeline per kernel.
static GPU_CONTEXT: OnceLock<Result<GpuContext, SimError>> = OnceLock::new();
struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<&'static str, wgpu::ComputePipeline>,
    dummy: wgpu::Buffer,
}
impl GpuContext {
    async fn new() -> Result<GpuContext> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(SimError::NoAdapter)?;
        let info = adapter.get_info();
        log::info!(
            "using GPU backend on {} ({:?}, {:?})",
            info.name,
            info.device_type,
            info.backend
        );
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("qshade"),
                    required_limits: adapter.limits(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| SimError::RequestDevice(e.to_string()))?;

        let storage_entry = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        });
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Kernels"),
            source: wgpu::ShaderSource::Wgsl(include_str!("gpu.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipelines = Kernel::ENTRY_POINTS
            .iter()
            .map(|&name| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(name),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(name),
                    cache: None,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                });
                (name, pipeline)
            })
            .collect();

        let dummy = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Unused input"),
            size: DUMMY_SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Ok(GpuContext {
            device,
            queue,
            bind_group_layout,
            pipelines,
            dummy,
        })
    }
}

/// Runs kernels as WGSL compute passes on the global device.
/// Textures are storage buffers of `f32` components in basis-index order.
pub(crate) struct GpuBackend {
    gpu: &'static GpuContext,
}
impl GpuBackend {
    pub fn new() -> Result<GpuBackend> {
        Ok(GpuBackend { gpu: get_gpu()? })
    }

    pub fn max_buffer_bytes(&self) -> u64 {
        let limits = self.gpu.device.limits();
        u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
    }

    pub fn alloc(&self, shape: TextureShape) -> wgpu::Buffer {
        // New buffers are zero-initialized by wgpu.
        self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture"),
            size: shape.byte_len(),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn clear(&self, buffer: &wgpu::Buffer) {
        let mut encoder = self.gpu.device.create_command_encoder(&Default::default());
        encoder.clear_buffer(buffer, 0, None);
        self.gpu.queue.submit(Some(encoder.finish()));
    }

    pub fn write(&self, buffer: &wgpu::Buffer, data: &[f32]) {
        self.gpu.queue.write_buffer(buffer, 0, cast_slice(data));
    }

    pub fn dispatch(
        &self,
        kernel: &Kernel,
        inputs: &[(&wgpu::Buffer, TextureShape)],
        out: &wgpu::Buffer,
        out_shape: TextureShape,
    ) {
        let gpu = self.gpu;
        let Some(pipeline) = gpu.pipelines.get(kernel.name()) else {
            unreachable!("no pipeline compiled for {}", kernel.name());
        };

        let mut in_len = [0; 3];
        for (len, (_, shape)) in in_len.iter_mut().zip(inputs) {
            *len = shape.len() as u32;
        }
        let params = Params {
            width: out_shape.width() as u32,
            height: out_shape.height() as u32,
            qubits: out_shape.qubits(),
            comps: out_shape.format().components() as u32,
            in_len,
            nan_bits: f32::NAN.to_bits(),
            args: kernel.params(),
        };
        let params_buf = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let input = |i: usize| inputs.get(i).map_or(&gpu.dummy, |(buffer, _)| *buffer);
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel.name()),
            layout: &gpu.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: input(0).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: input(1).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: input(2).as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: out.as_entire_binding(),
                },
            ],
        });

        let mut encoder = gpu.device.create_command_encoder(&Default::default());
        {
            let mut compute_pass = encoder.begin_compute_pass(&Default::default());
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(
                params.width.div_ceil(WORKGROUP_SIZE),
                params.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        gpu.queue.submit(Some(encoder.finish()));
    }

    pub fn read(&self, buffer: &wgpu::Buffer, shape: TextureShape) -> Result<Vec<f32>> {
        let gpu = self.gpu;
        let size = shape.byte_len();
        let download_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Download texture"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = gpu.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(buffer, 0, &download_buf, 0, size);
        gpu.queue.submit([encoder.finish()]);

        let slice = download_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        match receiver.recv() {
            Ok(Ok(())) => {}
            _ => return Err(SimError::Map),
        }
        let data = slice.get_mapped_range();
        let result = cast_slice::<u8, f32>(&data).to_vec();
        drop(data);
        download_buf.unmap();
        Ok(result)
    }
}
