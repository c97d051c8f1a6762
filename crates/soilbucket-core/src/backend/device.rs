//! Device backend: one wgpu compute lane per active cell, in `f32`.

use std::sync::mpsc;

use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use super::{check_dispatch_lengths, ExecutionBackend};
use crate::cells::CellBatch;
use crate::config::Backend;
use crate::constants::{MAX_WORKGROUPS_PER_DIMENSION, SOIL_ET_FRACTION};
use crate::error::{Result, WaterBalanceError};
use crate::kernel::CellTotals;
use crate::parameters::ParameterTables;

const SHADER_SRC: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/water_balance.wgsl"));

/// Forcing slots allocated up front; enough for one calendar month.
const INITIAL_FORCING_STEPS: usize = 31;

/// Adapter, logical device and queue.
pub struct DeviceContext {
    /// Logical device
    pub device: wgpu::Device,
    /// Submission queue
    pub queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
}

impl DeviceContext {
    /// Request a high-performance adapter, falling back to a software one.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let mut adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        if adapter.is_none() {
            warn!("no hardware adapter found, trying fallback adapter");
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: true,
                })
                .await;
        }
        let adapter = adapter.ok_or_else(|| {
            WaterBalanceError::backend_unavailable(
                Backend::Device.as_str(),
                "no compatible adapter found",
            )
        })?;

        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("soilbucket-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| {
                WaterBalanceError::backend_unavailable(Backend::Device.as_str(), e.to_string())
            })?;

        Ok(Self {
            device,
            queue,
            info,
        })
    }

    /// Name reported by the adapter driver.
    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Params {
    n_cells: u32,
    n_steps: u32,
    lanes_per_row: u32,
    soil_et_fraction: f32,
}

/// Device backend.
///
/// Parameter tables and cell indices are uploaded once. Each dispatch
/// uploads the period's forcing and the current storage, runs one lane per
/// cell and reads storage and per-cell sums back.
pub struct DeviceBackend {
    ctx: DeviceContext,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    n_cells: u32,
    workgroup_size: u32,
    cell_index: wgpu::Buffer,
    landuse_params: wgpu::Buffer,
    soil_capacity: wgpu::Buffer,
    forcing: wgpu::Buffer,
    forcing_steps: usize,
    storage: wgpu::Buffer,
    totals: wgpu::Buffer,
    storage_read: wgpu::Buffer,
    totals_read: wgpu::Buffer,
}

impl DeviceBackend {
    /// Compile the kernel and upload static per-cell data.
    pub fn new(
        ctx: DeviceContext,
        cells: &CellBatch,
        tables: &ParameterTables,
        workgroup_size: u32,
    ) -> Result<Self> {
        let n_cells = u32::try_from(cells.len()).map_err(|_| {
            WaterBalanceError::InvalidConfig(format!(
                "{} active cells exceed the device lane range",
                cells.len()
            ))
        })?;

        let (pipeline, layout) = build_pipeline(&ctx.device, workgroup_size)?;

        let index: Vec<[u32; 2]> = cells
            .landuse
            .iter()
            .zip(&cells.soil)
            .map(|(&lu, &so)| [lu, so])
            .collect();

        // Slot 0 stays zero so 1-based indices address the arrays directly.
        let mut lu_params = vec![[0.0f32; 4]];
        lu_params.extend((1..=tables.landuse_len() as u32).map(|i| {
            [
                tables.threshold.get(i) as f32,
                tables.crop_coefficient.get(i) as f32,
                tables.extraction_depth.get(i) as f32,
                0.0,
            ]
        }));
        let mut soil = vec![0.0f32];
        soil.extend(tables.soil_capacity.as_slice().iter().map(|&v| v as f32));

        let device = &ctx.device;
        let read_only = wgpu::BufferUsages::STORAGE;
        let cell_index = init_buffer(device, "cell_index", &padded(index), read_only);
        let landuse_params = init_buffer(device, "landuse_params", &lu_params, read_only);
        let soil_capacity = init_buffer(device, "soil_capacity", &soil, read_only);
        let forcing = forcing_buffer(device, INITIAL_FORCING_STEPS);

        let lanes = cells.len().max(1);
        let storage_bytes = (lanes * std::mem::size_of::<f32>()) as u64;
        let totals_bytes = (lanes * std::mem::size_of::<[f32; 4]>()) as u64;
        let rw = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let readback = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ;
        let storage = plain_buffer(device, "soil_storage", storage_bytes, rw);
        let totals = plain_buffer(device, "totals", totals_bytes, rw);
        let storage_read = plain_buffer(device, "soil_storage.read", storage_bytes, readback);
        let totals_read = plain_buffer(device, "totals.read", totals_bytes, readback);

        debug!(
            cells = n_cells,
            landuse_slots = lu_params.len(),
            soil_slots = soil.len(),
            "uploaded static device buffers"
        );

        Ok(Self {
            ctx,
            pipeline,
            layout,
            n_cells,
            workgroup_size,
            cell_index,
            landuse_params,
            soil_capacity,
            forcing,
            forcing_steps: INITIAL_FORCING_STEPS,
            storage,
            totals,
            storage_read,
            totals_read,
        })
    }

    /// Adapter this backend runs on.
    pub fn adapter_name(&self) -> &str {
        self.ctx.adapter_name()
    }

    fn ensure_forcing_capacity(&mut self, n_steps: usize) {
        if n_steps > self.forcing_steps {
            self.forcing = forcing_buffer(&self.ctx.device, n_steps);
            self.forcing_steps = n_steps;
        }
    }
}

impl ExecutionBackend for DeviceBackend {
    fn kind(&self) -> Backend {
        Backend::Device
    }

    fn n_cells(&self) -> usize {
        self.n_cells as usize
    }

    fn dispatch(
        &mut self,
        prec: &[f64],
        pet: &[f64],
        storage: &mut [f64],
    ) -> Result<Vec<CellTotals>> {
        check_dispatch_lengths(self.n_cells as usize, prec, pet, storage)?;
        if self.n_cells == 0 {
            return Ok(Vec::new());
        }
        let n_steps = u32::try_from(prec.len()).map_err(|_| {
            WaterBalanceError::InvalidForcing(format!("{} steps in one dispatch", prec.len()))
        })?;

        self.ensure_forcing_capacity(prec.len());
        let queue = &self.ctx.queue;
        let device = &self.ctx.device;

        if n_steps > 0 {
            let forcing: Vec<[f32; 2]> = prec
                .iter()
                .zip(pet)
                .map(|(&p, &e)| [p as f32, e as f32])
                .collect();
            queue.write_buffer(&self.forcing, 0, bytemuck::cast_slice(&forcing));
        }
        let s32: Vec<f32> = storage.iter().map(|&v| v as f32).collect();
        queue.write_buffer(&self.storage, 0, bytemuck::cast_slice(&s32));

        let (gx, gy) = dispatch_grid(self.n_cells, self.workgroup_size);
        let params = Params {
            n_cells: self.n_cells,
            n_steps,
            lanes_per_row: gx * self.workgroup_size,
            soil_et_fraction: SOIL_ET_FRACTION as f32,
        };
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::cast_slice(std::slice::from_ref(&params)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bg.water_balance"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.cell_index.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.landuse_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.soil_capacity.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.forcing.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.storage.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: self.totals.as_entire_binding(),
                },
            ],
        });

        let n = self.n_cells as usize;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("enc.water_balance"),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("cpass.water_balance"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind, &[]);
            cpass.dispatch_workgroups(gx, gy, 1);
        }
        encoder.copy_buffer_to_buffer(
            &self.storage,
            0,
            &self.storage_read,
            0,
            (n * std::mem::size_of::<f32>()) as u64,
        );
        encoder.copy_buffer_to_buffer(
            &self.totals,
            0,
            &self.totals_read,
            0,
            (n * std::mem::size_of::<[f32; 4]>()) as u64,
        );
        queue.submit(Some(encoder.finish()));

        let s_out: Vec<f32> = read_mapped(device, &self.storage_read, n)?;
        let t_out: Vec<[f32; 4]> = read_mapped(device, &self.totals_read, n)?;

        for (dst, &v) in storage.iter_mut().zip(&s_out) {
            *dst = v as f64;
        }
        Ok(t_out
            .iter()
            .map(|t| CellTotals {
                act_et: t[0] as f64,
                recharge: t[1] as f64,
                runoff: t[2] as f64,
                prec: t[3] as f64,
            })
            .collect())
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    workgroup_size: u32,
) -> Result<(wgpu::ComputePipeline, wgpu::BindGroupLayout)> {
    let src = SHADER_SRC.replace("WORKGROUP_SIZE", &workgroup_size.to_string());

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("water_balance.wgsl"),
        source: wgpu::ShaderSource::Wgsl(src.into()),
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("bind.water_balance"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Params>() as u64),
                },
                count: None,
            },
            storage_entry(1, true),
            storage_entry(2, true),
            storage_entry(3, true),
            storage_entry(4, true),
            storage_entry(5, false),
            storage_entry(6, false),
        ],
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("pipe.water_balance"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("water_balance"),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: "water_balance",
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(WaterBalanceError::Device(format!(
            "kernel compilation failed: {err}"
        )));
    }
    Ok((pipeline, layout))
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn init_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    label: &str,
    contents: &[T],
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(contents),
        usage,
    })
}

fn plain_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

fn forcing_buffer(device: &wgpu::Device, n_steps: usize) -> wgpu::Buffer {
    plain_buffer(
        device,
        "forcing",
        (n_steps.max(1) * std::mem::size_of::<[f32; 2]>()) as u64,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
    )
}

/// Zero-sized bindings are invalid; keep at least one element.
fn padded<T: bytemuck::Zeroable>(mut v: Vec<T>) -> Vec<T> {
    if v.is_empty() {
        v.push(T::zeroed());
    }
    v
}

/// Work-group grid covering `n_cells` lanes, spilling into y past the
/// per-dimension limit.
fn dispatch_grid(n_cells: u32, workgroup_size: u32) -> (u32, u32) {
    let groups = n_cells.div_ceil(workgroup_size).max(1);
    let gx = groups.min(MAX_WORKGROUPS_PER_DIMENSION);
    let gy = groups.div_ceil(gx);
    (gx, gy)
}

fn read_mapped<T: bytemuck::Pod>(
    device: &wgpu::Device,
    buf: &wgpu::Buffer,
    n: usize,
) -> Result<Vec<T>> {
    let slice = buf.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| WaterBalanceError::Device(format!("readback channel closed: {e}")))?
        .map_err(|e| WaterBalanceError::Device(format!("buffer map failed: {e}")))?;

    let data = slice.get_mapped_range();
    let out = bytemuck::cast_slice::<u8, T>(&data)[..n].to_vec();
    drop(data);
    buf.unmap();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use crate::constants::BACKEND_RTOL;
    use crate::parameters::ParameterArray;
    use approx::assert_relative_eq;

    fn context() -> Option<DeviceContext> {
        match DeviceContext::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("skipping device test: {e}");
                None
            }
        }
    }

    fn fixture(n: usize) -> (CellBatch, ParameterTables) {
        let landuse: Vec<u32> = (0..n).map(|i| (i % 4) as u32 + 1).collect();
        let soil: Vec<u32> = (0..n).map(|i| (i % 3) as u32 + 1).collect();
        let cells = CellBatch {
            rows: 1,
            cols: n,
            landuse,
            soil,
            mask: vec![true; n],
        };
        let tables = ParameterTables {
            threshold: ParameterArray::from_values(vec![6.0, 12.0, 25.0, 40.0]),
            crop_coefficient: ParameterArray::from_values(vec![0.6, 0.85, 1.0, 1.15]),
            extraction_depth: ParameterArray::from_values(vec![0.3, 0.6, 1.0, 1.5]),
            soil_capacity: ParameterArray::from_values(vec![90.0, 140.0, 210.0]),
        };
        (cells, tables)
    }

    fn forcing(n: usize) -> (Vec<f64>, Vec<f64>) {
        let prec = (0..n)
            .map(|t| if t % 5 == 0 { 18.0 + t as f64 * 0.25 } else { (t % 3) as f64 })
            .collect();
        let pet = (0..n).map(|t| 1.5 + (t % 7) as f64 * 0.4).collect();
        (prec, pet)
    }

    // -- Grid layout --

    #[test]
    fn dispatch_grid_single_row() {
        assert_eq!(dispatch_grid(1, 64), (1, 1));
        assert_eq!(dispatch_grid(64, 64), (1, 1));
        assert_eq!(dispatch_grid(65, 64), (2, 1));
        assert_eq!(dispatch_grid(0, 64), (1, 1));
    }

    #[test]
    fn dispatch_grid_spills_into_y() {
        let n = MAX_WORKGROUPS_PER_DIMENSION * 2 + 5;
        let (gx, gy) = dispatch_grid(n, 1);
        assert_eq!(gx, MAX_WORKGROUPS_PER_DIMENSION);
        assert_eq!(gy, 3);
        assert!(gx as u64 * gy as u64 >= n as u64);
    }

    #[test]
    fn padded_keeps_non_empty() {
        assert_eq!(padded(Vec::<f32>::new()), vec![0.0]);
        assert_eq!(padded(vec![1u32, 2]), vec![1, 2]);
    }

    // -- Device runs (skipped without an adapter) --

    #[test]
    fn matches_host_backend() {
        let Some(ctx) = context() else { return };
        let (cells, tables) = fixture(300);
        let (prec, pet) = forcing(31);

        let mut device = DeviceBackend::new(ctx, &cells, &tables, 64).unwrap();
        let mut host = HostBackend::new(&cells, &tables, None).unwrap();

        let init: Vec<f64> = (0..300).map(|i| 20.0 + (i % 11) as f64 * 7.5).collect();
        let mut s_dev = init.clone();
        let mut s_host = init;
        let t_dev = device.dispatch(&prec, &pet, &mut s_dev).unwrap();
        let t_host = host.dispatch(&prec, &pet, &mut s_host).unwrap();

        for i in 0..300 {
            assert_relative_eq!(s_dev[i], s_host[i], max_relative = BACKEND_RTOL, epsilon = 1e-3);
            assert_relative_eq!(
                t_dev[i].act_et,
                t_host[i].act_et,
                max_relative = BACKEND_RTOL,
                epsilon = 1e-3
            );
            assert_relative_eq!(
                t_dev[i].recharge,
                t_host[i].recharge,
                max_relative = BACKEND_RTOL,
                epsilon = 1e-3
            );
            assert_relative_eq!(
                t_dev[i].runoff,
                t_host[i].runoff,
                max_relative = BACKEND_RTOL,
                epsilon = 1e-3
            );
            assert_relative_eq!(t_dev[i].prec, t_host[i].prec, max_relative = BACKEND_RTOL);
        }
    }

    #[test]
    fn forcing_buffer_grows_for_long_batches() {
        let Some(ctx) = context() else { return };
        let (cells, tables) = fixture(10);
        let (prec, pet) = forcing(90);

        let mut device = DeviceBackend::new(ctx, &cells, &tables, 32).unwrap();
        let mut storage = vec![50.0; 10];
        let totals = device.dispatch(&prec, &pet, &mut storage).unwrap();
        assert_eq!(device.forcing_steps, 90);
        let expected_prec: f64 = prec.iter().sum();
        for t in &totals {
            assert_relative_eq!(t.prec, expected_prec, max_relative = BACKEND_RTOL);
        }
    }

    #[test]
    fn empty_batch_skips_dispatch() {
        let Some(ctx) = context() else { return };
        let (cells, tables) = fixture(0);
        let mut device = DeviceBackend::new(ctx, &cells, &tables, 64).unwrap();
        let mut storage: Vec<f64> = Vec::new();
        let totals = device.dispatch(&[1.0], &[1.0], &mut storage).unwrap();
        assert!(totals.is_empty());
    }
}
