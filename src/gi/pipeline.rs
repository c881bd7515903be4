use bevy::core_pipeline::fullscreen_vertex_shader::fullscreen_shader_vertex_state;
use bevy::ecs::query::QueryItem;
use bevy::prelude::*;
use bevy::render::render_asset::RenderAssets;
use bevy::render::render_graph::{NodeRunError, RenderGraphContext, RenderLabel, ViewNode};
use bevy::render::render_resource::*;
use bevy::render::renderer::{RenderContext, RenderDevice};
use bevy::render::texture::GpuImage;
use bevy::utils::HashMap;
use thiserror::Error;

use crate::gi::constants::{RADIANCE_FORMAT, SHADER_DOWNSAMPLE};
use crate::gi::passes::{Program, RecordedPass};
use crate::gi::pipeline_assets::{load_embedded_shader, RadianceCascadesPipelineAssets};
use crate::gi::resource::FrameState;
use crate::gi::targets::{BufferRole, GiTargets, GiTargetsWrapper};
use crate::gi::types_gpu::{GpuPassParams, GpuPointLights, GpuRadianceCascadesParams};

const FRAGMENT_ENTRY: &str = "fragment";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineSetupError
{
    #[error("no shader is registered for the {0:?} program")]
    MissingProgram(Program),
}

/// Shader of every full-screen program.
#[derive(Default)]
pub struct ProgramShaders
{
    shaders: HashMap<Program, Handle<Shader>>,
}

impl ProgramShaders
{
    pub fn load(asset_server: &AssetServer) -> Self
    {
        let mut shaders = Self::default();
        for program in Program::ALL {
            shaders.insert(program, load_embedded_shader(asset_server, program.shader_file()));
        }
        shaders
    }

    pub fn insert(&mut self, program: Program, shader: Handle<Shader>)
    {
        self.shaders.insert(program, shader);
    }

    pub fn get(&self, program: Program) -> Result<Handle<Shader>, PipelineSetupError>
    {
        self.shaders
            .get(&program)
            .cloned()
            .ok_or(PipelineSetupError::MissingProgram(program))
    }

    /// Every program's shader, or the first one missing.
    pub fn require_all(&self) -> Result<Vec<(Program, Handle<Shader>)>, PipelineSetupError>
    {
        Program::ALL
            .into_iter()
            .map(|program| self.get(program).map(|shader| (program, shader)))
            .collect()
    }
}

#[rustfmt::skip]
#[derive(Resource)]
pub struct RadianceCascadesPipeline {
    /// Seed, jump flood and signed distance.
    pub distance_layout:   BindGroupLayout,
    pub merge_layout:      BindGroupLayout,
    pub downsample_layout: BindGroupLayout,
    pub sampler:           Sampler,
    pub programs:          HashMap<Program, CachedRenderPipelineId>,
    pub downsample:        CachedRenderPipelineId,
}

impl RadianceCascadesPipeline
{
    /// Queues one render pipeline per program. Nothing is created when a
    /// program has no shader.
    pub fn new(
        render_device: &RenderDevice,
        pipeline_cache: &PipelineCache,
        shaders: &ProgramShaders,
        downsample_shader: Handle<Shader>,
    ) -> Result<Self, PipelineSetupError>
    {
        let program_shaders = shaders.require_all()?;

        let distance_layout = render_device.create_bind_group_layout(
            "rc_distance_bind_group_layout",
            &[
                // Pass params.
                uniform_entry::<GpuPassParams>(0, true),
                // Source.
                texture_entry(1),
                // Light occlusion.
                texture_entry(2),
            ],
        );

        let merge_layout = render_device.create_bind_group_layout(
            "rc_cascade_merge_bind_group_layout",
            &[
                // Stage params.
                uniform_entry::<GpuRadianceCascadesParams>(0, false),
                // Pass params.
                uniform_entry::<GpuPassParams>(1, true),
                // Point lights.
                uniform_entry::<GpuPointLights>(2, false),
                // Upper cascade radiance.
                texture_entry(3),
                // Light occlusion.
                texture_entry(4),
                // Distance field.
                texture_entry(5),
                sampler_entry(6),
            ],
        );

        let downsample_layout = render_device.create_bind_group_layout(
            "rc_downsample_bind_group_layout",
            &[texture_entry(0), sampler_entry(1)],
        );

        let sampler = render_device.create_sampler(&SamplerDescriptor {
            label: Some("rc_linear_clamp_sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..default()
        });

        let programs = program_shaders
            .into_iter()
            .map(|(program, shader)| {
                let layout = match program {
                    Program::CascadeMerge => merge_layout.clone(),
                    _ => distance_layout.clone(),
                };
                let descriptor = fullscreen_descriptor(program.label(), layout, shader, program.target_format());
                (program, pipeline_cache.queue_render_pipeline(descriptor))
            })
            .collect();

        let downsample = pipeline_cache.queue_render_pipeline(fullscreen_descriptor(
            "rc_downsample_pipeline",
            downsample_layout.clone(),
            downsample_shader,
            RADIANCE_FORMAT,
        ));

        Ok(Self {
            distance_layout,
            merge_layout,
            downsample_layout,
            sampler,
            programs,
            downsample,
        })
    }

    pub fn program<'a>(&self, pipeline_cache: &'a PipelineCache, program: Program) -> Option<&'a RenderPipeline>
    {
        self.programs
            .get(&program)
            .and_then(|id| pipeline_cache.get_render_pipeline(*id))
    }

    /// Whether every pipeline finished compiling.
    pub fn is_ready(&self, pipeline_cache: &PipelineCache) -> bool
    {
        Program::ALL
            .into_iter()
            .all(|program| self.program(pipeline_cache, program).is_some())
            && pipeline_cache.get_render_pipeline(self.downsample).is_some()
    }
}

/// Builds the pipeline resource. Failing to set up disables the stage.
pub(crate) fn init_pipeline(world: &mut World)
{
    let asset_server = world.resource::<AssetServer>();
    let shaders = ProgramShaders::load(asset_server);
    let downsample = load_embedded_shader(asset_server, SHADER_DOWNSAMPLE);

    let pipeline = RadianceCascadesPipeline::new(
        world.resource::<RenderDevice>(),
        world.resource::<PipelineCache>(),
        &shaders,
        downsample,
    );
    match pipeline {
        Ok(pipeline) => world.insert_resource(pipeline),
        Err(err) => error!("Radiance cascades are disabled: {err}"),
    }
}

fn fullscreen_descriptor(
    label: &'static str,
    layout: BindGroupLayout,
    shader: Handle<Shader>,
    format: TextureFormat,
) -> RenderPipelineDescriptor
{
    RenderPipelineDescriptor {
        label: Some(label.into()),
        layout: vec![layout],
        push_constant_ranges: vec![],
        vertex: fullscreen_shader_vertex_state(),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        fragment: Some(FragmentState {
            shader,
            shader_defs: vec![],
            entry_point: FRAGMENT_ENTRY.into(),
            targets: vec![Some(ColorTargetState {
                format,
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        }),
    }
}

#[rustfmt::skip]
fn uniform_entry<T: ShaderType>(binding: u32, has_dynamic_offset: bool) -> BindGroupLayoutEntry
{
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty:         BindingType::Buffer {
            ty:               BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: Some(T::min_size()),
        },
        count:      None,
    }
}

#[rustfmt::skip]
fn texture_entry(binding: u32) -> BindGroupLayoutEntry
{
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty:         BindingType::Texture {
            sample_type:    TextureSampleType::Float { filterable: true },
            view_dimension: TextureViewDimension::D2,
            multisampled:   false,
        },
        count:      None,
    }
}

#[rustfmt::skip]
fn sampler_entry(binding: u32) -> BindGroupLayoutEntry
{
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty:         BindingType::Sampler(SamplerBindingType::Filtering),
        count:      None,
    }
}

/// Downsample step writing `target` from the level above it.
pub struct MipLevel
{
    pub target:     TextureView,
    pub bind_group: BindGroup,
}

/// Bind groups keyed by the buffer a pass reads, and views keyed by the
/// buffer it writes.
#[rustfmt::skip]
#[derive(Resource)]
pub struct RadianceCascadesBindGroups {
    pub sources:    HashMap<BufferRole, BindGroup>,
    pub targets:    HashMap<BufferRole, TextureView>,
    pub mip_chains: HashMap<BufferRole, Vec<MipLevel>>,
}

impl RadianceCascadesBindGroups
{
    /// `None` until every image is on the GPU and every buffer is written.
    pub fn new(
        render_device: &RenderDevice,
        pipeline: &RadianceCascadesPipeline,
        gpu_images: &RenderAssets<GpuImage>,
        targets: &GiTargets,
        assets: &RadianceCascadesPipelineAssets,
    ) -> Option<Self>
    {
        let image = |role: BufferRole| gpu_images.get(targets.get(role));

        let occlusion = image(BufferRole::LightOcclusion)?;
        let distance = image(BufferRole::Distance)?;
        let params = assets.params.binding()?;
        let pass_params = assets.pass_params.binding()?;
        let point_lights = assets.point_lights.binding()?;

        let mut sources = HashMap::default();
        let mut views = HashMap::default();
        let mut mip_chains = HashMap::default();

        for role in [BufferRole::LightOcclusion, BufferRole::JumpFloodA, BufferRole::JumpFloodB] {
            let source = image(role)?;
            let bind_group = render_device.create_bind_group(
                role.label(),
                &pipeline.distance_layout,
                &BindGroupEntries::sequential((
                    pass_params.clone(),
                    &source.texture_view,
                    &occlusion.texture_view,
                )),
            );
            sources.insert(role, bind_group);
            views.insert(role, source.texture_view.clone());
        }
        views.insert(BufferRole::Distance, distance.texture_view.clone());

        for role in [BufferRole::RadianceA, BufferRole::RadianceB] {
            let radiance = image(role)?;
            let bind_group = render_device.create_bind_group(
                role.label(),
                &pipeline.merge_layout,
                &BindGroupEntries::sequential((
                    params.clone(),
                    pass_params.clone(),
                    point_lights.clone(),
                    &radiance.texture_view,
                    &occlusion.texture_view,
                    &distance.texture_view,
                    &pipeline.sampler,
                )),
            );
            sources.insert(role, bind_group);

            // attachments must be single-level views
            let levels: Vec<TextureView> = (0..radiance.mip_level_count)
                .map(|level| {
                    radiance.texture.create_view(&TextureViewDescriptor {
                        label: Some(role.label()),
                        base_mip_level: level,
                        mip_level_count: Some(1),
                        ..default()
                    })
                })
                .collect();

            let chain = levels
                .windows(2)
                .map(|pair| MipLevel {
                    target:     pair[1].clone(),
                    bind_group: render_device.create_bind_group(
                        "rc_downsample_bind_group",
                        &pipeline.downsample_layout,
                        &BindGroupEntries::sequential((&pair[0], &pipeline.sampler)),
                    ),
                })
                .collect();

            views.insert(role, levels.first()?.clone());
            mip_chains.insert(role, chain);
        }

        Some(Self {
            sources,
            targets: views,
            mip_chains,
        })
    }
}

#[rustfmt::skip]
pub fn system_prepare_bind_groups(
    mut commands:        Commands,
        pipeline:        Option<Res<RadianceCascadesPipeline>>,
        gpu_images:      Res<RenderAssets<GpuImage>>,
        gpu_frame:       Res<FrameState>,
        targets_wrapper: Res<GiTargetsWrapper>,
        pipeline_assets: Res<RadianceCascadesPipelineAssets>,
        render_device:   Res<RenderDevice>,
) {
    let bind_groups = pipeline
        .as_deref()
        .zip(targets_wrapper.targets.as_ref())
        .filter(|_| gpu_frame.active)
        .and_then(|(pipeline, targets)| {
            RadianceCascadesBindGroups::new(&render_device, pipeline, &gpu_images, targets, &pipeline_assets)
        });

    match bind_groups {
        Some(bind_groups) => commands.insert_resource(bind_groups),
        None => commands.remove_resource::<RadianceCascadesBindGroups>(),
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct RadianceCascadesLabel;

/// Replays the frame's recorded passes for the driving camera.
#[derive(Default)]
pub struct RadianceCascadesNode;

impl ViewNode for RadianceCascadesNode
{
    type ViewQuery = ();

    fn run<'w>(
        &self,
        graph: &mut RenderGraphContext,
        render_context: &mut RenderContext<'w>,
        _view: QueryItem<'w, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError>
    {
        let frame = world.resource::<FrameState>();
        if !frame.active || frame.driver != Some(graph.view_entity()) {
            return Ok(());
        }

        let (Some(pipeline), Some(bind_groups)) = (
            world.get_resource::<RadianceCascadesPipeline>(),
            world.get_resource::<RadianceCascadesBindGroups>(),
        ) else {
            debug!("Radiance cascades resources are not ready, skipping the frame");
            return Ok(());
        };

        let pipeline_cache = world.resource::<PipelineCache>();
        if !pipeline.is_ready(pipeline_cache) {
            debug!("Radiance cascades pipelines are still compiling");
            return Ok(());
        }

        let pipeline_assets = world.resource::<RadianceCascadesPipelineAssets>();
        let mut pass_offsets = pipeline_assets.pass_offsets.iter();

        for recorded in &pipeline_assets.recording.passes {
            match recorded {
                RecordedPass::Fullscreen(pass) => {
                    let (Some(render_pipeline), Some(bind_group), Some(target), Some(offset)) = (
                        pipeline.program(pipeline_cache, pass.program),
                        bind_groups.sources.get(&pass.source),
                        bind_groups.targets.get(&pass.target),
                        pass_offsets.next(),
                    ) else {
                        warn!("Incomplete {:?} pass, skipping the rest of the frame", pass.program);
                        return Ok(());
                    };
                    draw_fullscreen(render_context, pass.program.label(), target, render_pipeline, bind_group, &[*offset]);
                }
                RecordedPass::Mips(role) => {
                    let Some(render_pipeline) = pipeline_cache.get_render_pipeline(pipeline.downsample) else {
                        return Ok(());
                    };
                    for level in bind_groups.mip_chains.get(role).into_iter().flatten() {
                        draw_fullscreen(
                            render_context,
                            "rc_downsample_pass",
                            &level.target,
                            render_pipeline,
                            &level.bind_group,
                            &[],
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

#[rustfmt::skip]
fn draw_fullscreen(
    render_context: &mut RenderContext,
    label: &'static str,
    target: &TextureView,
    render_pipeline: &RenderPipeline,
    bind_group: &BindGroup,
    dynamic_offsets: &[u32],
)
{
    let mut pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
        label:                    Some(label),
        color_attachments:        &[Some(RenderPassColorAttachment {
            view:           target,
            resolve_target: None,
            ops:            Operations {
                load:  LoadOp::Clear(Default::default()),
                store: StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes:         None,
        occlusion_query_set:      None,
    });

    pass.set_render_pipeline(render_pipeline);
    pass.set_bind_group(0, bind_group, dynamic_offsets);
    pass.draw(0..3, 0..1);
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn every_program_needs_a_shader()
    {
        let mut shaders = ProgramShaders::default();
        for program in [Program::Seed, Program::JumpFlood, Program::CascadeMerge] {
            shaders.insert(program, Handle::default());
        }
        assert_eq!(
            shaders.require_all().unwrap_err(),
            PipelineSetupError::MissingProgram(Program::SignedDistance)
        );

        shaders.insert(Program::SignedDistance, Handle::default());
        let all = shaders.require_all().unwrap();
        assert_eq!(all.len(), Program::ALL.len());
    }
}
