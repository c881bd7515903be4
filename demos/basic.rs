use bevy::color::palettes::css;
use bevy::prelude::*;
use bevy::render::view::RenderLayers;
use bevy::sprite::{Anchor, MaterialMesh2dBundle};
use bevy::window::PrimaryWindow;
use bevy_radiance_cascades_2d::prelude::*;

const MAP: &[&[u8]] = &[
    &[1, 0, 0, 0, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 0, 0, 1, 0],
    &[0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0],
    &[0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0],
    &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0],
    &[0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 2, 0, 0, 1, 0, 0, 1, 0],
    &[1, 0, 1, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    &[1, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0],
    &[1, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0],
    &[0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 1, 0],
    &[0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
];

const BLOCK_SIZE: f32 = 48.0;
const PREVIEW_SIZE: Vec2 = Vec2::new(384.0, 216.0);

#[derive(Component)]
struct MouseLight;

#[derive(Component)]
struct GiPreview;

fn main()
{
    let mut app = App::new();
    app.insert_resource(ClearColor(Color::BLACK))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Radiance Cascades 2D: Basic".into(),
                resolution: (1280.0, 720.0).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(RadianceCascades2DPlugin)
        .insert_resource(RadianceCascadesSettings {
            cascade_count: 5,
            sky_color: Color::srgb(0.4, 0.5, 0.8),
            sky_intensity: 0.05,
            ..default()
        })
        .add_systems(Startup, setup)
        .add_systems(Update, (system_move_light_to_cursor, system_update_preview));

    #[cfg(feature = "egui")]
    app.add_plugins(bevy_inspector_egui::quick::ResourceInspectorPlugin::<RadianceCascadesSettings>::default());

    app.run();
}

fn setup(
    mut commands:  Commands,
    mut meshes:    ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<LightOcclusionMaterial>>,
    mut colors:    ResMut<Assets<ColorMaterial>>,
)
{
    let block_mesh = meshes.add(Rectangle::new(1.0, 1.0));
    let wall = materials.add(LightOcclusionMaterial::wall(1.0));
    let emitter = materials.add(LightOcclusionMaterial::emitter(LinearRgba::rgb(6.0, 2.0, 0.5)));
    let wall_color = colors.add(ColorMaterial::from(Color::from(css::DARK_GRAY)));
    let occlusion_layers = RenderLayers::layer(LAYER_LIGHT_OCCLUSION_ID);

    let rows = MAP.len() as f32;
    let cols = MAP[0].len() as f32;
    let origin = Vec2::new(-cols * BLOCK_SIZE, rows * BLOCK_SIZE) * 0.5 + Vec2::new(BLOCK_SIZE, -BLOCK_SIZE) * 0.5;

    for (i, row) in MAP.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let translation = origin + Vec2::new(j as f32, -(i as f32)) * BLOCK_SIZE;
            let transform = Transform {
                translation: translation.extend(0.0),
                scale: Vec3::new(BLOCK_SIZE, BLOCK_SIZE, 1.0),
                ..default()
            };

            let occlusion_material = match cell {
                1 => wall.clone(),
                2 => emitter.clone(),
                _ => continue,
            };

            // visible block
            commands.spawn(MaterialMesh2dBundle {
                mesh: block_mesh.clone().into(),
                material: wall_color.clone(),
                transform,
                ..default()
            });
            // its light-occlusion twin
            commands.spawn((
                MaterialMesh2dBundle {
                    mesh: block_mesh.clone().into(),
                    material: occlusion_material,
                    transform,
                    ..default()
                },
                occlusion_layers.clone(),
            ));
        }
    }

    commands.spawn((
        SpatialBundle::default(),
        {
            let mut light = RcPointLight2D::default();
            light.color = LinearRgba::rgb(4.0, 3.0, 1.5);
            light.radius = 12.0;
            light.decay_factor = 0.5;
            light
        },
        MouseLight,
        Name::new("mouse_light"),
    ));

    commands.spawn((
        SpatialBundle::from_transform(Transform::from_xyz(-300.0, -150.0, 0.0).with_rotation(Quat::from_rotation_z(0.8))),
        {
            let mut light = RcPointLight2D::default();
            light.color = LinearRgba::rgb(0.5, 2.0, 4.0);
            light.radius = 10.0;
            light.inner_angle = 40.0;
            light.outer_angle = 70.0;
            light
        },
        Name::new("spot_light"),
    ));

    commands
        .spawn((
            Camera2dBundle {
                camera: Camera {
                    hdr: true,
                    ..default()
                },
                ..default()
            },
            RadianceCascadesCamera::default(),
            Name::new("main_camera"),
        ))
        .with_children(|camera| {
            camera.spawn((
                SpriteBundle {
                    sprite: Sprite {
                        custom_size: Some(PREVIEW_SIZE),
                        anchor: Anchor::TopRight,
                        ..default()
                    },
                    transform: Transform::from_xyz(630.0, 350.0, 10.0),
                    ..default()
                },
                GiPreview,
            ));
        });
}

fn system_move_light_to_cursor(
    query_window:    Query<&Window, With<PrimaryWindow>>,
    query_camera:    Query<(&Camera, &GlobalTransform), With<RadianceCascadesCamera>>,
    mut query_light: Query<&mut Transform, With<MouseLight>>,
)
{
    let (Ok(window), Ok((camera, camera_transform))) = (query_window.get_single(), query_camera.get_single()) else {
        return;
    };
    let Some(cursor) = window
        .cursor_position()
        .and_then(|cursor| camera.viewport_to_world_2d(camera_transform, cursor))
    else {
        return;
    };
    for mut transform in &mut query_light {
        transform.translation = cursor.extend(0.0);
    }
}

fn system_update_preview(
    res_outputs:       Res<RadianceCascadesOutputs>,
    mut query_preview: Query<(&mut Handle<Image>, &mut Visibility), With<GiPreview>>,
)
{
    for (mut image, mut visibility) in &mut query_preview {
        match &res_outputs.global_gi {
            Some(global_gi) => {
                if *image != *global_gi {
                    *image = global_gi.clone();
                }
                *visibility = Visibility::Inherited;
            }
            None => *visibility = Visibility::Hidden,
        }
    }
}
