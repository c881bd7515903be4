use bevy::prelude::*;

use crate::gi::constants::MAX_POINT_LIGHTS;

/// Emissive point light seen by the cascade merge. Directional (spot) when
/// the angles are below 360 degrees; it faces the entity's local +X.
#[rustfmt::skip]
#[derive(Component, Reflect, Clone, Copy, Debug)]
#[reflect(Component)]
pub struct RcPointLight2D {
    /// HDR color, channels may exceed one.
    pub color:        LinearRgba,
    pub radius:       f32,
    /// `k` in `exp(-distance * k)`.
    pub decay_factor: f32,
    /// Full cone angle of full intensity, in degrees.
    pub inner_angle:  f32,
    /// Full cone angle where the light fades out, in degrees. Never below `inner_angle` once packed.
    pub outer_angle:  f32,
    #[reflect(ignore)]
    valid:            bool,
}

impl Default for RcPointLight2D
{
    #[rustfmt::skip]
    fn default() -> Self
    {
        Self {
            color:        LinearRgba::rgb(1.0, 0.9, 0.7),
            radius:       5.0,
            decay_factor: 1.0,
            inner_angle:  360.0,
            outer_angle:  360.0,
            valid:        false,
        }
    }
}

impl RcPointLight2D
{
    pub const MIN_DECAY_FACTOR: f32 = 0.01;

    /// Whether the light fits in the active-light capacity. Maintained by the plugin.
    pub fn is_valid(&self) -> bool
    {
        self.valid
    }

    /// Cosines of the half inner and half outer angles.
    pub fn angle_cosines(&self) -> Vec2
    {
        let inner = self.inner_angle.clamp(0.0, 360.0);
        let outer = self.outer_angle.clamp(inner, 360.0);
        Vec2::new(
            (inner * 0.5).to_radians().cos(),
            (outer * 0.5).to_radians().cos(),
        )
    }
}

/// A light resolved against its transform, ready for packing.
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightSample {
    pub position:  Vec3,
    pub direction: Vec3,
    pub light:     RcPointLight2D,
}

impl PartialEq for RcPointLight2D
{
    fn eq(&self, other: &Self) -> bool
    {
        self.color == other.color
            && self.radius == other.radius
            && self.decay_factor == other.decay_factor
            && self.inner_angle == other.inner_angle
            && self.outer_angle == other.outer_angle
    }
}

impl PointLightSample
{
    pub fn new(light: &RcPointLight2D, transform: &GlobalTransform) -> Self
    {
        Self {
            position:  transform.translation(),
            direction: *transform.right(),
            light:     *light,
        }
    }
}

/// Point lights of the scene in registration order.
#[derive(Resource, Default, Debug, Clone)]
pub struct PointLightCollection
{
    entries: Vec<Entity>,
}

impl PointLightCollection
{
    /// Appends `entity`. Returns false when it is already registered.
    pub fn register(&mut self, entity: Entity) -> bool
    {
        if self.entries.contains(&entity) {
            return false;
        }
        self.entries.push(entity);
        true
    }

    /// Removes `entity`, moving every later light up one rank.
    pub fn unregister(&mut self, entity: Entity) -> bool
    {
        let Some(index) = self.entries.iter().position(|e| *e == entity) else {
            return false;
        };
        self.entries.remove(index);
        true
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_
    {
        self.entries.iter().copied()
    }

    /// Only the first `MAX_POINT_LIGHTS` registered lights are valid.
    pub fn is_valid(&self, entity: Entity) -> bool
    {
        self.entries
            .iter()
            .take(MAX_POINT_LIGHTS)
            .any(|e| *e == entity)
    }

    pub fn validity(&self) -> impl Iterator<Item = (Entity, bool)> + '_
    {
        self.entries
            .iter()
            .enumerate()
            .map(|(rank, entity)| (*entity, rank < MAX_POINT_LIGHTS))
    }

    /// Packs up to `MAX_POINT_LIGHTS` lights in registration order. `lookup`
    /// returns `None` for lights that are gone or inactive; they are skipped
    /// and the next registered light takes their slot.
    pub fn pack(&self, lookup: impl Fn(Entity) -> Option<PointLightSample>) -> PackedPointLights
    {
        let mut packed = PackedPointLights::default();
        for sample in self.iter().filter_map(lookup).take(MAX_POINT_LIGHTS) {
            packed.push(&sample);
        }
        packed
    }
}

/// Point light arrays in the layout read by the cascade merge.
#[rustfmt::skip]
#[derive(Debug, Clone, PartialEq)]
pub struct PackedPointLights {
    pub count:           u32,
    /// xyz position, w radius.
    pub position_radius: [Vec4; MAX_POINT_LIGHTS],
    /// rgb color, w decay factor.
    pub color_decay:     [Vec4; MAX_POINT_LIGHTS],
    /// xyz facing, w unused.
    pub direction:       [Vec4; MAX_POINT_LIGHTS],
    /// x cos(inner / 2), y cos(outer / 2).
    pub angles:          [Vec4; MAX_POINT_LIGHTS],
}

impl Default for PackedPointLights
{
    fn default() -> Self
    {
        Self {
            count:           0,
            position_radius: [Vec4::ZERO; MAX_POINT_LIGHTS],
            color_decay:     [Vec4::ZERO; MAX_POINT_LIGHTS],
            direction:       [Vec4::ZERO; MAX_POINT_LIGHTS],
            angles:          [Vec4::ZERO; MAX_POINT_LIGHTS],
        }
    }
}

impl PackedPointLights
{
    fn push(&mut self, sample: &PointLightSample)
    {
        let i = self.count as usize;
        let light = &sample.light;
        let cosines = light.angle_cosines();

        self.position_radius[i] = sample.position.extend(light.radius.max(0.0));
        self.color_decay[i] = Vec4::new(
            light.color.red,
            light.color.green,
            light.color.blue,
            light.decay_factor.max(RcPointLight2D::MIN_DECAY_FACTOR),
        );
        self.direction[i] = sample.direction.extend(0.0);
        self.angles[i] = Vec4::new(cosines.x, cosines.y, 0.0, 0.0);
        self.count += 1;
    }
}

/// Keeps the collection in step with the `RcPointLight2D` components of the
/// world and re-ranks validity whenever it changes.
#[rustfmt::skip]
pub(crate) fn system_sync_point_lights(
    mut res_lights:   ResMut<PointLightCollection>,
    mut removed:      RemovedComponents<RcPointLight2D>,
        query_added:  Query<Entity, Added<RcPointLight2D>>,
    mut query_lights: Query<&mut RcPointLight2D>,
) {
    let mut changed = false;
    for entity in removed.read() {
        changed |= res_lights.unregister(entity);
    }

    let mut added: Vec<Entity> = query_added.iter().collect();
    added.sort();
    for entity in added {
        changed |= res_lights.register(entity);
    }

    if !changed {
        return;
    }

    for (entity, valid) in res_lights.validity() {
        if let Ok(mut light) = query_lights.get_mut(entity) {
            if light.valid != valid {
                light.valid = valid;
            }
        }
    }

    if res_lights.len() > MAX_POINT_LIGHTS {
        warn!(
            "{} point lights registered, only the first {} are used",
            res_lights.len(),
            MAX_POINT_LIGHTS
        );
    }
}

#[cfg(test)]
mod tests
{
    use approx::assert_relative_eq;
    use bevy::ecs::schedule::Schedule;

    use super::*;

    fn entities(count: u32) -> Vec<Entity>
    {
        (0..count).map(Entity::from_raw).collect()
    }

    fn sample(x: f32) -> PointLightSample
    {
        PointLightSample {
            position:  Vec3::new(x, 0.0, 0.0),
            direction: Vec3::X,
            light:     RcPointLight2D::default(),
        }
    }

    #[test]
    fn first_sixteen_registered_lights_are_valid()
    {
        let lights = entities(20);
        let mut collection = PointLightCollection::default();
        for light in &lights {
            assert!(collection.register(*light));
        }

        for (rank, light) in lights.iter().enumerate() {
            assert_eq!(collection.is_valid(*light), rank < 16, "light {rank}");
        }
        assert_eq!(collection.validity().filter(|(_, valid)| !valid).count(), 4);
    }

    #[test]
    fn unregistering_first_light_promotes_the_seventeenth()
    {
        let lights = entities(20);
        let mut collection = PointLightCollection::default();
        lights.iter().for_each(|light| {
            collection.register(*light);
        });

        assert!(!collection.is_valid(lights[16]));
        assert!(collection.unregister(lights[0]));
        assert!(collection.is_valid(lights[16]));
        assert!(!collection.is_valid(lights[17]));
        assert!(!collection.is_valid(lights[0]));
        assert!(!collection.unregister(lights[0]));
    }

    #[test]
    fn registering_twice_keeps_rank()
    {
        let lights = entities(3);
        let mut collection = PointLightCollection::default();
        lights.iter().for_each(|light| {
            collection.register(*light);
        });
        assert!(!collection.register(lights[0]));
        assert_eq!(collection.iter().collect::<Vec<_>>(), lights);
    }

    #[test]
    fn pack_skips_missing_lights_and_caps_at_capacity()
    {
        let lights = entities(20);
        let mut collection = PointLightCollection::default();
        lights.iter().for_each(|light| {
            collection.register(*light);
        });

        // every third light is gone
        let packed = collection.pack(|e| (e.index() % 3 != 0).then(|| sample(e.index() as f32)));
        assert_eq!(packed.count, 13);
        assert_eq!(packed.position_radius[0].x, 1.0);
        assert_eq!(packed.position_radius[1].x, 2.0);
        assert_eq!(packed.position_radius[2].x, 4.0);
        assert_eq!(packed.position_radius[12].x, 19.0);

        let packed = collection.pack(|e| Some(sample(e.index() as f32)));
        assert_eq!(packed.count, 16);
        assert_eq!(packed.position_radius[15].x, 15.0);
    }

    #[test]
    fn pack_layout()
    {
        let mut collection = PointLightCollection::default();
        collection.register(Entity::from_raw(0));

        let light = RcPointLight2D {
            color: LinearRgba::rgb(4.0, 2.0, 1.0),
            radius: 3.0,
            decay_factor: 0.0,
            inner_angle: 90.0,
            outer_angle: 60.0,
            ..default()
        };
        let packed = collection.pack(|_| {
            Some(PointLightSample {
                position: Vec3::new(1.0, 2.0, 3.0),
                direction: Vec3::Y,
                light,
            })
        });

        assert_eq!(packed.count, 1);
        assert_eq!(packed.position_radius[0], Vec4::new(1.0, 2.0, 3.0, 3.0));
        assert_eq!(packed.color_decay[0], Vec4::new(4.0, 2.0, 1.0, RcPointLight2D::MIN_DECAY_FACTOR));
        assert_eq!(packed.direction[0], Vec4::new(0.0, 1.0, 0.0, 0.0));
        // outer is raised to inner
        assert_relative_eq!(packed.angles[0].x, std::f32::consts::FRAC_PI_4.cos());
        assert_relative_eq!(packed.angles[0].y, packed.angles[0].x);
        assert_eq!(packed.position_radius[1], Vec4::ZERO);
    }

    #[test]
    fn omnidirectional_light_has_full_cone()
    {
        let cosines = RcPointLight2D::default().angle_cosines();
        assert_relative_eq!(cosines.x, -1.0);
        assert_relative_eq!(cosines.y, -1.0);
    }

    #[test]
    fn sync_system_ranks_lights_in_spawn_order()
    {
        let mut world = World::new();
        world.init_resource::<PointLightCollection>();
        let mut schedule = Schedule::default();
        schedule.add_systems(system_sync_point_lights);

        let lights: Vec<Entity> = (0..20)
            .map(|_| world.spawn(RcPointLight2D::default()).id())
            .collect();
        schedule.run(&mut world);

        let valid = |world: &World, entity: Entity| world.get::<RcPointLight2D>(entity).unwrap().is_valid();
        assert!(valid(&world, lights[15]));
        assert!(!valid(&world, lights[16]));

        world.despawn(lights[0]);
        schedule.run(&mut world);

        assert_eq!(world.resource::<PointLightCollection>().len(), 19);
        assert!(valid(&world, lights[16]));
        assert!(!valid(&world, lights[17]));

        let late = world.spawn(RcPointLight2D::default()).id();
        schedule.run(&mut world);
        assert!(!valid(&world, late));
        assert_eq!(world.resource::<PointLightCollection>().iter().last(), Some(late));
    }
}
