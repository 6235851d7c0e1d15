//! A JSON-backed scene over analytic primitives.
//!
//! This is the stand-in for the external scene subsystem: spheres and
//! parallelogram quads intersected by linear scan, loaded from a compact
//! JSON description. The engine itself only sees [`SceneOracle`].

use crate::core::common::{Float, EPSILON};
use crate::core::geometry::Ray;
use crate::core::rgb::Rgb;
use crate::scene::light::*;
use crate::scene::{Brdf, Camera, Hit, SceneOracle};
use glam::Vec3;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Scene loading errors.
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    #[error("unable to read scene file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scene description: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("surface references unknown material `{0}`")]
    UnknownMaterial(String),

    #[error("scene has no surfaces")]
    Empty,
}

/// An analytic surface.
#[derive(Clone, Debug)]
pub enum Surface {
    /// A sphere with an outward normal.
    Sphere { center: Vec3, radius: Float, material: usize },

    /// A parallelogram spanned by two edges from a corner.
    Quad { corner: Vec3, edge_u: Vec3, edge_v: Vec3, normal: Vec3, material: usize },
}

impl Surface {
    /// Returns the ray parameter and normal of the closest intersection
    /// beyond the self-intersection offset.
    ///
    /// * `ray` - The ray.
    fn intersect(&self, ray: &Ray) -> Option<(Float, Vec3)> {
        match self {
            Surface::Sphere { center, radius, .. } => {
                let oc = ray.origin - *center;
                let b = oc.dot(ray.direction);
                let c = oc.length_squared() - radius * radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let sqrt_disc = disc.sqrt();
                let t = if -b - sqrt_disc > EPSILON {
                    -b - sqrt_disc
                } else if -b + sqrt_disc > EPSILON {
                    -b + sqrt_disc
                } else {
                    return None;
                };
                let normal = (ray.at(t) - *center) / *radius;
                Some((t, normal))
            }
            Surface::Quad { corner, edge_u, edge_v, normal, .. } => {
                let denom = ray.direction.dot(*normal);
                if denom.abs() < 1e-9 {
                    return None;
                }
                let t = (*corner - ray.origin).dot(*normal) / denom;
                if t <= EPSILON {
                    return None;
                }
                let local = ray.at(t) - *corner;
                let uu = edge_u.length_squared();
                let vv = edge_v.length_squared();
                let uv = edge_u.dot(*edge_v);
                let lu = local.dot(*edge_u);
                let lv = local.dot(*edge_v);
                let det = uu * vv - uv * uv;
                if det.abs() < 1e-12 {
                    return None;
                }
                let a = (lu * vv - lv * uv) / det;
                let b = (lv * uu - lu * uv) / det;
                if !(0.0..=1.0).contains(&a) || !(0.0..=1.0).contains(&b) {
                    return None;
                }
                Some((t, *normal))
            }
        }
    }

    fn material(&self) -> usize {
        match self {
            Surface::Sphere { material, .. } => *material,
            Surface::Quad { material, .. } => *material,
        }
    }

    /// Returns the axis-aligned bounds of the surface.
    fn bounds(&self) -> (Vec3, Vec3) {
        match self {
            Surface::Sphere { center, radius, .. } => {
                (*center - Vec3::splat(*radius), *center + Vec3::splat(*radius))
            }
            Surface::Quad { corner, edge_u, edge_v, .. } => {
                let corners = [
                    *corner,
                    *corner + *edge_u,
                    *corner + *edge_v,
                    *corner + *edge_u + *edge_v,
                ];
                corners.iter().skip(1).fold((corners[0], corners[0]), |(lo, hi), c| {
                    (lo.min(*c), hi.max(*c))
                })
            }
        }
    }
}

/// A scene built from analytic surfaces, intersected by linear scan.
pub struct SimpleScene {
    materials: Vec<Brdf>,
    surfaces: Vec<Surface>,
    lights: Vec<Light>,
    camera: Camera,
    ambient: Rgb,
    background: Rgb,
    centroid: Vec3,
    bounding_radius: Float,
}

impl SimpleScene {
    /// Creates an empty scene with the given camera.
    ///
    /// * `camera`     - The camera.
    /// * `ambient`    - Scene-wide ambient color.
    /// * `background` - Background color.
    pub fn new(camera: Camera, ambient: Rgb, background: Rgb) -> Self {
        Self {
            materials: Vec::new(),
            surfaces: Vec::new(),
            lights: Vec::new(),
            camera,
            ambient,
            background,
            centroid: Vec3::ZERO,
            bounding_radius: 1.0,
        }
    }

    /// Adds a material and returns its index.
    pub fn add_material(&mut self, brdf: Brdf) -> usize {
        self.materials.push(brdf);
        self.materials.len() - 1
    }

    /// Adds a surface. Call [`SimpleScene::update_bounds`] after the last
    /// surface.
    pub fn add_surface(&mut self, surface: Surface) {
        self.surfaces.push(surface);
    }

    /// Adds a light.
    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    /// Recomputes the scene centroid and bounding radius from the surfaces.
    pub fn update_bounds(&mut self) {
        let mut bounds: Option<(Vec3, Vec3)> = None;
        for surface in &self.surfaces {
            let (lo, hi) = surface.bounds();
            bounds = Some(match bounds {
                None => (lo, hi),
                Some((blo, bhi)) => (blo.min(lo), bhi.max(hi)),
            });
        }
        if let Some((lo, hi)) = bounds {
            self.centroid = (lo + hi) * 0.5;
            self.bounding_radius = ((hi - lo).length() * 0.5).max(EPSILON);
        }
    }
}

impl SceneOracle for SimpleScene {
    fn intersect(&self, ray: &Ray) -> Option<Hit<'_>> {
        let mut closest: Option<(Float, Vec3, usize)> = None;
        for surface in &self.surfaces {
            if let Some((t, normal)) = surface.intersect(ray) {
                if closest.map_or(true, |(ct, _, _)| t < ct) {
                    closest = Some((t, normal, surface.material()));
                }
            }
        }
        closest.map(|(t, normal, material)| Hit {
            point: ray.at(t),
            normal,
            t,
            brdf: &self.materials[material],
        })
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn ambient(&self) -> Rgb {
        self.ambient
    }

    fn background(&self) -> Rgb {
        self.background
    }

    fn centroid(&self) -> Vec3 {
        self.centroid
    }

    fn bounding_radius(&self) -> Float {
        self.bounding_radius
    }
}

// -------------------------------------------------------------------------
// JSON description
// -------------------------------------------------------------------------

#[derive(Deserialize)]
struct SceneFile {
    camera: CameraSpec,
    #[serde(default)]
    ambient: [Float; 3],
    #[serde(default)]
    background: [Float; 3],
    #[serde(default)]
    materials: Vec<MaterialSpec>,
    #[serde(default)]
    surfaces: Vec<SurfaceSpec>,
    #[serde(default)]
    lights: Vec<LightSpec>,
}

#[derive(Deserialize)]
struct CameraSpec {
    eye: [Float; 3],
    towards: [Float; 3],
    up: [Float; 3],
    #[serde(default = "default_fov")]
    xfov: Float,
    #[serde(default = "default_fov")]
    yfov: Float,
}

fn default_fov() -> Float {
    0.5
}

#[derive(Deserialize)]
struct MaterialSpec {
    name: String,
    #[serde(default)]
    ambient: [Float; 3],
    #[serde(default)]
    diffuse: [Float; 3],
    #[serde(default)]
    specular: [Float; 3],
    #[serde(default)]
    transmission: [Float; 3],
    #[serde(default)]
    emission: [Float; 3],
    #[serde(default = "default_shininess")]
    shininess: Float,
    #[serde(default = "default_ir")]
    index_of_refraction: Float,
}

fn default_shininess() -> Float {
    1.0
}

fn default_ir() -> Float {
    1.0
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SurfaceSpec {
    Sphere {
        center: [Float; 3],
        radius: Float,
        material: String,
    },
    Quad {
        corner: [Float; 3],
        edge_u: [Float; 3],
        edge_v: [Float; 3],
        material: String,
    },
}

#[derive(Deserialize)]
struct LightBaseSpec {
    #[serde(default = "default_color")]
    color: [Float; 3],
    #[serde(default = "default_intensity")]
    intensity: Float,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default = "default_attenuation")]
    attenuation: [Float; 3],
}

fn default_color() -> [Float; 3] {
    [1.0, 1.0, 1.0]
}

fn default_intensity() -> Float {
    1.0
}

fn default_active() -> bool {
    true
}

fn default_attenuation() -> [Float; 3] {
    [1.0, 0.0, 0.0]
}

impl From<LightBaseSpec> for LightBase {
    fn from(spec: LightBaseSpec) -> Self {
        Self {
            color: spec.color.into(),
            intensity: spec.intensity,
            active: spec.active,
            constant_attenuation: spec.attenuation[0],
            linear_attenuation: spec.attenuation[1],
            quadratic_attenuation: spec.attenuation[2],
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LightSpec {
    Directional {
        #[serde(flatten)]
        base: LightBaseSpec,
        direction: [Float; 3],
    },
    Point {
        #[serde(flatten)]
        base: LightBaseSpec,
        position: [Float; 3],
    },
    Spot {
        #[serde(flatten)]
        base: LightBaseSpec,
        position: [Float; 3],
        direction: [Float; 3],
        #[serde(default = "default_drop_off")]
        drop_off_rate: Float,
        cut_off_angle: Float,
    },
    AreaDisk {
        #[serde(flatten)]
        base: LightBaseSpec,
        position: [Float; 3],
        direction: [Float; 3],
        radius: Float,
    },
    AreaRect {
        #[serde(flatten)]
        base: LightBaseSpec,
        position: [Float; 3],
        primary_axis: [Float; 3],
        secondary_axis: [Float; 3],
        primary_length: Float,
        secondary_length: Float,
    },
}

fn default_drop_off() -> Float {
    1.0
}

fn vec3(v: [Float; 3]) -> Vec3 {
    Vec3::from_array(v)
}

/// Loads a scene from a JSON file.
///
/// * `path`          - Path to the scene description.
/// * `real_material` - Normalize material reflectance channels to at most
///                     one.
pub fn load_scene<P: AsRef<Path>>(path: P, real_material: bool) -> Result<SimpleScene, SceneError> {
    let text = std::fs::read_to_string(path)?;
    let file: SceneFile = serde_json::from_str(&text)?;

    let camera = Camera {
        eye: vec3(file.camera.eye),
        towards: vec3(file.camera.towards).normalize(),
        up: vec3(file.camera.up).normalize(),
        xfov: file.camera.xfov,
        yfov: file.camera.yfov,
    };

    let mut scene = SimpleScene::new(camera, file.ambient.into(), file.background.into());

    let mut material_index = HashMap::new();
    for spec in file.materials {
        let brdf = Brdf {
            ambient: spec.ambient.into(),
            diffuse: spec.diffuse.into(),
            specular: spec.specular.into(),
            transmission: spec.transmission.into(),
            emission: spec.emission.into(),
            shininess: spec.shininess,
            index_of_refraction: spec.index_of_refraction,
        };
        let brdf = if real_material { brdf.normalized() } else { brdf };
        material_index.insert(spec.name.clone(), scene.add_material(brdf));
    }

    let lookup = |name: &str| {
        material_index
            .get(name)
            .copied()
            .ok_or_else(|| SceneError::UnknownMaterial(name.to_owned()))
    };

    for spec in file.surfaces {
        let surface = match spec {
            SurfaceSpec::Sphere { center, radius, material } => Surface::Sphere {
                center: vec3(center),
                radius,
                material: lookup(&material)?,
            },
            SurfaceSpec::Quad { corner, edge_u, edge_v, material } => {
                let edge_u = vec3(edge_u);
                let edge_v = vec3(edge_v);
                Surface::Quad {
                    corner: vec3(corner),
                    edge_u,
                    edge_v,
                    normal: edge_u.cross(edge_v).normalize(),
                    material: lookup(&material)?,
                }
            }
        };
        scene.add_surface(surface);
    }

    for spec in file.lights {
        let light = match spec {
            LightSpec::Directional { base, direction } => Light::Directional(DirectionalLight {
                base: base.into(),
                direction: vec3(direction).normalize(),
            }),
            LightSpec::Point { base, position } => Light::Point(PointLight {
                base: base.into(),
                position: vec3(position),
            }),
            LightSpec::Spot { base, position, direction, drop_off_rate, cut_off_angle } => {
                Light::Spot(SpotLight {
                    base: base.into(),
                    position: vec3(position),
                    direction: vec3(direction).normalize(),
                    drop_off_rate,
                    cut_off_angle,
                })
            }
            LightSpec::AreaDisk { base, position, direction, radius } => {
                Light::AreaDisk(AreaDiskLight {
                    base: base.into(),
                    position: vec3(position),
                    direction: vec3(direction).normalize(),
                    radius,
                })
            }
            LightSpec::AreaRect {
                base,
                position,
                primary_axis,
                secondary_axis,
                primary_length,
                secondary_length,
            } => {
                let primary_axis = vec3(primary_axis).normalize();
                let secondary_axis = vec3(secondary_axis).normalize();
                Light::AreaRect(AreaRectLight {
                    base: base.into(),
                    position: vec3(position),
                    direction: primary_axis.cross(secondary_axis).normalize(),
                    primary_axis,
                    secondary_axis,
                    primary_length,
                    secondary_length,
                })
            }
        };
        scene.add_light(light);
    }

    if scene.surfaces.is_empty() {
        return Err(SceneError::Empty);
    }
    scene.update_bounds();

    info!(
        "loaded scene: {} surfaces, {} materials, {} lights",
        scene.surfaces.len(),
        scene.materials.len(),
        scene.lights.len()
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> Camera {
        Camera {
            eye: Vec3::new(0.0, 0.0, 5.0),
            towards: -Vec3::Z,
            up: Vec3::Y,
            xfov: 0.5,
            yfov: 0.5,
        }
    }

    #[test]
    fn sphere_intersection() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let m = scene.add_material(Brdf::default());
        scene.add_surface(Surface::Sphere { center: Vec3::ZERO, radius: 1.0, material: m });
        scene.update_bounds();

        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let hit = scene.intersect(&ray).unwrap();
        assert_relative_eq!(hit.t, 4.0, epsilon = 1e-4);
        assert_relative_eq!(hit.normal.dot(Vec3::Z), 1.0, epsilon = 1e-4);

        // From inside, the second root is found.
        let inside = Ray::new(Vec3::ZERO, -Vec3::Z);
        let hit = scene.intersect(&inside).unwrap();
        assert_relative_eq!(hit.t, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn quad_intersection() {
        let mut scene = SimpleScene::new(test_camera(), Rgb::BLACK, Rgb::BLACK);
        let m = scene.add_material(Brdf::default());
        scene.add_surface(Surface::Quad {
            corner: Vec3::new(-1.0, -1.0, 0.0),
            edge_u: Vec3::new(2.0, 0.0, 0.0),
            edge_v: Vec3::new(0.0, 2.0, 0.0),
            normal: Vec3::Z,
            material: m,
        });
        scene.update_bounds();

        let hit_ray = Ray::new(Vec3::new(0.5, 0.5, 5.0), -Vec3::Z);
        assert!(scene.intersect(&hit_ray).is_some());

        let miss_ray = Ray::new(Vec3::new(1.5, 0.0, 5.0), -Vec3::Z);
        assert!(scene.intersect(&miss_ray).is_none());
    }

    #[test]
    fn load_from_json() {
        let json = r#"{
            "camera": {"eye": [0, 0, 5], "towards": [0, 0, -1], "up": [0, 1, 0]},
            "background": [0.1, 0.1, 0.1],
            "materials": [{"name": "white", "diffuse": [0.8, 0.8, 0.8]}],
            "surfaces": [
                {"type": "sphere", "center": [0, 0, 0], "radius": 1.0, "material": "white"}
            ],
            "lights": [
                {"type": "point", "position": [0, 3, 0], "intensity": 10.0}
            ]
        }"#;
        let dir = std::env::temp_dir().join("photonmap-scene-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scene.json");
        std::fs::write(&path, json).unwrap();

        let scene = load_scene(&path, false).unwrap();
        assert_eq!(scene.lights().len(), 1);
        assert_relative_eq!(scene.bounding_radius(), 3.0f32.sqrt(), epsilon = 1e-4);
        assert_eq!(scene.background(), Rgb::new(0.1, 0.1, 0.1));
    }

    #[test]
    fn unknown_material_is_an_error() {
        let json = r#"{
            "camera": {"eye": [0, 0, 5], "towards": [0, 0, -1], "up": [0, 1, 0]},
            "surfaces": [
                {"type": "sphere", "center": [0, 0, 0], "radius": 1.0, "material": "nope"}
            ]
        }"#;
        let dir = std::env::temp_dir().join("photonmap-scene-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, json).unwrap();

        assert!(matches!(load_scene(&path, false), Err(SceneError::UnknownMaterial(_))));
    }
}
