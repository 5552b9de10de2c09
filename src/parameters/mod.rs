//! Process-wide simulation parameters.
//!
//! The `.ini` syntax itself lives outside this crate: whatever parses the
//! file hands over one `HashMap<String, String>` per section, and this
//! module owns everything downstream of that — defaulting, the `-1`
//! sentinel convention, and derived-parameter recomputation. Grounded in
//! the teacher's own parameter sections (`parameter_plugin`), generalized
//! here from bevy resources to plain structs loaded once at startup and
//! broadcast by value instead of injected into an ECS world.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::real::Real;
use crate::vector::{Aabb, Vector, VecD};

bitflags::bitflags! {
    /// Bits of `simulation_mode`, broadcast alongside the rest of
    /// [`Parameters`] whenever it changes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SimulationMode: u32 {
        const EDIT_VIEW      = 0b0000_0001;
        const EMITTER_ACTIVE = 0b0000_0010;
        const EDIT_EMITTER   = 0b0000_0100;
        const EDIT_MOVER     = 0b0000_1000;
        const PAUSE_COMPUTE  = 0b0001_0000;
        const EXIT           = 0b0010_0000;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Cpu,
    Gpu,
}

/// `[SimParameters]`: run-scale and solver-schedule knobs.
#[derive(Clone, Debug)]
pub struct SimParameters {
    pub max_particles_local: usize,
    pub initial_global_particle_count: usize,
    pub solve_step_count: usize,
    pub time_step: f64,
    pub execution_mode: ExecutionMode,
}

/// `[PhysicalParameters]`: fluid constants, most derivable from
/// `particle_rest_spacing` when left at the `-1` sentinel.
#[derive(Clone, Debug)]
pub struct PhysicalParameters {
    pub particle_rest_spacing: f64,
    pub particle_radius: f64,
    pub smoothing_radius: f64,
    pub neighbor_bin_spacing: f64,
    pub rest_density: f64,
    pub rest_mass: f64,
    pub gravity: f64,
    pub surface_tension: f64,
    pub lambda_epsilon: f64,
    pub k_stiff: f64,
    pub viscosity: f64,
    pub max_speed: f64,
    pub vorticity_coef: f64,
}

/// `[InitialFluid]` / `[Mover]` / `[Boundary]` each specify one axis-aligned
/// region or point in the simulation's native `VecD<R>`.
pub struct Regions<R: Real> {
    pub boundary: Aabb<VecD<R>>,
    pub initial_fluid: Aabb<VecD<R>>,
    pub mover_center: VecD<R>,
    pub mover_radius: R,
    pub emitter_center: VecD<R>,
    pub emitter_velocity: VecD<R>,
}

pub struct Parameters<R: Real> {
    pub sim: SimParameters,
    pub physical: PhysicalParameters,
    pub regions: Regions<R>,
    pub simulation_mode: SimulationMode,
}

const SENTINEL: f64 = -1.0;

fn read_scalar(
    sections: &HashMap<String, HashMap<String, String>>,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, ConfigError> {
    let Some(value) = sections.get(section).and_then(|s| s.get(key)) else {
        return Ok(default);
    };
    value.trim().parse::<f64>().map_err(|_| ConfigError::MalformedScalar {
        section: section.to_string(),
        key: key.to_string(),
        value: value.clone(),
    })
}

fn require_scalar(
    sections: &HashMap<String, HashMap<String, String>>,
    section: &str,
    key: &str,
) -> Result<f64, ConfigError> {
    let Some(value) = sections.get(section).and_then(|s| s.get(key)) else {
        return Err(ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        });
    };
    value.trim().parse::<f64>().map_err(|_| ConfigError::MalformedScalar {
        section: section.to_string(),
        key: key.to_string(),
        value: value.clone(),
    })
}

fn read_vector<R: Real>(
    sections: &HashMap<String, HashMap<String, String>>,
    section: &str,
    key: &str,
) -> Result<VecD<R>, ConfigError> {
    let value = sections
        .get(section)
        .and_then(|s| s.get(key))
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })?;
    let components: Vec<&str> = value.split(',').map(str::trim).collect();
    if components.len() != crate::vector::DIM {
        return Err(ConfigError::MalformedVector {
            section: section.to_string(),
            key: key.to_string(),
            value: value.clone(),
            expected: crate::vector::DIM,
        });
    }
    let parsed: Result<Vec<f64>, ()> = components.iter().map(|c| c.parse::<f64>().map_err(|_| ())).collect();
    let parsed = parsed.map_err(|_| ConfigError::MalformedVector {
        section: section.to_string(),
        key: key.to_string(),
        value: value.clone(),
        expected: crate::vector::DIM,
    })?;
    #[cfg(feature = "2d")]
    let v = VecD::<R>::new(R::from_f64(parsed[0]), R::from_f64(parsed[1]));
    #[cfg(not(feature = "2d"))]
    let v = VecD::<R>::new(R::from_f64(parsed[0]), R::from_f64(parsed[1]), R::from_f64(parsed[2]));
    Ok(v)
}

impl<R: Real> Parameters<R> {
    /// Builds a complete, internally-consistent parameter set from raw
    /// `.ini`-style sections, applying the `-1` sentinel convention and
    /// recomputing every derived quantity it triggers.
    pub fn from_sections(sections: &HashMap<String, HashMap<String, String>>) -> Result<Self, ConfigError> {
        let max_particles_local = require_scalar(sections, "SimParameters", "max_particles_local")? as usize;
        let initial_global_particle_count =
            require_scalar(sections, "SimParameters", "initial_global_particle_count")? as usize;
        let solve_step_count = read_scalar(sections, "SimParameters", "solve_step_count", 4.0)? as usize;
        let time_step = require_scalar(sections, "SimParameters", "time_step")?;
        let execution_mode = match sections
            .get("SimParameters")
            .and_then(|s| s.get("execution_mode"))
            .map(|s| s.to_ascii_uppercase())
        {
            Some(ref s) if s == "GPU" => ExecutionMode::Gpu,
            _ => ExecutionMode::Cpu,
        };

        let boundary_min = read_vector::<R>(sections, "Boundary", "min")?;
        let boundary_max = read_vector::<R>(sections, "Boundary", "max")?;
        let boundary = Aabb::new(boundary_min, boundary_max);

        let fluid_min = read_vector::<R>(sections, "InitialFluid", "min")?;
        let fluid_max = read_vector::<R>(sections, "InitialFluid", "max")?;
        let initial_fluid = Aabb::new(fluid_min, fluid_max);

        let mover_center = read_vector::<R>(sections, "Mover", "center")?;
        let mover_radius = read_scalar(sections, "Mover", "radius", 0.2)?;

        let emitter_center = read_vector::<R>(sections, "SimParameters", "emitter_center")
            .unwrap_or_else(|_| initial_fluid.center());
        let emitter_velocity =
            read_vector::<R>(sections, "SimParameters", "emitter_velocity").unwrap_or_else(|_| VecD::<R>::zero());

        let mut particle_rest_spacing = read_scalar(sections, "PhysicalParameters", "particle_rest_spacing", SENTINEL)?;
        if particle_rest_spacing == SENTINEL {
            let dim = crate::vector::DIM as f64;
            let volume = num_traits::ToPrimitive::to_f64(&initial_fluid.volume()).unwrap_or(0.0);
            particle_rest_spacing = (volume / initial_global_particle_count.max(1) as f64).powf(1.0 / dim);
        }

        let mut smoothing_radius = read_scalar(sections, "PhysicalParameters", "smoothing_radius", SENTINEL)?;
        if smoothing_radius == SENTINEL {
            smoothing_radius = 1.8 * particle_rest_spacing;
        }

        let mut neighbor_bin_spacing = read_scalar(sections, "PhysicalParameters", "neighbor_bin_spacing", SENTINEL)?;
        if neighbor_bin_spacing == SENTINEL {
            neighbor_bin_spacing = 1.2 * smoothing_radius;
        }

        let mut max_speed = read_scalar(sections, "PhysicalParameters", "max_speed", SENTINEL)?;
        if max_speed == SENTINEL {
            max_speed = 0.5 * smoothing_radius * solve_step_count as f64 / time_step;
        }

        let particle_radius = read_scalar(sections, "PhysicalParameters", "particle_radius", particle_rest_spacing / 2.0)?;
        let rest_density = require_scalar(sections, "PhysicalParameters", "rest_density")?;
        let rest_mass = require_scalar(sections, "PhysicalParameters", "rest_mass")?;
        let gravity = read_scalar(sections, "PhysicalParameters", "gravity", -9.8)?;
        let surface_tension = read_scalar(sections, "PhysicalParameters", "surface_tension", 0.0)?;
        let lambda_epsilon = read_scalar(sections, "PhysicalParameters", "lambda_epsilon", 100.0)?;
        let k_stiff = read_scalar(sections, "PhysicalParameters", "k_stiff", 0.0)?;
        let viscosity = read_scalar(sections, "PhysicalParameters", "viscosity", 0.01)?;
        let vorticity_coef = read_scalar(sections, "PhysicalParameters", "vorticity_coef", 0.0)?;

        if rest_density <= 0.0 {
            panic!("rest_density must be positive, got {rest_density}");
        }
        if smoothing_radius <= 0.0 {
            panic!("smoothing_radius must be positive, got {smoothing_radius}");
        }

        Ok(Self {
            sim: SimParameters {
                max_particles_local,
                initial_global_particle_count,
                solve_step_count,
                time_step,
                execution_mode,
            },
            physical: PhysicalParameters {
                particle_rest_spacing,
                particle_radius,
                smoothing_radius,
                neighbor_bin_spacing,
                rest_density,
                rest_mass,
                gravity,
                surface_tension,
                lambda_epsilon,
                k_stiff,
                viscosity,
                max_speed,
                vorticity_coef,
            },
            regions: Regions {
                boundary,
                initial_fluid,
                mover_center,
                mover_radius: R::from_f64(mover_radius),
                emitter_center,
                emitter_velocity,
            },
            simulation_mode: SimulationMode::empty(),
        })
    }

    pub fn edge_width(&self) -> f64 {
        1.2 * self.physical.smoothing_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[cfg(feature = "2d")]
    fn sections() -> HashMap<String, HashMap<String, String>> {
        let mut sections = HashMap::new();
        sections.insert(
            "SimParameters".to_string(),
            section(&[
                ("max_particles_local", "10000"),
                ("initial_global_particle_count", "400"),
                ("time_step", "0.01"),
            ]),
        );
        sections.insert(
            "PhysicalParameters".to_string(),
            section(&[("rest_density", "1000"), ("rest_mass", "0.02")]),
        );
        sections.insert("Boundary".to_string(), section(&[("min", "0,0"), ("max", "10,10")]));
        sections.insert(
            "InitialFluid".to_string(),
            section(&[("min", "1,1"), ("max", "3,3")]),
        );
        sections.insert("Mover".to_string(), section(&[("center", "5,5")]));
        sections
    }

    #[test]
    #[cfg(feature = "2d")]
    fn missing_mandatory_scalar_is_an_error() {
        let mut sections = sections();
        sections.get_mut("PhysicalParameters").unwrap().remove("rest_density");
        let result = Parameters::<f64>::from_sections(&sections);
        assert!(matches!(result, Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    #[cfg(feature = "2d")]
    fn sentinel_scalars_derive_from_rest_spacing() {
        let params = Parameters::<f64>::from_sections(&sections()).unwrap();
        assert!(params.physical.particle_rest_spacing > 0.0);
        assert_eq!(params.physical.smoothing_radius, 1.8 * params.physical.particle_rest_spacing);
        assert_eq!(
            params.physical.neighbor_bin_spacing,
            1.2 * params.physical.smoothing_radius
        );
    }

    #[test]
    #[cfg(feature = "2d")]
    fn malformed_vector_reports_expected_component_count() {
        let mut sections = sections();
        sections
            .get_mut("Boundary")
            .unwrap()
            .insert("max".to_string(), "10,10,10".to_string());
        let result = Parameters::<f64>::from_sections(&sections);
        assert!(matches!(result, Err(ConfigError::MalformedVector { expected: 2, .. })));
    }
}
