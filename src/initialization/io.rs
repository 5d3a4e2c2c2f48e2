use crate::defaults::*;
use crate::error::{Result, SurfaceHoppingError};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Surface hopping algorithm, resolved once when the trajectory is set up.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HoppingMethod {
    #[serde(alias = "nosh")]
    None,
    #[serde(alias = "fssh")]
    FewestSwitches,
    #[serde(alias = "gsh")]
    GlobalSwitches,
}

/// Kind of coupling data delivered by the electronic structure backend.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CouplingType {
    Nac,
    Overlap,
}

/// Treatment of the velocities if a hop is rejected because of missing kinetic energy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FrustratedHopPolicy {
    Ignore,
    Reflect,
}

/// Direction along which the velocities are rescaled after a hop.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RescaleType {
    #[serde(alias = "vector")]
    Nac,
    Uniform,
}

fn default_verbose() -> i8 {
    VERBOSE
}
fn default_nstep() -> usize {
    NSTEP
}
fn default_stepsize() -> f64 {
    STEPSIZE
}
fn default_initial_state() -> usize {
    INITIAL_STATE
}
fn default_nstates() -> usize {
    NSTATES
}
fn default_coupling_type() -> CouplingType {
    COUPLING_TYPE
}
fn default_hopping_method() -> HoppingMethod {
    HOPPING_METHOD
}
fn default_integration_steps() -> usize {
    INTEGRATION_STEPS
}
fn default_max_substep_phase() -> f64 {
    MAX_SUBSTEP_PHASE
}
fn default_max_integration_steps() -> usize {
    MAX_INTEGRATION_STEPS
}
fn default_random_seed() -> u64 {
    RANDOM_SEED
}
fn default_frustrated_hop_policy() -> FrustratedHopPolicy {
    FRUSTRATED_HOP_POLICY
}
fn default_rescale_type() -> RescaleType {
    RESCALE_TYPE
}
fn default_population_floor() -> f64 {
    POPULATION_FLOOR
}
fn default_density_tolerance() -> f64 {
    DENSITY_TOLERANCE
}
fn default_decoherence_correction() -> bool {
    DECOHERENCE_CORRECTION
}
fn default_decoherence_constant() -> f64 {
    DECOHERENCE_CONSTANT
}
fn default_ntraj() -> usize {
    NTRAJ
}
fn default_momentum_width() -> f64 {
    MOMENTUM_WIDTH
}
fn default_tully_a() -> f64 {
    TULLY_A
}
fn default_tully_b() -> f64 {
    TULLY_B
}
fn default_tully_c() -> f64 {
    TULLY_C
}
fn default_tully_d() -> f64 {
    TULLY_D
}
fn default_model_mass() -> f64 {
    MODEL_MASS
}
fn default_model_position() -> f64 {
    MODEL_POSITION
}
fn default_model_momentum() -> f64 {
    MODEL_MOMENTUM
}
fn default_print_hopping() -> bool {
    PRINT_HOPPING
}
fn default_print_state() -> bool {
    PRINT_STATE
}
fn default_print_energies() -> bool {
    PRINT_ENERGIES
}
fn default_hopping_file_name() -> String {
    String::from(HOPPING_FILE_NAME)
}
fn default_hopping_config() -> HoppingConfiguration {
    let hopping_config: HoppingConfiguration = toml::from_str("").unwrap();
    hopping_config
}
fn default_ensemble_config() -> EnsembleConfiguration {
    let ensemble_config: EnsembleConfiguration = toml::from_str("").unwrap();
    ensemble_config
}
fn default_model_config() -> ModelConfiguration {
    let model_config: ModelConfiguration = toml::from_str("").unwrap();
    model_config
}
fn default_print_config() -> PrintConfiguration {
    let print_config: PrintConfiguration = toml::from_str("").unwrap();
    print_config
}

/// Struct that loads the configuration of the dynamics from the file "dynamics.toml".
/// It holds the structs [HoppingConfiguration], [EnsembleConfiguration],
/// [ModelConfiguration] and [PrintConfiguration]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DynamicConfiguration {
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default = "default_nstep")]
    pub nstep: usize,
    #[serde(default = "default_stepsize")]
    pub stepsize: f64,
    #[serde(default = "default_nstates")]
    pub nstates: usize,
    #[serde(default = "default_initial_state")]
    pub initial_state: usize,
    #[serde(default = "default_coupling_type")]
    pub coupling_type: CouplingType,
    #[serde(default = "default_hopping_config")]
    pub hopping: HoppingConfiguration,
    #[serde(default = "default_ensemble_config")]
    pub ensemble: EnsembleConfiguration,
    #[serde(default = "default_model_config")]
    pub model: ModelConfiguration,
    #[serde(default = "default_print_config")]
    pub print: PrintConfiguration,
}

/// Structs that holds the parameters for the surface hopping routines
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HoppingConfiguration {
    #[serde(default = "default_hopping_method")]
    pub hopping_method: HoppingMethod,
    #[serde(default = "default_integration_steps")]
    pub integration_steps: usize,
    #[serde(default = "default_max_substep_phase")]
    pub max_substep_phase: f64,
    #[serde(default = "default_max_integration_steps")]
    pub max_integration_steps: usize,
    // thresholds of global switches have to be set if the method is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_gap_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupling_threshold: Option<f64>,
    #[serde(default = "default_frustrated_hop_policy")]
    pub frustrated_hop_policy: FrustratedHopPolicy,
    #[serde(default = "default_rescale_type")]
    pub rescale_type: RescaleType,
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
    #[serde(default = "default_population_floor")]
    pub population_floor: f64,
    #[serde(default = "default_density_tolerance")]
    pub density_tolerance: f64,
    #[serde(default = "default_decoherence_correction")]
    pub decoherence_correction: bool,
    #[serde(default = "default_decoherence_constant")]
    pub decoherence_constant: f64,
}

/// Struct that holds the parameters of an ensemble of independent trajectories
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnsembleConfiguration {
    #[serde(default = "default_ntraj")]
    pub ntraj: usize,
    #[serde(default = "default_momentum_width")]
    pub momentum_width: f64,
}

/// Parameters of the analytic model potential used by the command line program
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ModelConfiguration {
    #[serde(default = "default_tully_a")]
    pub a: f64,
    #[serde(default = "default_tully_b")]
    pub b: f64,
    #[serde(default = "default_tully_c")]
    pub c: f64,
    #[serde(default = "default_tully_d")]
    pub d: f64,
    #[serde(default = "default_model_mass")]
    pub mass: f64,
    #[serde(default = "default_model_position")]
    pub position: f64,
    #[serde(default = "default_model_momentum")]
    pub momentum: f64,
}

/// Struct that controls the output of the simulation
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrintConfiguration {
    #[serde(default = "default_print_hopping")]
    pub print_hopping: bool,
    #[serde(default = "default_print_state")]
    pub print_state: bool,
    #[serde(default = "default_print_energies")]
    pub print_energies: bool,
    #[serde(default = "default_hopping_file_name")]
    pub hopping_file_name: String,
}

impl Default for DynamicConfiguration {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

impl DynamicConfiguration {
    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(config_string: &str) -> Result<Self> {
        let config: Self = toml::from_str(config_string)
            .map_err(|err| SurfaceHoppingError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read the configuration file. If it does not exist in the directory
    /// the default settings are used and written to the file, so that the
    /// user can see all the options.
    pub fn from_file(config_file_path: &Path) -> Result<Self> {
        if config_file_path.exists() {
            let config_string: String = fs::read_to_string(config_file_path)?;
            Self::from_toml(&config_string)
        } else {
            let config: Self = Self::default();
            config.validate()?;
            let config_string: String = toml::to_string(&config)
                .map_err(|err| SurfaceHoppingError::config(err.to_string()))?;
            fs::write(config_file_path, config_string)?;
            info!(
                "No configuration found, default settings written to {}",
                config_file_path.display()
            );
            Ok(config)
        }
    }

    /// Check the combination of settings before any step is executed.
    pub fn validate(&self) -> Result<()> {
        let hopping: &HoppingConfiguration = &self.hopping;
        if self.nstates == 0 {
            return Err(SurfaceHoppingError::config("nstates must be at least 1"));
        }
        if self.initial_state >= self.nstates {
            return Err(SurfaceHoppingError::config(format!(
                "initial_state {} is not one of the {} tracked states",
                self.initial_state, self.nstates
            )));
        }
        if !(self.stepsize > 0.0) {
            return Err(SurfaceHoppingError::config("stepsize must be positive"));
        }
        if hopping.integration_steps == 0 {
            return Err(SurfaceHoppingError::config(
                "integration_steps must be at least 1",
            ));
        }
        if hopping.max_integration_steps < hopping.integration_steps {
            return Err(SurfaceHoppingError::config(
                "max_integration_steps must not be smaller than integration_steps",
            ));
        }
        if !(hopping.max_substep_phase > 0.0) {
            return Err(SurfaceHoppingError::config(
                "max_substep_phase must be positive",
            ));
        }
        if hopping.decoherence_constant < 0.0 {
            return Err(SurfaceHoppingError::config(
                "decoherence_constant must not be negative",
            ));
        }
        if hopping.hopping_method == HoppingMethod::GlobalSwitches {
            match (hopping.energy_gap_threshold, hopping.coupling_threshold) {
                (Some(gap), Some(coupling)) if gap >= 0.0 && coupling >= 0.0 => {}
                (Some(_), Some(_)) => {
                    return Err(SurfaceHoppingError::config(
                        "the thresholds of global switches must not be negative",
                    ))
                }
                _ => {
                    return Err(SurfaceHoppingError::config(
                        "global switches requires energy_gap_threshold and coupling_threshold",
                    ))
                }
            }
        }
        if hopping.rescale_type == RescaleType::Nac && self.coupling_type == CouplingType::Overlap
        {
            return Err(SurfaceHoppingError::config(
                "rescaling along the nonadiabatic coupling vector requires coupling_type = \"nac\"",
            ));
        }
        Ok(())
    }

    /// Nuclear stepsize in atomic units.
    pub fn stepsize_au(&self) -> f64 {
        self.stepsize * crate::constants::FS_TO_AU
    }
}

#[test]
fn default_configuration_is_valid() {
    let config: DynamicConfiguration = DynamicConfiguration::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.hopping.hopping_method, HoppingMethod::FewestSwitches);
    assert_eq!(config.hopping.frustrated_hop_policy, FrustratedHopPolicy::Ignore);
    assert!(config.hopping.energy_gap_threshold.is_none());
}

#[test]
fn short_method_names_are_accepted() {
    let config = DynamicConfiguration::from_toml(
        "[hopping]\nhopping_method = \"gsh\"\nenergy_gap_threshold = 0.01\ncoupling_threshold = 0.001\n",
    )
    .unwrap();
    assert_eq!(config.hopping.hopping_method, HoppingMethod::GlobalSwitches);
    let config = DynamicConfiguration::from_toml("[hopping]\nhopping_method = \"nosh\"\n").unwrap();
    assert_eq!(config.hopping.hopping_method, HoppingMethod::None);
}

#[test]
fn unknown_method_is_a_configuration_error() {
    let result = DynamicConfiguration::from_toml("[hopping]\nhopping_method = \"fsh\"\n");
    assert!(matches!(result, Err(SurfaceHoppingError::Configuration(_))));
}

#[test]
fn global_switches_without_thresholds_fails() {
    let result = DynamicConfiguration::from_toml(
        "[hopping]\nhopping_method = \"global-switches\"\nenergy_gap_threshold = 0.01\n",
    );
    assert!(matches!(result, Err(SurfaceHoppingError::Configuration(_))));
}

#[test]
fn invalid_initial_state_fails() {
    let result = DynamicConfiguration::from_toml("nstates = 2\ninitial_state = 2\n");
    assert!(matches!(result, Err(SurfaceHoppingError::Configuration(_))));
}

#[test]
fn substep_limit_below_minimum_fails() {
    let result = DynamicConfiguration::from_toml(
        "[hopping]\nintegration_steps = 200\nmax_integration_steps = 100\n",
    );
    assert!(matches!(result, Err(SurfaceHoppingError::Configuration(_))));
    let config = DynamicConfiguration::from_toml("[hopping]\nmax_integration_steps = 5000\n").unwrap();
    assert_eq!(config.hopping.max_integration_steps, 5000);
}

#[test]
fn nac_rescaling_needs_nac_couplings() {
    let result = DynamicConfiguration::from_toml("coupling_type = \"overlap\"\n");
    assert!(result.is_err());
    let config = DynamicConfiguration::from_toml(
        "coupling_type = \"overlap\"\n[hopping]\nrescale_type = \"uniform\"\n",
    )
    .unwrap();
    assert_eq!(config.coupling_type, CouplingType::Overlap);
}

#[test]
fn configuration_round_trips_through_toml() {
    let mut config: DynamicConfiguration = DynamicConfiguration::default();
    config.hopping.hopping_method = HoppingMethod::GlobalSwitches;
    config.hopping.energy_gap_threshold = Some(0.01);
    config.hopping.coupling_threshold = Some(0.001);
    let string: String = toml::to_string(&config).unwrap();
    let parsed = DynamicConfiguration::from_toml(&string).unwrap();
    assert_eq!(parsed.hopping.energy_gap_threshold, Some(0.01));
    assert_eq!(parsed.nstates, config.nstates);
}
