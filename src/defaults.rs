use crate::initialization::io::{CouplingType, FrustratedHopPolicy, HoppingMethod, RescaleType};

// config file
pub const CONFIG_FILE_NAME: &str = "dynamics.toml";
// print level
pub const VERBOSE: i8 = 0;
// number of nuclear steps
pub const NSTEP: usize = 1000;
// nuclear stepsize in fs
pub const STEPSIZE: f64 = 0.1;
// initial electronic state
pub const INITIAL_STATE: usize = 0;
// number of electronic states
pub const NSTATES: usize = 2;
// surface hopping method: "none", "fewest-switches" or "global-switches"
pub const HOPPING_METHOD: HoppingMethod = HoppingMethod::FewestSwitches;
// the couplings are either nonadiabatic coupling vectors ("nac")
// or overlaps between wavefunctions of subsequent steps ("overlap")
pub const COUPLING_TYPE: CouplingType = CouplingType::Nac;
// minimal number of small steps for the electronic integration per nuclear step
pub const INTEGRATION_STEPS: usize = 100;
// maximal phase rotation (rad) of the electronic equations within one small step.
// The number of small steps is increased if this value would be exceeded.
pub const MAX_SUBSTEP_PHASE: f64 = 0.05;
// upper limit of small steps per nuclear step, more are treated as a diverging trajectory
pub const MAX_INTEGRATION_STEPS: usize = 1_000_000;
// seed of the random number generator for the fewest switches algorithm
pub const RANDOM_SEED: u64 = 1;
// frustrated hops: "ignore" keeps the velocities, "reflect" inverts the
// velocity component along the rescaling direction
pub const FRUSTRATED_HOP_POLICY: FrustratedHopPolicy = FrustratedHopPolicy::Ignore;
// type of velocity rescaling for surface hopping: "uniform" or "nac"
pub const RESCALE_TYPE: RescaleType = RescaleType::Nac;
// Populations of the active state below this value give zero hopping probabilities
pub const POPULATION_FLOOR: f64 = 1.0e-10;
// tolerance for the trace and the hermiticity of the density matrix
pub const DENSITY_TOLERANCE: f64 = 1.0e-6;
// If set to true, the decoherence correction according to
// eqn. (17) in JCP 126, 134114 (2007) is turned on.
pub const DECOHERENCE_CORRECTION: bool = false;
// constant in hartree
// use the recommended value for C in eqn. (17) of JCP 126, 134114 (2007)
pub const DECOHERENCE_CONSTANT: f64 = 0.1;
// number of trajectories of an ensemble
pub const NTRAJ: usize = 1;
// parameters of the Tully model (single avoided crossing), JCP 93, 1061 (1990)
pub const TULLY_A: f64 = 0.01;
pub const TULLY_B: f64 = 1.6;
pub const TULLY_C: f64 = 0.005;
pub const TULLY_D: f64 = 1.0;
// mass of the model particle (a.u.)
pub const MODEL_MASS: f64 = 2000.0;
// initial position (bohr) and momentum (a.u.) of the model particle
pub const MODEL_POSITION: f64 = -10.0;
pub const MODEL_MOMENTUM: f64 = 20.0;
// width of the gaussian distribution of the initial momenta (a.u.)
pub const MOMENTUM_WIDTH: f64 = 0.0;
// write the hopping log and the state of every step
pub const PRINT_HOPPING: bool = true;
pub const PRINT_STATE: bool = true;
pub const PRINT_ENERGIES: bool = false;
pub const HOPPING_FILE_NAME: &str = "hopping";
