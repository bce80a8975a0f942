//! # Actuator parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of values in the vector form of [`ActuatorParameters`].
pub const NUM_ACTUATOR_PARAMS: usize = 10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Physical constants of one joint actuator: the friction model of the gearbox and the
/// electrical model of the DC motor.
///
/// The vector form used by the `MODEL` and `MOTOR` commands lists the fields in declaration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorParameters {
    /// Maximum deflection of the bristle friction integrator.
    pub bristle_displ_max: f64,

    /// Restoring velocity per unit of bristle deflection.
    pub bristle_stiffness: f64,

    /// Friction while sticking, must be at least the coulomb friction.
    pub sticking_friction: f64,

    pub coulomb_friction: f64,

    /// Viscous friction per unit of normalised velocity.
    pub fluid_friction: f64,

    /// Characteristic velocity of the Stribeck curve, must be positive.
    pub stiction_range: f64,

    /// Motor supply voltage.
    ///
    /// Units: volts
    pub v_in: f64,

    /// Back EMF constant
    pub k_b: f64,

    /// Torque constant
    pub k_m: f64,

    /// Inverse coil resistance.
    ///
    /// Units: 1/ohms
    pub r_i_inv: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsError {
    #[error("Expected {} actuator parameters but got {0}", NUM_ACTUATOR_PARAMS)]
    WrongLength(usize),

    #[error("Actuator parameter {0} is not finite")]
    NotFinite(usize),

    #[error("Sticking friction ({0}) is less than coulomb friction ({1})")]
    StickingBelowCoulomb(f64, f64),

    #[error("Stiction range must be positive but is {0}")]
    NonPositiveStictionRange(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ActuatorParameters {
    fn default() -> Self {
        Self {
            bristle_displ_max: 0.01,
            bristle_stiffness: 1.0,
            sticking_friction: 0.2,
            coulomb_friction: 0.1,
            fluid_friction: 0.1,
            stiction_range: 0.01,
            v_in: 16.0,
            k_b: 2.563,
            k_m: 1.393,
            r_i_inv: 1.0 / 9.59,
        }
    }
}

impl ActuatorParameters {
    /// Parameters identified on the Sensorimotor actuator boards.
    pub const SENSORIMOTOR: Self = Self {
        bristle_displ_max: 8.71005098e-03,
        bristle_stiffness: 9.93740632e-01,
        sticking_friction: 2.17955433e-01,
        coulomb_friction: 1.04044079e-01,
        fluid_friction: 3.43298513e-01,
        stiction_range: 1.30738033e-01,
        v_in: 12.0,
        k_b: 1.88657814,
        k_m: 1.88925820,
        r_i_inv: 5.89352492e-02,
    };

    /// Build parameters from their vector form.
    pub fn from_slice(values: &[f64]) -> Result<Self, ParamsError> {
        if values.len() != NUM_ACTUATOR_PARAMS {
            return Err(ParamsError::WrongLength(values.len()))
        }

        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(ParamsError::NotFinite(i))
        }

        let params = Self {
            bristle_displ_max: values[0],
            bristle_stiffness: values[1],
            sticking_friction: values[2],
            coulomb_friction: values[3],
            fluid_friction: values[4],
            stiction_range: values[5],
            v_in: values[6],
            k_b: values[7],
            k_m: values[8],
            r_i_inv: values[9],
        };

        params.validate()?;

        Ok(params)
    }

    /// Vector form of the parameters.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.bristle_displ_max,
            self.bristle_stiffness,
            self.sticking_friction,
            self.coulomb_friction,
            self.fluid_friction,
            self.stiction_range,
            self.v_in,
            self.k_b,
            self.k_m,
            self.r_i_inv,
        ]
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.sticking_friction < self.coulomb_friction {
            return Err(ParamsError::StickingBelowCoulomb(
                self.sticking_friction,
                self.coulomb_friction
            ))
        }

        if !(self.stiction_range > 0.0) {
            return Err(ParamsError::NonPositiveStictionRange(self.stiction_range))
        }

        Ok(())
    }
}
