//! Wing surface calibration
//!
//! Corrects the raw wing mesh with measured surface-deflection polynomials.
//! Two correction curves (front and back surface) are blended per vertex by
//! where the vertex lies between two measured reference lines along the span.
//!
//! The correction is applied through [`MeshCalibrator::calibrate`], which
//! consumes a `Model<Raw>` and returns a `Model<Calibrated>`; a calibrated model
//! cannot be corrected a second time.

mod polynomial;

pub use polynomial::CalibrationPolynomial;

use serde::{Deserialize, Serialize};

use crate::mesh::{Calibrated, Mesh, Model, Raw};

/// Millimetres per model unit (inch)
pub const MM_PER_INCH: f64 = 25.4;

/// Gain at which the measured corrections apply unscaled
pub const REFERENCE_GAIN: f64 = 2.5;

/// Reference-line separations at or below this are treated as degenerate
pub const DEGENERATE_EPSILON: f64 = 1e-9;

fn default_front_reference_line() -> CalibrationPolynomial {
    CalibrationPolynomial::new(vec![-0.5192, 243.9])
}

fn default_back_reference_line() -> CalibrationPolynomial {
    CalibrationPolynomial::new(vec![
        -2.907e-16, 6.746e-16, 1.491e-10, -4.031e-10, -0.000323, 3.6e-05, -31.02,
    ])
}

/// Measured calibration data for one wing asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WingCalibration {
    /// Front-surface deflection (mm) as a function of span position (mm)
    pub front_surface: CalibrationPolynomial,
    /// Back-surface deflection (mm) as a function of span position (mm)
    pub back_surface: CalibrationPolynomial,
    /// Front reference line, evaluated at |x|
    #[serde(default = "default_front_reference_line")]
    pub front_reference_line: CalibrationPolynomial,
    /// Back reference line, evaluated at signed x
    #[serde(default = "default_back_reference_line")]
    pub back_reference_line: CalibrationPolynomial,
    /// Load gain G; corrections scale by G / 2.5
    pub gain: f64,
}

impl WingCalibration {
    /// Surface polynomials with the standard measured reference lines.
    pub fn new(
        front_surface: CalibrationPolynomial,
        back_surface: CalibrationPolynomial,
        gain: f64,
    ) -> Self {
        Self {
            front_surface,
            back_surface,
            front_reference_line: default_front_reference_line(),
            back_reference_line: default_back_reference_line(),
            gain,
        }
    }

    pub fn with_reference_lines(
        mut self,
        front: CalibrationPolynomial,
        back: CalibrationPolynomial,
    ) -> Self {
        self.front_reference_line = front;
        self.back_reference_line = back;
        self
    }

    /// True when no surface correction is defined; calibration is then the identity.
    pub fn is_identity(&self) -> bool {
        self.front_surface.is_empty() && self.back_surface.is_empty()
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if !self.gain.is_finite() {
            return Err(CalibrationError::InvalidCoefficients("gain"));
        }
        let polynomials = [
            ("front_surface", &self.front_surface),
            ("back_surface", &self.back_surface),
            ("front_reference_line", &self.front_reference_line),
            ("back_reference_line", &self.back_reference_line),
        ];
        match polynomials.iter().find(|(_, p)| !p.is_finite()) {
            Some((name, _)) => Err(CalibrationError::InvalidCoefficients(*name)),
            None => Ok(()),
        }
    }

    /// Z offset (model units) for a vertex at `(x, y)`.
    pub fn correction(&self, x: f64, y: f64) -> BlendOutcome {
        let x_mm = x * MM_PER_INCH;
        let z_front_mm = self.front_surface.evaluate(x_mm);
        let z_back_mm = self.back_surface.evaluate(x_mm);

        // Reference lines are fitted in model units
        let y_front = self.front_reference_line.evaluate(x.abs());
        let y_back = self.back_reference_line.evaluate(x);

        let separation = y_front - y_back;
        // `!(a > b)` also catches NaN
        if !(separation.abs() > DEGENERATE_EPSILON) {
            return BlendOutcome::Degenerate { y_front, y_back };
        }

        let ratio = (y_front - y) / separation;
        let correction_mm = z_front_mm * ratio + z_back_mm * (1.0 - ratio);
        let dz = correction_mm / MM_PER_INCH * (self.gain / REFERENCE_GAIN);
        BlendOutcome::Blended { ratio, dz }
    }
}

/// Result of blending the two surface corrections at one vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlendOutcome {
    /// `ratio` locates the vertex between the reference lines (0 = front, 1 = back)
    Blended { ratio: f64, dz: f64 },
    /// Reference lines coincide, so no blend weight exists
    Degenerate { y_front: f64, y_back: f64 },
}

/// What to do with vertices where the reference lines coincide
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateBlendPolicy {
    /// Fail the whole calibration
    #[default]
    Reject,
    /// Keep the raw z for that vertex and report it
    LeaveUncorrected,
}

/// Calibration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    #[error("calibration coefficient set '{0}' contains non-finite values")]
    InvalidCoefficients(&'static str),
    #[error(
        "mesh '{mesh}' vertex {vertex}: reference lines coincide \
         (front {y_front}, back {y_back}), blend ratio undefined"
    )]
    DegenerateBlend {
        mesh: String,
        vertex: usize,
        y_front: f64,
        y_back: f64,
    },
    #[error("mesh '{mesh}' vertex {vertex}: correction is not finite")]
    NonFiniteCorrection { mesh: String, vertex: usize },
}

/// Summary of one calibration run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationReport {
    /// Vertices whose z was changed
    pub corrected: usize,
    /// Corrected vertices with a blend ratio outside [0, 1] (applied unclamped)
    pub extrapolated: usize,
    /// Vertices left uncorrected under [`DegenerateBlendPolicy::LeaveUncorrected`]
    pub degenerate: usize,
    /// Largest absolute z change, model units
    pub max_abs_correction: f64,
}

/// One-shot geometric correction of a wing model
#[derive(Debug, Clone)]
pub struct MeshCalibrator {
    calibration: WingCalibration,
    policy: DegenerateBlendPolicy,
}

impl MeshCalibrator {
    pub fn new(calibration: WingCalibration) -> Self {
        Self {
            calibration,
            policy: DegenerateBlendPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DegenerateBlendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn calibration(&self) -> &WingCalibration {
        &self.calibration
    }

    pub fn policy(&self) -> DegenerateBlendPolicy {
        self.policy
    }

    /// Correct every vertex of `model`.
    ///
    /// On error the raw model is dropped; no partially corrected geometry escapes.
    pub fn calibrate(
        &self,
        model: Model<Raw>,
    ) -> Result<(Model<Calibrated>, CalibrationReport), CalibrationError> {
        self.calibration.validate()?;

        let identity = self.calibration.is_identity();
        let mut report = CalibrationReport::default();
        let (name, meshes) = model.into_meshes();

        let calibrated = meshes
            .into_iter()
            .map(|mesh| self.calibrate_mesh(mesh, identity, &mut report))
            .collect::<Result<Vec<_>, _>>()?;

        if identity {
            tracing::info!(model = %name, "Wing calibration has no surface coefficients, geometry unchanged");
        } else {
            tracing::info!(
                model = %name,
                corrected = report.corrected,
                max_abs_correction = report.max_abs_correction,
                gain = self.calibration.gain,
                "Wing calibration applied"
            );
        }
        if report.extrapolated > 0 {
            tracing::warn!(
                model = %name,
                vertices = report.extrapolated,
                "Blend ratio outside [0, 1]; corrections extrapolated beyond the reference lines"
            );
        }
        if report.degenerate > 0 {
            tracing::warn!(
                model = %name,
                vertices = report.degenerate,
                "Reference lines coincide; vertices left uncorrected"
            );
        }

        Ok((Model::new(name, calibrated), report))
    }

    fn calibrate_mesh(
        &self,
        mesh: Mesh<Raw>,
        identity: bool,
        report: &mut CalibrationReport,
    ) -> Result<Mesh<Calibrated>, CalibrationError> {
        let mesh_name = mesh.name().to_string();
        mesh.correct(|index, vertex| {
            if identity {
                return Ok(());
            }
            let x = vertex.position[0] as f64;
            let y = vertex.position[1] as f64;
            match self.calibration.correction(x, y) {
                BlendOutcome::Blended { ratio, dz } => {
                    if !dz.is_finite() {
                        return Err(CalibrationError::NonFiniteCorrection {
                            mesh: mesh_name.clone(),
                            vertex: index,
                        });
                    }
                    if !(0.0..=1.0).contains(&ratio) {
                        report.extrapolated += 1;
                    }
                    vertex.position[2] = (vertex.position[2] as f64 + dz) as f32;
                    report.corrected += 1;
                    report.max_abs_correction = report.max_abs_correction.max(dz.abs());
                    Ok(())
                }
                BlendOutcome::Degenerate { y_front, y_back } => match self.policy {
                    DegenerateBlendPolicy::Reject => Err(CalibrationError::DegenerateBlend {
                        mesh: mesh_name.clone(),
                        vertex: index,
                        y_front,
                        y_back,
                    }),
                    DegenerateBlendPolicy::LeaveUncorrected => {
                        report.degenerate += 1;
                        Ok(())
                    }
                },
            }
        })
    }
}
