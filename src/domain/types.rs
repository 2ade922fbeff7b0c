//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON
//! - reloaded later for plotting or comparisons

use serde::{Deserialize, Serialize};

use crate::error::FitError;

/// Speed of light (km/s).
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458;

/// Conversion between Gaussian sigma and FWHM.
pub const FWHM_PER_SIGMA: f64 = 2.355;

/// Doublet constants (rest-frame vacuum wavelengths, Å).
pub const SII_DOUBLET_OFFSET: f64 = 14.379;
pub const OIII_DOUBLET_OFFSET: f64 = 47.934;
pub const OIII_DOUBLET_RATIO: f64 = 2.98;
pub const NII_DOUBLET_OFFSET: f64 = 35.425;
pub const NII_DOUBLET_RATIO: f64 = 2.96;

/// One of the four jointly fitted line complexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complex {
    Hb,
    Oiii,
    NiiHa,
    Sii,
}

impl Complex {
    /// Catalog order.
    pub const ALL: [Complex; 4] = [Complex::Hb, Complex::Oiii, Complex::NiiHa, Complex::Sii];

    /// Prefix used for flat record columns.
    pub fn tag(self) -> &'static str {
        match self {
            Complex::Hb => "hb",
            Complex::Oiii => "oiii",
            Complex::NiiHa => "nii_ha",
            Complex::Sii => "sii",
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            Complex::Hb => "Hβ",
            Complex::Oiii => "[OIII]",
            Complex::NiiHa => "[NII]+Hα",
            Complex::Sii => "[SII]",
        }
    }

    /// Every component any architecture of this complex can contain.
    pub fn lines(self) -> &'static [LineId] {
        match self {
            Complex::Hb => &[LineId::HbN, LineId::HbOut, LineId::HbB],
            Complex::Oiii => &[
                LineId::Oiii4959,
                LineId::Oiii4959Out,
                LineId::Oiii5007,
                LineId::Oiii5007Out,
            ],
            Complex::NiiHa => &[
                LineId::Nii6548,
                LineId::Nii6548Out,
                LineId::Nii6583,
                LineId::Nii6583Out,
                LineId::HaN,
                LineId::HaOut,
                LineId::HaB,
            ],
            Complex::Sii => &[
                LineId::Sii6716,
                LineId::Sii6716Out,
                LineId::Sii6731,
                LineId::Sii6731Out,
            ],
        }
    }
}

/// Named Gaussian component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LineId {
    #[serde(rename = "hb_n")]
    HbN,
    #[serde(rename = "hb_out")]
    HbOut,
    #[serde(rename = "hb_b")]
    HbB,
    #[serde(rename = "oiii4959")]
    Oiii4959,
    #[serde(rename = "oiii4959_out")]
    Oiii4959Out,
    #[serde(rename = "oiii5007")]
    Oiii5007,
    #[serde(rename = "oiii5007_out")]
    Oiii5007Out,
    #[serde(rename = "nii6548")]
    Nii6548,
    #[serde(rename = "nii6548_out")]
    Nii6548Out,
    #[serde(rename = "nii6583")]
    Nii6583,
    #[serde(rename = "nii6583_out")]
    Nii6583Out,
    #[serde(rename = "ha_n")]
    HaN,
    #[serde(rename = "ha_out")]
    HaOut,
    #[serde(rename = "ha_b")]
    HaB,
    #[serde(rename = "sii6716")]
    Sii6716,
    #[serde(rename = "sii6716_out")]
    Sii6716Out,
    #[serde(rename = "sii6731")]
    Sii6731,
    #[serde(rename = "sii6731_out")]
    Sii6731Out,
}

impl LineId {
    /// Column prefix (`{name}_{quantity}`).
    pub fn name(self) -> &'static str {
        match self {
            LineId::HbN => "hb_n",
            LineId::HbOut => "hb_out",
            LineId::HbB => "hb_b",
            LineId::Oiii4959 => "oiii4959",
            LineId::Oiii4959Out => "oiii4959_out",
            LineId::Oiii5007 => "oiii5007",
            LineId::Oiii5007Out => "oiii5007_out",
            LineId::Nii6548 => "nii6548",
            LineId::Nii6548Out => "nii6548_out",
            LineId::Nii6583 => "nii6583",
            LineId::Nii6583Out => "nii6583_out",
            LineId::HaN => "ha_n",
            LineId::HaOut => "ha_out",
            LineId::HaB => "ha_b",
            LineId::Sii6716 => "sii6716",
            LineId::Sii6716Out => "sii6716_out",
            LineId::Sii6731 => "sii6731",
            LineId::Sii6731Out => "sii6731_out",
        }
    }

    pub fn complex(self) -> Complex {
        match self {
            LineId::HbN | LineId::HbOut | LineId::HbB => Complex::Hb,
            LineId::Oiii4959 | LineId::Oiii4959Out | LineId::Oiii5007 | LineId::Oiii5007Out => {
                Complex::Oiii
            }
            LineId::Nii6548
            | LineId::Nii6548Out
            | LineId::Nii6583
            | LineId::Nii6583Out
            | LineId::HaN
            | LineId::HaOut
            | LineId::HaB => Complex::NiiHa,
            LineId::Sii6716 | LineId::Sii6716Out | LineId::Sii6731 | LineId::Sii6731Out => {
                Complex::Sii
            }
        }
    }

    /// Rest-frame vacuum wavelength (Å).
    pub fn rest_wavelength(self) -> f64 {
        match self {
            LineId::HbN | LineId::HbOut | LineId::HbB => 4862.683,
            LineId::Oiii4959 | LineId::Oiii4959Out => 4960.295,
            LineId::Oiii5007 | LineId::Oiii5007Out => 5008.239,
            LineId::Nii6548 | LineId::Nii6548Out => 6549.852,
            LineId::Nii6583 | LineId::Nii6583Out => 6585.277,
            LineId::HaN | LineId::HaOut | LineId::HaB => 6564.312,
            LineId::Sii6716 | LineId::Sii6716Out => 6718.294,
            LineId::Sii6731 | LineId::Sii6731Out => 6732.673,
        }
    }
}

/// Number of kinematic components per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kinematics {
    OneComponent,
    TwoComponent,
}

/// How the narrow Balmer width relates to the [SII] template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthMode {
    /// Free within ±`frac_temp` percent of the template dispersion.
    Free,
    /// Tied to the template dispersion.
    Fixed,
}

/// Fit architecture, carried alongside every fit result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "complex", rename_all = "snake_case")]
pub enum Architecture {
    Sii {
        kinematics: Kinematics,
    },
    Oiii {
        kinematics: Kinematics,
    },
    Hb {
        kinematics: Kinematics,
        width: WidthMode,
        broad: bool,
    },
    NiiHa {
        kinematics: Kinematics,
        width: WidthMode,
        broad: bool,
    },
}

impl Architecture {
    pub fn complex(self) -> Complex {
        match self {
            Architecture::Sii { .. } => Complex::Sii,
            Architecture::Oiii { .. } => Complex::Oiii,
            Architecture::Hb { .. } => Complex::Hb,
            Architecture::NiiHa { .. } => Complex::NiiHa,
        }
    }

    pub fn kinematics(self) -> Kinematics {
        match self {
            Architecture::Sii { kinematics }
            | Architecture::Oiii { kinematics }
            | Architecture::Hb { kinematics, .. }
            | Architecture::NiiHa { kinematics, .. } => kinematics,
        }
    }

    pub fn has_broad(self) -> bool {
        match self {
            Architecture::Hb { broad, .. } | Architecture::NiiHa { broad, .. } => broad,
            _ => false,
        }
    }

    /// Free-parameter count, used as the reduced chi-square degrees of freedom.
    pub fn dof(self, continuum: bool) -> usize {
        use Kinematics::{OneComponent as One, TwoComponent as Two};
        use WidthMode::{Fixed, Free};

        let lines = match self {
            Architecture::Sii { kinematics: One } => 4,
            Architecture::Sii { kinematics: Two } => 7,
            Architecture::Oiii { kinematics: One } => 3,
            Architecture::Oiii { kinematics: Two } => 6,
            Architecture::Hb { kinematics, width, broad } => {
                let base = match (kinematics, width) {
                    (One, Free) => 3,
                    (Two, Free) => 6,
                    (One, Fixed) => 2,
                    (Two, Fixed) => 4,
                };
                base + if broad { 3 } else { 0 }
            }
            Architecture::NiiHa { kinematics, width, broad } => {
                let base = match (kinematics, width) {
                    (One, Free) => 5,
                    (Two, Free) => 10,
                    (One, Fixed) => 4,
                    (Two, Fixed) => 8,
                };
                base + if broad { 3 } else { 0 }
            }
        };
        lines + usize::from(continuum)
    }

    /// Components present in this architecture, in model order.
    pub fn components(self) -> Vec<LineId> {
        let two = self.kinematics() == Kinematics::TwoComponent;
        let mut out = Vec::new();
        match self {
            Architecture::Sii { .. } => {
                out.extend([LineId::Sii6716, LineId::Sii6731]);
                if two {
                    out.extend([LineId::Sii6716Out, LineId::Sii6731Out]);
                }
            }
            Architecture::Oiii { .. } => {
                out.extend([LineId::Oiii4959, LineId::Oiii5007]);
                if two {
                    out.extend([LineId::Oiii4959Out, LineId::Oiii5007Out]);
                }
            }
            Architecture::Hb { broad, .. } => {
                out.push(LineId::HbN);
                if two {
                    out.push(LineId::HbOut);
                }
                if broad {
                    out.push(LineId::HbB);
                }
            }
            Architecture::NiiHa { broad, .. } => {
                out.extend([LineId::Nii6548, LineId::Nii6583]);
                if two {
                    out.extend([LineId::Nii6548Out, LineId::Nii6583Out]);
                }
                out.push(LineId::HaN);
                if two {
                    out.push(LineId::HaOut);
                }
                if broad {
                    out.push(LineId::HaB);
                }
            }
        }
        out
    }

    /// Strategy flag recorded for Balmer architectures.
    pub fn strategy_flag(self) -> Option<FitFlag> {
        let (kinematics, width) = match self {
            Architecture::Hb { kinematics, width, .. } | Architecture::NiiHa { kinematics, width, .. } => {
                (kinematics, width)
            }
            _ => return None,
        };
        Some(match (kinematics, width) {
            (Kinematics::OneComponent, WidthMode::Free) => FitFlag::FreeOneComponent,
            (Kinematics::OneComponent, WidthMode::Fixed) => FitFlag::FixedOneComponent,
            (Kinematics::TwoComponent, WidthMode::Free) => FitFlag::FreeTwoComponent,
            (Kinematics::TwoComponent, WidthMode::Fixed) => FitFlag::FixedTwoComponent,
        })
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> String {
        let kin = match self.kinematics() {
            Kinematics::OneComponent => "one-component",
            Kinematics::TwoComponent => "two-component",
        };
        match self {
            Architecture::Sii { .. } | Architecture::Oiii { .. } => kin.to_string(),
            Architecture::Hb { width, broad, .. } | Architecture::NiiHa { width, broad, .. } => {
                let width = match width {
                    WidthMode::Free => "free",
                    WidthMode::Fixed => "fixed",
                };
                let broad = if broad { " + broad" } else { "" };
                format!("{width} {kin}{broad}")
            }
        }
    }
}

/// Diagnostic flag vocabulary.
///
/// Discriminants are the bit positions used in exported flag lists; values
/// 0–10 keep their historical meaning so older catalogs remain comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FitFlag {
    FreeOneComponent = 0,
    FixedOneComponent = 1,
    FreeTwoComponent = 2,
    FixedTwoComponent = 3,
    /// Broad fit improved the reduced chi-square by at least the threshold.
    BroadImproved = 4,
    /// Broad dispersion came out below the narrow dispersion.
    BroadNarrowerThanNarrow = 5,
    /// Broad and outflow roles were swapped after the fit.
    OutflowBroadSwapped = 6,
    /// Hβ narrow dispersion below the noise floor.
    HbNarrowBelowFloor = 9,
    /// Hα narrow dispersion below the noise floor.
    HaNarrowBelowFloor = 10,
    /// Two-component fit improved the reduced chi-square by at least the threshold.
    OutflowImproved = 11,
    /// Outflow dispersion came out at or below the narrow dispersion.
    OutflowNarrowerThanNarrow = 12,
    /// [SII] / [OIII] narrow dispersion below the noise floor.
    NarrowBelowFloor = 13,
    /// Broad Hα FWHM below the floor.
    BroadFwhmBelowFloor = 14,
    /// Optimizer stopped without meeting its tolerances.
    NonConverged = 15,
    /// Hβ and Hα narrow dispersions differ by more than the template band.
    BalmerWidthMismatch = 16,
}

impl FitFlag {
    pub const ALL: [FitFlag; 15] = [
        FitFlag::FreeOneComponent,
        FitFlag::FixedOneComponent,
        FitFlag::FreeTwoComponent,
        FitFlag::FixedTwoComponent,
        FitFlag::BroadImproved,
        FitFlag::BroadNarrowerThanNarrow,
        FitFlag::OutflowBroadSwapped,
        FitFlag::HbNarrowBelowFloor,
        FitFlag::HaNarrowBelowFloor,
        FitFlag::OutflowImproved,
        FitFlag::OutflowNarrowerThanNarrow,
        FitFlag::NarrowBelowFloor,
        FitFlag::BroadFwhmBelowFloor,
        FitFlag::NonConverged,
        FitFlag::BalmerWidthMismatch,
    ];

    pub fn bit(self) -> u8 {
        self as u8
    }

    fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.bit() == bit)
    }
}

/// Bitset over [`FitFlag`]; iteration is ascending and duplicate-free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u8>", into = "Vec<u8>")]
pub struct FitFlags(u32);

impl FitFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, flag: FitFlag) {
        self.0 |= 1 << flag.bit();
    }

    pub fn with(mut self, flag: FitFlag) -> Self {
        self.insert(flag);
        self
    }

    pub fn remove(&mut self, flag: FitFlag) {
        self.0 &= !(1 << flag.bit());
    }

    pub fn contains(&self, flag: FitFlag) -> bool {
        self.0 & (1 << flag.bit()) != 0
    }

    pub fn union(self, other: FitFlags) -> FitFlags {
        FitFlags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = FitFlag> + '_ {
        FitFlag::ALL.into_iter().filter(|f| self.contains(*f))
    }

    /// Sorted bit positions.
    pub fn bits(&self) -> Vec<u8> {
        self.iter().map(FitFlag::bit).collect()
    }
}

impl From<Vec<u8>> for FitFlags {
    fn from(bits: Vec<u8>) -> Self {
        let mut flags = FitFlags::empty();
        for flag in bits.into_iter().filter_map(FitFlag::from_bit) {
            flags.insert(flag);
        }
        flags
    }
}

impl From<FitFlags> for Vec<u8> {
    fn from(flags: FitFlags) -> Self {
        flags.bits()
    }
}

/// Optimizer outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    NonConverged,
}

/// A rest-frame spectrum (equal-length arrays).
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl Spectrum {
    /// Validate array lengths and sanitize non-finite pixels.
    ///
    /// Pixels with non-finite flux or inverse variance (or negative inverse
    /// variance) are kept but zero-weighted.
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>, ivar: Vec<f64>) -> Result<Self, FitError> {
        if wavelength.len() != flux.len() || wavelength.len() != ivar.len() {
            return Err(FitError::MalformedInput(format!(
                "array lengths differ: wavelength={}, flux={}, ivar={}",
                wavelength.len(),
                flux.len(),
                ivar.len()
            )));
        }
        if wavelength.is_empty() {
            return Err(FitError::MalformedInput("empty spectrum".into()));
        }
        if wavelength.iter().any(|w| !w.is_finite()) {
            return Err(FitError::MalformedInput("non-finite wavelength".into()));
        }

        let mut flux = flux;
        let mut ivar = ivar;
        let mut usable = 0usize;
        for (f, iv) in flux.iter_mut().zip(ivar.iter_mut()) {
            if !(f.is_finite() && iv.is_finite() && *iv >= 0.0) {
                *f = 0.0;
                *iv = 0.0;
            } else if *iv > 0.0 {
                usable += 1;
            }
        }
        if usable == 0 {
            return Err(FitError::MalformedInput(
                "no finite flux with positive inverse variance".into(),
            ));
        }

        Ok(Self {
            wavelength,
            flux,
            ivar,
        })
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Copy of this spectrum with a different flux vector.
    pub fn with_flux(&self, flux: Vec<f64>) -> Self {
        Self {
            wavelength: self.wavelength.clone(),
            flux,
            ivar: self.ivar.clone(),
        }
    }

    /// Slice the pixels with `lower <= wavelength <= upper`.
    pub fn window(&self, complex: Complex, bounds: WindowBounds) -> SpectralWindow {
        let mut window = SpectralWindow {
            complex,
            wavelength: Vec::new(),
            flux: Vec::new(),
            ivar: Vec::new(),
        };
        for i in 0..self.len() {
            let w = self.wavelength[i];
            if w >= bounds.lower && w <= bounds.upper {
                window.wavelength.push(w);
                window.flux.push(self.flux[i]);
                window.ivar.push(self.ivar[i]);
            }
        }
        window
    }
}

/// Pixels of one complex's fitting window.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralWindow {
    pub complex: Complex,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl SpectralWindow {
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Maximum flux within `(lower, upper)`, or over the whole window if that
    /// range holds no pixels. Floored at zero.
    pub fn peak_flux(&self, range: Option<(f64, f64)>) -> f64 {
        let in_range = |w: f64| range.is_none_or(|(lo, hi)| w > lo && w < hi);
        let mut peak = self
            .wavelength
            .iter()
            .zip(&self.flux)
            .filter(|(w, _)| in_range(**w))
            .map(|(_, f)| *f)
            .fold(f64::NEG_INFINITY, f64::max);
        if !peak.is_finite() && range.is_some() {
            peak = self.flux.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        }
        if peak.is_finite() { peak.max(0.0) } else { 0.0 }
    }
}

/// Rest-frame wavelength range (Å), inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub lower: f64,
    pub upper: f64,
}

impl WindowBounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

/// One wavelength range per complex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSet {
    pub hb: WindowBounds,
    pub oiii: WindowBounds,
    pub nii_ha: WindowBounds,
    pub sii: WindowBounds,
}

impl WindowSet {
    /// Line fitting windows.
    pub const FIT: WindowSet = WindowSet {
        hb: WindowBounds::new(4800.0, 4930.0),
        oiii: WindowBounds::new(4930.0, 5050.0),
        nii_ha: WindowBounds::new(6500.0, 6625.0),
        sii: WindowBounds::new(6690.0, 6760.0),
    };

    /// Line-free sidebands used for the noise proxy.
    pub const NOISE: WindowSet = WindowSet {
        hb: WindowBounds::new(4750.0, 4800.0),
        oiii: WindowBounds::new(5050.0, 5100.0),
        nii_ha: WindowBounds::new(6625.0, 6675.0),
        sii: WindowBounds::new(6760.0, 6800.0),
    };

    pub fn get(&self, complex: Complex) -> WindowBounds {
        match complex {
            Complex::Hb => self.hb,
            Complex::Oiii => self.oiii,
            Complex::NiiHa => self.nii_ha,
            Complex::Sii => self.sii,
        }
    }
}

/// Input target as handed over by the spectral-retrieval layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpectrum {
    pub target_id: String,
    #[serde(default)]
    pub redshift: f64,
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    /// Optional dense resolution matrix (row-major, `n x n`), only used to
    /// shape Monte-Carlo noise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Vec<Vec<f64>>>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Include a flat continuum term in every complex.
    pub fit_continuum: bool,
    /// Allowed Balmer width excursion around the template (percent).
    pub frac_temp: f64,
    /// Monte-Carlo resampling iterations per target.
    pub n_iterations: usize,
    /// Base seed for the resampling noise.
    pub seed: u64,
    /// Optimizer iteration cap.
    pub max_iterations: usize,
    /// Minimum fractional reduced chi-square improvement for a more complex model.
    pub improvement_threshold: f64,
    /// Narrow-component dispersion floor (km/s).
    pub min_narrow_sigma_kms: f64,
    /// Broad Hα FWHM floor (km/s).
    pub min_broad_fwhm_kms: f64,
    pub windows: WindowSet,
    pub noise_windows: WindowSet,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            fit_continuum: true,
            frac_temp: 60.0,
            n_iterations: 100,
            seed: 42,
            max_iterations: 1000,
            improvement_threshold: 0.20,
            min_narrow_sigma_kms: 40.0,
            min_broad_fwhm_kms: 300.0,
            windows: WindowSet::FIT,
            noise_windows: WindowSet::NOISE,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.frac_temp.is_finite() && self.frac_temp > 0.0 && self.frac_temp < 100.0) {
            return Err(FitError::InvalidConfig(format!(
                "frac_temp must be in (0, 100), got {}",
                self.frac_temp
            )));
        }
        if self.max_iterations == 0 {
            return Err(FitError::InvalidConfig("max_iterations must be > 0".into()));
        }
        if !(self.improvement_threshold.is_finite() && self.improvement_threshold >= 0.0) {
            return Err(FitError::InvalidConfig("improvement_threshold must be >= 0".into()));
        }
        if !(self.min_narrow_sigma_kms.is_finite() && self.min_broad_fwhm_kms.is_finite()) {
            return Err(FitError::InvalidConfig("width floors must be finite".into()));
        }
        for complex in Complex::ALL {
            for set in [&self.windows, &self.noise_windows] {
                let b = set.get(complex);
                if !(b.lower.is_finite() && b.upper.is_finite() && b.upper > b.lower) {
                    return Err(FitError::InvalidConfig(format!(
                        "invalid {} window [{}, {}]",
                        complex.tag(),
                        b.lower,
                        b.upper
                    )));
                }
            }
        }
        Ok(())
    }
}
