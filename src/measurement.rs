//! Domain values returned by [`InstrumentSession`](crate::session::InstrumentSession).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Wavelength meter identification, from four `GetWLMVersion` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Version {
    /// Wavelength meter type (e.g. 6 for a WS6).
    pub kind: i64,
    /// Software version number.
    pub major: i64,
    /// Revision number.
    pub minor: i64,
    /// Compile number.
    pub build: i64,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WS{} {}.{} (build {})", self.kind, self.major, self.minor, self.build)
    }
}

/// Result of translating the raw analysis range index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RangeLookup {
    /// The index maps to a known band.
    Found {
        /// Raw index from `GetRange`
        index: i64,
        /// Lower band edge in nm
        min_nm: f64,
        /// Upper band edge in nm
        max_nm: f64,
    },
    /// The driver reported an index the range table does not know.
    NotFound {
        /// Raw index from `GetRange`
        index: i64,
    },
}

impl RangeLookup {
    /// The raw index, mapped or not.
    pub fn index(&self) -> i64 {
        match self {
            Self::Found { index, .. } | Self::NotFound { index } => *index,
        }
    }

    /// Whether the index maps to a known band.
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    /// `(min_nm, max_nm)` when the index is mapped.
    pub fn band(&self) -> Option<(f64, f64)> {
        match self {
            Self::Found { min_nm, max_nm, .. } => Some((*min_nm, *max_nm)),
            Self::NotFound { .. } => None,
        }
    }
}

impl fmt::Display for RangeLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { index, min_nm, max_nm } => {
                write!(f, "range {index}: {min_nm}-{max_nm} nm")
            }
            Self::NotFound { index } => write!(f, "range not found: {index}"),
        }
    }
}

/// Interferometer amplitude statistics for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Amplitude {
    /// Lowest amplitude in the last measurement
    pub min: i64,
    /// Highest amplitude in the last measurement
    pub max: i64,
    /// Mean amplitude
    pub avg: i64,
}

/// Amplitudes keyed by 1-based channel number.
pub type Amplitudes = BTreeMap<u32, Amplitude>;

/// Linewidth analysis results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Linewidth {
    /// Vacuum wavelength in nm.
    pub vacuum_wavelength_nm: f64,
    /// Air wavelength in nm.
    pub air_wavelength_nm: f64,
    /// Frequency in THz.
    pub frequency_thz: f64,
    /// Wavenumber in 1/cm.
    pub wavenumber: f64,
    /// Photon energy in eV.
    pub photon_energy_ev: f64,
}

/// One sample of the analysed spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectrumPoint {
    /// Wavelength axis value in nm
    pub wavelength_nm: f64,
    /// Intensity axis value, widened from the driver's item type
    pub intensity: f64,
}

/// Spectrum from the signal analysis channel, ordered by sample index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Spectrum {
    /// Samples paired across both axes
    pub points: Vec<SpectrumPoint>,
}

impl Spectrum {
    /// Pair two axes index-for-index. Extra samples on the longer axis are dropped.
    pub fn from_axes(wavelengths: &[f64], intensities: &[f64]) -> Self {
        let points = wavelengths
            .iter()
            .zip(intensities)
            .map(|(&wavelength_nm, &intensity)| SpectrumPoint {
                wavelength_nm,
                intensity,
            })
            .collect();
        Self { points }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the analysis returned no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The sample with the highest intensity.
    pub fn peak(&self) -> Option<SpectrumPoint> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }

    /// Write the spectrum as a `wavelength_nm,intensity` table.
    #[cfg(feature = "storage_csv")]
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> crate::error::WlmResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for point in &self.points {
            csv.serialize(point)?;
        }
        csv.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_from_axes_truncates() {
        let spectrum = Spectrum::from_axes(&[500.0, 501.0, 502.0], &[0.1, 0.9]);
        assert_eq!(spectrum.len(), 2);
        assert_eq!(spectrum.points[1].wavelength_nm, 501.0);
        assert_eq!(spectrum.peak().map(|p| p.intensity), Some(0.9));
    }

    #[test]
    fn test_range_lookup_accessors() {
        let found = RangeLookup::Found { index: 2, min_nm: 320.0, max_nm: 420.0 };
        assert_eq!(found.index(), 2);
        assert_eq!(found.band(), Some((320.0, 420.0)));
        let missing = RangeLookup::NotFound { index: 9 };
        assert_eq!(missing.band(), None);
        assert_eq!(missing.to_string(), "range not found: 9");
    }

    #[test]
    fn test_version_display() {
        let version = Version { kind: 6, major: 3194, minor: 0, build: 42 };
        assert_eq!(version.to_string(), "WS6 3194.0 (build 42)");
    }

    #[cfg(feature = "storage_csv")]
    #[test]
    fn test_write_csv() {
        let spectrum = Spectrum::from_axes(&[500.0, 501.5], &[0.25, 1.0]);
        let mut out = Vec::new();
        spectrum.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("wavelength_nm,intensity"));
        assert_eq!(lines.next(), Some("500.0,0.25"));
        assert_eq!(lines.next(), Some("501.5,1.0"));
    }
}
