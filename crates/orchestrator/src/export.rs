//! Result exporters: diagnostics CSV and flow-extent PNG.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{ImageBuffer, Luma};
use tailings_kernel::DiagnosticSample;
use thiserror::Error;

/// Header row of the diagnostics CSV.
pub const DIAGNOSTICS_HEADER: &str = "simTime,meanSpeed,maxDistanceTraveled";

/// Prefix of exported flow images.
pub const FLOW_FILE_PREFIX: &str = "FlowMarkerData_";

/// Errors writing export files.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Creating or writing a file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// PNG encoding failed.
    #[error("failed to encode flow image: {0}")]
    Image(#[from] image::ImageError),
    /// Flow grid length is not a square.
    #[error("flow field of {0} cells is not square")]
    NotSquare(usize),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io { path: path.to_path_buf(), source }
}

/// Seconds since the Unix epoch, used to stamp export file names.
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Streaming writer for diagnostics samples.
pub struct DiagnosticsCsv<W: Write> {
    out: W,
}

impl DiagnosticsCsv<BufWriter<fs::File>> {
    /// Create (truncating) a CSV file and write the header row.
    pub fn create(path: &Path) -> Result<Self, ExportError> {
        let file = fs::File::create(path).map_err(io_error(path))?;
        Self::new(BufWriter::new(file)).map_err(io_error(path))
    }
}

impl<W: Write> DiagnosticsCsv<W> {
    /// Wrap a writer and emit the header row.
    pub fn new(mut out: W) -> std::io::Result<Self> {
        writeln!(out, "{DIAGNOSTICS_HEADER}")?;
        Ok(Self { out })
    }

    /// Append one sample.
    pub fn write_sample(&mut self, sample: &DiagnosticSample) -> std::io::Result<()> {
        writeln!(
            self.out,
            "{},{},{}",
            sample.sim_time, sample.mean_speed, sample.max_distance_travelled
        )
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Encode a flow snapshot as 16-bit grayscale.
///
/// Unvisited cells are black (0). Visited heights are normalized between
/// `min_elevation` and `max_elevation` into `1..=u16::MAX`, so a cell
/// reached at the lowest elevation still reads as visited. Row `y` of the
/// image is flow row `y` (z).
pub fn flow_image(
    snapshot: &[Option<f32>],
    min_elevation: f32,
    max_elevation: f32,
) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>, ExportError> {
    let res = (snapshot.len() as f64).sqrt() as usize;
    if res * res != snapshot.len() || res == 0 {
        return Err(ExportError::NotSquare(snapshot.len()));
    }
    let range = max_elevation - min_elevation;
    let pixels: Vec<u16> = snapshot
        .iter()
        .map(|cell| match cell {
            None => 0,
            Some(_) if range <= 0.0 => u16::MAX,
            Some(h) => {
                let t = ((h - min_elevation) / range).clamp(0.0, 1.0);
                1 + (t * f32::from(u16::MAX - 1)).round() as u16
            }
        })
        .collect();
    ImageBuffer::from_raw(res as u32, res as u32, pixels).ok_or(ExportError::NotSquare(snapshot.len()))
}

/// Write `FlowMarkerData_<stamp>.png` into `dir` and return its path.
pub fn write_flow_png(
    dir: &Path,
    stamp: u64,
    snapshot: &[Option<f32>],
    min_elevation: f32,
    max_elevation: f32,
) -> Result<PathBuf, ExportError> {
    let img = flow_image(snapshot, min_elevation, max_elevation)?;
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!("{FLOW_FILE_PREFIX}{stamp}.png"));
    img.save(&path)?;
    tracing::info!("Flow field written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, speed: f32, dist: f32) -> DiagnosticSample {
        DiagnosticSample { sim_time: t, mean_speed: speed, max_distance_travelled: dist }
    }

    #[test]
    fn test_csv_rows() {
        let mut csv = DiagnosticsCsv::new(Vec::new()).unwrap();
        csv.write_sample(&sample(0.5, 1.25, 3.0)).unwrap();
        csv.write_sample(&sample(1.0, 0.5, 4.5)).unwrap();
        let text = String::from_utf8(csv.finish().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![DIAGNOSTICS_HEADER, "0.5,1.25,3", "1,0.5,4.5"]);
    }

    #[test]
    fn test_flow_image_normalization() {
        let snap = vec![None, Some(0.0), Some(50.0), Some(200.0)];
        let img = flow_image(&snap, 0.0, 100.0).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert_eq!(img.get_pixel(1, 0).0[0], 1);
        assert_eq!(img.get_pixel(0, 1).0[0], 32768);
        assert_eq!(img.get_pixel(1, 1).0[0], u16::MAX);
    }

    #[test]
    fn test_visited_cell_at_min_elevation_is_not_black() {
        // Below-range heights clamp to the lowest visited value
        let snap = vec![None, Some(-20.0), Some(-20.0), Some(-25.0)];
        let img = flow_image(&snap, -20.0, 100.0).unwrap();
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        for (x, y) in [(1, 0), (0, 1), (1, 1)] {
            assert_eq!(img.get_pixel(x, y).0[0], 1, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn test_flow_image_rejects_non_square() {
        assert!(matches!(flow_image(&[None; 3], 0.0, 1.0), Err(ExportError::NotSquare(3))));
        assert!(matches!(flow_image(&[], 0.0, 1.0), Err(ExportError::NotSquare(0))));
    }

    #[test]
    fn test_write_files() {
        let dir = std::env::temp_dir().join(format!("tailings_export_{}", std::process::id()));
        let png = write_flow_png(&dir, 42, &[Some(1.0); 4], 0.0, 2.0).unwrap();
        assert!(png.ends_with("FlowMarkerData_42.png"));
        let decoded = image::open(&png).unwrap().to_luma16();
        assert_eq!(decoded.get_pixel(1, 1).0[0], 32768);

        let csv_path = dir.join("diagnostics.csv");
        let mut csv = DiagnosticsCsv::create(&csv_path).unwrap();
        csv.write_sample(&sample(0.1, 2.0, 0.0)).unwrap();
        csv.finish().unwrap();
        let text = fs::read_to_string(&csv_path).unwrap();
        assert!(text.starts_with(DIAGNOSTICS_HEADER));
        assert_eq!(text.lines().count(), 2);
        fs::remove_dir_all(&dir).ok();
    }
}
