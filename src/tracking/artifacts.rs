//! Rendered run artifacts and their scratch files

use crate::error::Result;
use crate::training::metrics::ConfusionMatrix;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const FONT: &str = "font-family: Verdana, sans-serif";

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Blue ramp from white (0) to dark blue (1)
fn blue_shade(intensity: f64) -> String {
    let t = intensity.clamp(0.0, 1.0);
    let lerp = |from: f64, to: f64| (from + (to - from) * t).round() as u8;
    format!("#{:02x}{:02x}{:02x}", lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0))
}

fn svg_header(out: &mut String, width: usize, height: usize, title: &str) {
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" style="background-color: white;">"#,
        width, height
    );
    let _ = writeln!(
        out,
        r#"<text x="{}" y="28" text-anchor="middle" style="{}; font-size: 16px; font-weight: bold;">{}</text>"#,
        width / 2,
        FONT,
        escape_xml(title)
    );
}

/// Confusion matrix heat map with counts in every cell
pub fn confusion_matrix_svg(cm: &ConfusionMatrix) -> String {
    let n = cm.labels.len().max(1);
    let cell = 90usize;
    let left = 110usize;
    let top = 60usize;
    let width = left + n * cell + 40;
    let height = top + n * cell + 70;
    let max = cm.counts.iter().flatten().copied().max().unwrap_or(0).max(1) as f64;

    let mut out = String::new();
    svg_header(&mut out, width, height, "Confusion Matrix");

    for (i, row) in cm.counts.iter().enumerate() {
        for (j, &count) in row.iter().enumerate() {
            let intensity = count as f64 / max;
            let x = left + j * cell;
            let y = top + i * cell;
            let text_fill = if intensity > 0.5 { "white" } else { "black" };
            let _ = writeln!(
                out,
                r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" stroke="white"/>"#,
                x, y, cell, cell, blue_shade(intensity)
            );
            let _ = writeln!(
                out,
                r#"<text x="{}" y="{}" text-anchor="middle" dominant-baseline="middle" fill="{}" style="{}; font-size: 14px;">{}</text>"#,
                x + cell / 2,
                y + cell / 2,
                text_fill,
                FONT,
                count
            );
        }
    }

    for (k, label) in cm.labels.iter().enumerate() {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="middle" style="{}; font-size: 12px;">{}</text>"#,
            left + k * cell + cell / 2,
            top + n * cell + 20,
            FONT,
            label
        );
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="end" dominant-baseline="middle" style="{}; font-size: 12px;">{}</text>"#,
            left - 10,
            top + k * cell + cell / 2,
            FONT,
            label
        );
    }

    let _ = writeln!(
        out,
        r#"<text x="{}" y="{}" text-anchor="middle" style="{}; font-size: 12px;">Predicted label</text>"#,
        left + n * cell / 2,
        top + n * cell + 50,
        FONT
    );
    let _ = writeln!(
        out,
        r#"<text x="30" y="{}" text-anchor="middle" transform="rotate(-90 30 {})" style="{}; font-size: 12px;">True label</text>"#,
        top + n * cell / 2,
        top + n * cell / 2,
        FONT
    );
    let _ = writeln!(out, "</svg>");
    out
}

/// Horizontal bar chart of feature importances, one bar per feature
pub fn feature_importance_svg(feature_names: &[String], importances: &[f64]) -> String {
    let bar_height = 24usize;
    let gap = 8usize;
    let left = 180usize;
    let plot_width = 480.0;
    let top = 50usize;
    let n = feature_names.len().min(importances.len());
    let width = left + plot_width as usize + 80;
    let height = top + n * (bar_height + gap) + 60;
    let max = importances
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let scale = if max > 0.0 { plot_width / max } else { 0.0 };

    let mut out = String::new();
    svg_header(&mut out, width, height, "Feature Importance");

    for (i, (name, &value)) in feature_names.iter().zip(importances.iter()).enumerate() {
        let y = top + i * (bar_height + gap);
        let bar = if value.is_finite() { value.max(0.0) * scale } else { 0.0 };
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="end" dominant-baseline="middle" style="{}; font-size: 12px;">{}</text>"#,
            left - 8,
            y + bar_height / 2,
            FONT,
            escape_xml(name)
        );
        let _ = writeln!(
            out,
            r##"<rect x="{}" y="{}" width="{:.1}" height="{}" fill="#1f77b4"/>"##,
            left, y, bar, bar_height
        );
        let _ = writeln!(
            out,
            r#"<text x="{:.1}" y="{}" dominant-baseline="middle" style="{}; font-size: 11px;">{:.3}</text>"#,
            left as f64 + bar + 6.0,
            y + bar_height / 2,
            FONT,
            value
        );
    }

    let axis_y = top + n * (bar_height + gap);
    let _ = writeln!(
        out,
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="black"/>"#,
        left,
        axis_y,
        left + plot_width as usize,
        axis_y
    );
    let _ = writeln!(
        out,
        r#"<text x="{}" y="{}" text-anchor="middle" style="{}; font-size: 12px;">Importance</text>"#,
        left + plot_width as usize / 2,
        axis_y + 35,
        FONT
    );
    let _ = writeln!(out, "</svg>");
    out
}

/// Local files written for upload, removed when the value is dropped.
///
/// Directories created along the way are removed too once empty, `dir`
/// included when this value created it.
#[derive(Debug)]
pub struct ScratchFiles {
    dir: PathBuf,
    files: Vec<PathBuf>,
    owns_dir: bool,
}

impl ScratchFiles {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let owns_dir = !dir.exists();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Vec::new(),
            owns_dir,
        })
    }

    /// Write `contents` to `dir/name` and track the file for removal
    pub fn write(&mut self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.files.push(path.clone());
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.files {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "Could not remove scratch file");
                }
            }
        }

        // Deepest first; remove_dir only succeeds on empty directories
        let mut dirs: Vec<&Path> = self
            .files
            .iter()
            .flat_map(|f| f.ancestors().skip(1))
            .filter(|d| d.starts_with(&self.dir) && *d != self.dir.as_path())
            .collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        dirs.dedup();
        for dir in dirs {
            let _ = fs::remove_dir(dir);
        }
        if self.owns_dir {
            if let Err(e) = fs::remove_dir(&self.dir) {
                warn!(dir = %self.dir.display(), error = %e, "Could not remove scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confusion_matrix_svg_has_counts() {
        let cm = ConfusionMatrix::from_labels(&array![0, 0, 1, 1, 1], &array![0, 1, 1, 1, 0]);
        let svg = confusion_matrix_svg(&cm);

        assert!(svg.starts_with("<?xml"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("Confusion Matrix"));
        assert_eq!(svg.matches("<rect").count(), 4);
        assert!(svg.contains(">2</text>"));
    }

    #[test]
    fn test_feature_importance_svg_escapes_names() {
        let names = vec!["ph".to_string(), "Sulfate<mg>".to_string()];
        let svg = feature_importance_svg(&names, &[0.25, 0.75]);

        assert!(svg.contains("Sulfate&lt;mg&gt;"));
        assert!(svg.contains("0.750"));
        assert_eq!(svg.matches("<rect").count(), 2);
    }

    #[test]
    fn test_scratch_files_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut scratch = ScratchFiles::new(dir.path()).unwrap();
            let path = scratch.write("report.txt", "hello").unwrap();
            assert!(path.exists());
            path
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_directories_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = root.path().join("run-1");
        {
            let mut scratch = ScratchFiles::new(&run_dir).unwrap();
            scratch.write("random_forest/model.json", "{}").unwrap();
            scratch.write("report.txt", "hello").unwrap();
            assert!(run_dir.join("random_forest").is_dir());
        }
        assert!(!run_dir.exists());
        assert!(root.path().exists());
    }

    #[test]
    fn test_existing_directory_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.txt"), "mine").unwrap();
        {
            let mut scratch = ScratchFiles::new(dir.path()).unwrap();
            scratch.write("nested/report.txt", "hello").unwrap();
        }
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_blue_shade_endpoints() {
        assert_eq!(blue_shade(0.0), "#f7fbff");
        assert_eq!(blue_shade(1.0), "#08306b");
    }
}
