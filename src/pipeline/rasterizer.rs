//! Page rasterization: document pages to PNG files, in page order.
//!
//! PDFs are rendered with pdfium. PPT/PPTX decks are first converted to PDF
//! with a headless office converter, then rendered the same way.
//!
//! pdfium is not async aware, so rendering runs inside `spawn_blocking`.

use super::error::PipelineError;
use crate::types::{DocumentFormat, SlideImage};
use crate::utils::execute_tool_command;
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Write one image per page of `document` into `output_dir` and return
    /// their paths in page order.
    async fn rasterize(&self, document: &Path, output_dir: &Path)
        -> Result<Vec<PathBuf>, PipelineError>;
}

/// Format check shared by every rasterizer. Runs before any tool is started.
pub fn detect_format(document: &Path) -> Result<DocumentFormat, PipelineError> {
    let file_name = document
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    DocumentFormat::from_file_name(file_name).ok_or_else(|| PipelineError::UnsupportedFormat {
        file_name: file_name.to_string(),
    })
}

/// Turn rasterizer output into index-tagged slides.
pub fn into_slides(paths: Vec<PathBuf>) -> Vec<SlideImage> {
    paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| SlideImage { index, path })
        .collect()
}

pub fn page_file_name(index: usize) -> String {
    format!("page-{:03}.png", index + 1)
}

/// Directory, under a run's output directory, holding that run's private
/// office converter profile. Converters sharing a profile refuse to run
/// concurrently.
pub const OFFICE_PROFILE_DIR: &str = ".office-profile";

/// Command line for a headless PDF conversion using the profile at `profile_dir`
/// (which must be absolute).
pub fn office_conversion_args(
    document: &Path,
    output_dir: &Path,
    profile_dir: &Path,
) -> Result<Vec<OsString>, String> {
    let profile_url = reqwest::Url::from_directory_path(profile_dir)
        .map_err(|_| format!("profile directory {} is not absolute", profile_dir.display()))?;

    Ok(vec![
        format!("-env:UserInstallation={}", profile_url).into(),
        "--headless".into(),
        "--convert-to".into(),
        "pdf".into(),
        "--outdir".into(),
        output_dir.as_os_str().to_os_string(),
        document.as_os_str().to_os_string(),
    ])
}

#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
    render_width: u32,
    soffice_bin: String,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>, render_width: u32, soffice_bin: String) -> Self {
        Self {
            library_dir,
            render_width: render_width.max(16),
            soffice_bin,
        }
    }

    async fn convert_to_pdf(&self, document: &Path, output_dir: &Path) -> Result<PathBuf, PipelineError> {
        let failed = |detail: String| PipelineError::RasterizationFailed {
            path: document.to_path_buf(),
            detail,
        };
        let run_dir = tokio::fs::canonicalize(output_dir)
            .await
            .map_err(|e| failed(format!("output directory unavailable: {}", e)))?;
        let args = office_conversion_args(document, output_dir, &run_dir.join(OFFICE_PROFILE_DIR)).map_err(failed)?;

        let mut command = Command::new(&self.soffice_bin);
        command.args(args);

        execute_tool_command("soffice", command).await.map_err(failed)?;

        let stem = document
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let pdf_path = output_dir.join(format!("{}.pdf", stem));

        if !pdf_path.exists() {
            return Err(failed("office converter produced no PDF".to_string()));
        }

        info!("Converted {} to PDF", document.display());
        Ok(pdf_path)
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        document: &Path,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let format = detect_format(document)?;

        let pdf_path = if format.needs_pdf_conversion() {
            self.convert_to_pdf(document, output_dir).await?
        } else {
            document.to_path_buf()
        };

        let library_dir = self.library_dir.clone();
        let width = self.render_width;
        let out = output_dir.to_path_buf();
        let source = pdf_path.clone();

        tokio::task::spawn_blocking(move || {
            render_pages_blocking(library_dir.as_deref(), &source, &out, width)
        })
        .await
        .map_err(|e| PipelineError::RasterizationFailed {
            path: pdf_path,
            detail: format!("render task panicked: {}", e),
        })?
    }
}

fn render_pages_blocking(
    library_dir: Option<&Path>,
    pdf_path: &Path,
    output_dir: &Path,
    width: u32,
) -> Result<Vec<PathBuf>, PipelineError> {
    let failed = |detail: String| PipelineError::RasterizationFailed {
        path: pdf_path.to_path_buf(),
        detail,
    };

    let bindings = match library_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| failed(format!("pdfium library unavailable: {:?}", e)))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| failed(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(width as i32);

    let mut paths = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("page {}: {:?}", index + 1, e)))?;

        let image = bitmap.as_image();
        let path = output_dir.join(page_file_name(index));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| failed(format!("page {}: {}", index + 1, e)))?;

        debug!("Rendered page {} → {}x{} px", index + 1, image.width(), image.height());
        paths.push(path);
    }

    if paths.is_empty() {
        return Err(failed("document has no pages".to_string()));
    }

    info!("Rasterized {} pages from {}", paths.len(), pdf_path.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_rejects_unknown_extension() {
        assert_eq!(detect_format(Path::new("/tmp/deck.pdf")).unwrap(), DocumentFormat::Pdf);
        assert_eq!(detect_format(Path::new("/tmp/deck.PPTX")).unwrap(), DocumentFormat::Pptx);

        let err = detect_format(Path::new("/tmp/deck.key")).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { ref file_name } if file_name == "deck.key"));
    }

    #[test]
    fn test_page_names_sort_in_page_order() {
        let mut names: Vec<String> = (0..12).map(page_file_name).collect();
        let expected = names.clone();
        names.sort();
        assert_eq!(names, expected);
        assert_eq!(page_file_name(0), "page-001.png");
    }

    #[test]
    fn test_each_conversion_uses_its_own_profile() {
        let first = office_conversion_args(
            Path::new("/work/a/source/deck.pptx"),
            Path::new("/work/a/images"),
            Path::new("/work/a/images/.office-profile"),
        )
        .unwrap();
        let second = office_conversion_args(
            Path::new("/work/b/source/deck.pptx"),
            Path::new("/work/b/images"),
            Path::new("/work/b/images/.office-profile"),
        )
        .unwrap();

        assert_eq!(first[0], OsString::from("-env:UserInstallation=file:///work/a/images/.office-profile/"));
        assert_ne!(first[0], second[0]);
        assert_eq!(first[1..5], ["--headless", "--convert-to", "pdf", "--outdir"].map(OsString::from));
        assert_eq!(first.last().unwrap(), &OsString::from("/work/a/source/deck.pptx"));

        assert!(office_conversion_args(Path::new("d.ppt"), Path::new("out"), Path::new("relative")).is_err());
    }

    #[test]
    fn test_into_slides_tags_indices() {
        let slides = into_slides(vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
        assert_eq!(slides[0].index, 0);
        assert_eq!(slides[1].index, 1);
        assert_eq!(slides[1].path, PathBuf::from("b.png"));
    }

    #[tokio::test]
    async fn test_unsupported_format_fails_before_any_tool_runs() {
        let rasterizer = PdfiumRasterizer::new(None, 1280, "definitely-not-soffice".to_string());
        let out = tempfile::tempdir().unwrap();
        let err = rasterizer
            .rasterize(Path::new("notes.txt"), out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }
}
