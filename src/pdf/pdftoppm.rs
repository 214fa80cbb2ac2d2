//! Subprocess rasterization through poppler's `pdftoppm`

use crate::error::{Error, Result, PDFTOPPM_INSTALL_HINT};
use crate::pdf::raster::{Artifact, ConversionOutcome, ConversionRequest, Rasterizer};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Secondary backend: shells out to `pdftoppm -png -r <dpi>`.
///
/// The tool picks its own page numbering and zero padding, so results are
/// discovered afterwards by globbing `{stem}*.png` and sorted as strings.
/// Past the tool's padding width that order can differ from page order.
/// The prefix match also picks up other documents' images sharing the stem,
/// e.g. `paper-v2-1.png` when converting `paper.pdf` in the same directory.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    /// Arguments placed before the rasterizer flags (wrappers such as `sh -c`)
    launcher_args: Vec<String>,
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm", Vec::new())
    }
}

impl PdftoppmRasterizer {
    pub fn new(program: impl Into<PathBuf>, launcher_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            launcher_args,
        }
    }

    fn command(&self, request: &ConversionRequest, output_base: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.launcher_args)
            .arg("-png")
            .arg("-r")
            .arg(request.dpi.to_string())
            .arg(&request.document)
            .arg(output_base)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }
}

/// Map a finished `pdftoppm` run to an error, if it failed.
///
/// Exit code 1 is treated as "tool missing" even though pdftoppm also uses it
/// for unreadable documents; callers rely on that mapping.
fn classify_exit(code: Option<i32>, stderr: &str) -> Option<Error> {
    if code == Some(0) {
        return None;
    }
    if code == Some(1) || stderr.to_lowercase().contains("not found") {
        return Some(Error::BackendMissing {
            guidance: PDFTOPPM_INSTALL_HINT.to_string(),
        });
    }
    let stderr = stderr.trim();
    Some(Error::BackendExecution {
        stderr: match code {
            Some(code) if stderr.is_empty() => format!("exit code {}", code),
            Some(_) => stderr.to_string(),
            None if stderr.is_empty() => "terminated by signal".to_string(),
            None => format!("terminated by signal: {}", stderr),
        },
    })
}

/// Find `{stem}*.png` in `dir`, sorted lexicographically
fn discover_outputs(dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}*.png",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(stem)
    );

    let entries = glob::glob(&pattern).map_err(|e| Error::InvalidArgument {
        reason: format!("Invalid output pattern {}: {}", pattern, e),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    async fn rasterize(&self, request: &ConversionRequest) -> ConversionOutcome {
        let stem = request.stem();
        let output_base = request.output_dir.join(&stem);

        tracing::debug!(
            program = %self.program.display(),
            document = %request.document.display(),
            dpi = request.dpi,
            "running pdftoppm"
        );

        let output = match self.command(request, &output_base).output().await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::BackendMissing {
                    guidance: PDFTOPPM_INSTALL_HINT.to_string(),
                });
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(err) = classify_exit(output.status.code(), &stderr) {
            return Err(err);
        }

        let files = discover_outputs(&request.output_dir, &stem)?;
        if files.is_empty() {
            return Err(Error::NoOutputProduced {
                dir: request.output_dir.clone(),
            });
        }

        let artifacts = files
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                tracing::info!(artifact = %path.display(), "generated");
                Artifact {
                    parent_stem: stem.clone(),
                    page_index: index as u32 + 1,
                    path,
                }
            })
            .collect();

        Ok(artifacts)
    }
}
