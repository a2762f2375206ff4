//! Rendering generated scripts
//!
//! `Renderer` is the seam between the repair loop and Manim. The production
//! implementation runs the script in a Python subprocess so a crashing or
//! hanging scene can never take the agent down with it.

use crate::prompt::ENTRY_POINT;
use manimcraft_error::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Quality presets accepted by Manim's `tempconfig`
pub const QUALITIES: &[&str] = &[
    "low_quality",
    "medium_quality",
    "high_quality",
    "production_quality",
    "fourk_quality",
    "example_quality",
];

const MOVIE_MARKER: &str = "MANIMCRAFT_MOVIE=";

/// Exit status of the harness when the script binds no entry point
const ENTRY_POINT_EXIT: i32 = 3;

/// Loads the script under a non-`__main__` name, renders the scene and reports
/// where the movie went. Arguments: script, scene, quality, media dir, marker.
///
/// Any module-level binding of the scene name counts as the entry point, so
/// aliases and imports are accepted.
const HARNESS: &str = r#"
import runpy
import sys

script, scene_name, quality, media_dir, marker = sys.argv[1:6]
namespace = runpy.run_path(script, run_name="__manimcraft__")
scene_cls = namespace.get(scene_name)
if scene_cls is None:
    sys.stderr.write(f"The provided code did not define a class '{scene_name}'.\n")
    sys.exit(3)

from manim import tempconfig

with tempconfig({"quality": quality, "media_dir": media_dir}):
    scene = scene_cls()
    scene.render()
    print(marker + str(scene.renderer.file_writer.movie_file_path), flush=True)
"#;

/// A successfully rendered video, still in the renderer's media directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVideo {
    pub path: PathBuf,
}

/// Executes a generated script.
///
/// Failures the model can fix come back as `RenderFailed`,
/// `EntryPointMissing` or `Timeout` carrying the diagnostic text; anything
/// else (interpreter missing, unreadable file) ends the job.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    async fn render(&self, script: &Path) -> Result<RenderedVideo>;
}

/// Renders with a local Python interpreter that has Manim installed
#[derive(Debug, Clone)]
pub struct PythonRenderer {
    python: String,
    scene: String,
    quality: String,
    timeout: Duration,
    media_dir: PathBuf,
}

impl PythonRenderer {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            python: "python3".into(),
            scene: ENTRY_POINT.into(),
            quality: "low_quality".into(),
            timeout: Duration::from_secs(1200),
            media_dir: media_dir.into(),
        }
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = scene.into();
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, script: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg("-c")
            .arg(HARNESS)
            .arg(script)
            .arg(&self.scene)
            .arg(&self.quality)
            .arg(&self.media_dir)
            .arg(MOVIE_MARKER)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Renderer for PythonRenderer {
    async fn render(&self, script: &Path) -> Result<RenderedVideo> {
        if !script.is_file() {
            return Err(Error::file_not_found(script.display().to_string())
                .with_operation("PythonRenderer::render"));
        }

        tokio::fs::create_dir_all(&self.media_dir).await?;
        info!(script = %script.display(), scene = %self.scene, quality = %self.quality, "rendering");

        let child = self.command(script).spawn().map_err(|e| {
            Error::new(ErrorKind::IoFailed, format!("failed to start '{}': {}", self.python, e))
                .with_operation("PythonRenderer::render")
                .set_source(e)
        })?;

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(Error::timeout("rendering", self.timeout.as_secs())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(status = ?output.status.code(), stdout = stdout.len(), stderr = stderr.len(), "renderer exited");

        if !output.status.success() {
            let missing = Error::entry_point_missing(&self.scene);
            if output.status.code() == Some(ENTRY_POINT_EXIT) && stderr.trim() == missing.message() {
                return Err(missing);
            }
            return Err(Error::render_failed(diagnostic(&stdout, &stderr))
                .with_context("exit_code", format!("{:?}", output.status.code())));
        }

        let path = movie_path(&stdout).ok_or_else(|| {
            Error::render_failed(format!(
                "Rendering finished but no movie file was reported.\n{}",
                diagnostic(&stdout, &stderr)
            ))
        })?;
        let path = if path.is_relative() { self.media_dir.join(path) } else { path };
        if !path.is_file() {
            return Err(Error::render_failed(format!(
                "Rendering reported {} but the file does not exist.",
                path.display()
            )));
        }

        Ok(RenderedVideo { path })
    }
}

/// stderr, or stdout when stderr is empty
fn diagnostic(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

fn movie_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(MOVIE_MARKER))
        .filter(|p| !p.is_empty() && p != &"None")
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_diagnostic_prefers_stderr() {
        assert_eq!(diagnostic("progress", "Traceback: boom\n"), "Traceback: boom");
        assert_eq!(diagnostic("  only stdout \n", "  "), "only stdout");
    }

    #[test]
    fn test_movie_path_marker() {
        let stdout = "Animation 0\nMANIMCRAFT_MOVIE=/tmp/media/FullTutorial.mp4\n";
        assert_eq!(movie_path(stdout), Some(PathBuf::from("/tmp/media/FullTutorial.mp4")));
        assert_eq!(movie_path("MANIMCRAFT_MOVIE=None\n"), None);
        assert_eq!(movie_path("no marker"), None);
    }

    #[tokio::test]
    async fn test_missing_script_is_not_repairable() {
        let dir = TempDir::new().unwrap();
        let renderer = PythonRenderer::new(dir.path().join("media"));
        let err = renderer.render(&dir.path().join("outputs.py")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(!err.kind().is_repairable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_entry_point_reported_by_harness() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "from manim import *\nclass Intro(Scene):\n    pass\n").unwrap();

        let fake = dir.path().join("fake-python");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho \"The provided code did not define a class '$4'.\" >&2\nexit 3\n",
        )
        .unwrap();
        make_executable(&fake);

        let renderer = PythonRenderer::new(dir.path().join("media")).with_python(fake.display().to_string());
        let err = renderer.render(&script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntryPointMissing);
        assert_eq!(err.message(), "The provided code did not define a class 'FullTutorial'.");
        assert!(err.kind().is_repairable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_code_alone_is_a_render_failure() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "import sys\nsys.exit(3)\n").unwrap();

        let fake = dir.path().join("fake-python");
        std::fs::write(&fake, "#!/bin/sh\necho 'SystemExit: 3' >&2\nexit 3\n").unwrap();
        make_executable(&fake);

        let renderer = PythonRenderer::new(dir.path().join("media")).with_python(fake.display().to_string());
        let err = renderer.render(&script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
        assert_eq!(err.message(), "SystemExit: 3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aliased_entry_point_renders() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(
            &script,
            "from manim import *\n\nclass Intro(Scene):\n    pass\n\nFullTutorial = Intro\n",
        )
        .unwrap();

        let fake = dir.path().join("fake-python");
        std::fs::write(
            &fake,
            "#!/bin/sh\nmkdir -p \"$6\"\ntouch \"$6/FullTutorial.mp4\"\necho \"$7$6/FullTutorial.mp4\"\n",
        )
        .unwrap();
        make_executable(&fake);

        let media = dir.path().join("media");
        let renderer = PythonRenderer::new(&media).with_python(fake.display().to_string());
        let video = renderer.render(&script).await.unwrap();
        assert_eq!(video.path, media.join("FullTutorial.mp4"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_not_repairable() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "class FullTutorial(Scene):\n    pass\n").unwrap();

        let renderer = PythonRenderer::new(dir.path().join("media")).with_python("/nonexistent/python");
        let err = renderer.render(&script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailed);
        assert!(!err.kind().is_repairable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_script_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "class FullTutorial:\n    pass\n").unwrap();

        // Stand-in interpreter; the harness arguments are positional $1..$7.
        let fake = dir.path().join("fake-python");
        std::fs::write(&fake, "#!/bin/sh\necho 'NameError: name Circl is not defined' >&2\nexit 1\n").unwrap();
        make_executable(&fake);

        let renderer = PythonRenderer::new(dir.path().join("media")).with_python(fake.display().to_string());
        let err = renderer.render(&script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
        assert_eq!(err.message(), "NameError: name Circl is not defined");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_script_times_out() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "class FullTutorial:\n    pass\n").unwrap();

        let fake = dir.path().join("fake-python");
        std::fs::write(&fake, "#!/bin/sh\nsleep 30\n").unwrap();
        make_executable(&fake);

        let renderer = PythonRenderer::new(dir.path().join("media"))
            .with_python(fake.display().to_string())
            .with_timeout(Duration::from_millis(200));
        let err = renderer.render(&script).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_render_reports_movie() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("outputs.py");
        std::fs::write(&script, "class FullTutorial:\n    pass\n").unwrap();

        let fake = dir.path().join("fake-python");
        std::fs::write(
            &fake,
            "#!/bin/sh\nmkdir -p \"$6\"\ntouch \"$6/FullTutorial.mp4\"\necho \"$7$6/FullTutorial.mp4\"\n",
        )
        .unwrap();
        make_executable(&fake);

        let media = dir.path().join("media");
        let renderer = PythonRenderer::new(&media).with_python(fake.display().to_string());
        let video = renderer.render(&script).await.unwrap();
        assert_eq!(video.path, media.join("FullTutorial.mp4"));
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
