//! Capture of rendered files
//!
//! While active, the interceptor replaces the render hook with a wrapper
//! that lets the previous renderer write into a private temporary
//! directory, reads the result back and keeps it under the file's path
//! relative to the working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::CodegenError;
use crate::templates::{self, RenderFn, RenderOptions};
use crate::FileMap;

#[derive(Default)]
struct Hooks {
    active: bool,
    /// Hook installed before `start`, restored by `stop`
    saved: Option<RenderFn>,
}

#[derive(Default)]
pub struct OutputInterceptor {
    files: Arc<Mutex<FileMap>>,
    hooks: Mutex<Hooks>,
}

impl OutputInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the capturing hook; no-op when already active
    pub fn start(&self) {
        let mut hooks = self.hooks.lock();
        if hooks.active {
            return;
        }

        let original = templates::current_hook();
        let files = self.files.clone();
        let capture: RenderFn = Arc::new(move |opts: &RenderOptions| {
            let content = render_captured(&original, opts)?;
            let key = relative_path(&opts.filename);
            debug!(bytes = content.len(), "captured {}", key);
            files.lock().insert(key, content);
            Ok(())
        });

        hooks.saved = templates::set_hook(Some(capture));
        hooks.active = true;
    }

    /// Restore the hook saved by `start`; no-op when inactive
    pub fn stop(&self) {
        let mut hooks = self.hooks.lock();
        if !hooks.active {
            return;
        }
        templates::set_hook(hooks.saved.take());
        hooks.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.hooks.lock().active
    }

    /// Copy of everything captured so far
    pub fn files(&self) -> FileMap {
        self.files.lock().clone()
    }

    pub fn clear(&self) {
        self.files.lock().clear();
    }
}

impl Drop for OutputInterceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_captured(original: &RenderFn, opts: &RenderOptions) -> Result<Vec<u8>, CodegenError> {
    let dir = tempfile::Builder::new().prefix("gqlforge-").tempdir()?;
    let name = opts
        .filename
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output.go"));
    let target = dir.path().join(name);

    let mut redirected = opts.clone();
    redirected.filename = target.clone();
    original(&redirected)?;

    let content = fs::read(&target)?;
    fs::remove_file(&target)?;
    Ok(content)
}

/// Path relative to the working directory when it lies beneath it
pub fn relative_path(path: &Path) -> String {
    let relative = if path.is_absolute() {
        std::env::current_dir()
            .ok()
            .and_then(|wd| path.strip_prefix(&wd).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    if relative.is_absolute() {
        return relative.to_string_lossy().into_owned();
    }
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
