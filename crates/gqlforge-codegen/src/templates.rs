//! The single render entry point for generated files
//!
//! Every generator hands a finished file body to [`render`]. By default it
//! is written to disk; [`set_hook`] swaps the behaviour process-wide, which
//! is how output capture works.

use std::fmt::Write;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use gqlforge_core::ImportAliasManager;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::CodegenError;

pub const GENERATED_HEADER: &str = "// Code generated by github.com/99designs/gqlgen, DO NOT EDIT.";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub filename: PathBuf,
    pub package_name: String,
    /// Imports collected while the body was built
    pub imports: ImportAliasManager,
    pub body: String,
    /// Emit the "DO NOT EDIT" marker; user-owned files such as resolvers omit it
    pub generated_header: bool,
}

pub type RenderFn = Arc<dyn Fn(&RenderOptions) -> Result<(), CodegenError> + Send + Sync>;

static RENDER_HOOK: RwLock<Option<RenderFn>> = parking_lot::const_rwlock(None);

/// Render a file through the installed hook
pub fn render(opts: &RenderOptions) -> Result<(), CodegenError> {
    let hook = RENDER_HOOK.read().clone();
    match hook {
        Some(hook) => hook(opts),
        None => default_render(opts),
    }
}

/// Install a hook, or restore the default with `None`; returns the previous one
pub fn set_hook(hook: Option<RenderFn>) -> Option<RenderFn> {
    std::mem::replace(&mut *RENDER_HOOK.write(), hook)
}

/// The renderer currently in effect
pub fn current_hook() -> RenderFn {
    RENDER_HOOK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(default_render) as RenderFn)
}

/// Write the file to disk, creating parent directories
pub fn default_render(opts: &RenderOptions) -> Result<(), CodegenError> {
    let content = render_to_string(opts)?;
    if let Some(parent) = opts.filename.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&opts.filename, content)?;
    debug!("wrote {}", opts.filename.display());
    Ok(())
}

/// Assemble header, package clause, import block and body
pub fn render_to_string(opts: &RenderOptions) -> Result<String, CodegenError> {
    if opts.package_name.is_empty() {
        return Err(CodegenError::Render {
            filename: opts.filename.display().to_string(),
            message: "missing package name".to_string(),
        });
    }

    let mut output = String::new();
    if opts.generated_header {
        writeln!(output, "{}", GENERATED_HEADER)?;
        writeln!(output)?;
    }
    writeln!(output, "package {}", opts.package_name)?;
    writeln!(output)?;

    if !opts.imports.is_empty() {
        writeln!(output, "import (")?;
        write!(output, "{}", opts.imports)?;
        writeln!(output, ")")?;
        writeln!(output)?;
    }

    output.push_str(opts.body.trim_start_matches('\n'));
    if !output.ends_with('\n') {
        output.push('\n');
    }
    Ok(output)
}

/// Quote text as a Go raw string literal
pub fn raw_string(text: &str) -> String {
    format!("`{}`", text.replace('`', "` + \"`\" + `"))
}

/// Prefix each line of a description with `// `
pub fn go_comment(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                format!("{}//\n", indent)
            } else {
                format!("{}// {}\n", indent, line.trim_end())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    fn options(filename: PathBuf) -> RenderOptions {
        let imports = ImportAliasManager::new();
        imports.reserve("context", None);
        RenderOptions {
            filename,
            package_name: "generated".to_string(),
            imports,
            body: "\ntype Resolver struct{}\n".to_string(),
            generated_header: true,
        }
    }

    #[test]
    fn test_render_to_string_layout() {
        let out = render_to_string(&options(PathBuf::from("generated.go"))).unwrap();
        assert_eq!(
            out,
            format!(
                "{}\n\npackage generated\n\nimport (\n\t\"context\"\n)\n\ntype Resolver struct{{}}\n",
                GENERATED_HEADER
            )
        );
    }

    #[test]
    fn test_missing_package_name() {
        let mut opts = options(PathBuf::from("x.go"));
        opts.package_name.clear();
        assert!(matches!(render_to_string(&opts), Err(CodegenError::Render { .. })));
    }

    #[test]
    #[serial]
    fn test_default_render_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("generated").join("generated.go");
        render(&options(target.clone())).unwrap();
        let written = std::fs::read_to_string(&target).unwrap();
        assert!(written.contains("package generated"));
    }

    #[test]
    #[serial]
    fn test_set_hook_returns_previous() {
        let hook: RenderFn = Arc::new(|_opts: &RenderOptions| Ok(()));
        assert!(set_hook(Some(hook.clone())).is_none());
        assert!(Arc::ptr_eq(&current_hook(), &hook));
        let previous = set_hook(None).unwrap();
        assert!(Arc::ptr_eq(&previous, &hook));
    }

    #[test]
    fn test_raw_string_escapes_backquotes() {
        assert_eq!(raw_string("a `b`"), "`a ` + \"`\" + `b` + \"`\" + ``");
    }

    #[test]
    fn test_go_comment() {
        assert_eq!(go_comment("A user\n\nof the API", "\t"), "\t// A user\n\t//\n\t// of the API\n");
    }
}
