//! Places rendered units and the report under the output directory.

use std::{
    collections::HashSet,
    io,
    path::{Component, Path, PathBuf},
};

use crate::{diagnostics::Report, error::OutputWriteError, generator::RenderedUnit};

pub const REPORT_FILE: &str = "apigen-report.json";

pub struct Writer {
    root: PathBuf,
}

impl Writer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a unit path under the output directory, refusing anything that could land
    /// outside of it
    fn destination(&self, relative: &str) -> Result<PathBuf, OutputWriteError> {
        let path = Path::new(relative);
        let contained = !relative.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if contained {
            Ok(self.root.join(path))
        } else {
            Err(OutputWriteError {
                path: path.to_path_buf(),
                written: vec![],
                source: io::Error::new(io::ErrorKind::InvalidInput, "path escapes the output directory"),
            })
        }
    }

    /// Writes every unit and then the report. All destinations are checked before the first
    /// write. Returns the paths whose content changed.
    pub fn write(&self, units: &[RenderedUnit], report: &Report) -> Result<Vec<PathBuf>, OutputWriteError> {
        let mut seen = HashSet::new();
        let mut files = Vec::with_capacity(units.len() + 1);
        for unit in units {
            let destination = self.destination(&unit.path)?;
            if !seen.insert(destination.clone()) {
                return Err(OutputWriteError {
                    path: destination,
                    written: vec![],
                    source: io::Error::new(io::ErrorKind::AlreadyExists, format!("`{}` is produced twice", unit.path)),
                });
            }
            files.push((destination, unit.text.clone()));
        }
        let mut report = serde_json::to_string_pretty(report).map_err(|err| OutputWriteError {
            path: self.root.join(REPORT_FILE),
            written: vec![],
            source: io::Error::new(io::ErrorKind::InvalidData, err),
        })?;
        report.push('\n');
        files.push((self.root.join(REPORT_FILE), report));

        let mut written = vec![];
        for (path, text) in files {
            match write_if_changed(&path, &text) {
                Ok(true) => {
                    log::debug!("wrote {}", path.display());
                    written.push(path);
                }
                Ok(false) => log::trace!("{} is up to date", path.display()),
                Err(source) => {
                    return Err(OutputWriteError { path, written, source });
                }
            }
        }
        log::info!("{} file(s) changed under {}", written.len(), self.root.display());
        Ok(written)
    }
}

fn write_if_changed(path: &Path, text: &str) -> io::Result<bool> {
    match std::fs::read(path) {
        Ok(existing) if existing == text.as_bytes() => return Ok(false),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(true)
}
