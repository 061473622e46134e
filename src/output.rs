use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use serde::Serialize;

use crate::{
    error::{PipelineError, persistence},
    narrative::types::{KeptText, PredictedDocument, RefinedDocument},
};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: u64 = 1;

/// Root of persisted documents: `<root>/<encounter>/<variant>/<index>.txt`.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
    write_manifest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub index: usize,
    pub file: String,
    pub document_type: String,
    pub description: String,
    pub applied_transformations: Vec<String>,
    pub kept: KeptText,
    pub fact_drift: Vec<String>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: u64,
    encounter_id: &'a str,
    variant: u32,
    documents: &'a [ManifestEntry],
}

/// One run's output directory, exclusively owned by the run that created it.
#[derive(Debug)]
pub struct RunSlot {
    encounter_id: String,
    variant: u32,
    dir: PathBuf,
    write_manifest: bool,
    entries: Vec<ManifestEntry>,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, write_manifest: bool) -> Self {
        Self {
            root: root.into(),
            write_manifest,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claims the lowest free variant directory for `encounter_id`.
    /// `create_dir` fails on an existing directory, so concurrent runs never
    /// share a slot.
    pub fn allocate(&self, encounter_id: &str) -> Result<RunSlot, PipelineError> {
        ensure_single_component(encounter_id)?;
        let encounter_dir = self.root.join(encounter_id);
        fs::create_dir_all(&encounter_dir).map_err(|err| {
            persistence(format!(
                "failed to create output directory '{}': {err}",
                encounter_dir.display()
            ))
        })?;

        let mut variant = 0_u32;
        loop {
            let dir = encounter_dir.join(variant.to_string());
            match fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::info!(
                        target: "output",
                        encounter_id = %encounter_id,
                        variant = variant,
                        dir = %dir.display(),
                        "run_slot_allocated"
                    );
                    return Ok(RunSlot {
                        encounter_id: encounter_id.to_string(),
                        variant,
                        dir,
                        write_manifest: self.write_manifest,
                        entries: Vec::new(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    variant = variant.checked_add(1).ok_or_else(|| {
                        persistence(format!(
                            "no free run slot left under '{}'",
                            encounter_dir.display()
                        ))
                    })?;
                }
                Err(err) => {
                    return Err(persistence(format!(
                        "failed to create run directory '{}': {err}",
                        dir.display()
                    )));
                }
            }
        }
    }
}

impl RunSlot {
    pub fn encounter_id(&self) -> &str {
        &self.encounter_id
    }

    pub fn variant(&self) -> u32 {
        self.variant
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Writes the next `<index>.txt` and refreshes the manifest.
    pub fn persist(
        &mut self,
        predicted: &PredictedDocument,
        refined: &RefinedDocument,
    ) -> Result<PathBuf, PipelineError> {
        let index = self.entries.len();
        let file = format!("{index}.txt");
        let path = self.dir.join(&file);

        let mut handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| {
                persistence(format!(
                    "failed to create document '{}': {err}",
                    path.display()
                ))
            })?;
        handle
            .write_all(refined.content.as_bytes())
            .and_then(|()| handle.sync_all())
            .map_err(|err| {
                persistence(format!("failed to write document '{}': {err}", path.display()))
            })?;

        self.entries.push(ManifestEntry {
            index,
            file,
            document_type: predicted.document_type.clone(),
            description: predicted.description.clone(),
            applied_transformations: refined.applied_transformations.clone(),
            kept: refined.kept,
            fact_drift: refined.fact_drift.clone(),
        });
        if self.write_manifest {
            self.write_manifest_file()?;
        }

        Ok(path)
    }

    fn write_manifest_file(&self) -> Result<(), PipelineError> {
        let path = self.dir.join(MANIFEST_FILE);
        let tmp_path = path.with_extension("tmp");
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            encounter_id: &self.encounter_id,
            variant: self.variant,
            documents: &self.entries,
        };

        let file = fs::File::create(&tmp_path).map_err(|err| {
            persistence(format!(
                "failed to create manifest temp file '{}': {err}",
                tmp_path.display()
            ))
        })?;
        {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &manifest).map_err(|err| {
                persistence(format!(
                    "failed to serialize manifest '{}': {err}",
                    tmp_path.display()
                ))
            })?;
            writer
                .write_all(b"\n")
                .and_then(|()| writer.flush())
                .map_err(|err| {
                    persistence(format!(
                        "failed to flush manifest '{}': {err}",
                        tmp_path.display()
                    ))
                })?;
        }

        fs::rename(&tmp_path, &path).map_err(|err| {
            persistence(format!(
                "failed to replace manifest '{}' from '{}': {err}",
                path.display(),
                tmp_path.display()
            ))
        })
    }
}

fn ensure_single_component(encounter_id: &str) -> Result<(), PipelineError> {
    let mut components = Path::new(encounter_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(persistence(format!(
            "encounter id '{}' cannot be used as a directory name",
            encounter_id
        ))),
    }
}
