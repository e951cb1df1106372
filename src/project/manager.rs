// Project manager for loading and saving songs
//
// A saved song is a directory holding `manifest.json` (metadata only, cheap to
// list) and `song.ron` (the full body). Files are written to a temporary name
// and renamed into place.

use crate::project::serialization::*;
use crate::project::types::*;
use crate::project::validate_song_file;
use crate::song::{EditError, Song, SongOptions};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SONG_FILE: &str = "song.ron";

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("File system error: {0}")]
    FileSystemError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Unsupported format version {0}")]
    InvalidVersion(FormatVersion),

    #[error("Missing required files in project")]
    MissingFiles,

    #[error("Import failed: {0}")]
    Import(#[from] EditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for loading a song
#[derive(Debug, Clone)]
pub struct ProjectLoadOptions {
    /// Whether to validate the file before importing
    pub validate: bool,
}

impl Default for ProjectLoadOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Project manager - handles saving/loading songs
#[derive(Debug, Clone, Default)]
pub struct ProjectManager {
    /// Written into the metadata of new songs
    author: Option<String>,
}

impl ProjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author(author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
        }
    }

    /// Save a song into `dir`, creating it if needed
    ///
    /// The creation timestamp of an existing save is kept.
    pub fn save_song<P: AsRef<Path>>(&self, song: &Song, dir: P) -> Result<(), ProjectError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to create project directory: {}", e))
        })?;

        let mut metadata = match self.read_metadata(dir) {
            Ok(existing) => existing,
            Err(_) => {
                let mut fresh = SongMetadata::new(song.name().to_string());
                fresh.author = self.author.clone();
                fresh
            }
        };
        metadata.modified = chrono::Utc::now().to_rfc3339();

        let file = song_to_file(song, metadata);
        write_atomic(&dir.join(MANIFEST_FILE), &serialize_metadata_to_json(&file.metadata)?)?;
        write_atomic(&dir.join(SONG_FILE), &serialize_to_ron(&file)?)?;

        log::info!(
            "Saved song '{}' ({} patterns, {} notes) to {}",
            song.name(),
            file.patterns.len(),
            song.note_count(),
            dir.display()
        );
        Ok(())
    }

    /// Load a song from `dir`
    pub fn load_song<P: AsRef<Path>>(
        &self,
        dir: P,
        song_options: SongOptions,
        options: &ProjectLoadOptions,
    ) -> Result<Song, ProjectError> {
        let file = self.read_song_file(dir.as_ref())?;
        if !file.metadata.version.is_compatible() {
            return Err(ProjectError::InvalidVersion(file.metadata.version));
        }
        if options.validate {
            validate_song_file(&file, song_options.note_limit)?;
        }

        let song = song_from_file(file, song_options)?;
        log::info!(
            "Loaded song '{}' ({} notes) from {}",
            song.name(),
            song.note_count(),
            dir.as_ref().display()
        );
        Ok(song)
    }

    /// Read the full file body without importing it
    pub fn read_song_file(&self, dir: &Path) -> Result<SongFile, ProjectError> {
        let path = dir.join(SONG_FILE);
        if !path.exists() {
            return Err(ProjectError::MissingFiles);
        }
        let ron_data = std::fs::read_to_string(&path).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        deserialize_from_ron(&ron_data)
    }

    /// Read only the manifest
    pub fn read_metadata<P: AsRef<Path>>(&self, dir: P) -> Result<SongMetadata, ProjectError> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        if !path.exists() {
            return Err(ProjectError::MissingFiles);
        }
        let json = std::fs::read_to_string(&path)?;
        deserialize_metadata_from_json(&json)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), ProjectError> {
    let mut temp = PathBuf::from(path);
    temp.set_extension("tmp");
    std::fs::write(&temp, contents).map_err(|e| {
        ProjectError::FileSystemError(format!("Failed to write {}: {}", temp.display(), e))
    })?;
    std::fs::rename(&temp, path).map_err(|e| {
        ProjectError::FileSystemError(format!(
            "Failed to move {} into place: {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}
