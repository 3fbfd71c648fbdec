//! Migration file discovery and creation.
//!
//! Files follow `<version>_<name>.up.sql` / `<version>_<name>.down.sql`. The
//! folder is scanned non-recursively; anything else in it is ignored.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use pgmgr_shared::Version;
use regex::Regex;

use super::error::MigrationError;
use super::types::{CreatedMigration, Direction, Migration};

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(.+)\.(up|down)\.sql$").expect("valid migration file pattern"));

/// A file name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    /// Leading version number.
    pub version: Version,
    /// Text between the version and the direction suffix.
    pub name: String,
    /// Which half the file holds.
    pub direction: Direction,
}

/// Splits a migration file name, or returns `None` when it does not follow the
/// naming convention.
#[must_use]
pub fn parse_file_name(file_name: &str) -> Option<ParsedFileName> {
    let caps = FILE_NAME.captures(file_name)?;
    let version = caps.get(1)?.as_str().parse::<i64>().ok()?;
    let direction = match caps.get(3)?.as_str() {
        "up" => Direction::Up,
        _ => Direction::Down,
    };
    Some(ParsedFileName {
        version: Version(version),
        name: caps.get(2)?.as_str().to_string(),
        direction,
    })
}

/// Normalizes a user-supplied migration name.
///
/// Surrounding whitespace is trimmed and inner whitespace becomes `_`. The
/// result must be non-empty and contain only ASCII letters, digits, `_` or `-`.
pub fn sanitize_name(raw: &str) -> Result<String, MigrationError> {
    let name: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(name)
    } else {
        Err(MigrationError::InvalidName(raw.to_string()))
    }
}

#[derive(Default)]
struct Halves {
    name: String,
    up: Option<(PathBuf, String)>,
    down: Option<(PathBuf, String)>,
}

/// Migration files in one folder.
#[derive(Debug, Clone)]
pub struct MigrationRepository {
    folder: PathBuf,
}

impl MigrationRepository {
    /// Create a repository over `folder`.
    #[must_use]
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// Folder this repository reads from.
    #[must_use]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Lists every migration, ascending by version.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The folder does not exist
    /// - A file cannot be read
    /// - Two files claim the same version and half, or one version carries two names
    pub fn list(&self) -> Result<Vec<Migration>, MigrationError> {
        let mut grouped: BTreeMap<Version, Halves> = BTreeMap::new();

        for (path, parsed) in self.scan()? {
            let body = fs::read_to_string(&path).map_err(|e| MigrationError::io(&path, e))?;
            let halves = grouped.entry(parsed.version).or_default();

            if halves.name.is_empty() {
                halves.name.clone_from(&parsed.name);
            } else if halves.name != parsed.name {
                let first = halves
                    .up
                    .as_ref()
                    .or(halves.down.as_ref())
                    .map(|(p, _)| p.clone())
                    .unwrap_or_default();
                return Err(MigrationError::DuplicateVersion {
                    version: parsed.version,
                    first,
                    second: path,
                });
            }

            let slot = match parsed.direction {
                Direction::Up => &mut halves.up,
                Direction::Down => &mut halves.down,
            };
            if let Some((first, _)) = slot {
                return Err(MigrationError::DuplicateVersion {
                    version: parsed.version,
                    first: first.clone(),
                    second: path,
                });
            }
            *slot = Some((path, body));
        }

        let mut migrations = Vec::with_capacity(grouped.len());
        for (version, halves) in grouped {
            let Some((up_path, up)) = halves.up else {
                tracing::warn!(%version, name = %halves.name, "Skipping migration with no up file");
                continue;
            };
            let (down_path, down) = match halves.down {
                Some((path, body)) if has_statements(&body) => (Some(path), Some(body)),
                Some((path, _)) => (Some(path), None),
                None => (None, None),
            };
            migrations.push(Migration {
                version,
                name: halves.name,
                up,
                down,
                up_path,
                down_path,
            });
        }

        Ok(migrations)
    }

    /// Writes a new up/down stub pair named `name`.
    ///
    /// The version is derived from `now` and bumped past every version already
    /// in the folder. The folder is created when missing; existing files are
    /// never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or contains forbidden characters
    /// - Either target file already exists
    /// - The folder or a file cannot be written
    pub fn create(&self, name: &str, now: DateTime<Utc>) -> Result<CreatedMigration, MigrationError> {
        let name = sanitize_name(name)?;

        fs::create_dir_all(&self.folder).map_err(|e| MigrationError::io(&self.folder, e))?;

        let latest = self.scan()?.into_iter().map(|(_, p)| p.version).max();
        let version = Version::next_after(latest, now)
            .ok_or(MigrationError::VersionExhausted(Version(i64::MAX)))?;

        let up_path = self.file_path(version, &name, Direction::Up);
        let down_path = self.file_path(version, &name, Direction::Down);
        for path in [&up_path, &down_path] {
            if path.exists() {
                return Err(MigrationError::FileExists(path.clone()));
            }
        }

        write_new(&up_path, &stub(version, &name, Direction::Up, now))?;
        write_new(&down_path, &stub(version, &name, Direction::Down, now))?;

        tracing::info!(%version, %name, folder = %self.folder.display(), "Created migration files");

        Ok(CreatedMigration {
            version,
            name,
            up_path,
            down_path,
        })
    }

    fn file_path(&self, version: Version, name: &str, direction: Direction) -> PathBuf {
        self.folder
            .join(format!("{version}_{name}.{}", direction.suffix()))
    }

    /// Migration-named files in the folder, in directory order.
    fn scan(&self) -> Result<Vec<(PathBuf, ParsedFileName)>, MigrationError> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MigrationError::FolderNotFound(self.folder.clone()));
            }
            Err(e) => return Err(MigrationError::io(&self.folder, e)),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MigrationError::io(&self.folder, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_file_name(file_name) {
                Some(parsed) => found.push((path.clone(), parsed)),
                None => tracing::debug!(file = %file_name, "Ignoring non-migration file"),
            }
        }
        Ok(found)
    }
}

/// Whether `body` holds anything besides whitespace and `--` line comments.
///
/// A down file left as the generated stub does not count as a rollback script.
fn has_statements(body: &str) -> bool {
    body.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

fn stub(version: Version, name: &str, direction: Direction, now: DateTime<Utc>) -> String {
    let purpose = match direction {
        Direction::Up => "Write the SQL that applies this migration below.",
        Direction::Down => "Write the SQL that reverts the up migration below.",
    };
    format!(
        "-- Migration: {name}\n-- Version: {version}\n-- Created: {}\n-- {purpose}\n\n",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn write_new(path: &Path, contents: &str) -> Result<(), MigrationError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                MigrationError::FileExists(path.to_path_buf())
            } else {
                MigrationError::io(path, e)
            }
        })?;
    file.write_all(contents.as_bytes())
        .map_err(|e| MigrationError::io(path, e))
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
