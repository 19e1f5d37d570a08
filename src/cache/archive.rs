//! Tar+zstd packing and unpacking of cache bundles

use crate::error::{OmniError, OmniResult};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use tar::{Archive, Builder, EntryType};
use walkdir::WalkDir;

/// Compression level 0 selects the zstd default
const ZSTD_LEVEL: i32 = 0;

/// Pack a directory into a zstd-compressed tar stream. Entry names are
/// slash-normalized and relative to `src`; only regular files and
/// directories are recorded.
pub fn pack(src: &Path) -> OmniResult<Vec<u8>> {
    let encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)
        .map_err(|e| OmniError::cache_io("creating zstd encoder", e))?;
    let mut builder = Builder::new(encoder);

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| OmniError::Walk {
            path: src.to_path_buf(),
            source: e,
        })?;

        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            builder
                .append_dir(&name, entry.path())
                .map_err(|e| OmniError::cache_io(format!("archiving directory {name:?}"), e))?;
        } else if entry.file_type().is_file() {
            builder
                .append_path_with_name(entry.path(), &name)
                .map_err(|e| OmniError::cache_io(format!("archiving file {name:?}"), e))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| OmniError::cache_io("finishing tar stream", e))?;
    encoder
        .finish()
        .map_err(|e| OmniError::cache_io("finishing zstd stream", e))
}

/// Unpack a zstd-framed tar stream into `dst`.
///
/// Symlinks, devices, and entries that would escape `dst` are rejected
/// rather than materialized.
pub fn unpack(bytes: &[u8], dst: &Path) -> OmniResult<()> {
    let decoder = zstd::Decoder::new(bytes)
        .map_err(|e| OmniError::cache_io("creating zstd decoder", e))?;
    let mut archive = Archive::new(decoder);

    let entries = archive
        .entries()
        .map_err(|e| OmniError::cache_io("reading tar stream", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| OmniError::cache_io("reading tar entry", e))?;
        let name = entry
            .path()
            .map_err(|e| OmniError::cache_io("reading tar entry name", e))?
            .into_owned();
        check_entry_path(&name)?;

        let path = dst.join(&name);
        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&path)
                    .map_err(|e| OmniError::cache_io(format!("creating directory {path:?}"), e))?;
            }
            EntryType::Regular => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        OmniError::cache_io(format!("creating directory {parent:?}"), e)
                    })?;
                }
                let mut file = File::create(&path)
                    .map_err(|e| OmniError::cache_io(format!("creating file {path:?}"), e))?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| OmniError::cache_io(format!("writing file {path:?}"), e))?;
                restore_mode(&entry, &path)?;
            }
            other => {
                return Err(OmniError::cache_io(
                    format!("unsupported tar entry type {other:?} for {name:?}"),
                    io::Error::from(io::ErrorKind::InvalidData),
                ));
            }
        }
    }

    Ok(())
}

fn check_entry_path(name: &Path) -> OmniResult<()> {
    let escapes = name.components().any(|comp| {
        matches!(
            comp,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });

    if escapes {
        return Err(OmniError::cache_io(
            format!("refusing to unpack entry {name:?} outside the destination"),
            io::Error::from(io::ErrorKind::InvalidData),
        ));
    }

    Ok(())
}

#[cfg(unix)]
fn restore_mode<R: io::Read>(entry: &tar::Entry<'_, R>, path: &Path) -> OmniResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(mode) = entry.header().mode() {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| OmniError::cache_io(format!("setting permissions on {path:?}"), e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restore_mode<R: io::Read>(_entry: &tar::Entry<'_, R>, _path: &Path) -> OmniResult<()> {
    Ok(())
}
