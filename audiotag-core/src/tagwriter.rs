//! Tag writer collaborator (spec.md §6): writes the corrected record to
//! the file's tags and, when artist+title are known, renames it from
//! the naming template.

use crate::types::{AlbumArt, CanonicalMetadata};
use audiotag_common::error::{Error, Result};
use lofty::config::WriteOptions as LoftyWriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use std::path::{Path, PathBuf};

const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub struct WriteOptions {
    pub overwrite_all: bool,
}

pub struct RenameOptions<'a> {
    pub output_dir: Option<&'a Path>,
    pub naming_template: &'a str,
}

pub struct TagWriteOutcome {
    pub new_path: Option<PathBuf>,
}

pub struct CorrectedRecord {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub lyrics: Option<String>,
    pub album_art: Option<AlbumArt>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
}

impl CorrectedRecord {
    /// Builds the tag-writer input record per spec.md §4.8's artist
    /// composition rule, carrying unresolved fields through unchanged.
    pub fn from_metadata(
        metadata: &CanonicalMetadata,
        lyrics: Option<String>,
        album_art: Option<AlbumArt>,
        track_number: Option<u32>,
        disc_number: Option<u32>,
    ) -> Self {
        let artist = if metadata.featured_artists.is_empty() {
            metadata.artist.clone()
        } else {
            format!("{} feat. {}", metadata.artist, metadata.featured_artists.join(", "))
        };

        Self {
            title: metadata.title.clone(),
            artist,
            album: metadata.album.clone(),
            year: metadata.year,
            genre: metadata.genres.first().cloned(),
            lyrics,
            album_art,
            track_number,
            disc_number,
        }
    }
}

pub trait TagWriter: Send + Sync {
    fn write(
        &self,
        file_path: &Path,
        record: &CorrectedRecord,
        write_options: &WriteOptions,
        rename_options: &RenameOptions<'_>,
    ) -> Result<TagWriteOutcome>;
}

pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write(
        &self,
        file_path: &Path,
        record: &CorrectedRecord,
        write_options: &WriteOptions,
        rename_options: &RenameOptions<'_>,
    ) -> Result<TagWriteOutcome> {
        let mut tagged_file = Probe::open(file_path)
            .map_err(|e| Error::Write(format!("cannot probe {}: {e}", file_path.display())))?
            .read()
            .map_err(|e| Error::Write(format!("cannot read tags from {}: {e}", file_path.display())))?;

        let tag = match tagged_file.primary_tag_mut() {
            Some(tag) => tag,
            None => {
                let tag_type = tagged_file.primary_tag_type();
                tagged_file.insert_tag(Tag::new(tag_type));
                tagged_file.primary_tag_mut().expect("tag inserted above")
            }
        };

        apply_record(tag, record, write_options.overwrite_all);

        tagged_file
            .save_to_path(file_path, LoftyWriteOptions::default())
            .map_err(|e| Error::Write(format!("failed to save tags to {}: {e}", file_path.display())))?;

        let new_path = if !record.artist.is_empty() && !record.title.is_empty() {
            Some(rename_to_template(file_path, record, rename_options)?)
        } else {
            None
        };

        Ok(TagWriteOutcome { new_path })
    }
}

fn apply_record(tag: &mut Tag, record: &CorrectedRecord, overwrite_all: bool) {
    let should_set = |existing: Option<&str>| overwrite_all || existing.map_or(true, str::is_empty);

    if should_set(tag.title().as_deref()) {
        tag.set_title(record.title.clone());
    }
    if should_set(tag.artist().as_deref()) {
        tag.set_artist(record.artist.clone());
    }
    if let Some(album) = &record.album {
        if should_set(tag.album().as_deref()) {
            tag.set_album(album.clone());
        }
    }
    if let Some(year) = record.year {
        tag.set_year(year);
    }
    if let Some(genre) = &record.genre {
        if should_set(tag.genre().as_deref()) {
            tag.set_genre(genre.clone());
        }
    }
    if let Some(lyrics) = &record.lyrics {
        tag.insert_text(ItemKey::Lyrics, lyrics.clone());
    }
    if let Some(art) = &record.album_art {
        let mime = match art.mime_type.as_str() {
            "image/png" => MimeType::Png,
            _ => MimeType::Jpeg,
        };
        let picture = Picture::new_unchecked(PictureType::CoverFront, Some(mime), None, art.bytes.clone());
        tag.push_picture(picture);
    }
    if let Some(track) = record.track_number {
        tag.set_track(track);
    }
    if let Some(disc) = record.disc_number {
        tag.set_disk(disc);
    }
}

fn rename_to_template(
    original: &Path,
    record: &CorrectedRecord,
    options: &RenameOptions<'_>,
) -> Result<PathBuf> {
    let extension = original
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    let filename = options
        .naming_template
        .replace("{artist}", &sanitize(&record.artist))
        .replace("{title}", &sanitize(&record.title))
        .replace("{album}", &sanitize(record.album.as_deref().unwrap_or("")))
        .replace(
            "{year}",
            &record.year.map(|y| y.to_string()).unwrap_or_default(),
        );

    let dir = options
        .output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| original.parent().map(Path::to_path_buf).unwrap_or_default());

    let candidate = dir.join(format!("{filename}.{extension}"));
    let final_path = resolve_collision(&candidate, original)?;

    if final_path != original {
        std::fs::rename(original, &final_path)
            .map_err(|e| Error::Write(format!("failed to rename to {}: {e}", final_path.display())))?;
    }
    Ok(final_path)
}

/// Appends `" (1)"`, `" (2)"`, … until a non-colliding path is found. The
/// original path itself is never treated as a collision with itself.
fn resolve_collision(candidate: &Path, original: &Path) -> Result<PathBuf> {
    if !candidate.exists() || candidate == original {
        return Ok(candidate.to_path_buf());
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();

    for n in 1.. {
        let name = match &extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let attempt = parent.join(name);
        if !attempt.exists() || attempt == original {
            return Ok(attempt);
        }
        if n > 10_000 {
            return Err(Error::Write("exhausted rename collision suffixes".to_string()));
        }
    }
    unreachable!()
}

fn sanitize(s: &str) -> String {
    sanitize_filename::sanitize_with_options(
        s,
        sanitize_filename::Options {
            truncate: true,
            windows: true,
            replacement: "",
        },
    )
    .chars()
    .filter(|c| !FORBIDDEN_CHARS.contains(c))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sanitize_strips_forbidden_characters() {
        assert_eq!(sanitize("AC/DC: Back? <In> Black|"), "ACDC Back In Black");
    }

    #[test]
    fn collision_suffix_increments() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("source.mp3");
        let candidate = dir.path().join("Song.mp3");
        fs::write(&candidate, b"x").unwrap();
        let resolved = resolve_collision(&candidate, &original).unwrap();
        assert_eq!(resolved, dir.path().join("Song (1).mp3"));
    }

    #[test]
    fn no_collision_when_candidate_is_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("Song.mp3");
        fs::write(&original, b"x").unwrap();
        let resolved = resolve_collision(&original, &original).unwrap();
        assert_eq!(resolved, original);
    }
}
