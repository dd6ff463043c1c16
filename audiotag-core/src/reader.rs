//! Reading step (spec.md §4.8): probes the file and captures its
//! existing tags into an immutable [`AudioFileMetadata`].

use crate::types::{AudioFileMetadata, AudioFormat};
use audiotag_common::error::{Error, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;

pub fn read(file_path: &Path) -> Result<AudioFileMetadata> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::FileRead(format!("{}: no file extension", file_path.display())))?;
    let format = AudioFormat::from_extension(extension)
        .ok_or_else(|| Error::FileRead(format!("{}: unsupported audio format", file_path.display())))?;

    let file_size = std::fs::metadata(file_path)
        .map_err(|e| Error::FileRead(format!("{}: {e}", file_path.display())))?
        .len();

    let tagged_file = Probe::open(file_path)
        .map_err(|e| Error::FileRead(format!("cannot probe {}: {e}", file_path.display())))?
        .read()
        .map_err(|e| Error::FileRead(format!("cannot read {}: {e}", file_path.display())))?;

    let duration = tagged_file.properties().duration().as_secs_f64();
    let tag = tagged_file.primary_tag();

    let (title, artist, album, year, genre, track_number, disc_number, album_artist, lyrics) =
        match tag {
            Some(tag) => (
                tag.title().map(|s| s.into_owned()),
                tag.artist().map(|s| s.into_owned()),
                tag.album().map(|s| s.into_owned()),
                tag.year(),
                tag.genre().map(|s| vec![s.into_owned()]).unwrap_or_default(),
                tag.track(),
                tag.disk(),
                tag.get_string(&lofty::tag::ItemKey::AlbumArtist).map(str::to_string),
                tag.get_string(&lofty::tag::ItemKey::Lyrics).map(str::to_string),
            ),
            None => (None, None, None, None, Vec::new(), None, None, None, None),
        };

    Ok(AudioFileMetadata {
        file_path: file_path.to_path_buf(),
        format,
        file_size,
        duration,
        title,
        artist,
        album,
        year,
        genre,
        track_number,
        disc_number,
        album_artist,
        lyrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_extension() {
        let err = read(Path::new("/tmp/does-not-exist.xyz")).unwrap_err();
        assert!(matches!(err, Error::FileRead(_)));
    }
}
