use std::path::Path;

use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::{Accessor, AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::tag::Tag;

/// Everything the reader could pull out of one audio file. Missing tags
/// leave their fields empty; only an unreadable file is an error.
#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    pub album: Option<String>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub lyrics: Option<String>,
    /// Whole seconds.
    pub duration_secs: Option<u32>,
    /// Kilobits per second.
    pub bitrate_kbps: Option<u32>,
    /// Embedded front cover, verbatim.
    pub cover: Option<CoverArt>,
}

impl TagInfo {
    /// `"; "`-joined artist display string.
    pub fn artist_display(&self) -> String {
        self.artists.join("; ")
    }

    pub fn album_artist_display(&self) -> String {
        self.album_artists.join("; ")
    }

    pub fn genre_display(&self) -> String {
        self.genres.join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

/// Fields the writer applies to a file. `None` leaves the existing value
/// alone; empty collections are skipped.
#[derive(Debug, Default, Clone)]
pub struct TagWrite {
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub lyrics: Option<String>,
    pub cover: Option<CoverArt>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut info = TagInfo::default();

    let duration = properties.duration().as_secs();
    if duration > 0 {
        info.duration_secs = Some(duration.min(u64::from(u32::MAX)) as u32);
    }
    info.bitrate_kbps = properties.audio_bitrate().or(properties.overall_bitrate());

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        info.artists = collect_names(tag, &ItemKey::TrackArtist);
        info.album_artists = collect_names(tag, &ItemKey::AlbumArtist);
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_no);
        info.disc_no = tag.get_string(&ItemKey::DiscNumber).and_then(parse_no);
        info.year = tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year);
        for value in tag.get_strings(&ItemKey::Genre) {
            for genre in split_values(value) {
                if !info.genres.contains(&genre) {
                    info.genres.push(genre);
                }
            }
        }
        info.lyrics = tag
            .get_string(&ItemKey::Lyrics)
            .or_else(|| unsync_lyrics(tag))
            .map(|v| v.to_string());
        if let Some(picture) = pick_picture(tag.pictures()) {
            info.cover = Some(CoverArt {
                data: picture.data().to_vec(),
                mime: guess_mime(picture.data()),
            });
        }
    }

    Ok(info)
}

/// Reads only the embedded front cover, for callers that do not need the
/// rest of the record.
pub fn read_cover(path: &Path) -> Result<Option<CoverArt>, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let picture = match pick_picture(tag.pictures()) {
        Some(picture) => picture,
        None => return Ok(None),
    };

    let data = picture.data().to_vec();
    let mime = guess_mime(&data);
    Ok(Some(CoverArt { data, mime }))
}

pub fn write_tags(path: &Path, write: &TagWrite) -> Result<(), MetadataError> {
    let mut tagged_file = lofty::read_from_path(path)?;
    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = match tagged_file.tag_mut(tag_type) {
        Some(tag) => tag,
        None => return Ok(()),
    };

    if let Some(title) = &write.title {
        tag.insert_text(ItemKey::TrackTitle, title.clone());
    }
    if !write.artists.is_empty() {
        tag.insert_text(ItemKey::TrackArtist, write.artists.join("; "));
    }
    if let Some(album) = &write.album {
        tag.insert_text(ItemKey::AlbumTitle, album.clone());
    }
    if !write.album_artists.is_empty() {
        tag.insert_text(ItemKey::AlbumArtist, write.album_artists.join("; "));
    }
    if let Some(track_no) = write.track_no {
        tag.set_track(track_no);
    }
    if let Some(disc_no) = write.disc_no {
        tag.set_disk(disc_no);
    }
    if let Some(year) = write.year {
        tag.insert_text(ItemKey::Year, year.to_string());
    }
    if !write.genres.is_empty() {
        tag.insert_text(ItemKey::Genre, write.genres.join("; "));
    }
    if let Some(lyrics) = &write.lyrics {
        tag.insert_text(ItemKey::Lyrics, lyrics.clone());
    }
    if let Some(cover) = &write.cover {
        let mime = cover
            .mime
            .as_deref()
            .map(MimeType::from_str)
            .unwrap_or(MimeType::Jpeg);
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(mime),
            None,
            cover.data.clone(),
        ));
    }

    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

fn collect_names(tag: &Tag, key: &ItemKey) -> Vec<String> {
    let mut out = Vec::new();
    for value in tag.get_strings(key) {
        for name in split_names(value) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

/// Artist-style splitting; commas stay intact because they appear inside
/// legitimate names.
fn split_names(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', '/', '\0'][..]) {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

fn split_values(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for part in text.split(&[';', ',', '/', '|', '\0'][..]) {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    if out.is_empty() {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// `N/M` track and disc forms take N.
fn parse_no(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

/// First run of digits in the date field.
fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn unsync_lyrics(tag: &Tag) -> Option<&str> {
    tag.items().find_map(|item| {
        let is_unsync = matches!(
            item.key(),
            ItemKey::Unknown(key) if key.eq_ignore_ascii_case("UNSYNCEDLYRICS")
                || key.eq_ignore_ascii_case("UNSYNCED LYRICS")
        );
        if is_unsync {
            item.value().text()
        } else {
            None
        }
    })
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_no_takes_head_of_fraction() {
        assert_eq!(parse_no("3/12"), Some(3));
        assert_eq!(parse_no(" 7 "), Some(7));
        assert_eq!(parse_no("x"), None);
    }

    #[test]
    fn year_takes_first_integer() {
        assert_eq!(parse_year("2003-04-01"), Some(2003));
        assert_eq!(parse_year("released 1999"), Some(1999));
        assert_eq!(parse_year("unknown"), None);
    }

    #[test]
    fn names_split_on_semicolons_but_not_commas() {
        assert_eq!(
            split_names("A; B / C"),
            vec!["A".to_string(), "B".to_string(), "C".to_string()]
        );
        assert_eq!(
            split_names("Crosby, Stills & Nash"),
            vec!["Crosby, Stills & Nash".to_string()]
        );
    }

    #[test]
    fn genres_split_on_commas_too() {
        assert_eq!(
            split_values("Rock, Pop; Jazz"),
            vec!["Rock".to_string(), "Pop".to_string(), "Jazz".to_string()]
        );
    }

    #[test]
    fn mime_sniffing_recognizes_jpeg_and_png() {
        assert_eq!(
            guess_mime(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg".to_string())
        );
        assert_eq!(
            guess_mime(&[0x89, 0x50, 0x4E, 0x47]),
            Some("image/png".to_string())
        );
        assert_eq!(guess_mime(&[0x00, 0x01]), None);
    }
}
