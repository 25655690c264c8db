use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Display name used for compilations whose tracks disagree on the album artist.
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Separator tag writers put between collaborating artists ("Alice · Bob").
pub const ARTIST_JOINER: &str = " · ";

/// Zero-width space, joins the directory list of an album.
pub const ZWSP: &str = "\u{200B}";

/// One audio file as handed over by the tag reader.
///
/// Every field may be empty or zero. Aggregation degrades on missing values,
/// it never rejects a track.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub path: String,
    pub title: String,
    pub album: String,
    pub album_id: String,
    pub artist_id: String,
    pub artist: String,
    pub album_artist_id: String,
    pub album_artist: String,
    /// Space separated ids of every artist credited on the track.
    pub all_artist_ids: String,
    pub has_cover_art: bool,
    pub track_number: i32,
    pub disc_number: i32,
    pub disc_subtitle: String,
    pub year: i32,
    pub date: String,
    pub original_year: i32,
    pub original_date: String,
    pub release_year: i32,
    pub release_date: String,
    pub size: u64,
    pub suffix: String,
    /// Seconds.
    pub duration: f32,
    pub bit_rate: i32,
    pub channels: i32,
    pub genre: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    pub full_text: String,
    pub sort_title: String,
    pub sort_album_name: String,
    pub sort_artist_name: String,
    pub sort_album_artist_name: String,
    pub order_title: String,
    pub order_album_name: String,
    pub order_artist_name: String,
    pub order_album_artist_name: String,
    pub compilation: bool,
    pub comment: String,
    pub lyrics: String,
    pub bpm: i32,
    pub catalog_num: String,
    pub mbz_track_id: String,
    pub mbz_release_track_id: String,
    pub mbz_album_id: String,
    pub mbz_artist_id: String,
    pub mbz_album_artist_id: String,
    pub mbz_album_type: String,
    pub mbz_album_comment: String,
    pub rg_album_gain: f64,
    pub rg_album_peak: f64,
    pub rg_track_gain: f64,
    pub rg_track_peak: f64,
    /// When the track entered the catalog.
    pub created_at: Option<OffsetDateTime>,
    /// File modification time.
    pub updated_at: Option<OffsetDateTime>,
}

impl Track {
    pub fn content_type(&self) -> Option<&'static str> {
        mime_guess::from_ext(&self.suffix).first_raw()
    }

    pub fn dir(&self) -> String {
        parent_dir(&self.path)
    }

    pub fn artist_ids(&self) -> impl Iterator<Item = &str> {
        self.all_artist_ids.split(' ').filter(|id| !id.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genre {
    pub id: String,
    pub name: String,
}

impl Genre {
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        Self {
            id: stable_id(&name.to_lowercase()),
            name: name.to_string(),
        }
    }
}

/// Canonical album record folded from all tracks sharing an album id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist_id: String,
    pub artist: String,
    pub album_artist_id: String,
    pub album_artist: String,
    pub all_artist_ids: String,
    pub embed_art_path: String,
    pub sort_album_name: String,
    pub sort_artist_name: String,
    pub sort_album_artist_name: String,
    pub order_album_name: String,
    pub order_album_artist_name: String,
    pub mbz_album_id: String,
    pub mbz_album_artist_id: String,
    pub mbz_album_type: String,
    pub mbz_album_comment: String,
    pub catalog_num: String,
    pub compilation: bool,
    pub duration: f32,
    pub size: u64,
    pub song_count: usize,
    pub min_year: i32,
    pub max_year: i32,
    pub min_original_year: i32,
    pub max_original_year: i32,
    pub date: String,
    pub original_date: String,
    pub release_date: String,
    /// Distinct release dates seen across the tracks.
    pub releases: usize,
    pub comment: String,
    pub genre: String,
    #[serde(default)]
    pub genres: Vec<Genre>,
    pub full_text: String,
    /// Directories holding the album's files, joined with [`ZWSP`].
    pub paths: String,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

impl Album {
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.split(ZWSP).filter(|path| !path.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub sort_artist_name: String,
    pub order_artist_name: String,
    pub song_count: usize,
    pub size: u64,
    #[serde(default)]
    pub genres: Vec<Genre>,
    pub mbz_artist_id: String,
}

pub fn stable_id(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().to_string()
}

pub fn various_artists_id() -> String {
    stable_id(&VARIOUS_ARTISTS.to_lowercase())
}

/// Directory part of a slash separated path, `"."` when there is none.
///
/// The path is cleaned first, so `a//b/./x.flac` and `a/b/x.flac` share a
/// directory.
pub fn parent_dir(path: &str) -> String {
    let cleaned = clean_path(path);
    match cleaned.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
        None => ".".to_string(),
    }
}

/// Lexically cleans a slash separated path: repeated separators, `.` and
/// resolvable `..` segments go away. An empty result is `"."`.
pub fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
