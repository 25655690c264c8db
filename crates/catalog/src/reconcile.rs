//! Rules for collapsing disagreeing per-track values into one album/artist value.

use std::collections::HashMap;
use std::hash::Hash;

use common::{various_artists_id, Album, Genre, VARIOUS_ARTISTS};
use time::OffsetDateTime;
use tracing::debug;

/// Returns the value when every item agrees, otherwise an empty string.
///
/// The count is 1 on agreement, the number of distinct values on conflict and
/// 0 for no input. Only adjacent repeats are folded before deciding, so
/// `["a", "b", "a"]` is a conflict of two values.
pub fn all_or_nothing<S: AsRef<str>>(items: &[S]) -> (String, usize) {
    let mut values: Vec<&str> = items.iter().map(|item| item.as_ref()).collect();
    values.dedup();
    match values.len() {
        0 => (String::new(), 0),
        1 => (values[0].to_string(), 1),
        _ => {
            values.sort_unstable();
            values.dedup();
            (String::new(), values.len())
        }
    }
}

/// Min and max of a year list where 0 means unknown.
///
/// A zero minimum is replaced by whatever comes next; once set it only moves
/// down for positive values. All-zero input gives `(0, 0)`.
pub fn min_max(items: &[i32]) -> (i32, i32) {
    let Some(&first) = items.first() else {
        return (0, 0);
    };
    let mut min = first;
    let mut max = first;
    for &value in items {
        max = max.max(value);
        if min == 0 {
            min = value;
        } else if value > 0 {
            min = min.min(value);
        }
    }
    (min, max)
}

/// Most common item; ties go to the one seen first.
pub fn most_frequent<T: Eq + Hash>(items: &[T]) -> Option<&T> {
    let mut counts: HashMap<&T, usize> = HashMap::with_capacity(items.len());
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let top = counts.values().copied().max()?;
    items.iter().find(|item| counts.get(item).copied() == Some(top))
}

pub fn newer(a: Option<OffsetDateTime>, b: Option<OffsetDateTime>) -> Option<OffsetDateTime> {
    a.max(b)
}

/// Earlier of two timestamps. An unset side never wins.
pub fn older(a: Option<OffsetDateTime>, b: Option<OffsetDateTime>) -> Option<OffsetDateTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Settles the album artist once all tracks have been folded.
pub fn fix_album_artist(album: &mut Album, album_artist_ids: &[String]) {
    if !album.compilation {
        if album.album_artist_id.is_empty() {
            album.album_artist_id = album.artist_id.clone();
            album.album_artist = album.artist.clone();
        }
        return;
    }

    let mixed = match album_artist_ids.first() {
        Some(first) => album_artist_ids.iter().any(|id| id != first),
        None => false,
    };
    if mixed {
        debug!(
            "Compilation {:?} lists several album artists; using {}",
            album.id, VARIOUS_ARTISTS
        );
        album.album_artist = VARIOUS_ARTISTS.to_string();
        album.album_artist_id = various_artists_id();
    }
}

/// Leading artist of a credit such as `"Alice · Bob"`.
///
/// A name that itself contains `·` gets cut as well.
pub fn artist_display_name(raw: &str) -> &str {
    raw.split('·').next().unwrap_or(raw).trim()
}

/// Sorts by genre id and drops repeats, keeping the first spelling seen.
pub fn dedup_genres(genres: &mut Vec<Genre>) {
    genres.sort_by(|a, b| a.id.cmp(&b.id));
    genres.dedup_by(|a, b| a.id == b.id);
}
