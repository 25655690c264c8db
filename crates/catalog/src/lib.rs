//! Folds per-track tag data into album and artist catalog records.
//!
//! Everything here is pure: no I/O, no shared state, so batches can be
//! aggregated on as many threads as the caller likes.

mod aggregate;
mod fulltext;
mod group;
mod reconcile;

use serde::{Deserialize, Serialize};

pub use aggregate::{
    dirs, merge_album_artist, to_album, to_album_artist, to_album_with, to_artist, to_artist_with,
};
pub use fulltext::{sanitize_strings, split_collaboration};
pub use group::{group_by, group_by_album, group_by_artist, TrackBatch};
pub use reconcile::{
    all_or_nothing, artist_display_name, dedup_genres, fix_album_artist, min_max, most_frequent,
    newer, older,
};

/// Order in which a batch is visited while folding.
///
/// Copy-through fields come from the last track visited and the embedded art
/// path from the first track with a cover, so the order decides them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldOrder {
    /// As handed in by the caller.
    #[default]
    Input,
    /// Ascending track id, independent of caller order.
    TrackId,
}
