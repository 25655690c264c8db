use std::collections::BTreeMap;

use common::{Album, Artist, Track};
use tracing::trace;

use crate::aggregate::{to_album_with, to_artist_with};
use crate::FoldOrder;

/// Tracks sharing one grouping key. Never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackBatch {
    key: String,
    tracks: Vec<Track>,
}

impl TrackBatch {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    pub fn to_album(&self, order: FoldOrder) -> Album {
        to_album_with(&self.tracks, order)
    }

    pub fn to_artist(&self, order: FoldOrder) -> Artist {
        to_artist_with(&self.tracks, order)
    }
}

/// Partitions tracks by `key`, keeping input order inside each batch.
pub fn group_by<I, F>(tracks: I, key: F) -> BTreeMap<String, TrackBatch>
where
    I: IntoIterator<Item = Track>,
    F: Fn(&Track) -> &str,
{
    let mut batches: BTreeMap<String, TrackBatch> = BTreeMap::new();
    for track in tracks {
        let batch_key = key(&track);
        match batches.get_mut(batch_key) {
            Some(batch) => batch.tracks.push(track),
            None => {
                let batch_key = batch_key.to_string();
                batches.insert(
                    batch_key.clone(),
                    TrackBatch {
                        key: batch_key,
                        tracks: vec![track],
                    },
                );
            }
        }
    }
    trace!("Grouped tracks into {} batches", batches.len());
    batches
}

pub fn group_by_album<I>(tracks: I) -> BTreeMap<String, TrackBatch>
where
    I: IntoIterator<Item = Track>,
{
    group_by(tracks, |track| track.album_id.as_str())
}

pub fn group_by_artist<I>(tracks: I) -> BTreeMap<String, TrackBatch>
where
    I: IntoIterator<Item = Track>,
{
    group_by(tracks, |track| track.artist_id.as_str())
}
