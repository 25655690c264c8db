use common::{Album, Artist, Track, ZWSP};
use tracing::debug;

use crate::fulltext::{sanitize_strings, split_collaboration};
use crate::reconcile::{
    all_or_nothing, artist_display_name, dedup_genres, fix_album_artist, min_max, most_frequent,
    newer, older,
};
use crate::FoldOrder;

/// Folds tracks of one album into an [`Album`], visiting them in input order.
///
/// All tracks are expected to carry the same album id. Mixed input is not
/// checked and gives a meaningless album.
pub fn to_album(tracks: &[Track]) -> Album {
    to_album_with(tracks, FoldOrder::Input)
}

pub fn to_album_with(tracks: &[Track], order: FoldOrder) -> Album {
    let tracks = fold_order(tracks, order);
    let mut al = Album {
        song_count: tracks.len(),
        ..Default::default()
    };

    let mut full_text: Vec<String> = Vec::with_capacity(tracks.len() * 4);
    let mut album_artist_ids = Vec::with_capacity(tracks.len());
    let mut all_artist_ids: Vec<&str> = Vec::new();
    let mut mbz_album_ids = Vec::with_capacity(tracks.len());
    let mut comments = Vec::with_capacity(tracks.len());
    let mut years = Vec::with_capacity(tracks.len());
    let mut dates = Vec::with_capacity(tracks.len());
    let mut original_years = Vec::with_capacity(tracks.len());
    let mut original_dates = Vec::with_capacity(tracks.len());
    let mut release_dates = Vec::with_capacity(tracks.len());

    for track in &tracks {
        al.duration += track.duration;
        al.size = al.size.saturating_add(track.size);
        years.push(track.year);
        dates.push(track.date.as_str());
        original_years.push(track.original_year);
        original_dates.push(track.original_date.as_str());
        release_dates.push(track.release_date.as_str());
        al.updated_at = newer(al.updated_at, track.updated_at);
        al.created_at = older(al.created_at, track.created_at);
        al.genres.extend(track.genres.iter().cloned());
        comments.push(track.comment.as_str());
        album_artist_ids.push(track.album_artist_id.clone());
        all_artist_ids.extend(track.artist_ids());
        mbz_album_ids.push(track.mbz_album_id.as_str());
        // sort names stay out, they repeat the plain names
        full_text.push(track.album.clone());
        full_text.push(split_collaboration(&track.album_artist));
        full_text.push(split_collaboration(&track.artist));
        full_text.push(track.disc_subtitle.clone());
        if track.has_cover_art && al.embed_art_path.is_empty() {
            al.embed_art_path = track.path.clone();
        }
    }

    if let Some(last) = tracks.last() {
        copy_album_fields(&mut al, last);
    }

    al.paths = dirs(tracks.iter().copied()).join(ZWSP);
    al.date = all_or_nothing(&dates).0;
    al.original_date = all_or_nothing(&original_dates).0;
    (al.release_date, al.releases) = all_or_nothing(&release_dates);
    (al.min_year, al.max_year) = min_max(&years);
    (al.min_original_year, al.max_original_year) = min_max(&original_years);
    al.comment = all_or_nothing(&comments).0;
    al.genre = most_frequent(&al.genres)
        .map(|genre| genre.name.clone())
        .unwrap_or_default();
    dedup_genres(&mut al.genres);
    al.full_text = format!(" {}", sanitize_strings(&full_text));
    fix_album_artist(&mut al, &album_artist_ids);
    all_artist_ids.sort_unstable();
    all_artist_ids.dedup();
    al.all_artist_ids = all_artist_ids.join(" ");
    al.mbz_album_id = most_frequent(&mbz_album_ids)
        .map(|id| id.to_string())
        .unwrap_or_default();

    debug!("Folded {} tracks into album {:?}", al.song_count, al.id);
    al
}

/// Folds tracks of one artist into an [`Artist`], visiting them in input order.
///
/// All tracks are expected to carry the same artist id.
pub fn to_artist(tracks: &[Track]) -> Artist {
    to_artist_with(tracks, FoldOrder::Input)
}

pub fn to_artist_with(tracks: &[Track], order: FoldOrder) -> Artist {
    let tracks = fold_order(tracks, order);
    let mut a = Artist {
        song_count: tracks.len(),
        ..Default::default()
    };
    let mut mbz_artist_ids = Vec::with_capacity(tracks.len());

    for track in &tracks {
        // size of tracks the artist also album-artists is counted on the album artist
        if track.artist_id != track.album_artist_id {
            a.size = a.size.saturating_add(track.size);
        }
        a.genres.extend(track.genres.iter().cloned());
        mbz_artist_ids.push(track.mbz_artist_id.as_str());
    }

    if let Some(last) = tracks.last() {
        a.id = last.artist_id.clone();
        a.name = artist_display_name(&last.artist).to_string();
        a.sort_artist_name = last.sort_artist_name.clone();
        a.order_artist_name = last.order_artist_name.clone();
    }

    dedup_genres(&mut a.genres);
    a.mbz_artist_id = most_frequent(&mbz_artist_ids)
        .map(|id| id.to_string())
        .unwrap_or_default();

    debug!("Folded {} tracks into artist {:?}", a.song_count, a.id);
    a
}

/// Folds albums sharing an album artist id into that artist.
///
/// Album sizes are counted in full here, which is where tracks the artist
/// also album-artists get their size.
pub fn to_album_artist<'a, I>(albums: I) -> Artist
where
    I: IntoIterator<Item = &'a Album>,
{
    let mut a = Artist::default();
    let mut mbz_artist_ids = Vec::new();
    let mut last: Option<&Album> = None;

    for album in albums {
        a.song_count += album.song_count;
        a.size = a.size.saturating_add(album.size);
        a.genres.extend(album.genres.iter().cloned());
        mbz_artist_ids.push(album.mbz_album_artist_id.as_str());
        last = Some(album);
    }

    if let Some(last) = last {
        a.id = last.album_artist_id.clone();
        a.name = artist_display_name(&last.album_artist).to_string();
        a.sort_artist_name = last.sort_album_artist_name.clone();
        a.order_artist_name = last.order_album_artist_name.clone();
    }

    dedup_genres(&mut a.genres);
    a.mbz_artist_id = most_frequent(&mbz_artist_ids)
        .map(|id| id.to_string())
        .unwrap_or_default();
    a
}

/// Adds an album-artist fold to the track-artist fold of the same id.
///
/// Songs are already counted on `artist`, so only size, genres and a missing
/// MusicBrainz id are taken over.
pub fn merge_album_artist(artist: &mut Artist, album_artist: Artist) {
    artist.size = artist.size.saturating_add(album_artist.size);
    artist.genres.extend(album_artist.genres);
    dedup_genres(&mut artist.genres);
    if artist.mbz_artist_id.is_empty() {
        artist.mbz_artist_id = album_artist.mbz_artist_id;
    }
}

/// Sorted, deduplicated directories of the given tracks.
pub fn dirs<'a, I>(tracks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Track>,
{
    let mut dirs: Vec<String> = tracks.into_iter().map(Track::dir).collect();
    dirs.sort_unstable();
    dirs.dedup();
    dirs
}

fn fold_order(tracks: &[Track], order: FoldOrder) -> Vec<&Track> {
    let mut ordered: Vec<&Track> = tracks.iter().collect();
    if order == FoldOrder::TrackId {
        ordered.sort_by(|a, b| a.id.cmp(&b.id));
    }
    ordered
}

fn copy_album_fields(al: &mut Album, track: &Track) {
    al.id = track.album_id.clone();
    al.name = track.album.clone();
    al.artist = track.artist.clone();
    al.artist_id = track.artist_id.clone();
    al.album_artist = track.album_artist.clone();
    al.album_artist_id = track.album_artist_id.clone();
    al.sort_album_name = track.sort_album_name.clone();
    al.sort_artist_name = track.sort_artist_name.clone();
    al.sort_album_artist_name = track.sort_album_artist_name.clone();
    al.order_album_name = track.order_album_name.clone();
    al.order_album_artist_name = track.order_album_artist_name.clone();
    al.mbz_album_artist_id = track.mbz_album_artist_id.clone();
    al.mbz_album_type = track.mbz_album_type.clone();
    al.mbz_album_comment = track.mbz_album_comment.clone();
    al.catalog_num = track.catalog_num.clone();
    al.compilation = track.compilation;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{various_artists_id, Genre, VARIOUS_ARTISTS};
    use time::OffsetDateTime;

    fn track(id: &str, path: &str) -> Track {
        Track {
            id: id.to_string(),
            path: path.to_string(),
            album_id: "al-1".to_string(),
            album: "Blue Train".to_string(),
            artist_id: "ar-1".to_string(),
            artist: "John Coltrane".to_string(),
            album_artist_id: "ar-1".to_string(),
            album_artist: "John Coltrane".to_string(),
            suffix: "flac".to_string(),
            ..Default::default()
        }
    }

    fn at(secs: i64) -> Option<OffsetDateTime> {
        Some(OffsetDateTime::from_unix_timestamp(secs).unwrap())
    }

    #[test]
    fn counts_and_sums_every_track() {
        let mut tracks = vec![
            track("t1", "jazz/Blue Train/01.flac"),
            track("t2", "jazz/Blue Train/02.flac"),
            track("t3", "jazz/Blue Train/03.flac"),
        ];
        for (i, t) in tracks.iter_mut().enumerate() {
            t.duration = 100.0 + i as f32;
            t.size = 1_000 * (i as u64 + 1);
        }

        let album = to_album(&tracks);
        assert_eq!(album.id, "al-1");
        assert_eq!(album.song_count, 3);
        assert_eq!(album.duration, 303.0);
        assert_eq!(album.size, 6_000);
    }

    #[test]
    fn years_and_dates_are_reconciled() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        tracks[0].year = 0;
        tracks[1].year = 1990;
        tracks[2].year = 1985;
        tracks[0].original_year = 1957;
        tracks[1].original_year = 1957;
        for t in tracks.iter_mut() {
            t.date = "1990-05-01".to_string();
        }
        tracks[0].release_date = "1990".to_string();
        tracks[1].release_date = "1991".to_string();
        tracks[2].release_date = "1990".to_string();
        tracks[2].comment = "remaster".to_string();

        let album = to_album(&tracks);
        assert_eq!((album.min_year, album.max_year), (1985, 1990));
        assert_eq!((album.min_original_year, album.max_original_year), (1957, 1957));
        assert_eq!(album.date, "1990-05-01");
        assert_eq!(album.release_date, "");
        assert_eq!(album.releases, 2);
        assert_eq!(album.comment, "");
    }

    #[test]
    fn agreeing_dates_and_comment_carry_over() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        for t in tracks.iter_mut() {
            t.original_date = "1957-09-15".to_string();
            t.release_date = "2003-01-28".to_string();
            t.comment = "RVG edition".to_string();
        }

        let album = to_album(&tracks);
        assert_eq!(album.original_date, "1957-09-15");
        assert_eq!(album.release_date, "2003-01-28");
        assert_eq!(album.releases, 1);
        assert_eq!(album.comment, "RVG edition");
    }

    #[test]
    fn timestamps_span_the_batch() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        tracks[0].created_at = None;
        tracks[1].created_at = at(200);
        tracks[2].created_at = at(100);
        tracks[0].updated_at = at(50);
        tracks[1].updated_at = at(500);
        tracks[2].updated_at = None;

        let album = to_album(&tracks);
        assert_eq!(album.created_at, at(100));
        assert_eq!(album.updated_at, at(500));
    }

    #[test]
    fn genres_are_deduplicated_and_ranked() {
        let names = ["Rock", "Pop", "Rock", "Jazz", "Pop", "Pop"];
        let tracks: Vec<Track> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut t = track(&format!("t{}", i), "a/x.flac");
                t.genres = vec![Genre::new(name)];
                t
            })
            .collect();

        let album = to_album(&tracks);
        assert_eq!(album.genre, "Pop");
        assert_eq!(album.genres.len(), 3);
        assert!(album.genres.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn paths_and_artist_ids_are_joined() {
        let mut tracks = vec![
            track("t1", "a/Blue Train/CD2/01.flac"),
            track("t2", "a/Blue Train/CD1/01.flac"),
            track("t3", "a/Blue Train/CD1/02.flac"),
        ];
        tracks[0].all_artist_ids = "ar-2 ar-1".to_string();
        tracks[1].all_artist_ids = "ar-1".to_string();
        tracks[2].all_artist_ids = "ar-3 ar-1".to_string();

        let album = to_album(&tracks);
        assert_eq!(
            album.paths,
            format!("a/Blue Train/CD1{}a/Blue Train/CD2", ZWSP)
        );
        assert_eq!(album.all_artist_ids, "ar-1 ar-2 ar-3");
    }

    #[test]
    fn paths_differing_in_separators_collapse() {
        let tracks = vec![track("t1", "a//Blue Train/01.flac"), track("t2", "a/Blue Train/./02.flac")];
        assert_eq!(to_album(&tracks).paths, "a/Blue Train");
    }

    #[test]
    fn full_text_uses_names_not_sort_names() {
        let mut tracks = vec![track("t1", "a/1.flac")];
        tracks[0].artist = "Alice · Bob".to_string();
        tracks[0].album_artist = "Alice".to_string();
        tracks[0].album = "Café Songs".to_string();
        tracks[0].disc_subtitle = "Side A".to_string();
        tracks[0].sort_album_name = "Zzz Sortonly".to_string();

        let album = to_album(&tracks);
        assert_eq!(album.full_text, " a alice bob cafe side songs");
    }

    #[test]
    fn embed_art_comes_from_first_track_with_cover() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        tracks[1].has_cover_art = true;
        tracks[2].has_cover_art = true;

        assert_eq!(to_album(&tracks).embed_art_path, "a/2.flac");
    }

    #[test]
    fn mbz_album_id_is_most_frequent() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        tracks[0].mbz_album_id = "m-1".to_string();
        tracks[1].mbz_album_id = "m-2".to_string();
        tracks[2].mbz_album_id = "m-2".to_string();

        assert_eq!(to_album(&tracks).mbz_album_id, "m-2");
    }

    #[test]
    fn album_artist_defaults_to_track_artist() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac")];
        for t in tracks.iter_mut() {
            t.album_artist_id.clear();
            t.album_artist.clear();
        }

        let album = to_album(&tracks);
        assert_eq!(album.album_artist_id, "ar-1");
        assert_eq!(album.album_artist, "John Coltrane");
    }

    #[test]
    fn mixed_compilation_is_various_artists() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        for t in tracks.iter_mut() {
            t.compilation = true;
        }
        tracks[2].album_artist_id = "ar-9".to_string();

        let album = to_album(&tracks);
        assert_eq!(album.album_artist, VARIOUS_ARTISTS);
        assert_eq!(album.album_artist_id, various_artists_id());
    }

    #[test]
    fn copy_through_follows_fold_order() {
        let mut tracks = vec![track("t2", "a/2.flac"), track("t1", "a/1.flac")];
        tracks[0].catalog_num = "CAT-2".to_string();
        tracks[1].catalog_num = "CAT-1".to_string();

        assert_eq!(to_album(&tracks).catalog_num, "CAT-1");
        assert_eq!(to_album_with(&tracks, FoldOrder::TrackId).catalog_num, "CAT-2");

        let reversed: Vec<Track> = tracks.iter().rev().cloned().collect();
        assert_eq!(
            to_album_with(&tracks, FoldOrder::TrackId),
            to_album_with(&reversed, FoldOrder::TrackId)
        );
    }

    #[test]
    fn album_is_idempotent() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "b/2.flac")];
        tracks[0].genres = vec![Genre::new("Jazz")];
        tracks[1].created_at = at(10);
        assert_eq!(to_album(&tracks), to_album(&tracks));
    }

    #[test]
    fn artist_name_keeps_first_credit() {
        let mut tracks = vec![track("t1", "a/1.flac")];
        tracks[0].artist = "Alice · Bob".to_string();
        assert_eq!(to_artist(&tracks).name, "Alice");
    }

    #[test]
    fn artist_size_skips_own_album_tracks() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "b/2.flac")];
        tracks[0].size = 100;
        tracks[1].size = 40;
        tracks[1].album_artist_id = "ar-9".to_string();

        let artist = to_artist(&tracks);
        assert_eq!(artist.song_count, 2);
        assert_eq!(artist.size, 40);
    }

    #[test]
    fn artist_genres_and_mbz_id() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac"), track("t3", "a/3.flac")];
        tracks[0].genres = vec![Genre::new("Jazz"), Genre::new("Bop")];
        tracks[1].genres = vec![Genre::new("Jazz")];
        tracks[0].mbz_artist_id = "mb-a".to_string();
        tracks[1].mbz_artist_id = "mb-b".to_string();
        tracks[2].mbz_artist_id = "mb-b".to_string();

        let artist = to_artist(&tracks);
        assert_eq!(artist.id, "ar-1");
        assert_eq!(artist.genres.len(), 2);
        assert_eq!(artist.mbz_artist_id, "mb-b");
        assert_eq!(to_artist(&tracks), artist);
    }

    #[test]
    fn album_artist_counts_whole_albums() {
        let mut first = to_album(&[track("t1", "a/1.flac"), track("t2", "a/2.flac")]);
        first.size = 300;
        first.genres = vec![Genre::new("Jazz")];
        first.mbz_album_artist_id = "mb-coltrane".to_string();
        let mut second = to_album(&[track("t3", "b/1.flac")]);
        second.size = 200;
        second.genres = vec![Genre::new("Bop"), Genre::new("jazz")];

        let artist = to_album_artist([&first, &second]);
        assert_eq!(artist.id, "ar-1");
        assert_eq!(artist.name, "John Coltrane");
        assert_eq!(artist.song_count, 3);
        assert_eq!(artist.size, 500);
        assert_eq!(artist.genres.len(), 2);
        assert_eq!(artist.mbz_artist_id, "mb-coltrane");
    }

    #[test]
    fn merge_adds_album_size_to_track_artist() {
        let mut tracks = vec![track("t1", "a/1.flac"), track("t2", "a/2.flac")];
        tracks[0].size = 600;
        tracks[1].size = 400;
        let album = to_album(&tracks);

        let mut artist = to_artist(&tracks);
        assert_eq!(artist.size, 0);
        merge_album_artist(&mut artist, to_album_artist([&album]));
        assert_eq!(artist.size, 1_000);
        assert_eq!(artist.song_count, 2);
    }

    #[test]
    fn empty_batch_gives_empty_aggregates() {
        let album = to_album(&[]);
        assert_eq!(album.song_count, 0);
        assert_eq!(album.full_text, " ");
        assert_eq!(to_artist(&[]).song_count, 0);
        assert_eq!(to_album_artist(Vec::<&Album>::new()), Artist::default());
    }
}
