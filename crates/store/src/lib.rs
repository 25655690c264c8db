//! redb-backed persistence for the catalog: tracks, albums, artists and
//! per-user annotations, plus the YAML configuration that points at them.

mod annotation;
mod config;
mod error;
mod records;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use catalog::{
    group_by_album, group_by_artist, merge_album_artist, to_album_artist, FoldOrder,
};
use common::{Album, Artist, Track};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use annotation::{Annotation, AnnotationStore, ItemType};
pub use config::{
    config_path_from_env, load_or_create_config, resolve_path, save_config, CatalogConfig,
    ConfigError, CONFIG_VERSION,
};
pub use error::StoreError;
pub use records::{QueryOptions, Record, Records, Repository, TrackRepository};

use records::{
    insert_record, replace_all, ALBUMS_BY_NAME_TABLE, ALBUMS_TABLE, ARTISTS_BY_NAME_TABLE,
    ARTISTS_TABLE, TRACKS_BY_NAME_TABLE, TRACKS_BY_PATH_TABLE, TRACKS_TABLE,
};

const INDEX_VERSION: u32 = 2;
const KEY_SEP: char = '\x1f';

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const META_VERSION_KEY: &str = "version";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshStats {
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
}

#[derive(Clone)]
pub struct Catalog {
    db: Arc<Database>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = open_or_create_db(path)?;
        let catalog = Self::with_db(Arc::new(db))?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    pub fn with_db(db: Arc<Database>) -> Result<Self, StoreError> {
        let catalog = Self { db };
        catalog.init_tables()?;
        Ok(catalog)
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    pub fn tracks(&self) -> Records<Track> {
        Records::new(Arc::clone(&self.db))
    }

    pub fn albums(&self) -> Records<Album> {
        Records::new(Arc::clone(&self.db))
    }

    pub fn artists(&self) -> Records<Artist> {
        Records::new(Arc::clone(&self.db))
    }

    pub fn annotations(&self) -> AnnotationStore {
        AnnotationStore::new(Arc::clone(&self.db))
    }

    /// Stores a scanned batch in a single transaction.
    pub fn put_tracks(&self, tracks: &[Track]) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write()?;
        for track in tracks {
            insert_record(&write_txn, track)?;
        }
        write_txn.commit()?;
        Ok(tracks.len())
    }

    /// Rebuilds every album and artist from the stored tracks.
    ///
    /// Album artists get the full size of their albums on top of their track
    /// credits, and get a row of their own when no track credits them.
    ///
    /// Both tables are replaced in one transaction, so readers see either the
    /// old aggregates or the new ones. Annotations are left alone.
    pub fn refresh_aggregates(&self, order: FoldOrder) -> Result<RefreshStats, StoreError> {
        let tracks = self.all_tracks()?;
        let track_count = tracks.len();

        let album_batches = group_by_album(tracks.iter().cloned());
        let artist_batches = group_by_artist(tracks);

        let mut skipped = 0usize;
        let mut albums = Vec::with_capacity(album_batches.len());
        for (key, batch) in &album_batches {
            if key.is_empty() {
                skipped += batch.len();
                continue;
            }
            albums.push(batch.to_album(order));
        }
        let mut artists: BTreeMap<String, Artist> = BTreeMap::new();
        for (key, batch) in &artist_batches {
            if key.is_empty() {
                skipped += batch.len();
                continue;
            }
            artists.insert(key.clone(), batch.to_artist(order));
        }
        if skipped > 0 {
            warn!("Skipped {} track entries without album or artist id", skipped);
        }

        let mut by_album_artist: BTreeMap<&str, Vec<&Album>> = BTreeMap::new();
        for album in &albums {
            if !album.album_artist_id.is_empty() {
                by_album_artist
                    .entry(album.album_artist_id.as_str())
                    .or_default()
                    .push(album);
            }
        }
        for (id, group) in by_album_artist {
            let album_artist = to_album_artist(group);
            match artists.get_mut(id) {
                Some(artist) => merge_album_artist(artist, album_artist),
                None => {
                    artists.insert(id.to_string(), album_artist);
                }
            }
        }
        let artists: Vec<Artist> = artists.into_values().collect();

        let write_txn = self.db.begin_write()?;
        replace_all(&write_txn, &albums)?;
        replace_all(&write_txn, &artists)?;
        write_txn.commit()?;

        let stats = RefreshStats {
            tracks: track_count,
            albums: albums.len(),
            artists: artists.len(),
        };
        info!(
            "Refreshed {} albums and {} artists from {} tracks",
            stats.albums, stats.artists, stats.tracks
        );
        Ok(stats)
    }

    fn all_tracks(&self) -> Result<Vec<Track>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let mut tracks = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            tracks.push(decode_value(entry.1.value())?);
        }
        Ok(tracks)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;

        let version: Option<u32> = {
            let meta = write_txn.open_table(META_TABLE)?;
            let version = match meta.get(META_VERSION_KEY)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            version
        };
        match version {
            Some(version) if version == INDEX_VERSION => {}
            Some(version) => {
                warn!("Index version mismatch ({}); dropping aggregates", version);
                clear_table(&write_txn, ALBUMS_TABLE)?;
                clear_table(&write_txn, ALBUMS_BY_NAME_TABLE)?;
                clear_table(&write_txn, ARTISTS_TABLE)?;
                clear_table(&write_txn, ARTISTS_BY_NAME_TABLE)?;
                let rebuilt = annotation::rebuild_indexes(&write_txn)?;
                info!("Rebuilt annotation indexes for {} entries", rebuilt);
            }
            None => info!("Creating catalog index"),
        }

        {
            let _ = write_txn.open_table(TRACKS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            annotation::init_tables(&write_txn)?;

            let mut meta = write_txn.open_table(META_TABLE)?;
            let version_bytes = encode_value(&INDEX_VERSION)?;
            meta.insert(META_VERSION_KEY, version_bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

pub(crate) fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), StoreError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn name_key(name: &str, id: &str) -> String {
    let mut out = String::new();
    out.push_str(name);
    out.push(KEY_SEP);
    out.push_str(id);
    out
}

pub(crate) fn prefix_end(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 4);
    out.push_str(prefix);
    out.push('\u{10ffff}');
    out
}

pub(crate) fn split_key_last(value: &str) -> Result<(&str, &str), StoreError> {
    let idx = value
        .rfind(KEY_SEP)
        .ok_or_else(|| StoreError::KeyParse(value.to_string()))?;
    let next = idx + KEY_SEP.len_utf8();
    Ok((&value[..idx], &value[next..]))
}

pub(crate) fn id_from_bytes(bytes: &[u8]) -> Result<&str, StoreError> {
    std::str::from_utf8(bytes).map_err(|err| StoreError::KeyParse(err.to_string()))
}
