use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use catalog::sanitize_strings;
use common::{parent_dir, Album, Artist, Track};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StoreError;
use crate::{decode_value, encode_value, id_from_bytes, name_key, prefix_end, split_key_last};

type Definition = TableDefinition<'static, &'static str, &'static [u8]>;

pub(crate) const TRACKS_TABLE: Definition = TableDefinition::new("tracks");
pub(crate) const TRACKS_BY_NAME_TABLE: Definition = TableDefinition::new("tracks_by_name");
pub(crate) const TRACKS_BY_PATH_TABLE: Definition = TableDefinition::new("tracks_by_path");
pub(crate) const ALBUMS_TABLE: Definition = TableDefinition::new("albums");
pub(crate) const ALBUMS_BY_NAME_TABLE: Definition = TableDefinition::new("albums_by_name");
pub(crate) const ARTISTS_TABLE: Definition = TableDefinition::new("artists");
pub(crate) const ARTISTS_BY_NAME_TABLE: Definition = TableDefinition::new("artists_by_name");

/// A value type the catalog stores, with the tables that hold it.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: Definition;
    const BY_NAME_TABLE: Definition;
    const BY_PATH_TABLE: Option<Definition> = None;

    fn id(&self) -> &str;

    /// Lowercased key used for listing order.
    fn sort_name(&self) -> String;

    /// Sanitized words, each preceded by a space, matched by [`Repository::search`].
    fn search_text(&self) -> String;

    fn path(&self) -> Option<&str> {
        None
    }
}

impl Record for Track {
    const TABLE: Definition = TRACKS_TABLE;
    const BY_NAME_TABLE: Definition = TRACKS_BY_NAME_TABLE;
    const BY_PATH_TABLE: Option<Definition> = Some(TRACKS_BY_PATH_TABLE);

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_name(&self) -> String {
        sort_key(&self.order_title, &self.title)
    }

    fn search_text(&self) -> String {
        if !self.full_text.trim().is_empty() {
            return self.full_text.clone();
        }
        format!(
            " {}",
            sanitize_strings([&self.title, &self.album, &self.artist, &self.album_artist])
        )
    }

    fn path(&self) -> Option<&str> {
        if self.path.is_empty() {
            None
        } else {
            Some(&self.path)
        }
    }
}

impl Record for Album {
    const TABLE: Definition = ALBUMS_TABLE;
    const BY_NAME_TABLE: Definition = ALBUMS_BY_NAME_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_name(&self) -> String {
        sort_key(&self.order_album_name, &self.name)
    }

    fn search_text(&self) -> String {
        if !self.full_text.trim().is_empty() {
            return self.full_text.clone();
        }
        format!(" {}", sanitize_strings([&self.name, &self.album_artist]))
    }
}

impl Record for Artist {
    const TABLE: Definition = ARTISTS_TABLE;
    const BY_NAME_TABLE: Definition = ARTISTS_BY_NAME_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_name(&self) -> String {
        sort_key(&self.order_artist_name, &self.name)
    }

    fn search_text(&self) -> String {
        format!(" {}", sanitize_strings([&self.name]))
    }
}

#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub offset: usize,
    pub max: Option<usize>,
    pub descending: bool,
}

/// Id-keyed storage for one record type.
pub trait Repository<T> {
    fn count_all(&self) -> Result<u64, StoreError>;
    fn exists(&self, id: &str) -> Result<bool, StoreError>;
    /// Inserts or replaces the record with the same id.
    fn put(&self, record: &T) -> Result<(), StoreError>;
    fn get(&self, id: &str) -> Result<Option<T>, StoreError>;
    /// Records ordered by sort name.
    fn get_all(&self, options: &QueryOptions) -> Result<Vec<T>, StoreError>;
    /// Records whose search text has a word starting with every query word.
    fn search(&self, query: &str, offset: usize, size: usize) -> Result<Vec<T>, StoreError>;
    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Path lookups the scanner uses to reconcile the catalog with the disk.
///
/// None of these touch annotations.
pub trait TrackRepository: Repository<Track> {
    /// Tracks directly inside `dir`, not in its subdirectories.
    fn find_all_by_path(&self, dir: &str) -> Result<Vec<Track>, StoreError>;
    fn find_by_path(&self, path: &str) -> Result<Option<Track>, StoreError>;
    /// Every directory at or below `base_path` that holds a track.
    fn find_paths_recursively(&self, base_path: &str) -> Result<Vec<String>, StoreError>;
    /// Removes `path` itself and everything below it; returns the number removed.
    fn delete_by_path(&self, path: &str) -> Result<usize, StoreError>;
}

pub struct Records<T> {
    db: Arc<Database>,
    marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Records<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            marker: PhantomData,
        }
    }
}

impl<T> Records<T> {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            marker: PhantomData,
        }
    }
}

impl<T: Record> Records<T> {
    fn ids_by_name(&self, descending: bool) -> Result<Vec<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn.open_table(T::BY_NAME_TABLE)?;
        let mut ids = Vec::new();
        for entry in names.iter()? {
            let entry = entry?;
            let (_, id) = split_key_last(entry.0.value())?;
            ids.push(id.to_string());
        }
        if descending {
            ids.reverse();
        }
        Ok(ids)
    }
}

impl<T: Record> Repository<T> for Records<T> {
    fn count_all(&self) -> Result<u64, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        Ok(table.len()?)
    }

    fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        let found = table.get(id)?.is_some();
        Ok(found)
    }

    fn put(&self, record: &T) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        insert_record(&write_txn, record)?;
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        let record = match table.get(id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn get_all(&self, options: &QueryOptions) -> Result<Vec<T>, StoreError> {
        let ids = self.ids_by_name(options.descending)?;
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;

        let mut items = Vec::new();
        for id in ids
            .iter()
            .skip(options.offset)
            .take(options.max.unwrap_or(usize::MAX))
        {
            if let Some(value) = table.get(id.as_str())? {
                items.push(decode_value(value.value())?);
            }
        }
        Ok(items)
    }

    fn search(&self, query: &str, offset: usize, size: usize) -> Result<Vec<T>, StoreError> {
        let words: Vec<String> = sanitize_strings([query])
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(|word| format!(" {}", word))
            .collect();
        if words.is_empty() {
            let options = QueryOptions {
                offset,
                max: Some(size),
                descending: false,
            };
            return self.get_all(&options);
        }

        let ids = self.ids_by_name(false)?;
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;

        let mut matched = 0usize;
        let mut items = Vec::new();
        for id in &ids {
            if items.len() >= size {
                break;
            }
            let record: T = match table.get(id.as_str())? {
                Some(value) => decode_value(value.value())?,
                None => continue,
            };
            let text = record.search_text();
            if !words.iter().all(|word| text.contains(word.as_str())) {
                continue;
            }
            matched += 1;
            if matched <= offset {
                continue;
            }
            items.push(record);
        }
        Ok(items)
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let removed = remove_record::<T>(&write_txn, id)?.is_some();
        write_txn.commit()?;
        Ok(removed)
    }
}

impl TrackRepository for Records<Track> {
    fn find_all_by_path(&self, dir: &str) -> Result<Vec<Track>, StoreError> {
        let prefix = dir_prefix(dir);
        let end = prefix_end(&prefix);
        let read_txn = self.db.begin_read()?;
        let paths = read_txn.open_table(TRACKS_BY_PATH_TABLE)?;
        let table = read_txn.open_table(TRACKS_TABLE)?;

        let mut tracks = Vec::new();
        for entry in paths.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            let rest = &entry.0.value()[prefix.len()..];
            if rest.contains('/') {
                continue;
            }
            let id = id_from_bytes(entry.1.value())?;
            if let Some(value) = table.get(id)? {
                tracks.push(decode_value(value.value())?);
            }
        }
        Ok(tracks)
    }

    fn find_by_path(&self, path: &str) -> Result<Option<Track>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let paths = read_txn.open_table(TRACKS_BY_PATH_TABLE)?;
        let table = read_txn.open_table(TRACKS_TABLE)?;

        let id = match paths.get(path)? {
            Some(value) => id_from_bytes(value.value())?.to_string(),
            None => return Ok(None),
        };
        let track = match table.get(id.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    fn find_paths_recursively(&self, base_path: &str) -> Result<Vec<String>, StoreError> {
        let prefix = dir_prefix(base_path);
        let end = prefix_end(&prefix);
        let read_txn = self.db.begin_read()?;
        let paths = read_txn.open_table(TRACKS_BY_PATH_TABLE)?;

        let mut dirs = BTreeSet::new();
        for entry in paths.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            dirs.insert(parent_dir(entry.0.value()));
        }
        Ok(dirs.into_iter().collect())
    }

    fn delete_by_path(&self, path: &str) -> Result<usize, StoreError> {
        let prefix = dir_prefix(path);
        let end = prefix_end(&prefix);
        let write_txn = self.db.begin_write()?;

        let mut ids = Vec::new();
        {
            let paths = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            if let Some(value) = paths.get(path)? {
                ids.push(id_from_bytes(value.value())?.to_string());
            }
            for entry in paths.range(prefix.as_str()..end.as_str())? {
                let entry = entry?;
                ids.push(id_from_bytes(entry.1.value())?.to_string());
            }
        }

        let mut removed = 0usize;
        for id in &ids {
            if remove_record::<Track>(&write_txn, id)?.is_some() {
                removed += 1;
            }
        }
        write_txn.commit()?;
        Ok(removed)
    }
}

pub(crate) fn insert_record<T: Record>(
    txn: &WriteTransaction,
    record: &T,
) -> Result<(), StoreError> {
    let id = record.id();
    remove_record::<T>(txn, id)?;

    {
        let mut table = txn.open_table(T::TABLE)?;
        let bytes = encode_value(record)?;
        table.insert(id, bytes.as_slice())?;
    }
    {
        let mut names = txn.open_table(T::BY_NAME_TABLE)?;
        let key = name_key(&record.sort_name(), id);
        names.insert(key.as_str(), id.as_bytes())?;
    }
    if let (Some(definition), Some(path)) = (T::BY_PATH_TABLE, record.path()) {
        let mut paths = txn.open_table(definition)?;
        let moved = match paths.insert(path, id.as_bytes())? {
            Some(previous) => previous.value() != id.as_bytes(),
            None => false,
        };
        if moved {
            warn!("Path {:?} moved to record {}", path, id);
        }
    }
    Ok(())
}

pub(crate) fn remove_record<T: Record>(
    txn: &WriteTransaction,
    id: &str,
) -> Result<Option<T>, StoreError> {
    let mut table = txn.open_table(T::TABLE)?;
    let previous: Option<T> = match table.remove(id)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    drop(table);

    let Some(record) = previous else {
        return Ok(None);
    };

    {
        let mut names = txn.open_table(T::BY_NAME_TABLE)?;
        let key = name_key(&record.sort_name(), id);
        names.remove(key.as_str())?;
    }
    if let (Some(definition), Some(path)) = (T::BY_PATH_TABLE, record.path()) {
        let mut paths = txn.open_table(definition)?;
        let owned = match paths.get(path)? {
            Some(value) => value.value() == id.as_bytes(),
            None => false,
        };
        if owned {
            paths.remove(path)?;
        }
    }
    Ok(Some(record))
}

/// Writes `records` into freshly emptied tables.
pub(crate) fn replace_all<T: Record>(
    txn: &WriteTransaction,
    records: &[T],
) -> Result<(), StoreError> {
    crate::clear_table(txn, T::TABLE)?;
    crate::clear_table(txn, T::BY_NAME_TABLE)?;
    if let Some(definition) = T::BY_PATH_TABLE {
        crate::clear_table(txn, definition)?;
    }
    for record in records {
        insert_record(txn, record)?;
    }
    Ok(())
}

fn sort_key(order_name: &str, name: &str) -> String {
    if order_name.trim().is_empty() {
        name.trim().to_lowercase()
    } else {
        order_name.trim().to_lowercase()
    }
}

fn dir_prefix(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Catalog;

    fn open() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("catalog.redb")).unwrap();
        (dir, catalog)
    }

    fn track(id: &str, path: &str, title: &str) -> Track {
        Track {
            id: id.to_string(),
            path: path.to_string(),
            title: title.to_string(),
            album: "Sessions".to_string(),
            artist: "Miles Davis".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn put_get_exists_delete() {
        let (_dir, catalog) = open();
        let tracks = catalog.tracks();
        let t = track("t1", "jazz/Kind of Blue/01.flac", "So What");

        tracks.put(&t).unwrap();
        assert!(tracks.exists("t1").unwrap());
        assert_eq!(tracks.get("t1").unwrap(), Some(t));
        assert_eq!(tracks.count_all().unwrap(), 1);

        assert!(tracks.delete("t1").unwrap());
        assert!(!tracks.delete("t1").unwrap());
        assert_eq!(tracks.get("t1").unwrap(), None);
        assert_eq!(tracks.count_all().unwrap(), 0);
        assert_eq!(tracks.find_by_path("jazz/Kind of Blue/01.flac").unwrap(), None);
    }

    #[test]
    fn put_replaces_name_and_path_entries() {
        let (_dir, catalog) = open();
        let tracks = catalog.tracks();
        tracks.put(&track("t1", "a/01.flac", "Zebra")).unwrap();
        tracks.put(&track("t1", "b/01.flac", "Apple")).unwrap();

        let all = tracks.get_all(&QueryOptions::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Apple");
        assert_eq!(tracks.find_by_path("a/01.flac").unwrap(), None);
        assert!(tracks.find_by_path("b/01.flac").unwrap().is_some());
    }

    #[test]
    fn get_all_orders_and_pages() {
        let (_dir, catalog) = open();
        let tracks = catalog.tracks();
        for (id, title) in [("t1", "Blue in Green"), ("t2", "All Blues"), ("t3", "So What")] {
            tracks.put(&track(id, &format!("a/{}.flac", id), title)).unwrap();
        }

        let titles = |options: QueryOptions| -> Vec<String> {
            tracks
                .get_all(&options)
                .unwrap()
                .into_iter()
                .map(|t| t.title)
                .collect()
        };
        assert_eq!(titles(QueryOptions::default()), vec!["All Blues", "Blue in Green", "So What"]);
        assert_eq!(
            titles(QueryOptions {
                offset: 1,
                max: Some(1),
                descending: false
            }),
            vec!["Blue in Green"]
        );
        assert_eq!(
            titles(QueryOptions {
                descending: true,
                ..Default::default()
            })[0],
            "So What"
        );
    }

    #[test]
    fn search_matches_word_prefixes() {
        let (_dir, catalog) = open();
        let tracks = catalog.tracks();
        tracks.put(&track("t1", "a/1.flac", "Blue in Green")).unwrap();
        tracks.put(&track("t2", "a/2.flac", "All Blues")).unwrap();
        tracks.put(&track("t3", "a/3.flac", "So What")).unwrap();

        let found = tracks.search("blu", 0, 10).unwrap();
        assert_eq!(found.len(), 2);
        let found = tracks.search("BLUE green", 0, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "t1");
        assert!(tracks.search("lue", 0, 10).unwrap().is_empty());
        assert_eq!(tracks.search("miles", 1, 1).unwrap().len(), 1);
        assert_eq!(tracks.search("", 0, 2).unwrap().len(), 2);
    }

    #[test]
    fn path_queries() {
        let (_dir, catalog) = open();
        let tracks = catalog.tracks();
        tracks.put(&track("t1", "jazz/Miles/Kind of Blue/01.flac", "So What")).unwrap();
        tracks.put(&track("t2", "jazz/Miles/Kind of Blue/02.flac", "Freddie")).unwrap();
        tracks.put(&track("t3", "jazz/Miles/Kind of Blue/CD2/01.flac", "Bonus")).unwrap();
        tracks.put(&track("t4", "jazz/Coltrane/Blue Train/01.flac", "Blue Train")).unwrap();
        tracks.put(&track("t5", "jazzfunk/01.flac", "Other")).unwrap();

        let direct = tracks.find_all_by_path("jazz/Miles/Kind of Blue/").unwrap();
        let mut ids: Vec<String> = direct.into_iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["t1", "t2"]);

        assert_eq!(
            tracks.find_paths_recursively("jazz").unwrap(),
            vec![
                "jazz/Coltrane/Blue Train".to_string(),
                "jazz/Miles/Kind of Blue".to_string(),
                "jazz/Miles/Kind of Blue/CD2".to_string(),
            ]
        );

        assert_eq!(tracks.delete_by_path("jazz/Miles").unwrap(), 3);
        assert_eq!(tracks.count_all().unwrap(), 2);
        assert!(tracks.find_by_path("jazzfunk/01.flac").unwrap().is_some());
        assert_eq!(tracks.delete_by_path("jazzfunk/01.flac").unwrap(), 1);
    }

    #[test]
    fn albums_and_artists_use_the_same_contract() {
        let (_dir, catalog) = open();
        let album = Album {
            id: "al-1".to_string(),
            name: "Kind of Blue".to_string(),
            full_text: " blue davis kind miles of".to_string(),
            ..Default::default()
        };
        let artist = Artist {
            id: "ar-1".to_string(),
            name: "Miles Davis".to_string(),
            ..Default::default()
        };
        catalog.albums().put(&album).unwrap();
        catalog.artists().put(&artist).unwrap();

        assert_eq!(catalog.albums().search("kind miles", 0, 5).unwrap(), vec![album]);
        assert_eq!(catalog.artists().search("dav", 0, 5).unwrap(), vec![artist]);
    }
}
