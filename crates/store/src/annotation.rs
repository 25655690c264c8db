use std::sync::Arc;

use catalog::newer;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::StoreError;
use crate::{decode_value, encode_value, prefix_end, split_key_last, KEY_SEP};

const ANNOTATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("annotations");
const ANNOTATIONS_BY_PLAY_COUNT_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("annotations_by_play_count");
const ANNOTATIONS_BY_PLAY_DATE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("annotations_by_play_date");
const ANNOTATIONS_BY_RATING_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("annotations_by_rating");
const ANNOTATIONS_BY_STARRED_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("annotations_by_starred");

/// Secondary tables and the sort value each one orders by. An annotation
/// without a value for a table is left out of it.
const INDEXES: [(TableDefinition<&str, &[u8]>, fn(&Annotation) -> Option<String>); 4] = [
    (ANNOTATIONS_BY_PLAY_COUNT_TABLE, play_count_value),
    (ANNOTATIONS_BY_PLAY_DATE_TABLE, play_date_value),
    (ANNOTATIONS_BY_RATING_TABLE, rating_value),
    (ANNOTATIONS_BY_STARRED_TABLE, starred_value),
];

const MAX_RATING: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Track,
    Album,
    Artist,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Track => "track",
            ItemType::Album => "album",
            ItemType::Artist => "artist",
        }
    }
}

/// What one user has recorded about one catalog item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub user_id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub play_count: u64,
    pub play_date: Option<OffsetDateTime>,
    pub rating: u8,
    pub starred: bool,
    pub starred_at: Option<OffsetDateTime>,
}

impl Annotation {
    fn new(user_id: &str, item_type: ItemType, item_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            item_type,
            play_count: 0,
            play_date: None,
            rating: 0,
            starred: false,
            starred_at: None,
        }
    }
}

/// Per-user play counts, ratings and stars.
///
/// Stored apart from the catalog tables, so rescans and path deletes leave
/// it untouched.
#[derive(Clone)]
pub struct AnnotationStore {
    db: Arc<Database>,
}

impl AnnotationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(
        &self,
        user_id: &str,
        item_type: ItemType,
        item_id: &str,
    ) -> Result<Option<Annotation>, StoreError> {
        let key = annotation_key(user_id, item_type, item_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ANNOTATIONS_TABLE)?;
        let annotation = match table.get(key.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(annotation)
    }

    /// Counts one play; the play date only moves forward.
    pub fn play(
        &self,
        user_id: &str,
        item_type: ItemType,
        item_id: &str,
        at: OffsetDateTime,
    ) -> Result<Annotation, StoreError> {
        self.update(user_id, item_type, item_id, |annotation| {
            annotation.play_count = annotation.play_count.saturating_add(1);
            annotation.play_date = newer(annotation.play_date, Some(at));
        })
    }

    /// Stores `rating`, capped at 5. Zero clears it.
    pub fn set_rating(
        &self,
        user_id: &str,
        item_type: ItemType,
        item_id: &str,
        rating: u8,
    ) -> Result<Annotation, StoreError> {
        if rating > MAX_RATING {
            debug!("Clamping rating {} for {} to {}", rating, item_id, MAX_RATING);
        }
        self.update(user_id, item_type, item_id, |annotation| {
            annotation.rating = rating.min(MAX_RATING);
        })
    }

    pub fn set_starred(
        &self,
        user_id: &str,
        item_type: ItemType,
        item_id: &str,
        starred: bool,
        at: OffsetDateTime,
    ) -> Result<Annotation, StoreError> {
        self.update(user_id, item_type, item_id, |annotation| {
            annotation.starred = starred;
            annotation.starred_at = if starred { Some(at) } else { None };
        })
    }

    /// All annotations of a user, optionally limited to one item type.
    pub fn list_for_user(
        &self,
        user_id: &str,
        item_type: Option<ItemType>,
    ) -> Result<Vec<Annotation>, StoreError> {
        let mut prefix = String::new();
        prefix.push_str(user_id);
        prefix.push(KEY_SEP);
        if let Some(item_type) = item_type {
            prefix.push_str(item_type.as_str());
            prefix.push(KEY_SEP);
        }
        let end = prefix_end(&prefix);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ANNOTATIONS_TABLE)?;
        let mut items = Vec::new();
        for entry in table.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            items.push(decode_value(entry.1.value())?);
        }
        Ok(items)
    }

    /// Starred items, most recently starred first.
    pub fn list_starred(
        &self,
        user_id: &str,
        item_type: ItemType,
    ) -> Result<Vec<Annotation>, StoreError> {
        self.list_by_index(ANNOTATIONS_BY_STARRED_TABLE, user_id, item_type, usize::MAX)
    }

    /// Played items, highest play count first.
    pub fn list_most_played(
        &self,
        user_id: &str,
        item_type: ItemType,
        limit: usize,
    ) -> Result<Vec<Annotation>, StoreError> {
        self.list_by_index(ANNOTATIONS_BY_PLAY_COUNT_TABLE, user_id, item_type, limit)
    }

    /// Played items, latest play first.
    pub fn list_recently_played(
        &self,
        user_id: &str,
        item_type: ItemType,
        limit: usize,
    ) -> Result<Vec<Annotation>, StoreError> {
        self.list_by_index(ANNOTATIONS_BY_PLAY_DATE_TABLE, user_id, item_type, limit)
    }

    /// Rated items, best rating first.
    pub fn list_top_rated(
        &self,
        user_id: &str,
        item_type: ItemType,
        limit: usize,
    ) -> Result<Vec<Annotation>, StoreError> {
        self.list_by_index(ANNOTATIONS_BY_RATING_TABLE, user_id, item_type, limit)
    }

    fn list_by_index(
        &self,
        index: TableDefinition<&str, &[u8]>,
        user_id: &str,
        item_type: ItemType,
        limit: usize,
    ) -> Result<Vec<Annotation>, StoreError> {
        let prefix = type_prefix(user_id, item_type);
        let end = prefix_end(&prefix);

        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let table = read_txn.open_table(ANNOTATIONS_TABLE)?;

        let mut items = Vec::new();
        for entry in index_table.range(prefix.as_str()..end.as_str())?.rev() {
            if items.len() >= limit {
                break;
            }
            let entry = entry?;
            let (_, item_id) = split_key_last(entry.0.value())?;
            let key = annotation_key(user_id, item_type, item_id);
            if let Some(value) = table.get(key.as_str())? {
                items.push(decode_value(value.value())?);
            }
        }
        Ok(items)
    }

    fn update<F>(
        &self,
        user_id: &str,
        item_type: ItemType,
        item_id: &str,
        apply: F,
    ) -> Result<Annotation, StoreError>
    where
        F: FnOnce(&mut Annotation),
    {
        let key = annotation_key(user_id, item_type, item_id);
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(ANNOTATIONS_TABLE)?;
            let mut annotation: Annotation = match table.get(key.as_str())? {
                Some(value) => decode_value(value.value())?,
                None => Annotation::new(user_id, item_type, item_id),
            };
            let previous = annotation.clone();
            apply(&mut annotation);
            let bytes = encode_value(&annotation)?;
            table.insert(key.as_str(), bytes.as_slice())?;
            drop(table);

            for (index, sort_value) in INDEXES {
                let old_key = sort_value(&previous).map(|value| index_key(&previous, &value));
                let new_key = sort_value(&annotation).map(|value| index_key(&annotation, &value));
                if old_key == new_key {
                    continue;
                }
                let mut index_table = write_txn.open_table(index)?;
                if let Some(old_key) = &old_key {
                    index_table.remove(old_key.as_str())?;
                }
                if let Some(new_key) = &new_key {
                    let marker: &[u8] = &[];
                    index_table.insert(new_key.as_str(), marker)?;
                }
            }
            annotation
        };
        write_txn.commit()?;
        Ok(updated)
    }
}

pub(crate) fn init_tables(txn: &WriteTransaction) -> Result<(), StoreError> {
    let _ = txn.open_table(ANNOTATIONS_TABLE)?;
    for (index, _) in INDEXES {
        let _ = txn.open_table(index)?;
    }
    Ok(())
}

/// Refills every secondary table from the annotations themselves.
pub(crate) fn rebuild_indexes(txn: &WriteTransaction) -> Result<usize, StoreError> {
    let mut annotations: Vec<Annotation> = Vec::new();
    {
        let table = txn.open_table(ANNOTATIONS_TABLE)?;
        for entry in table.iter()? {
            let entry = entry?;
            annotations.push(decode_value(entry.1.value())?);
        }
    }
    for (index, sort_value) in INDEXES {
        crate::clear_table(txn, index)?;
        let mut index_table = txn.open_table(index)?;
        for annotation in &annotations {
            if let Some(value) = sort_value(annotation) {
                let key = index_key(annotation, &value);
                let marker: &[u8] = &[];
                index_table.insert(key.as_str(), marker)?;
            }
        }
    }
    Ok(annotations.len())
}

fn type_prefix(user_id: &str, item_type: ItemType) -> String {
    let mut out = String::new();
    out.push_str(user_id);
    out.push(KEY_SEP);
    out.push_str(item_type.as_str());
    out.push(KEY_SEP);
    out
}

fn annotation_key(user_id: &str, item_type: ItemType, item_id: &str) -> String {
    let mut out = type_prefix(user_id, item_type);
    out.push_str(item_id);
    out
}

fn index_key(annotation: &Annotation, sort_value: &str) -> String {
    let mut out = type_prefix(&annotation.user_id, annotation.item_type);
    out.push_str(sort_value);
    out.push(KEY_SEP);
    out.push_str(&annotation.item_id);
    out
}

fn play_count_value(annotation: &Annotation) -> Option<String> {
    if annotation.play_count == 0 {
        None
    } else {
        Some(format!("{:020}", annotation.play_count))
    }
}

fn play_date_value(annotation: &Annotation) -> Option<String> {
    annotation.play_date.map(timestamp_value)
}

fn rating_value(annotation: &Annotation) -> Option<String> {
    if annotation.rating == 0 {
        None
    } else {
        Some(annotation.rating.to_string())
    }
}

fn starred_value(annotation: &Annotation) -> Option<String> {
    if annotation.starred {
        Some(annotation.starred_at.map(timestamp_value).unwrap_or_default())
    } else {
        None
    }
}

// nanoseconds shifted past zero so that string order is time order
fn timestamp_value(at: OffsetDateTime) -> String {
    let shifted = at.unix_timestamp_nanos().saturating_add(i128::from(i64::MAX));
    format!("{:040}", shifted.max(0))
}
