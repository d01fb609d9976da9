use ahash::AHashMap;

use super::{unit_id::UnitId, value::Record};

/// Attribute data keyed by unit id, preserving first-seen row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTable {
    ids: Vec<UnitId>,
    rows: Vec<Record>,
    index: AHashMap<UnitId, usize>, // Map between unit ids and row positions
}

impl PropertyTable {
    pub fn new() -> Self { Self::default() }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            rows: Vec::with_capacity(capacity),
            index: AHashMap::with_capacity(capacity),
        }
    }

    #[inline] pub fn len(&self) -> usize { self.ids.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.ids.is_empty() }

    #[inline] pub fn contains(&self, id: &str) -> bool { self.index.contains_key(id) }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    /// Insert a row, replacing (in place) any existing row with the same id.
    /// Returns the replaced row.
    pub fn insert(&mut self, id: UnitId, record: Record) -> Option<Record> {
        match self.index.get(&id) {
            Some(&i) => Some(std::mem::replace(&mut self.rows[i], record)),
            None => {
                self.index.insert(id.clone(), self.ids.len());
                self.ids.push(id);
                self.rows.push(record);
                None
            }
        }
    }

    /// Get the row for `id`, appending an empty one if absent.
    pub fn entry(&mut self, id: &UnitId) -> &mut Record {
        let i = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.insert(id.clone(), Record::new());
                self.ids.len() - 1
            }
        };
        &mut self.rows[i]
    }

    /// Unit ids in row order.
    #[inline] pub fn ids(&self) -> &[UnitId] { &self.ids }

    /// Iterate over (id, row) pairs in row order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &Record)> + '_ {
        self.ids.iter().zip(self.rows.iter())
    }
}

impl FromIterator<(UnitId, Record)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (UnitId, Record)>>(iter: I) -> Self {
        let mut table = PropertyTable::new();
        for (id, record) in iter { table.insert(id, record); }
        table
    }
}
