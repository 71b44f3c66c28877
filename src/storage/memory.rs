use std::{
    collections::{BTreeMap, btree_map},
    ops::RangeBounds,
};

use crate::{error::Result, storage::engine::{Engine, EngineIterator}};

/// In-memory storage engine backed by an ordered map
#[derive(Debug, Default)]
pub struct MemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for MemoryEngine {
    type EngineIterator<'a> = MemoryEngineIterator<'a>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.data.insert(key, value);
        Ok(())
    }

    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(&key).cloned())
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.data.remove(&key);
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_> {
        MemoryEngineIterator {
            inner: self.data.range(range),
        }
    }
}

/// Range iterator over a `MemoryEngine`
pub struct MemoryEngineIterator<'a> {
    inner: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
}

impl EngineIterator for MemoryEngineIterator<'_> {}

impl Iterator for MemoryEngineIterator<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| Ok((k.clone(), v.clone())))
    }
}

impl DoubleEndedIterator for MemoryEngineIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, v)| Ok((k.clone(), v.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryEngine;
    use crate::{error::Result, storage::engine::Engine};

    #[test]
    fn test_overwrite_and_reverse_scan() -> Result<()> {
        let mut eng = MemoryEngine::new();
        eng.set(b"b".to_vec(), b"2".to_vec())?;
        eng.set(b"a".to_vec(), b"1".to_vec())?;
        eng.set(b"c".to_vec(), b"3".to_vec())?;
        eng.set(b"a".to_vec(), b"4".to_vec())?;
        assert_eq!(eng.get(b"a".to_vec())?, Some(b"4".to_vec()));

        let keys = eng
            .scan(b"a".to_vec()..b"c".to_vec())
            .rev()
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec()]);

        eng.delete(b"b".to_vec())?;
        let keys = eng
            .scan(..)
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
        Ok(())
    }
}
