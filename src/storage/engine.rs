use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Abstract storage engine interface (byte-level operations)
///
/// Different from sql::engine::Engine which operates on tables.
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: Vec<u8>) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Prefix scan using lexicographic ordering
    fn scan_prefix(&mut self, prefix: Vec<u8>) -> Self::EngineIterator<'_> {
        self.scan(prefix_range(&prefix))
    }
}

/// Storage engine iterator trait (supports reverse traversal)
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

/// Converts a prefix into the range of keys starting with it.
///
/// Trailing `0xff` bytes are dropped before incrementing the last byte,
/// e.g. `[0x61, 0xff]` becomes `[0x61, 0xff]..[0x62)`. A prefix made only of
/// `0xff` bytes has no upper bound.
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return (start, Bound::Excluded(end));
        }
    }
    (start, Bound::Unbounded)
}

#[cfg(test)]
mod tests {
    use super::{Engine, prefix_range};
    use crate::{error::Result, storage::memory::MemoryEngine};
    use std::ops::Bound;

    fn test_point_opt(mut eng: impl Engine) -> Result<()> {
        assert_eq!(eng.get(b"not exist".to_vec())?, None);

        eng.set(b"aa".to_vec(), vec![1, 2, 3, 4])?;
        assert_eq!(eng.get(b"aa".to_vec())?, Some(vec![1, 2, 3, 4]));

        eng.set(b"aa".to_vec(), vec![5, 6, 7, 8])?;
        assert_eq!(eng.get(b"aa".to_vec())?, Some(vec![5, 6, 7, 8]));

        eng.delete(b"aa".to_vec())?;
        assert_eq!(eng.get(b"aa".to_vec())?, None);

        assert_eq!(eng.get(b"".to_vec())?, None);
        eng.set(b"".to_vec(), vec![])?;
        assert_eq!(eng.get(b"".to_vec())?, Some(vec![]));
        Ok(())
    }

    fn test_scan(mut eng: impl Engine) -> Result<()> {
        eng.set(b"nnaes".to_vec(), b"value1".to_vec())?;
        eng.set(b"amhue".to_vec(), b"value2".to_vec())?;
        eng.set(b"meeae".to_vec(), b"value3".to_vec())?;
        eng.set(b"uujeh".to_vec(), b"value4".to_vec())?;
        eng.set(b"anehe".to_vec(), b"value5".to_vec())?;

        let start = Bound::Included(b"a".to_vec());
        let end = Bound::Excluded(b"e".to_vec());

        let mut iter = eng.scan((start, end));
        let (key1, _) = iter.next().expect("no value founded")?;
        assert_eq!(key1, b"amhue".to_vec());

        let (key2, _) = iter.next().expect("no value founded")?;
        assert_eq!(key2, b"anehe".to_vec());
        assert!(iter.next().is_none());
        drop(iter);

        let start = Bound::Excluded(b"meeae".to_vec());
        let end = Bound::Unbounded;
        let mut iter2 = eng.scan((start, end));

        let (key3, _) = iter2.next_back().expect("no value founded")?;
        assert_eq!(key3, b"uujeh".to_vec());

        let (key4, _) = iter2.next().expect("no value founded")?;
        assert_eq!(key4, b"nnaes".to_vec());
        assert!(iter2.next().is_none());

        Ok(())
    }

    fn test_scan_prefix(mut eng: impl Engine) -> Result<()> {
        eng.set(b"ccnaes".to_vec(), b"value1".to_vec())?;
        eng.set(b"camhue".to_vec(), b"value2".to_vec())?;
        eng.set(b"deeae".to_vec(), b"value3".to_vec())?;
        eng.set(b"eeujeh".to_vec(), b"value4".to_vec())?;
        eng.set(b"canehe".to_vec(), b"value5".to_vec())?;
        eng.set(b"aanehe".to_vec(), b"value6".to_vec())?;
        eng.set(vec![b'c', b'a', 0xff], b"value7".to_vec())?;
        eng.set(vec![b'c', b'b'], b"value8".to_vec())?;

        let keys = eng
            .scan_prefix(b"ca".to_vec())
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(
            keys,
            vec![b"camhue".to_vec(), b"canehe".to_vec(), vec![b'c', b'a', 0xff]]
        );

        let keys = eng
            .scan_prefix(vec![b'c', b'a', 0xff])
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![vec![b'c', b'a', 0xff]]);

        Ok(())
    }

    #[test]
    fn test_prefix_range() {
        assert_eq!(
            prefix_range(b"ab"),
            (Bound::Included(b"ab".to_vec()), Bound::Excluded(b"ac".to_vec()))
        );
        assert_eq!(
            prefix_range(&[0x61, 0xff, 0xff]),
            (Bound::Included(vec![0x61, 0xff, 0xff]), Bound::Excluded(vec![0x62]))
        );
        assert_eq!(
            prefix_range(&[0xff]),
            (Bound::Included(vec![0xff]), Bound::Unbounded)
        );
    }

    #[test]
    fn test_memory() -> Result<()> {
        test_point_opt(MemoryEngine::new())?;
        test_scan(MemoryEngine::new())?;
        test_scan_prefix(MemoryEngine::new())?;
        Ok(())
    }
}
