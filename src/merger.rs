//! Binary heap run merger.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;

use crate::record::Record;
use crate::source::MergeSource;

/// Head record of a source waiting in the heap.
struct Head {
    record: Record,
    source: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .cmp(&other.record)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// Binary heap run merger.
/// Merges sorted runs into a single sorted stream. Each source is released as soon as it is
/// exhausted. Time complexity is *m* \* log(*k*) where *m* is the number of records and *k* is
/// the number of runs.
pub struct RunMerger {
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    heads: BinaryHeap<Reverse<Head>>,
    sources: Vec<Option<MergeSource>>,
    initiated: bool,
}

impl RunMerger {
    /// Creates a merger over sources positioned at their first records.
    /// Source records should be sorted in ascending order otherwise the result is undefined.
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = MergeSource>,
    {
        let sources = Vec::from_iter(sources.into_iter().map(Some));
        let heads = BinaryHeap::with_capacity(sources.len());

        return RunMerger {
            heads,
            sources,
            initiated: false,
        };
    }

    /// Number of sources not yet exhausted.
    pub fn active_sources(&self) -> usize {
        self.sources.iter().filter(|source| source.is_some()).count()
    }

    fn init(&mut self) -> io::Result<()> {
        for idx in 0..self.sources.len() {
            let record = match self.sources[idx].as_mut() {
                Some(source) => source.take_current(),
                None => continue,
            };

            match record {
                Some(record) => self.heads.push(Reverse(Head { record, source: idx })),
                None => self.release(idx)?,
            }
        }
        log::debug!("merging {} runs", self.heads.len());

        return Ok(());
    }

    fn release(&mut self, idx: usize) -> io::Result<()> {
        match self.sources[idx].take() {
            Some(mut source) => source.release(),
            None => Ok(()),
        }
    }
}

impl Iterator for RunMerger {
    type Item = io::Result<Record>;

    /// Returns the next record from the runs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            if let Err(err) = self.init() {
                return Some(Err(err));
            }
        }

        let Reverse(head) = self.heads.pop()?;
        let idx = head.source;

        let next = match self.sources[idx].as_mut() {
            Some(source) => match source.advance() {
                Ok(true) => source.take_current(),
                Ok(false) => None,
                Err(err) => return Some(Err(err)),
            },
            None => None,
        };

        match next {
            Some(record) => self.heads.push(Reverse(Head { record, source: idx })),
            None => {
                if let Err(err) = self.release(idx) {
                    return Some(Err(err));
                }
            }
        }

        return Some(Ok(head.record));
    }
}

#[cfg(test)]
mod test {
    use std::io::prelude::*;

    use rstest::*;

    use super::RunMerger;
    use crate::record::Record;
    use crate::registry::TempRegistry;
    use crate::source::{DiskSource, MemorySource, MergeSource};

    fn memory_source(lines: &[&str]) -> MergeSource {
        MemorySource::new(lines.iter().map(|line| Record::parse(*line)).collect()).into()
    }

    fn lines_of(merger: RunMerger) -> Vec<String> {
        merger
            .map(|record| String::from_utf8(record.unwrap().as_bytes().to_vec()).unwrap())
            .collect()
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(
        vec![
            vec!["4. d", "5. e", "7. g"],
            vec!["1. a", "6. f"],
            vec!["3. c"],
            vec![],
        ],
        vec!["1. a", "3. c", "4. d", "5. e", "6. f", "7. g"],
    )]
    #[case(
        vec![
            vec!["2. apple", "5. banana"],
            vec!["9. apple", "1. cherry"],
        ],
        vec!["2. apple", "9. apple", "5. banana", "1. cherry"],
    )]
    #[case(
        vec![
            vec!["1. x", "2. x"],
            vec!["1. x", "3. x"],
        ],
        vec!["1. x", "1. x", "2. x", "3. x"],
    )]
    fn test_merger(#[case] runs: Vec<Vec<&str>>, #[case] expected: Vec<&str>) {
        let merger = RunMerger::new(runs.iter().map(|run| memory_source(run)));
        assert_eq!(lines_of(merger), expected);
    }

    #[test]
    fn test_merger_releases_sources() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let registry = TempRegistry::new();

        let mut sources = Vec::new();
        let mut paths = Vec::new();
        for content in ["1. a\n3. c\n", "2. b\n", ""] {
            let mut file = tempfile::NamedTempFile::new_in(tmp_dir.path()).unwrap();
            file.write_all(content.as_bytes()).unwrap();
            let path = file.into_temp_path();
            registry.register(&path);
            paths.push(path.to_path_buf());
            sources.push(MergeSource::from(DiskSource::open(path, registry.clone(), None).unwrap()));
        }
        sources.push(memory_source(&["0. z"]));

        let mut merger = RunMerger::new(sources);
        assert_eq!(merger.active_sources(), 4);

        assert_eq!(merger.next().unwrap().unwrap(), Record::parse("1. a"));
        // the empty run is released on the first step
        assert!(!paths[2].exists());
        assert_eq!(merger.next().unwrap().unwrap(), Record::parse("2. b"));
        assert!(!paths[1].exists());
        assert!(paths[0].exists());

        assert_eq!(merger.next().unwrap().unwrap(), Record::parse("3. c"));
        assert!(!paths[0].exists());
        assert_eq!(merger.active_sources(), 1);

        assert_eq!(merger.next().unwrap().unwrap(), Record::parse("0. z"));
        assert!(merger.next().is_none());
        assert_eq!(merger.active_sources(), 0);
        assert!(registry.is_empty());
    }
}
