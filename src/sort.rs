//! External line sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io::{self, prelude::*};
use std::path::Path;

use crate::buffer::RunBuilder;
use crate::merger::RunMerger;
use crate::reader::LineReader;
use crate::registry::TempRegistry;
use crate::scheduler::SpillQueue;
use crate::source::MergeSource;
use crate::spill::SpillWriter;

/// Default per-run memory limit (1 GiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 1024 * 1024 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Spill file I/O error.
    IO(io::Error),
    /// Input data stream error.
    InputError(io::Error),
    /// Output data stream error.
    OutputError(io::Error),
    /// Background spill task terminated without a result.
    WorkerLost,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::InputError(err) => Some(err),
            SortError::OutputError(err) => Some(err),
            SortError::WorkerLost => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "temporary file I/O operation failed: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::OutputError(err) => write!(f, "output data stream error: {}", err),
            SortError::WorkerLost => write!(f, "spill worker terminated unexpectedly"),
        }
    }
}

/// Sorting statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of records (non-blank lines) sorted.
    pub records: u64,
    /// Number of runs the input was split into.
    pub runs: usize,
    /// Number of runs spilled to temporary files.
    pub spilled_runs: usize,
}

/// Line sorter builder. Provides methods for [`LineSorter`] initialization.
#[derive(Clone, Default)]
pub struct LineSorterBuilder {
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Spill file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Approximate memory a single run may take.
    memory_limit: Option<usize>,
    /// Maximum number of records in a single run.
    count_limit: Option<usize>,
}

impl LineSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        LineSorterBuilder::default()
    }

    /// Builds a [`LineSorter`] instance using provided configuration.
    pub fn build(self) -> Result<LineSorter, SortError> {
        let memory_limit = self.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
        let run_builder = match self.count_limit {
            Some(count_limit) => RunBuilder::new(memory_limit, count_limit),
            None => RunBuilder::with_memory_limit(memory_limit),
        };

        LineSorter::new(self.threads_number, self.tmp_dir.as_deref(), run_builder, self.rw_buf_size)
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> LineSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> LineSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets spill file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> LineSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets approximate memory a single run may take before it is spilled.
    /// At most two runs are held in memory at the same time.
    pub fn with_memory_limit(mut self, memory_limit: usize) -> LineSorterBuilder {
        self.memory_limit = Some(memory_limit);
        return self;
    }

    /// Sets maximum number of records in a single run. By default it is derived from the memory limit.
    pub fn with_count_limit(mut self, count_limit: usize) -> LineSorterBuilder {
        self.count_limit = Some(count_limit);
        return self;
    }
}

/// External line sorter.
pub struct LineSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Run limits.
    run_builder: RunBuilder,
    /// Spill file read/write buffer size.
    rw_buf_size: Option<usize>,
}

impl LineSorter {
    /// Creates a new line sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `run_builder` - Run limits.
    /// * `rw_buf_size` - Spill files read/write buffer size.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        run_builder: RunBuilder,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, SortError> {
        log::info!(
            "run limits: {} bytes, {} records",
            run_builder.mem_limit(),
            run_builder.count_limit()
        );

        return Ok(LineSorter {
            rw_buf_size,
            run_builder,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    pub(crate) fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        // a panicking spill task drops its result sender, which the queue reports as a lost worker
        let thread_pool = thread_pool_builder
            .thread_name(|idx| format!("spill-worker-{}", idx))
            .panic_handler(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                log::error!("spill worker panicked: {}", message);
            })
            .build()
            .map_err(SortError::ThreadPoolBuildError)?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Directory spill files are created in.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Sorts lines from the input and writes them to the output.
    /// On failure every spill file created by this call is removed; the output may be partially written.
    ///
    /// # Arguments
    /// * `input` - Input stream lines to be fetched from
    /// * `output` - Output stream sorted lines to be written to
    pub fn sort<R, W>(&self, input: R, mut output: W) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
    {
        let registry = TempRegistry::new();
        let result = self.sort_to(input, &mut output, &registry);

        if result.is_err() {
            let removed = registry.purge();
            if removed > 0 {
                log::warn!("{} leftover spill files removed", removed);
            }
        }

        return result;
    }

    /// Splits the input into sorted runs and returns an iterator over the merged records.
    ///
    /// # Arguments
    /// * `input` - Input stream lines to be fetched from
    pub fn merge_runs<R: BufRead>(&self, input: R) -> Result<RunMerger, SortError> {
        let registry = TempRegistry::new();
        let mut reader = LineReader::new(input);

        match self.build_runs(&mut reader, &registry) {
            Ok((sources, _)) => Ok(RunMerger::new(sources)),
            Err(err) => {
                registry.purge();
                Err(err)
            }
        }
    }

    fn sort_to<R, W>(&self, input: R, output: &mut W, registry: &TempRegistry) -> Result<SortSummary, SortError>
    where
        R: BufRead,
        W: Write,
    {
        let mut reader = LineReader::new(input);
        let (sources, summary) = self.build_runs(&mut reader, registry)?;
        let line_ending = reader.line_ending();

        log::debug!("merging {} runs ...", sources.len());
        for record in RunMerger::new(sources) {
            let record = record.map_err(SortError::IO)?;
            record
                .write_to(output, line_ending)
                .map_err(SortError::OutputError)?;
        }
        output.flush().map_err(SortError::OutputError)?;

        log::info!(
            "sorted {} records ({} runs, {} spilled)",
            summary.records,
            summary.runs,
            summary.spilled_runs
        );

        return Ok(summary);
    }

    /// Fills runs from the input, spilling each run but the last one in the background while the
    /// next one is being filled. The last run is kept in memory. Spill files are reported to
    /// `registry`, which belongs to the calling operation only.
    fn build_runs<R: BufRead>(
        &self,
        reader: &mut LineReader<R>,
        registry: &TempRegistry,
    ) -> Result<(Vec<MergeSource>, SortSummary), SortError> {
        let writer = SpillWriter::new(self.tmp_dir.path(), registry.clone(), self.rw_buf_size);
        let mut queue = SpillQueue::new(&self.thread_pool, writer.clone());
        let mut summary = SortSummary::default();

        loop {
            let (run, last) = self.run_builder.fill(reader).map_err(SortError::InputError)?;
            summary.runs += 1;
            summary.records += run.len() as u64;
            log::debug!(
                "run {} filled ({} records, ~{} bytes)",
                summary.runs,
                run.len(),
                run.mem_size()
            );

            if last {
                let resident = self.thread_pool.install(|| writer.keep_resident(run));
                let spilled = queue.finish()?;
                summary.spilled_runs = spilled.len();

                let mut sources = Vec::from_iter(spilled.into_iter().map(MergeSource::from));
                sources.push(resident.into());

                log::debug!("external sort preparation done");
                return Ok((sources, summary));
            }

            queue.submit(run)?;
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, prelude::*};

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{LineSorter, LineSorterBuilder, SortError, SortSummary};
    use crate::record::Record;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn sorter(tmp_dir: &tempfile::TempDir, count_limit: usize) -> LineSorter {
        LineSorterBuilder::new()
            .with_count_limit(count_limit)
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap()
    }

    fn sort_bytes(sorter: &LineSorter, input: &[u8]) -> (Vec<u8>, SortSummary) {
        let mut output = Vec::new();
        let summary = sorter.sort(io::Cursor::new(input.to_vec()), &mut output).unwrap();
        (output, summary)
    }

    fn random_lines(count: usize) -> Vec<String> {
        let words = ["apple", "banana", "cherry", "Apple", "apple pie", "", "zz top", "b"];
        let mut rng = rand::thread_rng();

        (0..count)
            .map(|_| format!("{}. {}", rng.gen_range(-50..50), words.choose(&mut rng).unwrap()))
            .collect()
    }

    fn assert_clean(sorter: &LineSorter) {
        assert_eq!(fs::read_dir(sorter.tmp_dir()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_two_runs_scenario(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 2);
        let (output, summary) = sort_bytes(&sorter, b"5. banana\n2. apple\n9. apple\n1. cherry\n");

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "2. apple\n9. apple\n1. cherry\n5. banana\n"
        );
        assert_eq!(
            summary,
            SortSummary {
                records: 4,
                runs: 2,
                spilled_runs: 1
            }
        );
        assert_clean(&sorter);
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(500)]
    #[case(501)]
    #[case(10_000)]
    fn test_line_sorter(tmp_dir: tempfile::TempDir, #[case] count_limit: usize) {
        let lines = random_lines(500);
        let input = lines.iter().map(|line| format!("{}\n", line)).collect::<String>();

        let mut expected = Vec::from_iter(lines.iter().map(|line| Record::parse(line.as_str())));
        expected.sort();
        let expected: String = expected
            .iter()
            .map(|record| format!("{}\n", String::from_utf8_lossy(record.as_bytes())))
            .collect();

        let sorter = sorter(&tmp_dir, count_limit);
        let (output, summary) = sort_bytes(&sorter, input.as_bytes());

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(summary.records, 500);
        assert_eq!(summary.spilled_runs, summary.runs - 1);
        assert_clean(&sorter);
    }

    #[rstest]
    fn test_memory_limit(tmp_dir: tempfile::TempDir) {
        let record_size = Record::parse("10. apple").mem_size();
        let sorter = LineSorterBuilder::new()
            .with_memory_limit(3 * record_size)
            .with_tmp_dir(tmp_dir.path())
            .with_rw_buf_size(64)
            .build()
            .unwrap();

        let input = "10. apple\n".repeat(10);
        let (output, summary) = sort_bytes(&sorter, input.as_bytes());

        assert_eq!(String::from_utf8(output).unwrap(), input);
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.spilled_runs, 3);
    }

    #[rstest]
    fn test_idempotence(tmp_dir: tempfile::TempDir) {
        let mut lines = random_lines(200);
        lines.shuffle(&mut rand::thread_rng());
        let input = lines.join("\n");

        let sorter = sorter(&tmp_dir, 16);
        let (sorted, _) = sort_bytes(&sorter, input.as_bytes());
        let (sorted_again, _) = sort_bytes(&sorter, &sorted);

        assert_eq!(sorted, sorted_again);
    }

    #[rstest]
    fn test_malformed_numbers_and_blank_lines(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 2);
        let input = "\n1. hello\n\nabc. hello\n-1. hello\nhello\n\n0. a\n\n";
        let (output, summary) = sort_bytes(&sorter, input.as_bytes());

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "0. a");
        assert_eq!(lines[1], "-1. hello");
        // `abc` and the line without separator both count as 0
        let mut zeros = vec![lines[2], lines[3]];
        zeros.sort();
        assert_eq!(zeros, vec!["abc. hello", "hello"]);
        assert_eq!(lines[4], "1. hello");
        assert_eq!(lines.len(), 5);
        assert_eq!(summary.records, 5);
        assert!(!output.contains("\n\n"));
    }

    #[rstest]
    #[case(b"2. b\r\n1. a\r\n".to_vec(), b"1. a\r\n2. b\r\n".to_vec())]
    #[case(b"2. b\n1. a".to_vec(), b"1. a\n2. b\n".to_vec())]
    #[case(b"".to_vec(), b"".to_vec())]
    #[case(b"\n\n\n".to_vec(), b"".to_vec())]
    #[case(b"2. b\n1. a\r\n3. c\r\n".to_vec(), b"1. a\n2. b\n3. c\n".to_vec())]
    fn test_line_endings(tmp_dir: tempfile::TempDir, #[case] input: Vec<u8>, #[case] expected: Vec<u8>) {
        let sorter = sorter(&tmp_dir, 1);
        let (output, _) = sort_bytes(&sorter, &input);
        assert_eq!(output, expected);
    }

    #[rstest]
    fn test_merge_runs(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 3);
        let merger = sorter
            .merge_runs(io::Cursor::new(b"3. c\n1. a\n5. e\n2. b\n4. d\n".to_vec()))
            .unwrap();

        let numbers: Vec<i32> = merger.map(|record| record.unwrap().number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_clean(&sorter);
    }

    /// Reader failing once its data is exhausted.
    struct FailingReader {
        data: io::Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::Other, "device unplugged")),
                n => Ok(n),
            }
        }
    }

    #[rstest]
    fn test_failed_sort_keeps_pending_merge(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 2);
        let merger = sorter
            .merge_runs(io::Cursor::new(b"3. c\n1. a\n5. e\n2. b\n4. d\n6. f\n".to_vec()))
            .unwrap();

        let input = FailingReader {
            data: io::Cursor::new(b"9. z\n8. y\n7. x\n".to_vec()),
        };
        let result = sorter.sort(io::BufReader::new(input), Vec::new());
        assert!(matches!(result, Err(SortError::InputError(_))));

        let numbers: Vec<i32> = merger.map(|record| record.unwrap().number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert_clean(&sorter);
    }

    #[test]
    fn test_spill_worker_panic_is_contained() {
        let pool = LineSorter::init_thread_pool(Some(1)).unwrap();

        let (tx, rx) = std::sync::mpsc::sync_channel::<()>(1);
        pool.spawn(move || {
            let _tx = tx;
            panic!("spill failed");
        });
        assert!(rx.recv().is_err());

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        pool.spawn(move || tx.send(42).unwrap());
        assert_eq!(rx.recv().unwrap(), 42);
    }

    /// Writer failing after the given number of bytes.
    struct FailingWriter {
        left: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.left == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.left);
            self.left -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[rstest]
    fn test_input_failure_cleanup(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 2);
        let input = random_lines(50).join("\n");
        let reader = io::BufReader::with_capacity(
            32,
            FailingReader {
                data: io::Cursor::new(input.into_bytes()),
            },
        );

        let result = sorter.sort(reader, Vec::new());
        assert!(matches!(result, Err(SortError::InputError(_))));
        assert_clean(&sorter);
    }

    #[rstest]
    fn test_output_failure_cleanup(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 4);
        let input = random_lines(100).join("\n");

        let result = sorter.sort(io::Cursor::new(input.into_bytes()), FailingWriter { left: 100 });
        assert!(matches!(result, Err(SortError::OutputError(_))));
        assert_clean(&sorter);
    }

    #[rstest]
    fn test_tmp_dir_removed_with_sorter(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(&tmp_dir, 2);
        let sorter_dir = sorter.tmp_dir().to_path_buf();
        assert!(sorter_dir.starts_with(tmp_dir.path()));

        sort_bytes(&sorter, b"2. b\n1. a\n3. c\n");
        drop(sorter);

        assert!(!sorter_dir.exists());
    }

    #[test]
    fn test_missing_tmp_dir() {
        let result = LineSorterBuilder::new()
            .with_tmp_dir(std::path::Path::new("/nonexistent/ext-line-sort"))
            .build();
        assert!(matches!(result, Err(SortError::TempDir(_))));
    }
}
