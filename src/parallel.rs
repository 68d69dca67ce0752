//! Range-partitioned parallel loops with ordered per-task logs.
//!
//! With the `rayon` feature the chunks run on the rayon pool; otherwise
//! they run one after another. Either way the results and the buffered log
//! lines come back in chunk order.

use crate::trace::trace_debug;
use std::ops::Range;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Half-open index range handled by one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParallelRange {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ParallelRange {
    /// Iterates over the indices of the chunk.
    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Log buffer owned by one task; flushed after all tasks joined.
#[derive(Debug, Default)]
pub struct TaskLog {
    lines: Vec<String>,
}

impl TaskLog {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Splits `range` into chunks of at most `chunk` indices.
pub fn partition(range: Range<usize>, chunk: usize) -> Vec<ParallelRange> {
    let chunk = chunk.max(1);
    let mut parts = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = (start + chunk).min(range.end);
        parts.push(ParallelRange {
            index: parts.len(),
            start,
            end,
        });
        start = end;
    }
    parts
}

/// Runs `f` on every chunk of `range` and returns the results in chunk order.
pub fn pfor<T, F>(range: Range<usize>, chunk: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ParallelRange, &mut TaskLog) -> T + Sync + Send,
{
    let (results, logs) = pfor_with_logs(range, chunk, f);
    emit(&logs);
    results
}

/// Emits task logs in task order.
fn emit(logs: &[TaskLog]) {
    for (task, log) in logs.iter().enumerate() {
        for line in log.lines() {
            trace_debug!("task_log", task = task, line = line.as_str());
        }
    }
}

/// Like [`pfor`] but hands the task logs back instead of emitting them.
pub fn pfor_with_logs<T, F>(range: Range<usize>, chunk: usize, f: F) -> (Vec<T>, Vec<TaskLog>)
where
    T: Send,
    F: Fn(ParallelRange, &mut TaskLog) -> T + Sync + Send,
{
    let parts = partition(range, chunk);
    let run = |part: ParallelRange| {
        let mut log = TaskLog::default();
        let result = f(part, &mut log);
        (result, log)
    };

    #[cfg(feature = "rayon")]
    let outputs: Vec<(T, TaskLog)> = parts.into_par_iter().map(run).collect();
    #[cfg(not(feature = "rayon"))]
    let outputs: Vec<(T, TaskLog)> = parts.into_iter().map(run).collect();

    outputs.into_iter().unzip()
}

/// Fills `out` row by row, computing rows in parallel chunks.
pub fn fill_rows<T, F>(out: &mut [T], width: usize, chunk_rows: usize, f: F)
where
    T: Send + Copy + Default,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    fill_rows_with_log(out, width, chunk_rows, |y, row, _log| f(y, row));
}

/// Like [`fill_rows`]; every row also gets the log of its chunk. The logs
/// are emitted and then returned in chunk order.
pub fn fill_rows_with_log<T, F>(out: &mut [T], width: usize, chunk_rows: usize, f: F) -> Vec<TaskLog>
where
    T: Send + Copy + Default,
    F: Fn(usize, &mut [T], &mut TaskLog) + Sync + Send,
{
    if width == 0 {
        return Vec::new();
    }
    let height = out.len() / width;
    let (chunks, logs) = pfor_with_logs(0..height, chunk_rows, |part, log| {
        let mut rows = vec![T::default(); part.len() * width];
        for (i, y) in part.iter().enumerate() {
            f(y, &mut rows[i * width..(i + 1) * width], log);
        }
        rows
    });
    emit(&logs);
    for (dst, rows) in out.chunks_mut(chunk_rows.max(1) * width).zip(chunks) {
        dst.copy_from_slice(&rows);
    }
    logs
}
