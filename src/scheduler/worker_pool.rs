//! CPU-bound parse fan-out (spec §4.6, §5: "fixed-size worker pool running in
//! parallel... workers return pure `FileIndexResult` values"). Grounded on the
//! teacher's `index_directory_parallel`: collect paths, hand them to rayon,
//! wrap the whole batch in `spawn_blocking` so the tokio runtime isn't starved.

use std::sync::Arc;

use crate::parser::{FileIndexResult, SourceParser};
use crate::uri::Uri;

/// One unit of parse work: a uri plus the text to parse.
pub struct ParseJob {
    pub uri: Uri,
    pub text: String,
}

pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    /// `max_concurrent_jobs` should already be clamped to `[1, 16]`
    /// (`IndexConfig::clamp`).
    pub fn new(max_concurrent_jobs: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrent_jobs.max(1))
            .thread_name(|i| format!("index-worker-{i}"))
            .build()
            .expect("building the index worker pool with a valid thread count");
        Self { pool: Arc::new(pool) }
    }

    /// Parses every job in parallel on this pool. The rayon work itself runs
    /// via `spawn_blocking` so the tokio runtime isn't starved while it waits
    /// (mirrors the teacher's `index_directory_parallel`). Workers never
    /// touch shared index state — they return plain values, which the caller
    /// applies on the single-writer path.
    pub async fn parse_batch(
        &self,
        jobs: Vec<ParseJob>,
        parser: Arc<dyn SourceParser>,
    ) -> Vec<(Uri, FileIndexResult)> {
        use rayon::prelude::*;

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            pool.install(|| {
                jobs.par_iter()
                    .map(|job| {
                        let result = parser.parse(&job.uri, &job.text);
                        (job.uri.clone(), result)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .await
        .expect("index worker pool task panicked")
    }
}
