use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use crate::api::{DataApi, Neighbor, PointId};
use crate::error::{ExplorerError, ExplorerResult};
use crate::session::SessionKey;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Shared flag a worker checks to abandon its request.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn check(&self) -> ExplorerResult<()> {
        if self.is_cancelled() {
            Err(ExplorerError::CancelledRequest)
        } else {
            Ok(())
        }
    }
}

/// Holds the latest value until no newer one arrived for `window`.
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        if self.pending.is_some() {
            log::debug!("debounce: coalescing parameter change");
        }
        self.pending = Some((value, now));
    }

    pub fn ready(&mut self, now: Instant) -> Option<T> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|(_, pushed_at)| now.saturating_duration_since(*pushed_at) >= self.window);
        if due {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

type Job<T> = Box<dyn FnOnce(&CancelToken) -> ExplorerResult<T> + Send>;

struct InFlight<T> {
    id: u64,
    token: CancelToken,
    rx: Receiver<(u64, ExplorerResult<T>)>,
}

/// Last-request-wins runner for one resource.
///
/// Jobs are debounced, then run on a worker thread with their own token. Launching
/// a job cancels the one before it, and results of superseded jobs are dropped.
pub struct RequestCoordinator<T> {
    label: &'static str,
    debouncer: Debouncer<Job<T>>,
    next_id: u64,
    in_flight: Option<InFlight<T>>,
}

impl<T: Send + 'static> RequestCoordinator<T> {
    pub fn new(label: &'static str, window: Duration) -> Self {
        Self {
            label,
            debouncer: Debouncer::new(window),
            next_id: 0,
            in_flight: None,
        }
    }

    pub fn schedule(
        &mut self,
        job: impl FnOnce(&CancelToken) -> ExplorerResult<T> + Send + 'static,
        now: Instant,
    ) {
        self.debouncer.push(Box::new(job), now);
    }

    /// Launches without waiting for the debounce window.
    pub fn launch_now(
        &mut self,
        job: impl FnOnce(&CancelToken) -> ExplorerResult<T> + Send + 'static,
    ) {
        self.debouncer.clear();
        self.launch(Box::new(job));
    }

    fn launch(&mut self, job: Job<T>) {
        if let Some(previous) = self.in_flight.take() {
            log::debug!("{}: cancelling request #{}", self.label, previous.id);
            previous.token.cancel();
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        let token = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let worker_token = token.clone();
        log::debug!("{}: launching request #{id}", self.label);

        thread::spawn(move || {
            let result = match worker_token.check() {
                Ok(()) => job(&worker_token),
                Err(error) => Err(error),
            };
            let result = if worker_token.is_cancelled() {
                Err(ExplorerError::CancelledRequest)
            } else {
                result
            };
            let _ = tx.send((id, result));
        });

        self.in_flight = Some(InFlight { id, token, rx });
    }

    /// Launches a due job and returns the result of the live one, if finished.
    pub fn poll(&mut self, now: Instant) -> Option<ExplorerResult<T>> {
        if let Some(job) = self.debouncer.ready(now) {
            self.launch(job);
        }

        let in_flight = self.in_flight.take()?;
        match in_flight.rx.try_recv() {
            Ok((id, result)) if id == in_flight.id => match result {
                Err(error) if error.is_silent() => {
                    log::debug!("{}: request #{id} was cancelled", self.label);
                    None
                }
                other => Some(other),
            },
            Ok((id, _)) => {
                log::debug!("{}: dropping stale response #{id}", self.label);
                None
            }
            Err(TryRecvError::Empty) => {
                self.in_flight = Some(in_flight);
                None
            }
            Err(TryRecvError::Disconnected) => Some(Err(ExplorerError::network(
                self.label,
                "background worker disconnected",
            ))),
        }
    }

    pub fn cancel(&mut self) {
        self.debouncer.clear();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.debouncer.is_pending()
    }
}

impl<T> Drop for RequestCoordinator<T> {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
    }
}

#[derive(Debug)]
pub struct NeighborResult {
    pub generation: u64,
    pub source: PointId,
    pub result: ExplorerResult<Vec<Neighbor>>,
}

/// Nearest-neighbor lookups for one selection, one result per source id.
///
/// Each batch carries the selection generation it was issued for so that
/// results can be merged, or discarded, per source.
pub struct NeighborFetcher {
    token: Option<CancelToken>,
    outstanding: usize,
    tx: mpsc::Sender<NeighborResult>,
    rx: Receiver<NeighborResult>,
}

impl NeighborFetcher {
    pub const MAX_SOURCES: usize = 256;

    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            token: None,
            outstanding: 0,
            tx,
            rx,
        }
    }

    pub fn start(
        &mut self,
        api: Arc<dyn DataApi>,
        key: SessionKey,
        categories: Vec<String>,
        generation: u64,
        sources: Vec<PointId>,
    ) {
        self.cancel();
        if sources.is_empty() {
            return;
        }

        let mut sources = sources;
        if sources.len() > Self::MAX_SOURCES {
            log::info!(
                "nearest neighbors: limiting batch from {} to {} sources",
                sources.len(),
                Self::MAX_SOURCES
            );
            sources.truncate(Self::MAX_SOURCES);
        }

        let token = CancelToken::new();
        self.token = Some(token.clone());
        self.outstanding = sources.len();
        let tx = self.tx.clone();

        thread::spawn(move || {
            for source in sources {
                if token.is_cancelled() {
                    break;
                }
                let result = api.nearest_neighbors(&key, source, &categories, &token);
                if token.is_cancelled() {
                    break;
                }
                if tx
                    .send(NeighborResult {
                        generation,
                        source,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    pub fn cancel(&mut self) {
        self.outstanding = 0;
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub fn drain(&mut self) -> Vec<NeighborResult> {
        let results = self.rx.try_iter().collect::<Vec<_>>();
        self.outstanding = self.outstanding.saturating_sub(results.len());
        results
    }

    /// True while the current batch still has sources to report.
    pub fn is_active(&self) -> bool {
        self.outstanding > 0
    }
}

impl Default for NeighborFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NeighborFetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::api::{
        ConceptDataset, ConceptMatches, GraphQuery, GraphResponse, LayerData, Overlap,
        RankedOverlap,
    };

    fn wait_for<T: Send + 'static>(
        coordinator: &mut RequestCoordinator<T>,
    ) -> Option<ExplorerResult<T>> {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(5) {
            if let Some(result) = coordinator.poll(Instant::now()) {
                return Some(result);
            }
            if !coordinator.is_busy() {
                return None;
            }
            thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn debouncer_coalesces_bursts() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.push(1, start);
        debouncer.push(2, start + Duration::from_millis(40));
        debouncer.push(3, start + Duration::from_millis(80));

        assert_eq!(debouncer.ready(start + Duration::from_millis(150)), None);
        assert_eq!(debouncer.ready(start + Duration::from_millis(180)), Some(3));
        assert_eq!(debouncer.ready(start + Duration::from_millis(400)), None);
    }

    #[test]
    fn only_the_last_scheduled_job_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut coordinator = RequestCoordinator::new("test", Duration::from_millis(100));
        let start = Instant::now();

        for value in 0..3 {
            let runs = Arc::clone(&runs);
            coordinator.schedule(
                move |_| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(value)
                },
                start,
            );
        }

        assert!(coordinator.poll(start).is_none());
        let result = coordinator
            .poll(start + Duration::from_millis(150))
            .or_else(|| wait_for(&mut coordinator));

        assert_eq!(result, Some(Ok(2)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn superseded_request_is_cancelled_and_dropped() {
        let observed_cancel = Arc::new(AtomicBool::new(false));
        let mut coordinator = RequestCoordinator::new("test", Duration::ZERO);

        let flag = Arc::clone(&observed_cancel);
        let (started_tx, started_rx) = mpsc::channel();
        coordinator.launch_now(move |token: &CancelToken| {
            let _ = started_tx.send(());
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
            Ok("stale")
        });
        // Supersede only once the first job is running, or it never sees the token fire.
        assert!(started_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        coordinator.launch_now(|_| Ok("fresh"));

        assert_eq!(wait_for(&mut coordinator), Some(Ok("fresh")));

        let started = Instant::now();
        while !observed_cancel.load(Ordering::SeqCst) && started.elapsed() < Duration::from_secs(5)
        {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(observed_cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn job_superseded_before_it_starts_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut coordinator = RequestCoordinator::new("test", Duration::ZERO);

        let counter = Arc::clone(&runs);
        coordinator.schedule(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            },
            Instant::now(),
        );
        coordinator.launch_now(|_| Ok(2));

        assert_eq!(wait_for(&mut coordinator), Some(Ok(2)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancelled_results_are_swallowed() {
        let mut coordinator: RequestCoordinator<u32> =
            RequestCoordinator::new("test", Duration::ZERO);
        coordinator.launch_now(|_| Err(ExplorerError::CancelledRequest));
        assert_eq!(wait_for(&mut coordinator), None);
    }

    #[test]
    fn failures_are_surfaced() {
        let mut coordinator: RequestCoordinator<u32> =
            RequestCoordinator::new("test", Duration::ZERO);
        coordinator.launch_now(|_| Err(ExplorerError::network("ballmapper", "HTTP 500")));
        assert!(matches!(
            wait_for(&mut coordinator),
            Some(Err(ExplorerError::NetworkFailure { .. }))
        ));
    }

    struct FakeApi {
        neighbor_calls: Mutex<Vec<PointId>>,
    }

    impl DataApi for FakeApi {
        fn layer_data(&self, _: &SessionKey, _: &CancelToken) -> ExplorerResult<LayerData> {
            Err(ExplorerError::empty("layer data"))
        }

        fn ball_mapper_graph(
            &self,
            _: &GraphQuery,
            _: &CancelToken,
        ) -> ExplorerResult<GraphResponse> {
            Err(ExplorerError::empty("graph nodes"))
        }

        fn nearest_neighbors(
            &self,
            _: &SessionKey,
            point: PointId,
            _: &[String],
            _: &CancelToken,
        ) -> ExplorerResult<Vec<Neighbor>> {
            if let Ok(mut calls) = self.neighbor_calls.lock() {
                calls.push(point);
            }
            if point == 13 {
                return Err(ExplorerError::network("nearest-saes", "HTTP 404"));
            }
            Ok(vec![Neighbor {
                id: point + 100,
                similarity: 0.5,
                label: format!("near {point}"),
            }])
        }

        fn concepts(&self, _: &SessionKey, _: &CancelToken) -> ExplorerResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn search_concept(
            &self,
            _: &SessionKey,
            concept: &str,
            _: &CancelToken,
        ) -> ExplorerResult<ConceptMatches> {
            Ok(ConceptMatches {
                concept: concept.to_owned(),
                matches: Vec::new(),
                category_distribution: Vec::new(),
            })
        }

        fn category_overlaps(
            &self,
            _: &SessionKey,
            _: &str,
            _: &CancelToken,
        ) -> ExplorerResult<BTreeMap<String, Overlap>> {
            Ok(BTreeMap::new())
        }

        fn pinned_category_overlaps(
            &self,
            _: &SessionKey,
            _: &str,
            _: &CancelToken,
        ) -> ExplorerResult<Vec<RankedOverlap>> {
            Ok(Vec::new())
        }

        fn concept_datasets(&self, _: &CancelToken) -> ExplorerResult<Vec<ConceptDataset>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn neighbor_batch_reports_each_source_with_its_generation() {
        let api = Arc::new(FakeApi {
            neighbor_calls: Mutex::new(Vec::new()),
        });
        let mut fetcher = NeighborFetcher::new();
        let key = SessionKey {
            layer: 1,
            threshold: 0.5,
            concept_dataset: "thingsplus".to_owned(),
        };
        fetcher.start(api.clone(), key, Vec::new(), 7, vec![3, 13, 9]);

        let mut results = Vec::new();
        let started = Instant::now();
        while results.len() < 3 && started.elapsed() < Duration::from_secs(5) {
            results.extend(fetcher.drain());
            thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(results.len(), 3);
        assert!(!fetcher.is_active());
        assert!(results.iter().all(|result| result.generation == 7));
        let failed = results.iter().find(|result| result.source == 13).unwrap();
        assert!(failed.result.is_err());
        let nine = results.iter().find(|result| result.source == 9).unwrap();
        assert_eq!(nine.result.as_ref().unwrap()[0].id, 109);
        assert_eq!(api.neighbor_calls.lock().unwrap().as_slice(), &[3, 13, 9]);
    }
}
