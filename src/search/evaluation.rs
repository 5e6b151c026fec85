//! Cached, time-limited candidate evaluation on a worker pool.

use super::config::SearchConfig;
use super::types::{CancelHandle, ObjectEvaluator};
use crate::error::{ConfigurationError, EvaluationError};
use crate::model::ComponentInstance;
use crossbeam_channel::{unbounded, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a waiting coordinator re-checks cancellation and free slots.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cached outcome of one candidate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub score: Result<f64, EvaluationError>,
    /// Wall-clock time the evaluator spent on the candidate.
    pub eval_time: Duration,
}

impl EvaluationRecord {
    fn new(score: Result<f64, EvaluationError>, eval_time: Duration) -> Self {
        Self { score, eval_time }
    }

    pub fn is_success(&self) -> bool {
        self.score.is_ok()
    }

    /// Whether the outcome says something about the candidate itself.
    /// Interrupted evaluations are not.
    fn is_cacheable(&self) -> bool {
        !matches!(self.score, Err(EvaluationError::Cancelled))
    }
}

/// Index of the batch entry, its score and the time the evaluator took.
type Outcome = (usize, Result<f64, EvaluationError>, Duration);

/// Sends the outcome of one evaluation, or a failure if the evaluator
/// unwinds before producing one.
struct Reply {
    index: usize,
    started: Instant,
    tx: Option<Sender<Outcome>>,
}

impl Reply {
    fn send(mut self, score: Result<f64, EvaluationError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send((self.index, score, self.started.elapsed()));
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let failure = EvaluationError::failed("evaluator terminated without a result");
            let _ = tx.send((self.index, Err(failure), self.started.elapsed()));
        }
    }
}

/// One of the `cpus` evaluation slots, held by a dispatched evaluation.
///
/// Released when the evaluation finishes or when the coordinator
/// abandons it, whichever comes first.
struct SlotLease {
    free: Arc<AtomicUsize>,
    released: AtomicBool,
}

impl SlotLease {
    fn acquire(free: &Arc<AtomicUsize>) -> Option<Arc<Self>> {
        free.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|_| {
                Arc::new(Self {
                    free: Arc::clone(free),
                    released: AtomicBool::new(false),
                })
            })
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.free.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// An evaluation the coordinator is waiting on.
struct Flight {
    dispatched: Instant,
    /// When the candidate's own timeout runs out.
    expires: Option<Instant>,
    lease: Arc<SlotLease>,
    pool: Arc<rayon::ThreadPool>,
}

/// Evaluates component instances with a user [`ObjectEvaluator`].
///
/// Each distinct instance is handed to the evaluator at most once; later
/// requests are served from a concurrent cache keyed by the instance's
/// structure and values. Failures are cached as well, and so are scores
/// that are not finite, as failures.
///
/// At most `cpus` evaluations run at a time. The caller waits for each
/// result up to the per-candidate timeout, counted from dispatch, and
/// abandons it afterwards. An abandoned evaluation gives up its slot at
/// once: the pool it still occupies is retired and later evaluations run
/// on a fresh one.
pub struct CandidateEvaluator {
    evaluator: Arc<dyn ObjectEvaluator>,
    pool: Mutex<Arc<rayon::ThreadPool>>,
    cpus: usize,
    free_slots: Arc<AtomicUsize>,
    cache: DashMap<ComponentInstance, EvaluationRecord>,
    timeout: Option<Duration>,
    cancel: CancelHandle,
    external_calls: AtomicUsize,
}

fn build_pool(cpus: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(cpus)
        .thread_name(|i| format!("configsearch-eval-{i}"))
        .panic_handler(|_| warn!("object evaluator panicked"))
        .build()
}

/// Non-finite scores cannot be ranked and count as failed evaluations.
fn finite(score: Result<f64, EvaluationError>) -> Result<f64, EvaluationError> {
    match score {
        Ok(s) if !s.is_finite() => Err(EvaluationError::failed(format!("non-finite score {s}"))),
        other => other,
    }
}

impl CandidateEvaluator {
    /// Creates an evaluator with a pool of `config.cpus` workers.
    pub fn new(
        evaluator: Arc<dyn ObjectEvaluator>,
        config: &SearchConfig,
        cancel: CancelHandle,
    ) -> Result<Self, ConfigurationError> {
        config.validate().map_err(ConfigurationError::InvalidConfig)?;
        let pool = build_pool(config.cpus)
            .map_err(|e| ConfigurationError::InvalidConfig(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            evaluator,
            pool: Mutex::new(Arc::new(pool)),
            cpus: config.cpus,
            free_slots: Arc::new(AtomicUsize::new(config.cpus)),
            cache: DashMap::new(),
            timeout: config.candidate_timeout,
            cancel,
            external_calls: AtomicUsize::new(0),
        })
    }

    /// Evaluates a single instance, waiting at most until `deadline`.
    pub fn evaluate(&self, instance: &ComponentInstance, deadline: Option<Instant>) -> EvaluationRecord {
        self.evaluate_batch(std::slice::from_ref(instance), deadline)
            .pop()
            .unwrap_or_else(|| EvaluationRecord::new(Err(EvaluationError::Cancelled), Duration::ZERO))
    }

    /// Evaluates instances concurrently; results are in input order.
    ///
    /// Repeated instances within the batch are evaluated once. Cached
    /// instances are answered immediately. Partial instances are rejected
    /// with [`EvaluationError::Incomplete`] without reaching the
    /// evaluator. Waiting stops at `deadline`, at each candidate's own
    /// timeout or on cancellation. Results interrupted by cancellation or
    /// by `deadline` are not cached.
    pub fn evaluate_batch(
        &self,
        instances: &[ComponentInstance],
        deadline: Option<Instant>,
    ) -> Vec<EvaluationRecord> {
        let mut records: Vec<Option<EvaluationRecord>> = vec![None; instances.len()];
        let mut repeats: Vec<(usize, usize)> = Vec::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut first_seen: HashMap<&ComponentInstance, usize> = HashMap::new();

        for (i, instance) in instances.iter().enumerate() {
            if let Some(&earlier) = first_seen.get(instance) {
                repeats.push((i, earlier));
                continue;
            }
            first_seen.insert(instance, i);
            if let Some(hit) = self.cache.get(instance) {
                records[i] = Some(hit.value().clone());
                continue;
            }
            if let Err(reason) = instance.check_resolved() {
                let record =
                    EvaluationRecord::new(Err(EvaluationError::Incomplete(reason)), Duration::ZERO);
                records[i] = Some(self.store(instance, record));
                continue;
            }
            queue.push_back(i);
        }

        if !queue.is_empty() {
            self.drain(instances, queue, deadline, &mut records);
        }
        for (i, earlier) in repeats {
            records[i] = records[earlier].clone();
        }
        records
            .into_iter()
            .map(|r| r.unwrap_or_else(|| EvaluationRecord::new(Err(EvaluationError::Cancelled), Duration::ZERO)))
            .collect()
    }

    /// Dispatches queued entries as slots free up and collects their
    /// outcomes into `records`.
    fn drain(
        &self,
        instances: &[ComponentInstance],
        mut queue: VecDeque<usize>,
        deadline: Option<Instant>,
        records: &mut [Option<EvaluationRecord>],
    ) {
        let (tx, rx) = unbounded::<Outcome>();
        let mut in_flight: HashMap<usize, Flight> = HashMap::new();

        while !queue.is_empty() || !in_flight.is_empty() {
            let now = Instant::now();
            let cancelled = self.cancel.is_cancelled();
            if cancelled || deadline.is_some_and(|d| now >= d) {
                for (i, flight) in in_flight.drain() {
                    self.abandon(&flight);
                    let elapsed = flight.dispatched.elapsed();
                    let error = if cancelled {
                        EvaluationError::Cancelled
                    } else {
                        EvaluationError::TimedOut(elapsed)
                    };
                    records[i] = Some(EvaluationRecord::new(Err(error), elapsed));
                }
                for i in queue.drain(..) {
                    let error = if cancelled {
                        EvaluationError::Cancelled
                    } else {
                        EvaluationError::TimedOut(Duration::ZERO)
                    };
                    records[i] = Some(EvaluationRecord::new(Err(error), Duration::ZERO));
                }
                return;
            }

            let expired: Vec<usize> = in_flight
                .iter()
                .filter(|(_, f)| f.expires.is_some_and(|e| now >= e))
                .map(|(&i, _)| i)
                .collect();
            for i in expired {
                if let Some(flight) = in_flight.remove(&i) {
                    self.abandon(&flight);
                    let elapsed = flight.dispatched.elapsed();
                    debug!(instance = %instances[i], ?elapsed, "candidate evaluation timed out");
                    let record = EvaluationRecord::new(Err(EvaluationError::TimedOut(elapsed)), elapsed);
                    records[i] = Some(self.store(&instances[i], record));
                }
            }

            while let Some(&i) = queue.front() {
                let Some(lease) = SlotLease::acquire(&self.free_slots) else {
                    break;
                };
                queue.pop_front();
                in_flight.insert(i, self.dispatch(i, &instances[i], lease, tx.clone()));
            }

            let mut wake = now + POLL_INTERVAL;
            for d in in_flight.values().filter_map(|f| f.expires).chain(deadline) {
                wake = wake.min(d);
            }
            // Outcomes of abandoned evaluations have no flight left and are dropped.
            if let Ok((i, score, elapsed)) = rx.recv_deadline(wake) {
                let Some(flight) = in_flight.remove(&i) else {
                    continue;
                };
                flight.lease.release();
                let record = EvaluationRecord::new(finite(score), elapsed);
                match &record.score {
                    Ok(score) => debug!(instance = %instances[i], score, "candidate evaluated"),
                    Err(e) => debug!(instance = %instances[i], error = %e, "candidate evaluation failed"),
                }
                records[i] = Some(if record.is_cacheable() {
                    self.store(&instances[i], record)
                } else {
                    record
                });
            }
        }
    }

    fn dispatch(
        &self,
        index: usize,
        instance: &ComponentInstance,
        lease: Arc<SlotLease>,
        tx: Sender<Outcome>,
    ) -> Flight {
        let dispatched = Instant::now();
        let pool = Arc::clone(&*self.pool.lock());
        let evaluator = Arc::clone(&self.evaluator);
        let cancel = self.cancel.clone();
        let instance = instance.clone();
        let worker_lease = Arc::clone(&lease);
        self.external_calls.fetch_add(1, Ordering::Relaxed);
        pool.spawn(move || {
            let reply = Reply {
                index,
                started: Instant::now(),
                tx: Some(tx),
            };
            let score = if cancel.is_cancelled() {
                Err(EvaluationError::Cancelled)
            } else {
                evaluator.evaluate(&instance)
            };
            worker_lease.release();
            reply.send(score);
        });
        Flight {
            dispatched,
            expires: self.timeout.map(|t| dispatched + t),
            lease,
            pool,
        }
    }

    /// Gives up on an evaluation that may still be running.
    ///
    /// Its slot is freed, and if it runs on the current pool that pool is
    /// replaced so the occupied worker no longer counts against `cpus`.
    fn abandon(&self, flight: &Flight) {
        flight.lease.release();
        let mut current = self.pool.lock();
        if !Arc::ptr_eq(&*current, &flight.pool) {
            return;
        }
        match build_pool(self.cpus) {
            Ok(fresh) => {
                *current = Arc::new(fresh);
                debug!("evaluation pool replaced after abandoning a running evaluation");
            }
            Err(e) => warn!(error = %e, "cannot replace evaluation pool; abandoned worker keeps its thread"),
        }
    }

    /// Inserts `record` unless another caller cached the instance first,
    /// and returns whichever record is cached.
    fn store(&self, instance: &ComponentInstance, record: EvaluationRecord) -> EvaluationRecord {
        self.cache
            .entry(instance.clone())
            .or_insert(record)
            .value()
            .clone()
    }

    /// The cached record of `instance`, if it was evaluated before.
    pub fn cached(&self, instance: &ComponentInstance) -> Option<EvaluationRecord> {
        self.cache.get(instance).map(|r| r.value().clone())
    }

    /// Number of calls made to the user evaluator.
    pub fn external_calls(&self) -> usize {
        self.external_calls.load(Ordering::Relaxed)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }
}

impl std::fmt::Debug for CandidateEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateEvaluator")
            .field("cached", &self.cache.len())
            .field("external_calls", &self.external_calls())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Parameter};
    use std::thread;

    fn leaf(x: &str) -> ComponentInstance {
        let c = Arc::new(
            Component::new("Leaf")
                .provides("L")
                .with_parameter(Parameter::numeric("x", 0.0, 10.0, 1.0)),
        );
        ComponentInstance::new(c).with_parameter("x", x)
    }

    fn x_evaluator() -> Arc<dyn ObjectEvaluator> {
        Arc::new(|inst: &ComponentInstance| {
            inst.numeric_value("x")
                .ok_or_else(|| EvaluationError::failed("x not numeric"))
        })
    }

    #[test]
    fn test_evaluates_and_caches() {
        let eval = CandidateEvaluator::new(x_evaluator(), &SearchConfig::default(), CancelHandle::new()).unwrap();
        let a = leaf("3");
        assert_eq!(eval.evaluate(&a, None).score, Ok(3.0));
        assert_eq!(eval.evaluate(&a, None).score, Ok(3.0));
        assert_eq!(eval.external_calls(), 1, "second call must hit the cache");
        assert!(eval.cached(&a).is_some());
    }

    #[test]
    fn test_failures_are_cached() {
        let eval = CandidateEvaluator::new(x_evaluator(), &SearchConfig::default(), CancelHandle::new()).unwrap();
        let bad = leaf("[1, 2]");
        assert!(eval.evaluate(&bad, None).score.is_err());
        assert!(eval.evaluate(&bad, None).score.is_err());
        assert_eq!(eval.external_calls(), 1);
    }

    #[test]
    fn test_incomplete_never_reaches_evaluator() {
        let eval = CandidateEvaluator::new(x_evaluator(), &SearchConfig::default(), CancelHandle::new()).unwrap();
        let root = Arc::new(Component::new("Root").provides("R").requires("l", "L"));
        let partial = ComponentInstance::new(root);
        assert!(matches!(
            eval.evaluate(&partial, None).score,
            Err(EvaluationError::Incomplete(_))
        ));
        assert_eq!(eval.external_calls(), 0);
    }

    #[test]
    fn test_batch_preserves_order() {
        let config = SearchConfig::default().with_cpus(3);
        let eval = CandidateEvaluator::new(x_evaluator(), &config, CancelHandle::new()).unwrap();
        let batch = vec![leaf("5"), leaf("1"), leaf("5"), leaf("2")];
        let scores: Vec<f64> = eval
            .evaluate_batch(&batch, None)
            .into_iter()
            .map(|r| r.score.unwrap())
            .collect();
        assert_eq!(scores, vec![5.0, 1.0, 5.0, 2.0]);
        assert_eq!(eval.cache_len(), 3);
    }

    #[test]
    fn test_timeout_abandons_evaluation() {
        let slow: Arc<dyn ObjectEvaluator> = Arc::new(|_: &ComponentInstance| -> Result<f64, EvaluationError> {
            thread::sleep(Duration::from_millis(500));
            Ok(0.0)
        });
        let config = SearchConfig::default().with_candidate_timeout(Duration::from_millis(50));
        let eval = CandidateEvaluator::new(slow, &config, CancelHandle::new()).unwrap();
        let start = Instant::now();
        let record = eval.evaluate(&leaf("1"), None);
        assert!(matches!(record.score, Err(EvaluationError::TimedOut(_))));
        assert!(start.elapsed() < Duration::from_millis(400), "waited for the abandoned evaluation");
    }

    #[test]
    fn test_abandoned_evaluation_frees_its_worker() {
        let hangs_on_one: Arc<dyn ObjectEvaluator> =
            Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
                let x = inst.numeric_value("x").unwrap_or(0.0);
                if x == 1.0 {
                    thread::sleep(Duration::from_secs(3));
                }
                Ok(x)
            });
        let config = SearchConfig::default()
            .with_cpus(1)
            .with_candidate_timeout(Duration::from_millis(50));
        let eval = CandidateEvaluator::new(hangs_on_one, &config, CancelHandle::new()).unwrap();

        assert!(matches!(
            eval.evaluate(&leaf("1"), None).score,
            Err(EvaluationError::TimedOut(_))
        ));
        let start = Instant::now();
        assert_eq!(eval.evaluate(&leaf("2"), None).score, Ok(2.0));
        assert!(
            start.elapsed() < Duration::from_millis(1000),
            "next evaluation queued behind the abandoned one for {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_batch_continues_after_abandoned_entry() {
        let hangs_on_five: Arc<dyn ObjectEvaluator> =
            Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
                let x = inst.numeric_value("x").unwrap_or(0.0);
                if x == 5.0 {
                    thread::sleep(Duration::from_secs(3));
                }
                Ok(x)
            });
        let config = SearchConfig::default()
            .with_cpus(1)
            .with_candidate_timeout(Duration::from_millis(50));
        let eval = CandidateEvaluator::new(hangs_on_five, &config, CancelHandle::new()).unwrap();

        let start = Instant::now();
        let records = eval.evaluate_batch(&[leaf("5"), leaf("2"), leaf("3")], None);
        assert!(matches!(records[0].score, Err(EvaluationError::TimedOut(_))));
        assert_eq!(records[1].score, Ok(2.0));
        assert_eq!(records[2].score, Ok(3.0));
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(
            matches!(eval.cached(&leaf("5")).map(|r| r.score), Some(Err(EvaluationError::TimedOut(_)))),
            "a candidate timeout is a verdict on the candidate and is cached"
        );
    }

    #[test]
    fn test_non_finite_score_is_failure() {
        let nan: Arc<dyn ObjectEvaluator> =
            Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
                match inst.numeric_value("x") {
                    Some(x) if x == 1.0 => Ok(f64::NAN),
                    Some(x) if x == 2.0 => Ok(f64::INFINITY),
                    _ => Ok(0.5),
                }
            });
        let eval = CandidateEvaluator::new(nan, &SearchConfig::default(), CancelHandle::new()).unwrap();
        assert!(matches!(eval.evaluate(&leaf("1"), None).score, Err(EvaluationError::Failed(_))));
        assert!(matches!(eval.evaluate(&leaf("2"), None).score, Err(EvaluationError::Failed(_))));
        assert_eq!(eval.evaluate(&leaf("3"), None).score, Ok(0.5));
    }

    #[test]
    fn test_concurrent_requests_share_one_cache_entry() {
        let slowish: Arc<dyn ObjectEvaluator> =
            Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
                thread::sleep(Duration::from_millis(10));
                inst.numeric_value("x")
                    .ok_or_else(|| EvaluationError::failed("x not numeric"))
            });
        let config = SearchConfig::default().with_cpus(4);
        let eval = CandidateEvaluator::new(slowish, &config, CancelHandle::new()).unwrap();
        let instance = leaf("4");

        let records: Vec<EvaluationRecord> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| eval.evaluate(&instance, None)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(eval.cache_len(), 1);
        let cached = eval.cached(&instance).unwrap();
        assert!(records.iter().all(|r| *r == cached), "all callers must see the cached record");
        assert_eq!(cached.score, Ok(4.0));
    }

    #[test]
    fn test_cancellation_interrupts_wait() {
        let slow: Arc<dyn ObjectEvaluator> = Arc::new(|_: &ComponentInstance| -> Result<f64, EvaluationError> {
            thread::sleep(Duration::from_millis(500));
            Ok(0.0)
        });
        let cancel = CancelHandle::new();
        let eval = CandidateEvaluator::new(slow, &SearchConfig::default(), cancel.clone()).unwrap();
        let trigger = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.cancel();
        });
        let record = eval.evaluate(&leaf("1"), None);
        assert_eq!(record.score, Err(EvaluationError::Cancelled));
        assert!(eval.cached(&leaf("1")).is_none(), "cancelled results are not cached");
    }

    #[test]
    fn test_panicking_evaluator_reports_failure() {
        let panicky: Arc<dyn ObjectEvaluator> =
            Arc::new(|_: &ComponentInstance| -> Result<f64, EvaluationError> { panic!("boom") });
        let eval = CandidateEvaluator::new(panicky, &SearchConfig::default(), CancelHandle::new()).unwrap();
        assert!(matches!(
            eval.evaluate(&leaf("1"), None).score,
            Err(EvaluationError::Failed(_))
        ));
    }
}
