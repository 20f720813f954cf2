use super::key::{DescriptorMap, UiStateDescriptor};
use crate::error::{DocscanError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Millisecond time source for the stabilizer
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> f64;
}

/// Milliseconds elapsed since the clock was created
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-driven clock for deterministic tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Mutex::new(start_ms),
        }
    }

    pub fn set(&self, ms: f64) {
        *self.now.lock() = ms;
    }

    pub fn advance(&self, ms: f64) {
        *self.now.lock() += ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.now.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> f64 {
        (**self).now_ms()
    }
}

/// Tunables for [`FeedbackStabilizer`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerOptions {
    /// Events older than this are evicted from the main queue
    pub time_window_ms: f64,
    /// Per-submission decay multiplier applied to every queued event
    pub decay_rate: f64,
}

impl Default for StabilizerOptions {
    fn default() -> Self {
        Self {
            time_window_ms: 3000.0,
            decay_rate: 0.95,
        }
    }
}

/// How a submitted event is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Competes in the decayed scoring over the time window
    Scored,
    /// Shown exactly once as soon as the dwell gate opens
    OneShot,
}

/// One submitted UI state observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UiStateEvent<K> {
    pub key: K,
    pub timestamp_ms: f64,
    pub current_weight: f64,
    pub kind: EventKind,
}

/// Per-key snapshot of the last scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct KeyScore<K> {
    pub key: K,
    pub weights: Vec<f64>,
    pub summed_score: f64,
}

/// Smooths a noisy stream of UI state keys into one current state.
///
/// Scored events decay with age and are weighed by frequency within the time
/// window. A state, once shown, stays for at least its `min_duration_ms`.
/// One-shot events skip scoring and take over as soon as that gate opens.
pub struct FeedbackStabilizer<K> {
    descriptors: DescriptorMap<K>,
    options: StabilizerOptions,
    clock: Arc<dyn Clock>,
    initial_key: K,
    current: UiStateDescriptor<K>,
    current_state_start_ms: f64,
    event_queue: VecDeque<UiStateEvent<K>>,
    single_emit_queue: VecDeque<UiStateEvent<K>>,
    scores: Vec<KeyScore<K>>,
}

impl<K> FeedbackStabilizer<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new(
        descriptors: DescriptorMap<K>,
        initial_key: K,
        options: StabilizerOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let current = *descriptors.get(&initial_key).ok_or_else(|| {
            DocscanError::component(
                "feedback_stabilizer".to_string(),
                format!("Initial key {:?} has no descriptor", initial_key),
            )
        })?;

        let now = clock.now_ms();
        Ok(Self {
            descriptors,
            options,
            clock,
            initial_key,
            current,
            current_state_start_ms: now,
            event_queue: VecDeque::new(),
            single_emit_queue: VecDeque::new(),
            scores: Vec::new(),
        })
    }

    /// Record an observation of `key` and return the state that should be
    /// shown now. This is the only mutator besides [`reset`](Self::reset).
    pub fn submit_event(&mut self, key: K) -> UiStateDescriptor<K> {
        let now = self.clock.now_ms();

        let Some(descriptor) = self.descriptors.get(&key).copied() else {
            warn!("Ignoring UI state {:?} without a descriptor", key);
            return self.current;
        };

        let kind = if descriptor.single_emit {
            EventKind::OneShot
        } else {
            EventKind::Scored
        };
        let event = UiStateEvent {
            key,
            timestamp_ms: now,
            current_weight: descriptor.weight(),
            kind,
        };

        if kind == EventKind::OneShot {
            // Unlike scored events, a one-shot is not pushed on every
            // submission: repeats of a queued or showing one-shot are dropped
            let pending = self.single_emit_queue.iter().any(|e| e.key == key);
            if !pending && self.current.key != key {
                trace!("Queued one-shot UI state {:?}", key);
                self.single_emit_queue.push_back(event);
            }
        }

        if self.gate_open(now) {
            if let Some(next) = self.single_emit_queue.pop_front() {
                self.event_queue.clear();
                self.scores.clear();
                self.switch_to(next.key, now);
                return self.current;
            }
        }

        if kind == EventKind::Scored {
            self.event_queue.push_back(event);
        }

        let window = self.options.time_window_ms;
        while let Some(oldest) = self.event_queue.front() {
            if now - oldest.timestamp_ms > window {
                self.event_queue.pop_front();
            } else {
                break;
            }
        }

        for queued in self.event_queue.iter_mut() {
            let ratio = if now > 0.0 {
                queued.timestamp_ms / now
            } else {
                1.0
            };
            queued.current_weight *= self.options.decay_rate * ratio;
        }

        self.rebuild_score_board();

        if !self.gate_open(now) {
            return self.current;
        }

        let total = self.event_queue.len();
        if total == 0 {
            return self.current;
        }

        for score in self.scores.iter_mut() {
            let count = score.weights.len() as f64;
            let weight_sum: f64 = score.weights.iter().sum();
            score.summed_score = (count / total as f64) * weight_sum;
        }

        // Scores are in declaration order, so strict `>` resolves ties in
        // favour of the key declared first.
        let mut winner: Option<(K, f64)> = None;
        for score in &self.scores {
            match winner {
                Some((_, best)) if score.summed_score <= best => {}
                _ => winner = Some((score.key, score.summed_score)),
            }
        }

        if let Some((key, score)) = winner {
            if key != self.current.key {
                debug!(
                    "UI state {:?} -> {:?} (score {:.4} over {} events)",
                    self.current.key, key, score, total
                );
                self.switch_to(key, now);
            }
        }

        self.current
    }

    fn rebuild_score_board(&mut self) {
        let mut scores: Vec<(usize, KeyScore<K>)> = Vec::new();
        for event in &self.event_queue {
            let position = self.descriptors.position(&event.key).unwrap_or(usize::MAX);
            match scores.iter_mut().find(|(_, s)| s.key == event.key) {
                Some((_, score)) => score.weights.push(event.current_weight),
                None => scores.push((
                    position,
                    KeyScore {
                        key: event.key,
                        weights: vec![event.current_weight],
                        summed_score: 0.0,
                    },
                )),
            }
        }
        scores.sort_by_key(|(position, _)| *position);
        self.scores = scores.into_iter().map(|(_, s)| s).collect();
    }

    fn switch_to(&mut self, key: K, now: f64) {
        if let Some(descriptor) = self.descriptors.get(&key) {
            self.current = *descriptor;
            self.current_state_start_ms = now;
        }
    }

    fn gate_open(&self, now: f64) -> bool {
        now - self.current_state_start_ms >= self.current.min_duration_ms as f64
    }

    /// The state currently shown
    pub fn current_state(&self) -> &UiStateDescriptor<K> {
        &self.current
    }

    pub fn current_key(&self) -> K {
        self.current.key
    }

    pub fn current_state_start_ms(&self) -> f64 {
        self.current_state_start_ms
    }

    /// Whether the current state's minimum duration has elapsed
    pub fn can_show_new_state(&self) -> bool {
        self.gate_open(self.clock.now_ms())
    }

    pub fn event_queue(&self) -> &VecDeque<UiStateEvent<K>> {
        &self.event_queue
    }

    pub fn single_emit_queue(&self) -> &VecDeque<UiStateEvent<K>> {
        &self.single_emit_queue
    }

    /// Decayed weights per key from the last submission. Diagnostic only.
    pub fn score_board(&self) -> &[KeyScore<K>] {
        &self.scores
    }

    /// Summed score of `key` from the last scoring pass, if it was scored
    pub fn summed_score(&self, key: &K) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| &s.key == key)
            .map(|s| s.summed_score)
    }

    pub fn descriptors(&self) -> &DescriptorMap<K> {
        &self.descriptors
    }

    /// Clear both queues and return to the initial state
    pub fn reset(&mut self) {
        self.event_queue.clear();
        self.single_emit_queue.clear();
        self.scores.clear();
        let now = self.clock.now_ms();
        self.switch_to(self.initial_key, now);
        debug!("Feedback stabilizer reset to {:?}", self.initial_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_map() -> DescriptorMap<&'static str> {
        DescriptorMap::new(vec![
            UiStateDescriptor::new("A", 1000),
            UiStateDescriptor::new("B", 1000),
            UiStateDescriptor::new("C", 1000),
            UiStateDescriptor::new("X", 2000).single_emit(),
        ])
    }

    fn stabilizer(clock: &Arc<ManualClock>) -> FeedbackStabilizer<&'static str> {
        FeedbackStabilizer::new(
            scenario_map(),
            "A",
            StabilizerOptions::default(),
            Arc::clone(clock) as Arc<dyn Clock>,
        )
        .unwrap()
    }

    fn submit_at(
        stabilizer: &mut FeedbackStabilizer<&'static str>,
        clock: &ManualClock,
        at_ms: f64,
        key: &'static str,
    ) -> &'static str {
        clock.set(at_ms);
        stabilizer.submit_event(key).key
    }

    #[test]
    fn test_majority_weighted_key_wins() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        for (i, key) in ["B", "C", "C", "C", "B"].into_iter().enumerate() {
            submit_at(&mut s, &clock, 1000.0 + 500.0 * i as f64, key);
        }

        assert_eq!(s.current_state().key, "C");
    }

    #[test]
    fn test_single_emit_waits_for_gate_then_clears_queue() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        assert_eq!(submit_at(&mut s, &clock, 1000.0, "B"), "B");
        assert_eq!(submit_at(&mut s, &clock, 1100.0, "X"), "B");
        submit_at(&mut s, &clock, 1200.0, "C");
        submit_at(&mut s, &clock, 1300.0, "C");
        submit_at(&mut s, &clock, 1400.0, "B");

        assert_eq!(s.current_state().key, "B");
        assert!(!s.can_show_new_state());
        assert!(s.event_queue().iter().all(|e| e.key != "X"));
        assert_eq!(s.single_emit_queue().len(), 1);

        clock.set(2000.0);
        assert!(s.can_show_new_state());
        assert_eq!(submit_at(&mut s, &clock, 2000.0, "C"), "X");
        assert!(s.event_queue().is_empty());
        assert!(s.single_emit_queue().is_empty());

        // X holds for its own two seconds
        assert_eq!(submit_at(&mut s, &clock, 2500.0, "C"), "X");
        assert_eq!(submit_at(&mut s, &clock, 3900.0, "C"), "X");
    }

    #[test]
    fn test_repeated_one_shot_shown_once() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        for t in [100.0, 200.0, 300.0] {
            submit_at(&mut s, &clock, t, "X");
        }
        assert_eq!(s.single_emit_queue().len(), 1);

        assert_eq!(submit_at(&mut s, &clock, 1000.0, "X"), "X");
        assert!(s.single_emit_queue().is_empty());

        // Still showing X: further X events do not queue a second showing
        submit_at(&mut s, &clock, 1500.0, "X");
        assert!(s.single_emit_queue().is_empty());
        assert_eq!(submit_at(&mut s, &clock, 3000.0, "B"), "B");
    }

    #[test]
    fn test_min_duration_blocks_switch() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        assert_eq!(submit_at(&mut s, &clock, 1000.0, "B"), "B");
        let switched_at = s.current_state_start_ms();

        // C overwhelms the queue but the gate is closed until 2000
        for t in [1100.0, 1200.0, 1300.0, 1500.0, 1800.0, 1999.0] {
            assert_eq!(submit_at(&mut s, &clock, t, "C"), "B");
        }
        assert!(s.summed_score(&"C").is_some());
        assert_eq!(s.current_state_start_ms(), switched_at);

        assert_eq!(submit_at(&mut s, &clock, 2000.0, "C"), "C");
    }

    #[test]
    fn test_decay_penalizes_older_events() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        submit_at(&mut s, &clock, 1000.0, "B");
        submit_at(&mut s, &clock, 1600.0, "B");

        let queue: Vec<_> = s.event_queue().iter().collect();
        assert_eq!(queue.len(), 2);
        assert!(queue[0].timestamp_ms < queue[1].timestamp_ms);
        assert!(queue[0].current_weight < queue[1].current_weight);
        assert!(queue[1].current_weight < 1.0);
    }

    #[test]
    fn test_window_eviction() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        submit_at(&mut s, &clock, 1000.0, "B");
        submit_at(&mut s, &clock, 2500.0, "C");
        assert!(s.summed_score(&"B").is_some());

        // B at 1000 is now more than 3000ms old
        submit_at(&mut s, &clock, 4001.0, "C");
        assert!(s.event_queue().iter().all(|e| e.key != "B"));
        assert!(s.summed_score(&"B").is_none());
        assert!(s.score_board().iter().all(|k| k.key != "B"));
        assert_eq!(s.current_state().key, "C");
    }

    #[test]
    fn test_empty_queue_keeps_current_state() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        // One-shot while the gate is closed: nothing lands in the main queue
        assert_eq!(submit_at(&mut s, &clock, 100.0, "X"), "A");
        assert!(s.event_queue().is_empty());
        assert!(s.score_board().is_empty());
    }

    #[test]
    fn test_tie_breaks_on_declaration_order() {
        let clock = Arc::new(ManualClock::new(0.0));
        let map = DescriptorMap::new(vec![
            UiStateDescriptor::new("A", 0),
            UiStateDescriptor::new("C", 0),
            UiStateDescriptor::new("B", 0),
        ]);
        let mut s = FeedbackStabilizer::new(
            map,
            "A",
            StabilizerOptions {
                time_window_ms: 3000.0,
                decay_rate: 1.0,
            },
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();

        // Same timestamp, same weight: B and C tie exactly
        clock.set(1000.0);
        s.submit_event("B");
        s.submit_event("C");
        assert_eq!(s.summed_score(&"B"), s.summed_score(&"C"));
        assert_eq!(s.current_state().key, "C");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut s = stabilizer(&clock);

        submit_at(&mut s, &clock, 1000.0, "B");
        submit_at(&mut s, &clock, 1100.0, "X");
        submit_at(&mut s, &clock, 1200.0, "C");

        for _ in 0..2 {
            s.reset();
            assert_eq!(s.current_state().key, "A");
            assert!(s.event_queue().is_empty());
            assert!(s.single_emit_queue().is_empty());
            assert!(s.score_board().is_empty());
        }
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let clock = Arc::new(ManualClock::new(5000.0));
        let mut s = stabilizer(&clock);
        assert_eq!(s.submit_event("nope").key, "A");
        assert!(s.event_queue().is_empty());
    }

    #[test]
    fn test_initial_key_must_have_descriptor() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0.0));
        let result =
            FeedbackStabilizer::new(scenario_map(), "Z", StabilizerOptions::default(), clock);
        assert!(result.is_err());
    }

    #[test]
    fn test_initial_weight_scales_score() {
        let clock = Arc::new(ManualClock::new(0.0));
        let map = DescriptorMap::new(vec![
            UiStateDescriptor::new("A", 0),
            UiStateDescriptor::new("B", 0),
            UiStateDescriptor::new("C", 0).with_initial_weight(3.0),
        ]);
        let mut s = FeedbackStabilizer::new(
            map,
            "A",
            StabilizerOptions::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();

        clock.set(1000.0);
        s.submit_event("B");
        s.submit_event("B");
        s.submit_event("C");
        // Two B events outscore one heavy C
        assert_eq!(s.current_state().key, "B");

        clock.set(1001.0);
        s.submit_event("C");
        assert_eq!(s.current_state().key, "C");
    }
}
