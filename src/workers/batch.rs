use std::time::Duration;

use tokio::time::Instant;

use crate::config::{BatchConfig, BatchRule};

/// How often the batch task re-evaluates its thresholds.
pub const BATCH_TICK: Duration = Duration::from_secs(60);

/// Threshold state for batch mode: a clock since the last run, compared
/// together with the queued backlog on every tick.
#[derive(Debug, Clone)]
pub struct BatchTrigger {
    document_threshold: u64,
    time_threshold: Duration,
    rule: BatchRule,
    last_run: Instant,
}

impl BatchTrigger {
    pub fn new(config: &BatchConfig, now: Instant) -> Self {
        Self {
            document_threshold: config.document_threshold,
            time_threshold: config.time_threshold,
            rule: config.rule,
            last_run: now,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_run)
    }

    pub fn should_run(&self, queued: u64, now: Instant) -> bool {
        let time_met = self.elapsed(now) >= self.time_threshold;
        let count_met = queued >= self.document_threshold;
        match self.rule {
            BatchRule::Either => time_met || count_met,
            BatchRule::Both => time_met && count_met,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last_run = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rule: BatchRule) -> BatchConfig {
        BatchConfig {
            document_threshold: 10,
            time_threshold: Duration::from_secs(600),
            rule,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn either_fires_on_whichever_threshold_comes_first() {
        let start = Instant::now();
        let trigger = BatchTrigger::new(&config(BatchRule::Either), start);

        assert!(!trigger.should_run(3, start + Duration::from_secs(60)));
        assert!(trigger.should_run(10, start + Duration::from_secs(60)));
        assert!(trigger.should_run(0, start + Duration::from_secs(600)));
    }

    #[test]
    fn both_requires_count_and_time() {
        let start = Instant::now();
        let trigger = BatchTrigger::new(&config(BatchRule::Both), start);

        assert!(!trigger.should_run(25, start + Duration::from_secs(60)));
        assert!(!trigger.should_run(2, start + Duration::from_secs(900)));
        assert!(trigger.should_run(25, start + Duration::from_secs(900)));
    }

    #[test]
    fn reset_restarts_the_clock() {
        let start = Instant::now();
        let mut trigger = BatchTrigger::new(&config(BatchRule::Either), start);
        let later = start + Duration::from_secs(700);
        assert!(trigger.should_run(0, later));

        trigger.reset(later);
        assert_eq!(trigger.elapsed(later), Duration::ZERO);
        assert!(!trigger.should_run(0, later + Duration::from_secs(30)));
    }
}
