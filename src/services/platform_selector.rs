//! Platform selection (load balancing across service platforms).
//!
//! Round-robin usage counters live for the whole process and are keyed by
//! platform type, then platform name.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;
use tracing::debug;

use crate::domain::errors::{CuratorError, CuratorResult};
use crate::domain::models::{normalize_platform_type, PlatformsConfig, SelectionStrategy, ServicePlatform};

/// Usage counters per platform type, per platform name.
pub type UsageCounters = HashMap<String, HashMap<String, u64>>;

/// Picks one concrete platform for a requested platform type.
#[derive(Debug, Default)]
pub struct PlatformSelector {
    strategy: SelectionStrategy,
    overrides: HashMap<String, String>,
    usage: Mutex<UsageCounters>,
}

impl PlatformSelector {
    pub fn new(strategy: SelectionStrategy, overrides: HashMap<String, String>) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(platform_type, name)| (normalize_platform_type(&platform_type), name))
            .collect();
        Self {
            strategy,
            overrides,
            usage: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &PlatformsConfig) -> Self {
        Self::new(config.strategy, config.overrides.clone())
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Select with the configured strategy and override table.
    pub fn select(
        &self,
        platform_type: &str,
        pool: &[ServicePlatform],
    ) -> CuratorResult<ServicePlatform> {
        let platform_type = normalize_platform_type(platform_type);
        let override_name = self.overrides.get(&platform_type).map(String::as_str);
        self.select_with(self.strategy, &platform_type, pool, override_name)
    }

    /// Select with an explicit strategy and override name.
    pub fn select_with(
        &self,
        strategy: SelectionStrategy,
        platform_type: &str,
        pool: &[ServicePlatform],
        override_name: Option<&str>,
    ) -> CuratorResult<ServicePlatform> {
        if pool.is_empty() {
            return Err(CuratorError::PlatformUnavailable {
                platform_type: platform_type.to_string(),
                reason: "the platform adapter lists no platform of this type".to_string(),
            });
        }

        let chosen = match strategy {
            SelectionStrategy::Override => {
                let name = override_name.ok_or_else(|| CuratorError::PlatformUnavailable {
                    platform_type: platform_type.to_string(),
                    reason: "no override platform configured".to_string(),
                })?;
                pool.iter()
                    .find(|p| p.name == name)
                    .ok_or_else(|| CuratorError::NotFound(format!("platform {name}")))?
            }
            SelectionStrategy::Random => pool
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| CuratorError::PlatformUnavailable {
                    platform_type: platform_type.to_string(),
                    reason: "empty pool".to_string(),
                })?,
            SelectionStrategy::RoundRobin => self.least_used(platform_type, pool),
            SelectionStrategy::First => &pool[0],
        };

        debug!(
            platform_type,
            strategy = strategy.as_str(),
            platform = %chosen.name,
            "selected service platform"
        );
        Ok(chosen.clone())
    }

    fn least_used<'a>(&self, platform_type: &str, pool: &'a [ServicePlatform]) -> &'a ServicePlatform {
        let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        let counters = usage.entry(platform_type.to_string()).or_default();

        // min_by_key keeps the first minimum, so ties go to pool order
        let chosen = pool
            .iter()
            .min_by_key(|p| counters.get(&p.name).copied().unwrap_or(0))
            .unwrap_or(&pool[0]);
        *counters.entry(chosen.name.clone()).or_insert(0) += 1;
        chosen
    }

    /// Copy of the round-robin counters, for diagnostics.
    pub fn usage_snapshot(&self) -> UsageCounters {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> Vec<ServicePlatform> {
        names
            .iter()
            .map(|n| ServicePlatform::new(*n, "sonata"))
            .collect()
    }

    #[test]
    fn test_empty_pool_is_unavailable() {
        let selector = PlatformSelector::default();
        let err = selector.select("SONATA", &[]).unwrap_err();
        assert!(matches!(err, CuratorError::PlatformUnavailable { .. }));
    }

    #[test]
    fn test_first_is_default() {
        let selector = PlatformSelector::default();
        let chosen = selector.select("sonata", &pool(&["a", "b"])).unwrap();
        assert_eq!(chosen.name, "a");
    }

    #[test]
    fn test_override_picks_named_platform() {
        let overrides = HashMap::from([("SONATA".to_string(), "b".to_string())]);
        let selector = PlatformSelector::new(SelectionStrategy::Override, overrides);
        let chosen = selector.select("sonata", &pool(&["a", "b"])).unwrap();
        assert_eq!(chosen.name, "b");
    }

    #[test]
    fn test_override_missing_from_pool() {
        let overrides = HashMap::from([("sonata".to_string(), "zzz".to_string())]);
        let selector = PlatformSelector::new(SelectionStrategy::Override, overrides);
        let err = selector.select("sonata", &pool(&["a"])).unwrap_err();
        assert!(matches!(err, CuratorError::NotFound(_)));
    }

    #[test]
    fn test_random_stays_in_pool() {
        let selector = PlatformSelector::new(SelectionStrategy::Random, HashMap::new());
        let pool = pool(&["a", "b", "c"]);
        for _ in 0..20 {
            let chosen = selector.select("sonata", &pool).unwrap();
            assert!(pool.contains(&chosen));
        }
    }

    #[test]
    fn test_round_robin_cycles_in_pool_order() {
        let selector = PlatformSelector::new(SelectionStrategy::RoundRobin, HashMap::new());
        let pool = pool(&["a", "b", "c"]);
        let picks: Vec<String> = (0..6)
            .map(|_| selector.select("sonata", &pool).unwrap().name)
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_round_robin_prefers_newly_seen_platform() {
        let selector = PlatformSelector::new(SelectionStrategy::RoundRobin, HashMap::new());
        selector.select("sonata", &pool(&["a", "b"])).unwrap();
        selector.select("sonata", &pool(&["a", "b"])).unwrap();

        let chosen = selector.select("sonata", &pool(&["a", "b", "c"])).unwrap();
        assert_eq!(chosen.name, "c");
    }

    #[test]
    fn test_round_robin_counters_are_per_type() {
        let selector = PlatformSelector::new(SelectionStrategy::RoundRobin, HashMap::new());
        selector.select("sonata", &pool(&["a", "b"])).unwrap();
        let osm = vec![ServicePlatform::new("a", "osm"), ServicePlatform::new("b", "osm")];
        assert_eq!(selector.select("osm", &osm).unwrap().name, "a");

        let usage = selector.usage_snapshot();
        assert_eq!(usage["sonata"]["a"], 1);
        assert_eq!(usage["osm"]["a"], 1);
    }
}
