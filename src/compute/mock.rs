//! Mock simulation used as the default compute operation.
//!
//! Produces DPS-style metrics for a character payload after a random delay.
//! Sampling uses a ChaCha8 RNG so a seeded simulation is reproducible for a
//! given call order.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

use super::{ComputeError, ComputeOperation, ComputeRequest};

/// Baseline item level assumed when the payload does not carry one.
const DEFAULT_ITEM_LEVEL: f64 = 600.0;

/// Number of simulated fight iterations reported in the metrics.
const SIMULATED_ITERATIONS: u64 = 1000;

/// Configuration for [`MockSimulation`].
#[derive(Debug, Clone)]
pub struct MockSimulationConfig {
    /// Lower bound of the simulated latency.
    pub min_latency: Duration,
    /// Upper bound of the simulated latency.
    pub max_latency: Duration,
    /// Probability (0.0-1.0) that an attempt fails.
    pub failure_rate: f64,
    /// Simulated fight length in seconds.
    pub fight_length_secs: f64,
    /// Seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for MockSimulationConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_millis(500),
            max_latency: Duration::from_millis(2000),
            failure_rate: 0.0,
            fight_length_secs: 300.0,
            seed: None,
        }
    }
}

impl MockSimulationConfig {
    /// Sets the latency range.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    /// Sets the failure probability.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Stand-in compute operation producing simulated combat metrics.
pub struct MockSimulation {
    config: MockSimulationConfig,
    rng: Mutex<ChaCha8Rng>,
}

/// Values drawn for one attempt.
struct Draw {
    latency: Duration,
    fails: bool,
    dps_factor: f64,
}

impl MockSimulation {
    /// Creates a new mock simulation.
    pub fn new(config: MockSimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    fn draw(&self) -> Draw {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let min_ms = self.config.min_latency.as_millis() as u64;
        let max_ms = (self.config.max_latency.as_millis() as u64).max(min_ms);
        let latency = Duration::from_millis(rng.random_range(min_ms..=max_ms));
        let fails = rng.random_range(0.0..1.0) < self.config.failure_rate;

        // Fight-to-fight variance of roughly 3%.
        let dps_factor: f64 = rand_distr::Normal::<f64>::new(1.0, 0.03)
            .map(|normal| rng.sample(normal))
            .unwrap_or(1.0)
            .clamp(0.85, 1.15);

        Draw {
            latency,
            fails,
            dps_factor,
        }
    }
}

impl Default for MockSimulation {
    fn default() -> Self {
        Self::new(MockSimulationConfig::default())
    }
}

/// Reads the effective item level from a character payload.
///
/// Uses `itemLevel` when present, otherwise averages the `ilvl`/`itemLevel`
/// fields of the `equipment` slots.
fn item_level(payload: &Value) -> f64 {
    if let Some(level) = payload.get("itemLevel").and_then(Value::as_f64) {
        return level;
    }

    let levels: Vec<f64> = payload
        .get("equipment")
        .and_then(Value::as_object)
        .map(|slots| {
            slots
                .values()
                .filter_map(|slot| {
                    slot.get("ilvl")
                        .or_else(|| slot.get("itemLevel"))
                        .and_then(Value::as_f64)
                })
                .collect()
        })
        .unwrap_or_default();

    if levels.is_empty() {
        DEFAULT_ITEM_LEVEL
    } else {
        levels.iter().sum::<f64>() / levels.len() as f64
    }
}

#[async_trait]
impl ComputeOperation for MockSimulation {
    fn name(&self) -> &str {
        "mock-simulation"
    }

    async fn compute(&self, request: ComputeRequest<'_>) -> Result<Value, ComputeError> {
        if !request.payload.is_object() {
            return Err(ComputeError::InvalidPayload(
                "character payload must be an object".to_string(),
            ));
        }

        let draw = self.draw();
        tokio::time::sleep(draw.latency).await;

        if draw.fails {
            return Err(ComputeError::Failed(format!(
                "simulation for '{}' failed on attempt {}",
                request.task_id, request.attempt
            )));
        }

        let ilvl = item_level(request.payload);
        let dps = (ilvl * 2.5 * draw.dps_factor * 100.0).round() / 100.0;
        let fight_length = self.config.fight_length_secs;

        Ok(json!({
            "dps": dps,
            "totalDamage": (dps * fight_length).round(),
            "fightLengthSecs": fight_length,
            "iterations": SIMULATED_ITERATIONS,
            "itemLevel": ilvl,
            "simulatedMs": draw.latency.as_millis() as u64,
        }))
    }
}
