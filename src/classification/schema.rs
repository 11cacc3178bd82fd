use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Relative richness of a schema's required fields; used for registry selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Minimal,
    Standard,
    Detailed,
    Optimized,
    ContextAware,
}

/// Static, never-mutated expectations for a schema's performance, used until enough
/// live measurements accumulate to prefer measured numbers instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Baseline {
    pub accuracy: f64,
    pub latency_ms: f64,
    pub parsing_reliability: f64,
}

/// Live, monotonically-updated counters for a schema's observed performance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Measured {
    pub total_uses: u64,
    pub successful_classifications: u64,
    pub total_latency_ms: f64,
    pub total_parsing_attempts: u64,
    pub successful_parsing_attempts: u64,
    pub last_measured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceProfile {
    pub baseline: Baseline,
    pub measured: Measured,
}

/// A profile's numbers as actually used by callers: measured once `total_uses > 0`,
/// otherwise the never-mutated baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffectivePerformance {
    pub accuracy: f64,
    pub latency_ms: f64,
    pub parsing_reliability: f64,
    pub is_measured: bool,
}

impl PerformanceProfile {
    fn effective(&self) -> EffectivePerformance {
        if self.measured.total_uses == 0 {
            return EffectivePerformance {
                accuracy: self.baseline.accuracy,
                latency_ms: self.baseline.latency_ms,
                parsing_reliability: self.baseline.parsing_reliability,
                is_measured: false,
            };
        }
        let accuracy = self.measured.successful_classifications as f64 / self.measured.total_uses as f64;
        let latency_ms = self.measured.total_latency_ms / self.measured.total_uses as f64;
        let parsing_reliability = if self.measured.total_parsing_attempts == 0 {
            self.baseline.parsing_reliability
        } else {
            self.measured.successful_parsing_attempts as f64 / self.measured.total_parsing_attempts as f64
        };
        EffectivePerformance {
            accuracy,
            latency_ms,
            parsing_reliability,
            is_measured: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub name: String,
    pub complexity: Complexity,
    pub version: String,
    pub recommended_for: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRegistryEntry {
    pub schema: Value,
    pub metadata: SchemaMetadata,
    pub performance: PerformanceProfile,
}

/// Selection hints for [`SchemaRegistry::select_optimal`].
#[derive(Debug, Clone, Default)]
pub struct SelectionCriteria {
    pub use_case: Option<String>,
    pub max_latency_ms: Option<f64>,
    pub min_accuracy: Option<f64>,
    pub prioritize: Option<Priority>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Speed,
    Accuracy,
}

/// Process-wide registry of named classification output-shape contracts, with
/// per-name performance counters. Entries are looked up by name; built-ins are
/// registered at construction and never removed.
pub struct SchemaRegistry {
    entries: RwLock<HashMap<String, SchemaRegistryEntry>>,
    order: RwLock<Vec<String>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&self) {
        let builtins: [(&str, Complexity, Baseline, Value); 5] = [
            (
                "minimal",
                Complexity::Minimal,
                Baseline { accuracy: 0.72, latency_ms: 50.0, parsing_reliability: 0.95 },
                serde_json::json!({"required": ["type", "confidence"]}),
            ),
            (
                "standard",
                Complexity::Standard,
                Baseline { accuracy: 0.80, latency_ms: 120.0, parsing_reliability: 0.93 },
                serde_json::json!({"required": ["type", "confidence", "reasoning"]}),
            ),
            (
                "detailed",
                Complexity::Detailed,
                Baseline { accuracy: 0.85, latency_ms: 220.0, parsing_reliability: 0.90 },
                serde_json::json!({"required": ["type", "confidence", "reasoning", "indicators", "complexityScore"]}),
            ),
            (
                "optimized",
                Complexity::Optimized,
                Baseline { accuracy: 0.83, latency_ms: 150.0, parsing_reliability: 0.94 },
                serde_json::json!({"required": ["type", "confidence", "reasoning", "taskSteps"]}),
            ),
            (
                "context_aware",
                Complexity::ContextAware,
                Baseline { accuracy: 0.88, latency_ms: 280.0, parsing_reliability: 0.88 },
                serde_json::json!({"required": ["type", "confidence", "conversationContext", "stepCount", "requiresCoordination"]}),
            ),
        ];

        for (name, complexity, baseline, schema) in builtins {
            let entry = SchemaRegistryEntry {
                schema,
                metadata: SchemaMetadata {
                    name: name.to_string(),
                    complexity,
                    version: "1.0.0".to_string(),
                    recommended_for: default_recommended_for(complexity),
                },
                performance: PerformanceProfile { baseline, measured: Measured::default() },
            };
            self.entries.write().unwrap().insert(name.to_string(), entry);
            self.order.write().unwrap().push(name.to_string());
        }
    }

    pub fn register(&self, name: &str, schema: Value, metadata: SchemaMetadata, baseline: Baseline) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(name) {
            return Err(Error::business("ALREADY_EXISTS", format!("schema `{name}` is already registered")));
        }
        entries.insert(
            name.to_string(),
            SchemaRegistryEntry {
                schema,
                metadata,
                performance: PerformanceProfile { baseline, measured: Measured::default() },
            },
        );
        self.order.write().unwrap().push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<SchemaRegistryEntry> {
        self.entries
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::business("NOT_FOUND", format!("no schema named `{name}`")))
    }

    pub fn get_by_complexity(&self, complexity: Complexity) -> Result<SchemaRegistryEntry> {
        let entries = self.entries.read().unwrap();
        let order = self.order.read().unwrap();
        order
            .iter()
            .filter_map(|name| entries.get(name))
            .find(|e| e.metadata.complexity == complexity)
            .cloned()
            .ok_or_else(|| Error::business("NOT_FOUND", "no schema with that complexity"))
    }

    pub fn select_optimal(&self, criteria: &SelectionCriteria) -> Result<SchemaRegistryEntry> {
        let entries = self.entries.read().unwrap();
        let order = self.order.read().unwrap();
        let mut candidates: Vec<&SchemaRegistryEntry> = order.iter().filter_map(|n| entries.get(n)).collect();

        if let Some(use_case) = &criteria.use_case {
            candidates.retain(|e| e.metadata.recommended_for.iter().any(|u| u == use_case));
        }
        if let Some(max_latency) = criteria.max_latency_ms {
            candidates.retain(|e| e.performance.effective().latency_ms <= max_latency);
        }
        if let Some(min_accuracy) = criteria.min_accuracy {
            candidates.retain(|e| e.performance.effective().accuracy >= min_accuracy);
        }
        if candidates.is_empty() {
            return Err(Error::business("NOT_FOUND", "no schema satisfies the selection criteria"));
        }

        let chosen = match criteria.prioritize {
            Some(Priority::Speed) => candidates
                .iter()
                .min_by(|a, b| {
                    a.performance
                        .effective()
                        .latency_ms
                        .partial_cmp(&b.performance.effective().latency_ms)
                        .unwrap()
                })
                .copied(),
            Some(Priority::Accuracy) => candidates
                .iter()
                .max_by(|a, b| {
                    a.performance
                        .effective()
                        .accuracy
                        .partial_cmp(&b.performance.effective().accuracy)
                        .unwrap()
                })
                .copied(),
            None => candidates
                .iter()
                .find(|e| e.metadata.complexity == Complexity::Optimized)
                .or_else(|| candidates.iter().find(|e| e.metadata.complexity == Complexity::Standard))
                .or_else(|| candidates.first())
                .copied(),
        };

        chosen.cloned().ok_or_else(|| Error::business("NOT_FOUND", "selection produced no candidate"))
    }

    pub fn track_usage(&self, name: &str, latency_ms: f64, classification_success: bool, parsing_success: bool) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::business("NOT_FOUND", format!("no schema named `{name}`")))?;
        let m = &mut entry.performance.measured;
        m.total_uses += 1;
        if classification_success {
            m.successful_classifications += 1;
        }
        m.total_latency_ms += latency_ms;
        m.total_parsing_attempts += 1;
        if parsing_success {
            m.successful_parsing_attempts += 1;
        }
        m.last_measured_at = Some(Utc::now());
        Ok(())
    }

    pub fn get_effective(&self, name: &str) -> Result<EffectivePerformance> {
        Ok(self.get(name)?.performance.effective())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_recommended_for(complexity: Complexity) -> Vec<String> {
    match complexity {
        Complexity::Minimal => vec!["speed".to_string()],
        Complexity::Standard => vec!["general".to_string()],
        Complexity::Detailed => vec!["accuracy".to_string(), "audit".to_string()],
        Complexity::Optimized => vec!["workflow".to_string()],
        Complexity::ContextAware => vec!["multi_turn".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered() {
        let r = SchemaRegistry::new();
        assert!(r.get("minimal").is_ok());
        assert!(r.get("context_aware").is_ok());
        assert!(r.get("nonexistent").is_err());
    }

    #[test]
    fn baseline_used_until_measured() {
        let r = SchemaRegistry::new();
        let eff = r.get_effective("minimal").unwrap();
        assert!(!eff.is_measured);
        assert_eq!(eff.accuracy, 0.72);
    }

    #[test]
    fn measured_overrides_baseline_after_use() {
        let r = SchemaRegistry::new();
        r.track_usage("minimal", 40.0, true, true).unwrap();
        r.track_usage("minimal", 60.0, false, true).unwrap();
        let eff = r.get_effective("minimal").unwrap();
        assert!(eff.is_measured);
        assert_eq!(eff.accuracy, 0.5);
        assert_eq!(eff.latency_ms, 50.0);
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let r = SchemaRegistry::new();
        let err = r
            .register(
                "minimal",
                serde_json::json!({}),
                SchemaMetadata {
                    name: "minimal".into(),
                    complexity: Complexity::Minimal,
                    version: "1.0.0".into(),
                    recommended_for: vec![],
                },
                Baseline { accuracy: 0.5, latency_ms: 10.0, parsing_reliability: 0.5 },
            )
            .unwrap_err();
        assert_eq!(err.code, "ALREADY_EXISTS");
    }

    #[test]
    fn select_optimal_prefers_speed_when_asked() {
        let r = SchemaRegistry::new();
        let entry = r
            .select_optimal(&SelectionCriteria { prioritize: Some(Priority::Speed), ..Default::default() })
            .unwrap();
        assert_eq!(entry.metadata.name, "minimal");
    }

    #[test]
    fn select_optimal_defaults_to_optimized() {
        let r = SchemaRegistry::new();
        let entry = r.select_optimal(&SelectionCriteria::default()).unwrap();
        assert_eq!(entry.metadata.name, "optimized");
    }
}
