// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lexical task classifier.
//!
//! Maps a free-text description to a [`TaskClassification`] using a table of
//! rules. Rules are plain data ([`ClassifierRules`]) so they can be replaced
//! from configuration; the built-in table is used when none is configured.
//!
//! Scoring per rule: each matching keyword scores 1, each matching pattern
//! scores `2 × weight`. The highest score wins and ties go to the rule listed
//! first. A description that matches nothing is `general`.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::state::{Complexity, Task, TaskType};

// ============================================================================
// Rule data
// ============================================================================

fn default_weight() -> f64 {
    1.0
}

/// One classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierRule {
    pub name: String,
    pub task_type: TaskType,
    /// Whole-word, case-insensitive keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Case-insensitive regular expressions.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Capability tags suggested for tasks this rule classifies.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Words that push the complexity estimate up or down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityMarkers {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
    /// Descriptions at least this many characters long are high complexity
    /// unless a low marker says otherwise.
    #[serde(default = "default_long_description")]
    pub long_description: usize,
}

fn default_long_description() -> usize {
    400
}

impl Default for ComplexityMarkers {
    fn default() -> Self {
        Self {
            high: words(&[
                "architecture",
                "migrate",
                "migration",
                "redesign",
                "rewrite",
                "overhaul",
                "distributed",
                "concurrency",
                "entire",
                "across",
            ]),
            low: words(&[
                "typo", "rename", "minor", "small", "quick", "trivial", "simple", "tweak",
            ]),
            long_description: default_long_description(),
        }
    }
}

/// The full rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierRules {
    pub rules: Vec<ClassifierRule>,
    #[serde(default)]
    pub complexity: ComplexityMarkers,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn rule(
    name: &str,
    task_type: TaskType,
    keywords: &[&str],
    patterns: &[&str],
    tags: &[&str],
) -> ClassifierRule {
    ClassifierRule {
        name: name.to_string(),
        task_type,
        keywords: words(keywords),
        patterns: words(patterns),
        weight: 1.0,
        tags: words(tags),
    }
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            rules: vec![
                rule(
                    "testing",
                    TaskType::Testing,
                    &["test", "tests", "testing", "coverage", "regression", "flaky", "qa", "e2e"],
                    &[
                        r"\b(unit|integration|e2e|end-to-end)\s+tests?\b",
                        r"\b(write|add)\s+(some\s+)?tests?\b",
                    ],
                    &["testing", "quality"],
                ),
                rule(
                    "review",
                    TaskType::Review,
                    &["review", "audit", "inspect", "critique", "feedback"],
                    &[
                        r"\b(code|pull request|pr)\s+review\b",
                        r"\breview\s+(the\s+|this\s+)?(pr|pull request|diff|changes|patch)\b",
                    ],
                    &["review", "quality"],
                ),
                rule(
                    "documentation",
                    TaskType::Documentation,
                    &["document", "documentation", "docs", "readme", "guide", "tutorial", "changelog"],
                    &[
                        r"\b(write|update)\s+(the\s+)?(docs|documentation|readme|changelog)\b",
                        r"\bdoc\s*comments?\b",
                    ],
                    &["docs", "writing"],
                ),
                rule(
                    "research",
                    TaskType::Research,
                    &["research", "investigate", "compare", "evaluate", "explore", "analyze", "survey"],
                    &[r"\b(find out|look into|look up)\b", r"\b(what is|how does|why does)\b"],
                    &["research", "analysis"],
                ),
                rule(
                    "design",
                    TaskType::Design,
                    &["design", "architecture", "architect", "schema", "diagram", "rfc", "proposal"],
                    &[
                        r"\b(system|api|data|database)\s+(design|model)\b",
                        r"\bdesign\s+(the\s+|an?\s+)?\w+",
                    ],
                    &["design", "architecture"],
                ),
                rule(
                    "coding",
                    TaskType::Coding,
                    &[
                        "implement", "code", "fix", "bug", "function", "refactor", "build",
                        "feature", "endpoint", "crash", "compile", "debug",
                    ],
                    &[
                        r"\b(add|create|write)\s+(a\s+|an\s+|the\s+)?(function|method|class|module|endpoint|struct)\b",
                        r"\bfix(es|ed)?\s+(the\s+|a\s+)?(\w+\s+)?(bug|crash|error|panic|leak)\b",
                    ],
                    &["code", "implementation"],
                ),
            ],
            complexity: ComplexityMarkers::default(),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Optional caller-supplied hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    /// Overrides the lexical type.
    #[serde(default)]
    pub type_hint: Option<TaskType>,
    /// Merged into the suggested tags.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub complexity_hint: Option<Complexity>,
}

/// Result of classifying a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskClassification {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub tags: Vec<String>,
    /// Name of the rule that decided the type lexically, if any.
    pub matched_rule: Option<String>,
}

impl TaskClassification {
    /// Rebuild the classification recorded on an existing task.
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_type: task.task_type,
            complexity: task.complexity,
            tags: task.tags.clone(),
            matched_rule: None,
        }
    }
}

struct CompiledRule {
    rule: ClassifierRule,
    keywords: Vec<Regex>,
    patterns: Vec<Regex>,
}

impl CompiledRule {
    fn score(&self, description: &str) -> f64 {
        let keyword_hits = self
            .keywords
            .iter()
            .filter(|re| re.is_match(description))
            .count() as f64;
        let pattern_hits = self
            .patterns
            .iter()
            .filter(|re| re.is_match(description))
            .count() as f64;
        keyword_hits + pattern_hits * 2.0 * self.rule.weight
    }
}

fn compile(rule_name: &str, pattern: &str) -> Result<Regex, RoutingError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| RoutingError::InvalidRule {
            rule: rule_name.to_string(),
            message: e.to_string(),
        })
}

fn keyword_regex(rule_name: &str, keyword: &str) -> Result<Regex, RoutingError> {
    compile(rule_name, &format!(r"\b{}\b", regex::escape(keyword.trim())))
}

/// A compiled rule table.
pub struct TaskClassifier {
    rules: Vec<CompiledRule>,
    high_markers: Vec<Regex>,
    low_markers: Vec<Regex>,
    long_description: usize,
}

impl std::fmt::Debug for TaskClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskClassifier")
            .field(
                "rules",
                &self.rules.iter().map(|r| r.rule.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TaskClassifier {
    /// Compile a rule table. Fails on an empty rule name or a bad regex.
    pub fn new(table: &ClassifierRules) -> Result<Self, RoutingError> {
        let mut rules = Vec::with_capacity(table.rules.len());
        for rule in &table.rules {
            if rule.name.trim().is_empty() {
                return Err(RoutingError::InvalidRule {
                    rule: format!("{}", rule.task_type),
                    message: "rule name is empty".to_string(),
                });
            }
            if !rule.weight.is_finite() || rule.weight < 0.0 {
                return Err(RoutingError::InvalidRule {
                    rule: rule.name.clone(),
                    message: format!("weight must be a non-negative number, got {}", rule.weight),
                });
            }
            let keywords = rule
                .keywords
                .iter()
                .filter(|k| !k.trim().is_empty())
                .map(|k| keyword_regex(&rule.name, k))
                .collect::<Result<Vec<_>, _>>()?;
            let patterns = rule
                .patterns
                .iter()
                .map(|p| compile(&rule.name, p))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(CompiledRule {
                rule: rule.clone(),
                keywords,
                patterns,
            });
        }

        let markers = |list: &[String]| {
            list.iter()
                .filter(|k| !k.trim().is_empty())
                .map(|k| keyword_regex("complexity", k))
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            rules,
            high_markers: markers(&table.complexity.high)?,
            low_markers: markers(&table.complexity.low)?,
            long_description: table.complexity.long_description,
        })
    }

    /// Classify a description. Pure and deterministic.
    pub fn classify(&self, description: &str, metadata: &TaskMetadata) -> TaskClassification {
        let mut best: Option<(&CompiledRule, f64)> = None;
        for rule in &self.rules {
            let score = rule.score(description);
            if score <= 0.0 {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((rule, score)),
            }
        }

        let lexical_type = best
            .map(|(rule, _)| rule.rule.task_type)
            .unwrap_or(TaskType::General);
        let task_type = metadata.type_hint.unwrap_or(lexical_type);

        let mut tags: Vec<String> = match best {
            Some((rule, _)) if rule.rule.task_type == task_type => rule.rule.tags.clone(),
            _ => self
                .rules
                .iter()
                .find(|r| r.rule.task_type == task_type)
                .map(|r| r.rule.tags.clone())
                .unwrap_or_default(),
        };
        for tag in &metadata.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        TaskClassification {
            task_type,
            complexity: metadata
                .complexity_hint
                .unwrap_or_else(|| self.estimate_complexity(description)),
            tags,
            matched_rule: best.map(|(rule, _)| rule.rule.name.clone()),
        }
    }

    fn estimate_complexity(&self, description: &str) -> Complexity {
        let high = self
            .high_markers
            .iter()
            .filter(|re| re.is_match(description))
            .count();
        let low = self
            .low_markers
            .iter()
            .filter(|re| re.is_match(description))
            .count();

        if high > low {
            Complexity::High
        } else if low > high {
            Complexity::Low
        } else if description.chars().count() >= self.long_description {
            Complexity::High
        } else {
            Complexity::Medium
        }
    }
}

static DEFAULT_CLASSIFIER: Lazy<Option<TaskClassifier>> =
    Lazy::new(|| TaskClassifier::new(&ClassifierRules::default()).ok());

/// Classify with the built-in rule table.
pub fn classify_task(description: &str, metadata: &TaskMetadata) -> TaskClassification {
    match DEFAULT_CLASSIFIER.as_ref() {
        Some(classifier) => classifier.classify(description, metadata),
        None => TaskClassification {
            task_type: metadata.type_hint.unwrap_or_default(),
            complexity: metadata.complexity_hint.unwrap_or_default(),
            tags: metadata.tags.clone(),
            matched_rule: None,
        },
    }
}
