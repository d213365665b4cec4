// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Task classification and routing.
//!
//! A task enters as a description, the [`TaskClassifier`] turns it into a
//! [`TaskClassification`], and the [`Router`] picks an agent from the current
//! state and records the choice through the state store.
//!
//! # Example
//!
//! ```rust,ignore
//! use a2a::routing::{ClassifierRules, Router, RoutingConfig, TaskClassifier, TaskSubmission};
//!
//! let classifier = TaskClassifier::new(&ClassifierRules::default())?;
//! let router = Router::new(RoutingConfig::default(), classifier);
//!
//! let routed = router.route_to_next_agent(&mut store, TaskSubmission::new("Fix the login bug"))?;
//! if let Ok(decision) = &routed.outcome {
//!     let command = router.generate_routing_command(decision, store.state());
//!     surface.deliver(&command).await?;
//! }
//! ```

pub mod classifier;
pub mod router;

pub use classifier::{
    classify_task, ClassifierRule, ClassifierRules, ComplexityMarkers, TaskClassification,
    TaskClassifier, TaskMetadata,
};
pub use router::{
    generate_routing_command, rank_agents, select_agent, RouteDecision, RoutedTask, Router,
    RoutingCommand, RoutingConfig, TaskSubmission, MAX_ROUTING_ATTEMPTS,
};
