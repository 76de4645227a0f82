//! rulecast-core - Rule activation engine for inheritable quality profiles
//!
//! A quality profile is a named set of active rules for one language.
//! Profiles form a forest: a child inherits every rule its parent activates
//! and may override the severity, prioritized flag, or parameters of what it
//! inherits. This crate decides, for every change a user or a plugin makes,
//! what happens to each affected (profile, rule) pair, and reports it as a
//! ledger of [`ActiveRuleChange`]s.
//!
//! # Inheritance
//!
//! Every active rule carries an [`Inheritance`] tag:
//!
//! - `NONE` - activated directly on the profile
//! - `INHERITED` - mirrors the parent's activation
//! - `OVERRIDES` - inherited, but with diverging values
//!
//! Activating a rule on a profile propagates the activation to every
//! descendant, stopping at profiles that override the rule. Deactivating a
//! rule removes it from the whole subtree.
//!
//! # Operations
//!
//! Everything goes through [`ProfileEngine`], which wraps each operation in
//! a store transaction and notifies the [`ChangeIndexer`] after commit:
//!
//! ```
//! use rulecast_core::memory::{MemoryCatalog, MemoryStore, RecordingIndexer};
//! use rulecast_core::{ChangeType, Inheritance, ProfileEngine, Rule, RuleActivation, Severity};
//!
//! let catalog: MemoryCatalog = [Rule::new("java:S1", "java", Severity::Major)]
//!     .into_iter()
//!     .collect();
//! let mut engine = ProfileEngine::new(catalog, MemoryStore::new(), RecordingIndexer::default());
//!
//! let (parent, _) = engine.create_profile("java", "Company way", None).unwrap();
//! let (child, _) = engine.create_profile("java", "Team way", Some(&parent.id)).unwrap();
//!
//! let changes = engine
//!     .activate(&parent.id, &RuleActivation::new("java:S1").with_severity(Severity::Blocker))
//!     .unwrap();
//! assert_eq!(changes.len(), 2);
//! assert_eq!(changes[1].key.profile_id, child.id);
//! assert_eq!(changes[1].change_type, ChangeType::Activated);
//! assert_eq!(changes[1].inheritance, Inheritance::Inherited);
//! assert_eq!(changes[1].severity, Severity::Blocker);
//! ```
//!
//! # Built-in profiles
//!
//! Language plugins declare built-in profiles as [`DeclaredProfile`]s.
//! [`ProfileEngine::register_builtins`] keeps the stored profiles in line
//! with those declarations at startup. Built-in profiles are read-only for
//! every other operation.
//!
//! # Storage
//!
//! The engine is generic over its collaborators ([`RuleCatalog`],
//! [`ProfileStore`], [`ChangeIndexer`], [`Clock`]). The [`memory`] module
//! provides in-memory implementations.

pub mod activation;
pub mod activator;
pub mod change;
pub mod context;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod param_type;
pub mod registrar;
pub mod settings;
pub mod store;
pub mod tree;

pub use activation::RuleActivation;
pub use activator::RuleActivator;
pub use change::{ActiveRuleChange, BulkChangeResult, BulkError, ChangeType};
pub use context::{ActivationSnapshot, RuleCursor, bind};
pub use engine::ProfileEngine;
pub use error::{ActivationError, Result, StoreError};
pub use model::{
    ActiveRule, ActiveRuleKey, Inheritance, Profile, ProfileId, Rule, RuleId, RuleParam, RuleStatus,
    Severity,
};
pub use param_type::ParamType;
pub use registrar::{DeclaredProfile, DeclaredRule, RegistrationReport};
pub use settings::EngineSettings;
pub use store::{
    ChangeIndexer, Clock, ProfileStore, RuleCatalog, RuleFilter, StoreTransaction, SystemClock,
    TracingIndexer,
};
