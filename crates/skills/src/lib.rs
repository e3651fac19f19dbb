//! Skills: the handlers the runtime dispatches events to, and the matchers
//! that decide which handler wins.
//!
//! A [`Skill`] is an explicit record built with [`Skill::builder`] or the
//! [`match_regex`] shortcut. Handlers receive the runtime as an
//! `Arc<dyn SkillHost>`, the skill's own configuration and the matched event.

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod skill;

pub use {
    catalog::{SkillCatalog, SkillConstructor},
    error::{Error, Result},
    matcher::{
        CrontabMatcher, EventMatcher, MatchOutcome, Matcher, MatchingCondition, RegexMatcher,
        RegexSpec, WebhookMatcher, calculate_score,
    },
    registry::SkillRegistry,
    skill::{Skill, SkillBuilder, SkillFn, SkillFuture, SkillHost, match_regex},
};
