//! Skills shipped with the runtime.
//!
//! Small enough to read as examples, and enough to drive the whole pipeline
//! from a terminal: `ping`, `hello`, and `remember`/`recall` on top of
//! memory. Every one accepts the regex overrides `score_factor`,
//! `case_sensitive` and `matching_condition` in its settings.

use std::sync::Arc;

use {anyhow::Context, serde_json::Value, tracing::debug};

use crate::{
    Result,
    matcher::{Matcher, MatchingCondition, RegexSpec},
    skill::{Skill, SkillHost},
};

fn skill_name(settings: &Value, default: &str) -> String {
    settings
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn bucket(config: &Value) -> Option<&str> {
    config.get("bucket").and_then(Value::as_str)
}

fn regex(spec: RegexSpec, settings: &Value) -> Result<Matcher> {
    Matcher::regex(spec.with_overrides(settings)?)
}

/// Replies `pong` to `ping`.
pub fn ping(settings: &Value) -> Result<Skill> {
    let spec = RegexSpec::new("ping")
        .condition(MatchingCondition::FullMatch)
        .ignore_case();
    Ok(Skill::builder(skill_name(settings, "ping"))
        .matcher(regex(spec, settings)?)
        .handler(|host: Arc<dyn SkillHost>, _config, event| async move {
            host.send(event.reply("pong")).await?;
            Ok(())
        }))
}

/// Greets whoever says hi. `greeting` overrides the word used.
pub fn hello(settings: &Value) -> Result<Skill> {
    let spec = RegexSpec::new(r"(?:hi|hello|hey)\b")
        .condition(MatchingCondition::Match)
        .ignore_case();
    Ok(Skill::builder(skill_name(settings, "hello"))
        .matcher(regex(spec, settings)?)
        .handler(|host: Arc<dyn SkillHost>, config: Arc<Value>, event| async move {
            let greeting = config
                .get("greeting")
                .and_then(Value::as_str)
                .unwrap_or("Hello");
            let who = event.user().unwrap_or("there");
            host.send(event.reply(format!("{greeting} {who}"))).await?;
            Ok(())
        }))
}

/// `remember <key> is <value>` stores the value in memory, in the
/// configured `bucket` if any.
pub fn remember(settings: &Value) -> Result<Skill> {
    let spec = RegexSpec::new(r"remember (?P<key>[\w:.-]+) (?:is|as|=) (?P<value>.+)")
        .condition(MatchingCondition::Match)
        .ignore_case();
    Ok(Skill::builder(skill_name(settings, "remember"))
        .matcher(regex(spec, settings)?)
        .handler(|host: Arc<dyn SkillHost>, config: Arc<Value>, event| async move {
            let matched = event.matched().context("remember fired without a match")?;
            let key = matched.name("key").context("missing key")?;
            let value = matched.name("value").context("missing value")?.trim();

            let memory = host.memory();
            match bucket(&config) {
                Some(bucket) => memory.with_bucket(bucket, memory.put(key, value)).await?,
                None => memory.put(key, value).await?,
            }
            debug!(key, "remembered");
            host.send(event.reply(format!("OK, I'll remember {key}.")))
                .await?;
            Ok(())
        }))
}

/// `what is <key>` (or `recall <key>`) answers with what was remembered.
pub fn recall(settings: &Value) -> Result<Skill> {
    let spec = RegexSpec::new(r"(?:what is|recall) (?P<key>[\w:.-]+)\??")
        .condition(MatchingCondition::Match)
        .ignore_case();
    Ok(Skill::builder(skill_name(settings, "recall"))
        .matcher(regex(spec, settings)?)
        .handler(|host: Arc<dyn SkillHost>, config: Arc<Value>, event| async move {
            let key = event
                .matched()
                .and_then(|m| m.name("key"))
                .context("recall fired without a key")?;

            let memory = host.memory();
            let value: Option<Value> = match bucket(&config) {
                Some(bucket) => memory.with_bucket(bucket, memory.get(key)).await?,
                None => memory.get(key).await?,
            };
            let text = match value {
                Some(Value::String(s)) => format!("{key} is {s}."),
                Some(other) => format!("{key} is {other}."),
                None => format!("I don't know anything about {key}."),
            };
            host.send(event.reply(text)).await?;
            Ok(())
        }))
}
