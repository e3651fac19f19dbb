//! Matchers decide whether a skill applies to an event and how confidently.
//!
//! Regex and custom matchers take part in ranking. Crontab and webhook
//! matchers are triggers: the scheduler and the web API fire those skills
//! directly and they never compete with conversational skills.

use std::{fmt, str::FromStr, sync::Arc};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    cron::Schedule,
    regex::{Regex, RegexBuilder},
    serde::{Deserialize, Deserializer, Serialize, Serializer},
    serde_json::Value,
    skiff_channels::{Event, MatchData},
};

use crate::{Error, Result};

/// Score for a regex hit: approaches `score_factor` as the expression gets
/// longer, so specific patterns outrank catch-alls with the same factor.
///
/// Length is counted in characters.
pub fn calculate_score(expression: &str, score_factor: f64) -> f64 {
    let len = expression.chars().count() as f64;
    (1.0 - 1.0 / (len + 1.0).powi(2)) * score_factor
}

/// How much of the text a regex has to cover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchingCondition {
    /// Anywhere in the text.
    #[default]
    Search,
    /// Anchored at the start.
    Match,
    /// The whole text.
    FullMatch,
}

impl MatchingCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Match => "match",
            Self::FullMatch => "fullmatch",
        }
    }

    fn anchor(self, expression: &str) -> String {
        match self {
            Self::Search => expression.to_string(),
            Self::Match => format!(r"\A(?:{expression})"),
            Self::FullMatch => format!(r"\A(?:{expression})\z"),
        }
    }
}

impl FromStr for MatchingCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "match" => Ok(Self::Match),
            "fullmatch" => Ok(Self::FullMatch),
            other => Err(Error::invalid_config(format!(
                "matching_condition must be search, match or fullmatch, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MatchingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MatchingCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MatchingCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_score_factor() -> f64 {
    1.0
}

/// Uncompiled regex matcher settings, as written in code or config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexSpec {
    pub expression: String,
    /// Legacy flag: `Some(true)` makes matching case-insensitive, absent or
    /// `false` keeps it case-sensitive. Existing configs depend on this.
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub matching_condition: MatchingCondition,
    #[serde(default = "default_score_factor")]
    pub score_factor: f64,
}

impl RegexSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            case_sensitive: None,
            matching_condition: MatchingCondition::Search,
            score_factor: default_score_factor(),
        }
    }

    pub fn case_sensitive(mut self, flag: bool) -> Self {
        self.case_sensitive = Some(flag);
        self
    }

    /// Match regardless of case. Sets the legacy `case_sensitive` flag,
    /// whose `true` means case-insensitive.
    pub fn ignore_case(self) -> Self {
        self.case_sensitive(true)
    }

    pub fn condition(mut self, condition: MatchingCondition) -> Self {
        self.matching_condition = condition;
        self
    }

    pub fn score_factor(mut self, factor: f64) -> Self {
        self.score_factor = factor;
        self
    }

    /// Take `score_factor`, `case_sensitive` and `matching_condition` from
    /// module settings when present.
    pub fn with_overrides(mut self, settings: &Value) -> Result<Self> {
        if let Some(raw) = settings.get("score_factor") {
            self.score_factor = raw.as_f64().ok_or_else(|| {
                Error::invalid_config(format!("score_factor must be a number, got {raw}"))
            })?;
        }
        if let Some(raw) = settings.get("case_sensitive") {
            self.case_sensitive = Some(raw.as_bool().ok_or_else(|| {
                Error::invalid_config(format!("case_sensitive must be a boolean, got {raw}"))
            })?);
        }
        if let Some(raw) = settings.get("matching_condition") {
            let raw = raw.as_str().ok_or_else(|| {
                Error::invalid_config(format!("matching_condition must be a string, got {raw}"))
            })?;
            self.matching_condition = raw.parse()?;
        }
        Ok(self)
    }

    pub fn compile(self) -> Result<RegexMatcher> {
        if !(0.0..=1.0).contains(&self.score_factor) {
            return Err(Error::ScoreFactorOutOfRange {
                value: self.score_factor,
            });
        }
        let regex = RegexBuilder::new(&self.matching_condition.anchor(&self.expression))
            .case_insensitive(self.case_sensitive == Some(true))
            .build()
            .map_err(|e| Error::invalid_regex(&self.expression, e))?;
        Ok(RegexMatcher { spec: self, regex })
    }
}

/// Compiled regex matcher.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    spec: RegexSpec,
    regex: Regex,
}

impl RegexMatcher {
    /// Search matcher with score factor 1.0.
    pub fn new(expression: impl Into<String>) -> Result<Self> {
        RegexSpec::new(expression).compile()
    }

    pub fn spec(&self) -> &RegexSpec {
        &self.spec
    }

    pub fn expression(&self) -> &str {
        &self.spec.expression
    }

    /// Score of any hit, independent of the text that matched.
    pub fn score(&self) -> f64 {
        calculate_score(&self.spec.expression, self.spec.score_factor)
    }

    /// Capture data when `text` matches.
    pub fn captures(&self, text: &str) -> Option<MatchData> {
        let caps = self.regex.captures(text)?;
        let groups = caps
            .iter()
            .map(|g| g.map(|m| m.as_str().to_string()))
            .collect();
        let named = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| Some((name.to_string(), caps.name(name)?.as_str().to_string())))
            .collect();
        Some(MatchData {
            groups,
            named,
            payload: None,
        })
    }
}

/// Fires a skill on a cron schedule.
#[derive(Debug, Clone)]
pub struct CrontabMatcher {
    expression: String,
    timezone: Option<Tz>,
    schedule: Schedule,
}

impl CrontabMatcher {
    /// Accepts 5-field (`min hour dom month dow`), 6-field or 7-field
    /// expressions and an optional IANA timezone (UTC otherwise).
    pub fn new(expression: impl Into<String>, timezone: Option<&str>) -> Result<Self> {
        let expression = expression.into();
        let schedule = expression
            .parse::<Schedule>()
            .or_else(|_| format!("0 {expression} *").parse::<Schedule>())
            .map_err(|e| Error::invalid_cron(&expression, e.to_string()))?;
        let timezone = timezone
            .map(|tz| {
                tz.parse::<Tz>().map_err(|_| Error::UnknownTimezone {
                    timezone: tz.to_string(),
                })
            })
            .transpose()?;
        Ok(Self {
            expression,
            timezone,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Option<Tz> {
        self.timezone
    }

    /// Next firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.timezone {
            Some(tz) => self
                .schedule
                .after(&now.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            None => self.schedule.after(&now).next(),
        }
    }
}

/// Fires a skill on `POST /skill/{skill}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMatcher {
    pub name: String,
}

impl WebhookMatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A ranked hit.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub score: f64,
    pub data: MatchData,
}

/// Additional ranked matcher kinds, such as intent classifiers.
#[async_trait]
pub trait EventMatcher: Send + Sync {
    /// Short name used in logs.
    fn kind(&self) -> &str;

    /// `Ok(None)` when the event does not apply. Errors are logged and the
    /// matcher is treated as a miss.
    async fn evaluate(&self, event: &Event) -> anyhow::Result<Option<MatchOutcome>>;
}

#[derive(Clone)]
pub enum Matcher {
    Regex(RegexMatcher),
    Crontab(CrontabMatcher),
    Webhook(WebhookMatcher),
    Custom(Arc<dyn EventMatcher>),
}

impl Matcher {
    pub fn regex(spec: RegexSpec) -> Result<Self> {
        Ok(Self::Regex(spec.compile()?))
    }

    pub fn crontab(expression: impl Into<String>, timezone: Option<&str>) -> Result<Self> {
        Ok(Self::Crontab(CrontabMatcher::new(expression, timezone)?))
    }

    pub fn webhook(name: impl Into<String>) -> Self {
        Self::Webhook(WebhookMatcher::new(name))
    }

    /// Whether this matcher fires outside ranking.
    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::Crontab(_) | Self::Webhook(_))
    }

    /// Rank `event` against this matcher. Triggers always miss.
    pub async fn evaluate(&self, event: &Event) -> anyhow::Result<Option<MatchOutcome>> {
        match self {
            Self::Regex(regex) => Ok(event.text().and_then(|text| {
                regex.captures(text).map(|data| MatchOutcome {
                    score: regex.score(),
                    data,
                })
            })),
            Self::Custom(custom) => custom.evaluate(event).await,
            Self::Crontab(_) | Self::Webhook(_) => Ok(None),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Regex(_) => "regex",
            Self::Crontab(_) => "crontab",
            Self::Webhook(_) => "webhook",
            Self::Custom(custom) => custom.kind(),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(regex) => f.debug_tuple("Regex").field(regex.spec()).finish(),
            Self::Crontab(cron) => f.debug_tuple("Crontab").field(&cron.expression).finish(),
            Self::Webhook(hook) => f.debug_tuple("Webhook").field(&hook.name).finish(),
            Self::Custom(custom) => f.debug_tuple("Custom").field(&custom.kind()).finish(),
        }
    }
}
