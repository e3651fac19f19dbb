use std::sync::Arc;

use crate::{
    matcher::{CrontabMatcher, Matcher},
    skill::Skill,
};

/// Registered skills in registration order.
///
/// The order is the tie-breaker when two candidates score the same.
#[derive(Debug, Default, Clone)]
pub struct SkillRegistry {
    skills: Vec<Arc<Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `skill`, returning its registration index.
    pub fn register(&mut self, skill: Skill) -> usize {
        self.skills.push(Arc::new(skill));
        self.skills.len() - 1
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn clear(&mut self) {
        self.skills.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Skill>> {
        self.skills.iter()
    }

    /// Cheap copy of the current skill list, for use across awaits.
    pub fn snapshot(&self) -> Vec<Arc<Skill>> {
        self.skills.clone()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Skill>> {
        self.skills.iter().find(|s| s.name() == name)
    }

    /// Skill named `skill` with a webhook matcher called `webhook`.
    pub fn find_webhook(&self, skill: &str, webhook: &str) -> Option<&Arc<Skill>> {
        self.skills.iter().find(|s| {
            s.name() == skill
                && s.matchers()
                    .iter()
                    .any(|m| matches!(m, Matcher::Webhook(hook) if hook.name == webhook))
        })
    }

    /// Every crontab matcher with the skill it fires.
    pub fn crontabs(&self) -> Vec<(Arc<Skill>, CrontabMatcher)> {
        self.skills
            .iter()
            .flat_map(|skill| {
                skill.matchers().iter().filter_map(move |m| match m {
                    Matcher::Crontab(cron) => Some((Arc::clone(skill), cron.clone())),
                    _ => None,
                })
            })
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::RegexSpec};

    fn noop(name: &str, matcher: Matcher) -> Skill {
        Skill::builder(name)
            .matcher(matcher)
            .handler(|_, _, _| async { Ok(()) })
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = SkillRegistry::new();
        assert_eq!(
            registry.register(noop("a", Matcher::regex(RegexSpec::new("a")).unwrap())),
            0
        );
        assert_eq!(
            registry.register(noop("b", Matcher::regex(RegexSpec::new("b")).unwrap())),
            1
        );
        let names: Vec<_> = registry.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["a", "b"]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn finds_triggers() {
        let mut registry = SkillRegistry::new();
        registry.register(noop("deploy", Matcher::webhook("github")));
        registry.register(noop("report", Matcher::crontab("0 9 * * *", None).unwrap()));

        assert!(registry.find_webhook("deploy", "github").is_some());
        assert!(registry.find_webhook("deploy", "gitlab").is_none());
        assert!(registry.find_webhook("report", "github").is_none());

        let crontabs = registry.crontabs();
        assert_eq!(crontabs.len(), 1);
        assert_eq!(crontabs[0].0.name(), "report");
        assert_eq!(crontabs[0].1.expression(), "0 9 * * *");
    }
}
