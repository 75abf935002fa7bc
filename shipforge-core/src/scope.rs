//! Pattern-based plan subsetting with optional transitive dependency closure.

use crate::ids::TaskId;
use crate::plan::{Plan, Task};
use crate::spec::{Feature, ProductSpec};
use glob::Pattern;
use std::collections::{HashMap, HashSet};

enum ParsedPattern {
    /// `feature:<id>` with no glob metacharacters — exact id match.
    FeatureId(String),
    /// `feature:<glob>` — glob match against feature titles.
    FeatureTitleGlob(Pattern),
    /// `@<tag>` — reserved, never matches.
    Tag(String),
    /// Anything else — glob match against any API path of the owning feature.
    ApiPathGlob(Pattern),
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', ']'])
}

fn parse_pattern(raw: &str) -> ParsedPattern {
    if let Some(rest) = raw.strip_prefix("feature:") {
        if has_glob_meta(rest) {
            // Fall back to a match-nothing pattern on malformed globs rather
            // than panicking on user input.
            let pat = Pattern::new(rest).unwrap_or_else(|_| Pattern::new("\0unmatchable\0").unwrap());
            return ParsedPattern::FeatureTitleGlob(pat);
        }
        return ParsedPattern::FeatureId(rest.to_string());
    }
    if let Some(tag) = raw.strip_prefix('@') {
        return ParsedPattern::Tag(tag.to_string());
    }
    let pat = Pattern::new(raw).unwrap_or_else(|_| Pattern::new("\0unmatchable\0").unwrap());
    ParsedPattern::ApiPathGlob(pat)
}

fn feature_matches(feature: &Feature, pattern: &ParsedPattern) -> bool {
    match pattern {
        ParsedPattern::FeatureId(id) => feature.id.as_str() == id,
        ParsedPattern::FeatureTitleGlob(pat) => pat.matches(&feature.title),
        ParsedPattern::Tag(_) => false,
        ParsedPattern::ApiPathGlob(pat) => {
            // Open question in the design notes: a feature with no APIs does
            // not match a `path:`-style pattern.
            feature.api.iter().any(|api| pat.matches(&api.path))
        }
    }
}

/// Subset `plan` to tasks whose owning feature matches any of `patterns`.
///
/// An empty pattern list is the identity filter. When `include_dependencies`
/// is true, the matched set is expanded to a fixed point over `depends_on`.
/// Original task order is preserved.
pub fn filter_plan(plan: &Plan, spec: &ProductSpec, patterns: &[String], include_dependencies: bool) -> Plan {
    if patterns.is_empty() {
        return plan.clone();
    }

    let parsed: Vec<ParsedPattern> = patterns.iter().map(|p| parse_pattern(p)).collect();
    let features: HashMap<_, _> = spec.features.iter().map(|f| (&f.id, f)).collect();

    let mut matched: HashSet<TaskId> = plan
        .tasks
        .iter()
        .filter(|task| {
            features
                .get(&task.feature_id)
                .map(|feature| parsed.iter().any(|p| feature_matches(feature, p)))
                .unwrap_or(false)
        })
        .map(|t| t.id.clone())
        .collect();

    if include_dependencies {
        close_over_dependencies(plan, &mut matched);
    }

    Plan {
        tasks: plan.tasks.iter().filter(|t| matched.contains(&t.id)).cloned().collect(),
    }
}

fn close_over_dependencies(plan: &Plan, matched: &mut HashSet<TaskId>) {
    let by_id: HashMap<&TaskId, &Task> = plan.tasks.iter().map(|t| (&t.id, t)).collect();
    loop {
        let mut changed = false;
        let additions: Vec<TaskId> = matched
            .iter()
            .filter_map(|id| by_id.get(id))
            .flat_map(|t| t.depends_on.iter().cloned())
            .filter(|dep| !matched.contains(dep))
            .collect();
        for dep in additions {
            matched.insert(dep);
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

/// `(matched_count, total_count)` without mutating the plan.
pub fn estimate_impact(plan: &Plan, spec: &ProductSpec, patterns: &[String], include_dependencies: bool) -> (usize, usize) {
    let filtered = filter_plan(plan, spec, patterns, include_dependencies);
    (filtered.tasks.len(), plan.tasks.len())
}
