//! The default accumulator set for runner telemetry.
//!
//! These know the runner's event vocabulary (quests, plans, feedback). The
//! aggregator itself does not; any other collaborator can supply its own
//! `Accumulator`s instead.

use std::collections::BTreeMap;

use serde_json::Value;

use evchain_contracts::event::{Event, RISK_FLAGGED};
use evchain_contracts::summary::Tally;
use evchain_core::traits::Accumulator;

const UNKNOWN: &str = "unknown";

/// The accumulators used when none are specified.
pub fn standard_accumulators() -> Vec<Box<dyn Accumulator>> {
    vec![
        Box::new(EventTotals::default()),
        Box::new(QuestOutcomes::default()),
        Box::new(Plans::default()),
        Box::new(RiskFlags::default()),
        Box::new(Feedback::default()),
    ]
}

// ── Event totals ────────────────────────────────────────────────────────────

/// Every event, by type, actor, and source.
#[derive(Debug, Default)]
pub struct EventTotals {
    total: i64,
    by_type: BTreeMap<String, i64>,
    by_actor_kind: BTreeMap<String, i64>,
    by_actor_id: BTreeMap<String, i64>,
    by_source: BTreeMap<String, i64>,
}

impl Accumulator for EventTotals {
    fn observe(&mut self, event: &Event) {
        self.total += 1;
        bump(&mut self.by_type, &event.event_type, 1);
        bump(&mut self.by_actor_kind, event.actor.kind.as_str(), 1);
        bump(&mut self.by_actor_id, &event.actor.id, 1);
        bump(&mut self.by_source, &event.source, 1);
    }

    fn emit(&self, tally: &mut Tally) {
        tally.set_counter("events_total", self.total);
        merge(tally, "events_by_type", &self.by_type);
        merge(tally, "events_by_actor_kind", &self.by_actor_kind);
        merge(tally, "events_by_actor_id", &self.by_actor_id);
        merge(tally, "events_by_source", &self.by_source);
    }
}

// ── Quest outcomes ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Outcome {
    quest_id: Option<String>,
    pillars: Vec<String>,
    pack_id: Option<String>,
    actor_kind: String,
    actor_id: String,
    source: String,
    proof_tier: String,
    preset_id: String,
    failure_reason: String,
    xp_awarded: i64,
    timebox_minutes: i64,
    observed_seconds: i64,
}

impl Outcome {
    fn from_event(event: &Event) -> Self {
        let data = &event.data;
        Self {
            quest_id: text(data, "quest_id"),
            pillars: text_list(data, "pillars"),
            pack_id: text(data, "pack_id"),
            actor_kind: event.actor.kind.as_str().to_string(),
            actor_id: event.actor.id.clone(),
            source: event.source.clone(),
            proof_tier: scalar_label(data, "proof_tier"),
            preset_id: text(data, "applied_preset_id").unwrap_or_else(|| "none".to_string()),
            failure_reason: scalar_label(data, "reason"),
            xp_awarded: integer(data, "xp_awarded"),
            timebox_minutes: integer(data, "timebox_estimate_minutes"),
            observed_seconds: integer(data, "observed_duration_seconds"),
        }
    }
}

/// How many quests `top_quests_completed` keeps.
const TOP_QUESTS: usize = 10;

/// `quest.completed` and `quest.failed`: outcomes, XP, and success rates.
///
/// Pillars and pack of an outcome come from its own data when present,
/// otherwise from any completion of the same quest seen in the range, and
/// fall back to `Unknown` / `unknown`. `risk.flagged` rows are attributed to
/// pillars the same way.
#[derive(Debug, Default)]
pub struct QuestOutcomes {
    completions: Vec<Outcome>,
    failures: Vec<Outcome>,
    flags: Vec<Outcome>,
}

impl QuestOutcomes {
    fn known_pillars(&self) -> BTreeMap<&str, &[String]> {
        self.completions
            .iter()
            .filter(|o| !o.pillars.is_empty())
            .filter_map(|o| o.quest_id.as_deref().map(|id| (id, o.pillars.as_slice())))
            .collect()
    }

    fn known_packs(&self) -> BTreeMap<&str, &str> {
        self.completions
            .iter()
            .filter_map(|o| Some((o.quest_id.as_deref()?, o.pack_id.as_deref()?)))
            .collect()
    }
}

impl Accumulator for QuestOutcomes {
    fn observe(&mut self, event: &Event) {
        match event.event_type.as_str() {
            "quest.completed" => self.completions.push(Outcome::from_event(event)),
            "quest.failed" => self.failures.push(Outcome::from_event(event)),
            RISK_FLAGGED => self.flags.push(Outcome::from_event(event)),
            _ => {}
        }
    }

    fn emit(&self, tally: &mut Tally) {
        let pillars_by_quest = self.known_pillars();
        let packs_by_quest = self.known_packs();
        let unknown_pillar = vec!["Unknown".to_string()];
        let pillars_of = |o: &Outcome| -> Vec<String> {
            if !o.pillars.is_empty() {
                return o.pillars.clone();
            }
            o.quest_id
                .as_deref()
                .and_then(|id| pillars_by_quest.get(id))
                .map(|p| p.to_vec())
                .unwrap_or_else(|| unknown_pillar.clone())
        };

        for name in [
            "completions_by_actor_kind",
            "completions_by_actor_id",
            "completions_by_source",
            "completions_by_proof_tier",
            "completions_by_pillar",
            "completions_by_pack",
            "completions_by_preset",
            "completions_by_quest",
            "xp_by_pillar",
            "xp_by_preset",
            "failures_by_reason",
            "risk_flags_by_pillar",
            "top_quests_completed",
        ] {
            tally.breakdown(name);
        }

        let mut attempts_by_pillar: BTreeMap<String, i64> = BTreeMap::new();
        let mut successes_by_pillar: BTreeMap<String, i64> = BTreeMap::new();
        let mut xp_total: i64 = 0;
        let mut timebox_sum: i64 = 0;
        let mut observed_sum: i64 = 0;

        for o in &self.completions {
            let pack = o
                .pack_id
                .as_deref()
                .or_else(|| o.quest_id.as_deref().and_then(|id| packs_by_quest.get(id).copied()))
                .unwrap_or(UNKNOWN);
            tally.bump("completions_by_actor_kind", &o.actor_kind, 1);
            tally.bump("completions_by_actor_id", &o.actor_id, 1);
            tally.bump("completions_by_source", &o.source, 1);
            tally.bump("completions_by_proof_tier", &o.proof_tier, 1);
            tally.bump("completions_by_pack", pack, 1);
            tally.bump("completions_by_preset", &o.preset_id, 1);
            tally.bump("xp_by_preset", &o.preset_id, o.xp_awarded);
            if let Some(quest_id) = &o.quest_id {
                tally.bump("completions_by_quest", quest_id, 1);
            }
            for pillar in pillars_of(o) {
                tally.bump("completions_by_pillar", &pillar, 1);
                tally.bump("xp_by_pillar", &pillar, o.xp_awarded);
                bump(&mut successes_by_pillar, &pillar, 1);
                bump(&mut attempts_by_pillar, &pillar, 1);
            }
            xp_total = xp_total.saturating_add(o.xp_awarded);
            timebox_sum = timebox_sum.saturating_add(o.timebox_minutes);
            observed_sum = observed_sum.saturating_add(o.observed_seconds);
        }

        for o in &self.failures {
            tally.bump("failures_by_reason", &o.failure_reason, 1);
            for pillar in pillars_of(o) {
                bump(&mut attempts_by_pillar, &pillar, 1);
            }
        }

        for o in &self.flags {
            for pillar in pillars_of(o) {
                tally.bump("risk_flags_by_pillar", &pillar, 1);
            }
        }

        let mut by_quest: Vec<(String, i64)> = tally
            .breakdown("completions_by_quest")
            .iter()
            .map(|(quest, count)| (quest.clone(), *count))
            .collect();
        by_quest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (quest, count) in by_quest.into_iter().take(TOP_QUESTS) {
            tally.bump("top_quests_completed", &quest, count);
        }

        let completions = self.completions.len() as i64;
        let attempts = completions + self.failures.len() as i64;
        tally.set_counter("completions_total", completions);
        tally.set_counter("failures_total", self.failures.len() as i64);
        tally.set_counter("xp_total", xp_total);
        tally.set_counter("timebox_estimates_sum", timebox_sum);
        tally.set_counter("observed_duration_sum", observed_sum);
        tally.set_rate("quest_success_rate", ratio(completions, attempts));
        for (pillar, attempts) in &attempts_by_pillar {
            let successes = successes_by_pillar.get(pillar).copied().unwrap_or(0);
            tally.set_rate(
                &format!("quest_success_rate_by_pillar.{}", pillar),
                ratio(successes, *attempts),
            );
        }
    }
}

// ── Plans ───────────────────────────────────────────────────────────────────

/// `plan.generated`: plan count and average quests per plan.
#[derive(Debug, Default)]
pub struct Plans {
    plans: i64,
    quests: i64,
}

impl Accumulator for Plans {
    fn observe(&mut self, event: &Event) {
        if event.event_type == "plan.generated" {
            self.plans += 1;
            self.quests = self.quests.saturating_add(integer(&event.data, "quest_count"));
        }
    }

    fn emit(&self, tally: &mut Tally) {
        tally.set_counter("plans_generated", self.plans);
        tally.set_counter("quests_planned", self.quests);
        tally.set_rate("avg_quests_per_plan", ratio(self.quests, self.plans));
    }
}

// ── Risk flags ──────────────────────────────────────────────────────────────

/// `risk.flagged`, by reason and by the event type that triggered it.
#[derive(Debug, Default)]
pub struct RiskFlags {
    count: i64,
    by_reason: BTreeMap<String, i64>,
    by_trigger: BTreeMap<String, i64>,
}

impl Accumulator for RiskFlags {
    fn observe(&mut self, event: &Event) {
        if event.event_type != RISK_FLAGGED {
            return;
        }
        self.count += 1;
        bump(&mut self.by_reason, &scalar_label(&event.data, "reason"), 1);
        if let Some(trigger) = text(&event.data, "trigger_event_type") {
            bump(&mut self.by_trigger, &trigger, 1);
        }
    }

    fn emit(&self, tally: &mut Tally) {
        tally.set_counter("risk_flags_count", self.count);
        merge(tally, "risk_flags_by_reason", &self.by_reason);
        merge(tally, "risk_flags_by_trigger", &self.by_trigger);
    }
}

// ── Feedback ────────────────────────────────────────────────────────────────

/// `feedback.submitted`, by component and severity.
#[derive(Debug, Default)]
pub struct Feedback {
    count: i64,
    by_component: BTreeMap<String, i64>,
    by_severity: BTreeMap<String, i64>,
}

impl Accumulator for Feedback {
    fn observe(&mut self, event: &Event) {
        if event.event_type != "feedback.submitted" {
            return;
        }
        self.count += 1;
        if let Some(component) = text(&event.data, "component") {
            bump(&mut self.by_component, &component, 1);
        }
        if let Some(severity) = text(&event.data, "severity") {
            bump(&mut self.by_severity, &severity, 1);
        }
    }

    fn emit(&self, tally: &mut Tally) {
        tally.set_counter("feedback_count", self.count);
        merge(tally, "feedback_by_component", &self.by_component);
        merge(tally, "feedback_by_severity", &self.by_severity);
    }
}

// ── Data helpers ────────────────────────────────────────────────────────────

fn bump(map: &mut BTreeMap<String, i64>, key: &str, by: i64) {
    let slot = map.entry(key.to_string()).or_insert(0);
    *slot = slot.saturating_add(by);
}

fn merge(tally: &mut Tally, name: &str, counts: &BTreeMap<String, i64>) {
    tally.breakdown(name);
    for (key, count) in counts {
        tally.bump(name, key, *count);
    }
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A non-empty string field.
fn text(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-empty strings of an array field; anything else is ignored.
fn text_list(data: &Value, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A string or number field rendered as a breakdown key, else `unknown`.
fn scalar_label(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// An integral field; floats are truncated, anything else counts as 0.
fn integer(data: &Value, key: &str) -> i64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
