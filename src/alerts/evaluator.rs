//! Rule evaluation: matched substances and inferred conditions in, sorted alerts out.

use uuid::Uuid;

use crate::models::enums::RuleKind;

use super::catalog::CatalogSnapshot;
use super::conditions::InferredConditions;
use super::matcher::MatchedSubstances;
use super::types::{alert_id, Alert};

/// Cross-evaluate matched substances against inferred conditions and
/// against each other.
///
/// Each rule costs two set lookups, so evaluation is linear in the rule
/// tables. Output is stably sorted by severity; ties keep rule-table order
/// with contraindications before interactions. Raw alerts are never
/// acknowledged; the controller stamps that afterwards.
pub fn evaluate(
    individual_id: &Uuid,
    matched: &MatchedSubstances,
    inferred: &InferredConditions,
    catalog: &CatalogSnapshot,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if matched.is_empty() {
        return alerts;
    }

    for rule in catalog.contraindication_rules() {
        if !matched.contains(&rule.substance_id) || !inferred.contains(&rule.condition_id) {
            continue;
        }
        alerts.push(Alert {
            id: alert_id(individual_id, &rule.id),
            rule_id: rule.id,
            rule_kind: RuleKind::Condition,
            severity: rule.severity,
            subject_name: substance_name(&rule.substance_id, matched, catalog),
            counterpart_name: inferred
                .name(&rule.condition_id)
                .map(str::to_string)
                .or_else(|| catalog.condition(&rule.condition_id).map(|c| c.name.clone()))
                .unwrap_or_default(),
            message_text: rule.message_text.clone(),
            recommendation_text: rule.recommendation_text.clone(),
            source_citation: rule.source_citation.clone(),
            acknowledged: false,
        });
    }

    for rule in catalog.interaction_rules() {
        // Both members of the pair must be present.
        if !matched.contains(&rule.substance_a_id) || !matched.contains(&rule.substance_b_id) {
            continue;
        }
        alerts.push(Alert {
            id: alert_id(individual_id, &rule.id),
            rule_id: rule.id,
            rule_kind: RuleKind::Interaction,
            severity: rule.severity,
            subject_name: substance_name(&rule.substance_a_id, matched, catalog),
            counterpart_name: substance_name(&rule.substance_b_id, matched, catalog),
            message_text: rule.message_text.clone(),
            recommendation_text: rule.recommendation_text.clone(),
            source_citation: rule.source_citation.clone(),
            acknowledged: false,
        });
    }

    sort_by_severity(&mut alerts);
    alerts
}

/// Stable sort, critical first.
pub fn sort_by_severity(alerts: &mut [Alert]) {
    alerts.sort_by_key(|a| a.severity.rank());
}

fn substance_name(id: &Uuid, matched: &MatchedSubstances, catalog: &CatalogSnapshot) -> String {
    matched
        .name(id)
        .or_else(|| catalog.substance(id).map(|s| s.canonical_name.as_str()))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_support::{contraindication_id, fixture_catalog, id, interaction_id};
    use crate::models::enums::Severity;

    fn matched(catalog: &CatalogSnapshot, names: &[&str]) -> MatchedSubstances {
        let mut matched = MatchedSubstances::default();
        for name in names {
            let substance = catalog.substance(&id(name)).unwrap().clone();
            matched.ids.insert(substance.id);
            matched.by_id.insert(substance.id, substance);
        }
        matched
    }

    fn inferred(catalog: &CatalogSnapshot, names: &[&str]) -> InferredConditions {
        let mut inferred = InferredConditions::default();
        for name in names {
            inferred.insert(catalog.condition(&id(name)).unwrap());
        }
        inferred
    }

    #[test]
    fn critical_condition_alert_for_millepertuis() {
        let catalog = fixture_catalog();
        let individual = Uuid::new_v4();
        let alerts = evaluate(
            &individual,
            &matched(&catalog, &["Millepertuis"]),
            &inferred(&catalog, &["Anticoagulants"]),
            &catalog,
        );

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.rule_kind, RuleKind::Condition);
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.subject_name, "Millepertuis");
        assert_eq!(alert.counterpart_name, "Anticoagulants");
        assert_eq!(alert.rule_id, contraindication_id("Millepertuis", "Anticoagulants"));
        assert!(!alert.acknowledged);
    }

    #[test]
    fn interaction_alert_when_both_present() {
        let catalog = fixture_catalog();
        let alerts = evaluate(
            &Uuid::new_v4(),
            &matched(&catalog, &["Millepertuis", "Pamplemousse"]),
            &InferredConditions::default(),
            &catalog,
        );

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_kind, RuleKind::Interaction);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(alerts[0].subject_name, "Millepertuis");
        assert_eq!(alerts[0].counterpart_name, "Pamplemousse");
    }

    #[test]
    fn interaction_requires_both_sides() {
        let catalog = fixture_catalog();
        for alone in ["Millepertuis", "Pamplemousse", "Ginkgo"] {
            let alerts = evaluate(
                &Uuid::new_v4(),
                &matched(&catalog, &[alone]),
                &InferredConditions::default(),
                &catalog,
            );
            assert!(
                alerts.iter().all(|a| a.rule_kind != RuleKind::Interaction),
                "{alone} alone fired an interaction"
            );
        }
    }

    #[test]
    fn condition_without_substance_does_not_fire() {
        let catalog = fixture_catalog();
        let alerts = evaluate(
            &Uuid::new_v4(),
            &matched(&catalog, &["Pamplemousse"]),
            &inferred(&catalog, &["Anticoagulants", "Hypertension"]),
            &catalog,
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn empty_match_yields_no_alerts() {
        let catalog = fixture_catalog();
        let alerts = evaluate(
            &Uuid::new_v4(),
            &MatchedSubstances::default(),
            &inferred(&catalog, &["Anticoagulants"]),
            &catalog,
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn sorted_by_severity_with_stable_ties() {
        let catalog = fixture_catalog();
        let alerts = evaluate(
            &Uuid::new_v4(),
            &matched(&catalog, &["Millepertuis", "Pamplemousse", "Ginkgo", "Réglisse"]),
            &inferred(&catalog, &["Anticoagulants", "Oral contraceptives", "Hypertension"]),
            &catalog,
        );

        assert!(alerts
            .windows(2)
            .all(|w| w[0].severity.rank() <= w[1].severity.rank()));

        let rule_ids: Vec<Uuid> = alerts.iter().map(|a| a.rule_id).collect();
        assert_eq!(
            rule_ids,
            vec![
                // critical, table order
                contraindication_id("Millepertuis", "Anticoagulants"),
                contraindication_id("Millepertuis", "Oral contraceptives"),
                // warning: contraindications first, then interactions
                contraindication_id("Réglisse", "Hypertension"),
                contraindication_id("Ginkgo", "Anticoagulants"),
                interaction_id("Millepertuis", "Pamplemousse"),
                // info
                interaction_id("Ginkgo", "Millepertuis"),
            ]
        );
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let catalog = fixture_catalog();
        let individual = Uuid::new_v4();
        let m = matched(&catalog, &["Millepertuis", "Pamplemousse", "Ginkgo"]);
        let c = inferred(&catalog, &["Anticoagulants"]);
        let first = evaluate(&individual, &m, &c, &catalog);
        for _ in 0..5 {
            assert_eq!(evaluate(&individual, &m, &c, &catalog), first);
        }
    }
}
