//! Classification of specification documents
//!
//! Every case a document expands to is a behavior test. Speed comes from
//! `@fast`/`@medium`/`@slow` tags, the most specific carrier winning:
//! examples block, then scenario, then feature.

use crate::classifier::{CaseInfo, FileClassification};
use crate::complexity::{complexity, ComplexityInputs};
use tally_core::{Category, Classification, Speed};
use tally_spec::{IdentifierScheme, ScenarioKind, SpecificationDocument};

/// Classify every case of a parsed document
pub fn classify_document(
    doc: &SpecificationDocument,
    scheme: &IdentifierScheme,
) -> FileClassification {
    let mut result = FileClassification::empty(doc.path.clone());
    for case in scheme.expand(doc) {
        let Some(scenario) = doc.scenarios.get(case.scenario_index) else {
            continue;
        };
        let row_tags = case.example.as_ref().map(|row| row.tags.as_slice()).unwrap_or(&[]);
        let speed = [row_tags, scenario.tags.as_slice(), doc.tags.as_slice()]
            .iter()
            .find_map(|tags| speed_tag(tags))
            .unwrap_or(Speed::Unmarked);

        let then_steps = scenario
            .steps
            .iter()
            .filter(|s| s.keyword == "Then")
            .count();
        let columns = match &scenario.kind {
            ScenarioKind::Outline { examples } => {
                examples.first().map_or(0, |t| t.header.len())
            }
            ScenarioKind::Scenario => 0,
        };
        let score = complexity(ComplexityInputs {
            lines: case.step_count,
            asserts: then_steps,
            fixtures: 0,
            parametrize: columns,
        });

        result.cases.insert(
            case.id,
            CaseInfo {
                classification: Classification::new(Category::Behavior, speed),
                complexity: score,
                line: case.example.as_ref().map_or(scenario.line, |row| row.line),
                markers: case.tags,
            },
        );
    }
    result
}

fn speed_tag(tags: &[String]) -> Option<Speed> {
    tags.iter().find_map(|t| Speed::from_marker(t))
}
