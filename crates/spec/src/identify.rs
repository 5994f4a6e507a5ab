//! Canonical identifier generation
//!
//! The external framework generates one test function per scenario at
//! collection time and one parametrized case per examples row. The
//! identifiers it prints are reproduced here as a pure function of the
//! document, so the static inventory and the dynamic collection can be joined
//! on identical keys.
//!
//! ```text
//! features/basket.feature::test_empty_basket
//! features/basket.feature::test_eating[0]
//! features/basket.feature::test_eating[1]
//! ```

use crate::document::{ExampleRow, SpecificationDocument};
use std::collections::HashSet;
use tally_core::limits::EXAMPLE_ORDINAL_BASE;
use tally_core::TestCaseId;

/// Naming parameters of the external framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierScheme {
    /// Ordinal of the first example row
    pub ordinal_base: usize,
    /// Prefix of the generated test function
    pub function_prefix: String,
}

impl Default for IdentifierScheme {
    fn default() -> Self {
        IdentifierScheme {
            ordinal_base: EXAMPLE_ORDINAL_BASE,
            function_prefix: "test_".to_string(),
        }
    }
}

/// A scenario or example row resolved to its identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedCase {
    /// Canonical identifier
    pub id: TestCaseId,
    /// Position of the scenario in the document
    pub scenario_index: usize,
    /// Scenario name as written
    pub scenario: String,
    /// Feature, scenario and examples tags in that order, without duplicates
    pub tags: Vec<String>,
    /// Bound example row, for outline cases with rows
    pub example: Option<ExampleRow>,
    /// Background plus scenario steps
    pub step_count: usize,
}

/// Convert free text to the Python identifier the framework derives from it.
///
/// Spaces become `_`, remaining non-word characters are dropped, leading
/// digits (and underscores following them) are stripped, and the result is
/// lowercased.
pub fn python_name(text: &str) -> String {
    let word: String = text
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    let trimmed = match word.find(|c: char| !c.is_ascii_digit()) {
        Some(0) => word.as_str(),
        Some(i) => word[i..].trim_start_matches('_'),
        None => "",
    };
    trimmed.to_lowercase()
}

impl IdentifierScheme {
    /// Function names for every scenario in document order.
    ///
    /// A name already taken in the same document gets `_1`, `_2`, ...
    /// appended, matching how the framework avoids clobbering an earlier
    /// generated function.
    pub fn function_names(&self, doc: &SpecificationDocument) -> Vec<String> {
        let mut taken = HashSet::with_capacity(doc.scenarios.len());
        doc.scenarios
            .iter()
            .map(|scenario| {
                let base = format!("{}{}", self.function_prefix, python_name(&scenario.name));
                let mut name = base.clone();
                let mut suffix = 0usize;
                while !taken.insert(name.clone()) {
                    suffix += 1;
                    name = format!("{}_{}", base, suffix);
                }
                name
            })
            .collect()
    }

    /// Identifier of one scenario, or of one of its example rows.
    ///
    /// `example_index` is the 0-based position among all rows of the
    /// outline. Returns `None` when either index is out of range, or when a
    /// row is requested for something that has no rows.
    pub fn identify(
        &self,
        doc: &SpecificationDocument,
        scenario: usize,
        example_index: Option<usize>,
    ) -> Option<TestCaseId> {
        let node = doc.scenarios.get(scenario)?;
        let names = self.function_names(doc);
        let function = names.get(scenario)?;
        match example_index {
            None if node.row_count() == 0 => {
                Some(TestCaseId::from_parts(&doc.path, [function.as_str()]))
            }
            None => None,
            Some(i) if i < node.row_count() => Some(self.row_id(&doc.path, function, i)),
            Some(_) => None,
        }
    }

    /// Every identifier the document expands to, in document order
    pub fn identify_all(&self, doc: &SpecificationDocument) -> Vec<TestCaseId> {
        self.expand(doc).into_iter().map(|case| case.id).collect()
    }

    /// Every case the document expands to, with tags and bound rows
    pub fn expand(&self, doc: &SpecificationDocument) -> Vec<ExpandedCase> {
        let names = self.function_names(doc);
        let background_steps = doc.background.as_ref().map_or(0, Vec::len);
        let mut cases = Vec::with_capacity(doc.case_count());

        let scenarios = doc.scenarios.iter().zip(&names).enumerate();
        for (scenario_index, (scenario, function)) in scenarios {
            let mut tags = Vec::new();
            push_unique(&mut tags, &doc.tags);
            push_unique(&mut tags, &scenario.tags);
            let step_count = background_steps + scenario.steps.len();

            let rows = scenario.example_rows();
            if rows.is_empty() {
                cases.push(ExpandedCase {
                    id: TestCaseId::from_parts(&doc.path, [function.as_str()]),
                    scenario_index,
                    scenario: scenario.name.clone(),
                    tags,
                    example: None,
                    step_count,
                });
                continue;
            }
            for row in rows {
                let mut row_tags = tags.clone();
                push_unique(&mut row_tags, &row.tags);
                cases.push(ExpandedCase {
                    id: self.row_id(&doc.path, function, row.index),
                    scenario_index,
                    scenario: scenario.name.clone(),
                    tags: row_tags,
                    example: Some(row),
                    step_count,
                });
            }
        }
        cases
    }

    fn row_id(&self, path: &str, function: &str, index: usize) -> TestCaseId {
        let segment = format!("{}[{}]", function, index + self.ordinal_base);
        TestCaseId::from_parts(path, [segment.as_str()])
    }
}

fn push_unique(into: &mut Vec<String>, tags: &[String]) {
    for tag in tags {
        if !into.contains(tag) {
            into.push(tag.clone());
        }
    }
}

/// [`IdentifierScheme::identify`] with the default scheme
pub fn identify(
    doc: &SpecificationDocument,
    scenario: usize,
    example_index: Option<usize>,
) -> Option<TestCaseId> {
    IdentifierScheme::default().identify(doc, scenario, example_index)
}

/// [`IdentifierScheme::identify_all`] with the default scheme
pub fn identify_all(doc: &SpecificationDocument) -> Vec<TestCaseId> {
    IdentifierScheme::default().identify_all(doc)
}

/// [`IdentifierScheme::expand`] with the default scheme
pub fn expand(doc: &SpecificationDocument) -> Vec<ExpandedCase> {
    IdentifierScheme::default().expand(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use proptest::prelude::*;

    const BASKET: &str = r#"@fast
Feature: Basket
  Background:
    Given a basket

  Scenario: Empty basket
    Then it is empty

  @slow
  Scenario Outline: Eating cucumbers
    Given there are <start> cucumbers
    When I eat <eat>

    @smoke
    Examples:
      | start | eat |
      | 12    | 5   |
      | 20    | 5   |
      | 5     | 5   |
"#;

    #[test]
    fn test_python_name_rules() {
        assert_eq!(python_name("Empty basket"), "empty_basket");
        assert_eq!(python_name("Log in (admin)!"), "log_in_admin");
        assert_eq!(python_name("3 little pigs"), "little_pigs");
        assert_eq!(python_name("42"), "");
        assert_eq!(python_name("User-Name Valid"), "username_valid");
    }

    #[test]
    fn test_scenario_and_outline_ids() {
        let doc = parse_str("features/basket.feature", BASKET).unwrap();
        let ids: Vec<String> = identify_all(&doc).iter().map(|i| i.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "features/basket.feature::test_empty_basket",
                "features/basket.feature::test_eating_cucumbers[0]",
                "features/basket.feature::test_eating_cucumbers[1]",
                "features/basket.feature::test_eating_cucumbers[2]",
            ]
        );
    }

    #[test]
    fn test_identify_single_case() {
        let doc = parse_str("b.feature", BASKET).unwrap();
        assert_eq!(
            identify(&doc, 1, Some(2)).unwrap().as_str(),
            "b.feature::test_eating_cucumbers[2]"
        );
        assert_eq!(identify(&doc, 0, None).unwrap().as_str(), "b.feature::test_empty_basket");
        assert!(identify(&doc, 1, None).is_none());
        assert!(identify(&doc, 1, Some(3)).is_none());
        assert!(identify(&doc, 0, Some(0)).is_none());
        assert!(identify(&doc, 9, None).is_none());
    }

    #[test]
    fn test_ordinal_base_is_configurable() {
        let doc = parse_str("b.feature", BASKET).unwrap();
        let scheme = IdentifierScheme {
            ordinal_base: 1,
            ..IdentifierScheme::default()
        };
        let ids = scheme.identify_all(&doc);
        assert_eq!(ids[1].as_str(), "b.feature::test_eating_cucumbers[1]");
        assert_eq!(ids[3].as_str(), "b.feature::test_eating_cucumbers[3]");
    }

    #[test]
    fn test_duplicate_names_disambiguated() {
        let text = "Feature: F\n  Scenario: Same\n    Given a\n  Scenario: Same\n    Given b\n  Scenario: same!\n    Given c\n";
        let doc = parse_str("d.feature", text).unwrap();
        let ids: Vec<String> = identify_all(&doc).iter().map(|i| i.to_string()).collect();
        assert_eq!(
            ids,
            vec!["d.feature::test_same", "d.feature::test_same_1", "d.feature::test_same_2"]
        );
    }

    #[test]
    fn test_outline_without_rows_collected_once() {
        let text = "Feature: F\n  Scenario Outline: Empty\n    Given <x>\n    Examples:\n      | x |\n";
        let doc = parse_str("e.feature", text).unwrap();
        let ids = identify_all(&doc);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "e.feature::test_empty");
    }

    #[test]
    fn test_expand_carries_tags_and_rows() {
        let doc = parse_str("b.feature", BASKET).unwrap();
        let cases = expand(&doc);
        assert_eq!(cases[0].tags, vec!["fast".to_string()]);
        assert_eq!(cases[0].step_count, 2);
        assert_eq!(
            cases[1].tags,
            vec!["fast".to_string(), "slow".to_string(), "smoke".to_string()]
        );
        let row = cases[2].example.as_ref().unwrap();
        assert_eq!(row.steps[0].text, "there are 20 cucumbers");
    }

    fn document_text(plain: usize, outlines: &[usize]) -> String {
        let mut text = String::from("Feature: Generated\n");
        for i in 0..plain {
            text.push_str(&format!("  Scenario: plain {i}\n    Given step\n"));
        }
        for (i, rows) in outlines.iter().enumerate() {
            text.push_str(&format!(
                "  Scenario Outline: outline {i}\n    Given <v>\n    Examples:\n      | v |\n"
            ));
            for r in 0..*rows {
                text.push_str(&format!("      | {r} |\n"));
            }
        }
        text
    }

    proptest! {
        #[test]
        fn prop_identifier_count_matches_structure(
            plain in 0usize..6,
            outlines in proptest::collection::vec(0usize..5, 0..5),
        ) {
            let doc = parse_str("p.feature", &document_text(plain, &outlines)).unwrap();
            let expected = plain + outlines.iter().map(|r| (*r).max(1)).sum::<usize>();
            let ids = identify_all(&doc);
            prop_assert_eq!(ids.len(), expected);
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
