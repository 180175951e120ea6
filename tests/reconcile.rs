use std::collections::HashSet;

use proptest::prelude::*;
use sheet_ingest::{
    error::IngestError,
    reconcile::{MatchStrategy, reconcile},
};

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn spaces_and_underscores_are_interchangeable() {
    let forward = reconcile(&owned(&["Customer Name"]), &["Customer_Name"]).unwrap();
    assert_eq!(forward.mappings[0].strategy, MatchStrategy::SeparatorNormalized);

    let reverse = reconcile(&owned(&["Customer_Name"]), &["Customer Name"]).unwrap();
    assert_eq!(reverse.mappings[0].strategy, MatchStrategy::SeparatorNormalized);
}

#[test]
fn mappings_follow_required_column_order() {
    let result = reconcile(
        &owned(&["Amount", "Customer Name", "Facility-No"]),
        &["Facility_No", "Customer_Name", "Amount"],
    )
    .unwrap();
    let columns = result
        .mappings
        .iter()
        .map(|m| (m.column.as_str(), m.excel_index))
        .collect::<Vec<_>>();
    assert_eq!(
        columns,
        vec![("Facility_No", 2), ("Customer_Name", 1), ("Amount", 0)]
    );
}

#[test]
fn missing_amount_is_named() {
    let err = reconcile(
        &owned(&["Facility No", "Customer Name"]),
        &["Facility_No", "Customer_Name", "Amount"],
    )
    .unwrap_err();
    assert!(matches!(&err, IngestError::UnreconciledColumns { unmatched, .. } if unmatched == &["Amount"]));
    assert!(err.to_string().contains("Amount"));
}

fn column_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,6}( [A-Za-z0-9]{1,6}){0,2}"
}

proptest! {
    #[test]
    fn matching_names_are_always_exact(
        names in proptest::collection::hash_set(column_name(), 1..8),
        upper in any::<bool>(),
    ) {
        let required = names.iter().cloned().collect::<Vec<_>>();
        // Distinct case-insensitively, otherwise two columns legitimately share a header.
        let lowered = required.iter().map(|n| n.to_lowercase()).collect::<HashSet<_>>();
        prop_assume!(lowered.len() == required.len());

        let headers = required
            .iter()
            .rev()
            .map(|name| if upper { name.to_uppercase() } else { name.to_lowercase() })
            .collect::<Vec<_>>();
        let result = reconcile(&headers, &required).expect("all columns present");
        prop_assert!(result.mappings.iter().all(|m| m.strategy == MatchStrategy::Exact));
        prop_assert!(result.unused_headers.is_empty());
    }

    #[test]
    fn no_header_is_mapped_twice(
        headers in proptest::collection::vec(column_name(), 0..10),
        required in proptest::collection::vec(column_name(), 0..10),
    ) {
        let (mappings, unused) = match reconcile(&headers, &required) {
            Ok(result) => (result.mappings, result.unused_headers),
            Err(IngestError::UnreconciledColumns { unmatched, .. }) => {
                prop_assert!(!unmatched.is_empty());
                return Ok(());
            }
            Err(other) => return Err(TestCaseError::fail(format!("unexpected {other:?}"))),
        };
        let indices = mappings.iter().map(|m| m.excel_index).collect::<HashSet<_>>();
        prop_assert_eq!(indices.len(), mappings.len());
        prop_assert_eq!(mappings.len() + unused.len(), headers.iter().filter(|h| !h.trim().is_empty()).count());
        for mapping in &mappings {
            prop_assert_eq!(&headers[mapping.excel_index].trim().to_string(), &mapping.excel_header);
        }
    }
}
