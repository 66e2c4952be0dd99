//! This bench test fingerprints and diffs a large requirement collection, then
//! merges a many-group artifact surgically.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use criterion::{Criterion, criterion_group, criterion_main};
use resync::{
    Requirement, RequirementId, Severity, Strategy,
    domain::{Attribute, Bounds, Constraint, ConstraintKind, ScalarType, change::fingerprint_all},
    detect_changes, update_artifact,
};

/// Generates requirements with a handful of bounded attributes each
fn collection(size: usize, lower: f64) -> BTreeMap<RequirementId, Requirement> {
    (0..size)
        .map(|i| {
            let id: RequirementId = format!("REQ-{i:04}").parse().unwrap();
            let requirement = Requirement::new(id.clone(), format!("Requirement{i}"))
                .with_documentation("The system shall   keep the value within bounds.")
                .with_attribute(
                    Attribute::new("height", ScalarType::Integer)
                        .with_bounds(Bounds::range(lower, 200.0)),
                )
                .with_attribute(
                    Attribute::new("color", ScalarType::String)
                        .with_bounds(Bounds::Enumerated(vec!["green".into(), "blue".into()])),
                )
                .with_constraint(Constraint::new(
                    ConstraintKind::Requirement,
                    "height >= 150 and height <= 200",
                ));
            (id, requirement)
        })
        .collect()
}

fn artifact(groups: usize, lower: u32, custom: &str) -> String {
    let mut text = String::from("import pytest\nfrom hypothesis import given\n\n");
    for i in 0..groups {
        text.push_str(&format!(
            "\
# SYSML2PYTEST-METADATA-START
# requirement_id: REQ-{i:04}
# version: 1
# SYSML2PYTEST-METADATA-END
# SYSML2PYTEST-GENERATED-START
@given(height=st.integers(min_value={lower}, max_value=200))
def test_requirement_{i}(height):
# SYSML2PYTEST-GENERATED-END
    # SYSML2PYTEST-CUSTOM-START
{custom}    # SYSML2PYTEST-CUSTOM-END

"
        ));
    }
    text
}

fn fingerprint_and_detect(c: &mut Criterion) {
    let old = collection(1_000, 150.0);
    let new = collection(1_000, 140.0);

    c.bench_function("fingerprint and detect 1000 requirements", |b| {
        b.iter(|| {
            let report = detect_changes(&fingerprint_all(old.values()), &fingerprint_all(new.values()));
            assert_eq!(report.modified.len(), 1_000);
        });
    });
}

fn surgical_merge(c: &mut Criterion) {
    let existing = artifact(200, 150, "    assert height > 0\n");
    let generated = artifact(200, 140, "    # Add custom test logic here\n");

    c.bench_function("surgical merge of 200 groups", |b| {
        b.iter(|| {
            update_artifact(
                Some(&existing),
                &generated,
                Severity::Moderate,
                Strategy::Surgical,
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, fingerprint_and_detect, surgical_merge);
criterion_main!(benches);
