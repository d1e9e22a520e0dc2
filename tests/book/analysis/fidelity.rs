//! Trace fidelity examples from the book

use medidor::fidelity::{edit_distance, FidelityAnalyzer, FidelityScore, OrderCheck, OrderOutcome};
use medidor::trace::{extract_invocations, InvocationToken, SequenceShape};

#[test]
fn test_extraction_example() {
    let tokens = extract_invocations("noise m0(0) noise m1(0) trailing m0(1)");
    assert_eq!(
        tokens,
        vec![
            InvocationToken::new(0, 0),
            InvocationToken::new(1, 0),
            InvocationToken::new(0, 1),
        ]
    );
}

#[test]
fn test_expected_sequence_example() {
    let expected = SequenceShape::new(2, 2).expected();
    let printed: Vec<String> = expected.iter().map(ToString::to_string).collect();
    assert_eq!(printed, ["m0(0)", "m1(0)", "m0(1)", "m1(1)"]);
}

#[test]
fn test_single_missing_call_example() {
    let observed = ["m0(0)".parse::<InvocationToken>().expect("marker")];
    let expected = [InvocationToken::new(0, 0), InvocationToken::new(1, 0)];
    assert_eq!(edit_distance(&observed, &expected).expect("distance"), 1);

    let score = FidelityScore::compute(&observed, &expected).expect("score");
    assert_eq!(score.relative_edit_rate, 0.5);
}

#[test]
fn test_enforcement_reduces_edits_example() {
    crate::init_logging();
    let analyzer = FidelityAnalyzer::new(SequenceShape::new(3, 2)).expect("shape");

    // Without enforcement the scheduler interleaves iterations freely
    let plain = analyzer
        .report(&[
            "m0(0) m0(1) m1(0) m1(1) m0(2) m1(2)",
            "m1(0) m0(0) m1(1) m0(1) m1(2) m0(2)",
        ])
        .expect("report");
    let enforced = analyzer
        .report(&[
            "[log] m0(0)\n[log] m1(0)\n[log] m0(1)\n[log] m1(1)\n[log] m0(2)\n[log] m1(2)\n",
            "m0(0) m1(0) m0(1) m1(1) m0(2) m1(2)",
        ])
        .expect("report");

    assert!(plain.mean_edit_distance > 0.0);
    assert_eq!(enforced.mean_edit_distance, 0.0);
    assert_eq!(enforced.exact_runs(), 2);
    assert_eq!(plain.reference_length, 6);
}

#[test]
fn test_order_check_example() {
    let check = OrderCheck::new("publish", "request").expect("markers");
    assert_eq!(
        check.check("Teacher: publish grades\nStudent: request grade\n"),
        OrderOutcome::Preserved
    );

    let runs = [
        "publish\nrequest",
        "request\npublish",
        "publish\nrequest",
        "publish\nrequest",
    ];
    let tally = check.tally(&runs);
    assert_eq!(tally.violated, 1);
    assert_eq!(tally.total(), 4);
    assert_eq!(tally.violation_rate(), 0.25);
}
