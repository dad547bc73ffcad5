//! End-to-end protocol scenarios: every party runs a full session over a
//! shared [`LocalBus`] and [`Dealer`], and the reconstructed result is
//! checked against the expected cleartext answer.

use smcompiler::bus::{LocalBus, MessageBus};
use smcompiler::dealer::Dealer;
use smcompiler::expression::{Expression, NodeId};
use smcompiler::field::Fp;
use smcompiler::participant::Participant;
use smcompiler::prg::Prg;
use smcompiler::protocol::ProtocolSpec;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

/// Runs one protocol session to completion across real threads, one per
/// named party, and returns every party's reconstructed result. `inputs`
/// maps a party name to the `(node, value)` pairs it owns.
fn run_session(
    party_names: &[&str],
    expr: Expression<Fp>,
    inputs: &HashMap<&str, Vec<(NodeId, u64)>>,
) -> Vec<u64> {
    let participant_ids: Vec<String> = party_names.iter().map(|s| s.to_string()).collect();
    let spec = ProtocolSpec::new(expr, participant_ids);
    let bus: Arc<dyn MessageBus> = LocalBus::new();
    let dealer = Arc::new(Dealer::<Fp>::new(Prg::new(Some(vec![0xAB, 0xCD]))));

    let handles: Vec<_> = party_names
        .iter()
        .map(|&name| {
            let mut owned = HashMap::new();
            if let Some(pairs) = inputs.get(name) {
                for &(node, value) in pairs {
                    owned.insert(node, Fp::new(value));
                }
            }
            let participant = Participant::new(
                name.to_string(),
                spec.clone(),
                owned,
                Prg::new(Some(name.as_bytes().to_vec())),
                Arc::clone(&bus),
                Arc::clone(&dealer),
            );
            thread::spawn(move || participant.run().unwrap().value())
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn assert_all_agree(results: &[u64], expected: u64) {
    assert!(results.iter().all(|&r| r == expected), "{results:?}");
}

#[test]
fn s1_sum_of_two_secrets_plus_a_scalar() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let expr = Expression::add(
        Expression::add(a.clone(), b.clone()),
        Expression::scalar(Fp::new(10)),
    );

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 5)]);
    inputs.insert("B", vec![(b.id(), 3)]);

    let results = run_session(&["A", "B"], expr, &inputs);
    assert_all_agree(&results, 18);
}

#[test]
fn s2_difference_scaled_by_a_public_constant() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let expr = Expression::mult(
        Expression::sub(a.clone(), b.clone()),
        Expression::scalar(Fp::new(2)),
    );

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 14)]);
    inputs.insert("B", vec![(b.id(), 3)]);

    let results = run_session(&["A", "B"], expr, &inputs);
    assert_all_agree(&results, 22);
}

#[test]
fn s3_three_way_product_runs_two_beaver_multiplications() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let c = Expression::<Fp>::secret();
    let expr = Expression::mult(Expression::mult(a.clone(), b.clone()), c.clone());

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 7)]);
    inputs.insert("B", vec![(b.id(), 6)]);
    inputs.insert("C", vec![(c.id(), 2)]);

    let results = run_session(&["A", "B", "C"], expr, &inputs);
    assert_all_agree(&results, 84);
}

#[test]
fn s4_scalars_mixed_with_a_single_secret_beaver_multiplication() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let c = Expression::<Fp>::secret();
    let expr = Expression::mult(
        Expression::mult(
            Expression::sub(a.clone(), Expression::scalar(Fp::new(2))),
            Expression::sub(b.clone(), c.clone()),
        ),
        Expression::scalar(Fp::new(10)),
    );

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 3000)]);
    inputs.insert("B", vec![(b.id(), 8)]);
    inputs.insert("C", vec![(c.id(), 4)]);

    let results = run_session(&["A", "B", "C"], expr, &inputs);
    assert_all_agree(&results, 119_920);
}

#[test]
fn s5_addition_scales_past_two_parties() {
    let secrets: Vec<_> = (0..5).map(|_| Expression::<Fp>::secret()).collect();
    let expr = secrets
        .iter()
        .cloned()
        .reduce(Expression::add)
        .expect("non-empty");

    let names = ["A", "B", "C", "D", "E"];
    let mut inputs = HashMap::new();
    for (name, secret) in names.iter().zip(&secrets) {
        inputs.insert(*name, vec![(secret.id(), 1)]);
    }

    let results = run_session(&names, expr, &inputs);
    assert_all_agree(&results, 5);
}

#[test]
fn s6_reused_sum_squared_by_identity() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let sum = Expression::add(a.clone(), b.clone());
    // The same `AddOp` node, by identity, fills both operands of the
    // multiplication — evaluation memoizes it, so it is only walked once.
    let expr = Expression::mult(sum.clone(), sum);

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 2)]);
    inputs.insert("B", vec![(b.id(), 3)]);

    let results = run_session(&["A", "B"], expr, &inputs);
    assert_all_agree(&results, 25);
}

#[test]
fn s6_independently_constructed_sums_squared() {
    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    // Two separate `AddOp` nodes with distinct identities but the same
    // operands — still only one `MultOp` node, so still one Beaver
    // triplet, but now two independent evaluations of the addition.
    let left = Expression::add(a.clone(), b.clone());
    let right = Expression::add(a.clone(), b.clone());
    assert_ne!(left.id(), right.id());
    let expr = Expression::mult(left, right);

    let mut inputs = HashMap::new();
    inputs.insert("A", vec![(a.id(), 2)]);
    inputs.insert("B", vec![(b.id(), 3)]);

    let results = run_session(&["A", "B"], expr, &inputs);
    assert_all_agree(&results, 25);
}

#[test]
fn bare_scalar_expression_reconstructs_without_any_secrets() {
    let expr = Expression::<Fp>::scalar(Fp::new(7));
    let results = run_session(&["A", "B", "C"], expr, &HashMap::new());
    assert_all_agree(&results, 7);
}

#[test]
fn unbound_secret_is_reported_rather_than_hanging() {
    use smcompiler::error::SmcError;
    use smcompiler::participant::EngineConfig;
    use std::time::Duration;

    let a = Expression::<Fp>::secret();
    let b = Expression::<Fp>::secret();
    let expr = Expression::add(a.clone(), b);

    let spec = ProtocolSpec::new(expr, vec!["A".into(), "B".into()]);
    let bus: Arc<dyn MessageBus> = LocalBus::new();
    let dealer = Arc::new(Dealer::<Fp>::new(Prg::new(Some(vec![1]))));

    // Neither party claims "a" or "b" — both are unbound.
    let alice = Participant::with_config(
        "A".into(),
        spec.clone(),
        HashMap::new(),
        Prg::new(Some(b"A".to_vec())),
        Arc::clone(&bus),
        Arc::clone(&dealer),
        EngineConfig {
            secret_timeout: Duration::from_millis(100),
        },
    );
    let bob = Participant::with_config(
        "B".into(),
        spec,
        HashMap::new(),
        Prg::new(Some(b"B".to_vec())),
        bus,
        dealer,
        EngineConfig {
            secret_timeout: Duration::from_millis(100),
        },
    );

    let alice_handle = thread::spawn(move || alice.run());
    let bob_handle = thread::spawn(move || bob.run());

    let alice_result = alice_handle.join().unwrap();
    let bob_result = bob_handle.join().unwrap();
    assert!(matches!(alice_result, Err(SmcError::UnboundSecret(_))));
    assert!(matches!(bob_result, Err(SmcError::UnboundSecret(_))));
}
