//! The participant engine (C4): each party's view of a single protocol
//! session, from sharing its inputs through to reconstructing the result.
//!
//! This generalizes the teacher crate's `VirtualMachine` — which plays every
//! party's role in one process against one shared `HashMap` — into a
//! self-contained state machine one real thread runs per participant,
//! talking only through a [`MessageBus`] and a [`Dealer`] (spec §4.4, §5).

use crate::bus::MessageBus;
use crate::dealer::Dealer;
use crate::error::{Result, SmcError};
use crate::expression::{Expression, NodeId, ScalarOperand};
use crate::field::{reconstruct, PrimeField};
use crate::prg::Prg;
use crate::protocol::{ParticipantId, ProtocolSpec};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// The session state machine a participant moves through exactly once per
/// `run()` call (spec §4.4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, nothing sent yet.
    Init,
    /// Distributing shares of this party's own secret inputs.
    Sharing,
    /// Waiting for every party's ready marker before evaluation starts.
    Barrier,
    /// Walking the expression tree.
    Evaluating,
    /// Publishing and collecting the final shares.
    Finalizing,
    /// Session complete; the result is available.
    Done,
}

/// Tunables for the parts of the engine spec §1 leaves to the
/// implementation: how long to wait for a secret's owner to show up before
/// declaring it unbound (spec §7's `UnboundSecret`).
///
/// A participant dropping out entirely during the barrier or finalization
/// phases is not handled here — that is out of scope (spec §1, "fault
/// tolerance against participant dropouts").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long to wait on a private read for a `Secret` node's share
    /// before treating it as unbound.
    pub secret_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secret_timeout: Duration::from_secs(5),
        }
    }
}

fn secret_label(id: NodeId) -> String {
    format!("secret:{id:08x}")
}

fn ready_label(participant_id: &str) -> String {
    format!("{participant_id}_sent")
}

fn beaver_d_label(op_id: NodeId) -> String {
    format!("beaver:x_a{op_id:08x}")
}

fn beaver_e_label(op_id: NodeId) -> String {
    format!("beaver:y_b{op_id:08x}")
}

fn final_label(participant_id: &str) -> String {
    format!("final_share_{participant_id}")
}

/// One party's runtime view of a protocol session.
///
/// Not `Sync` (its caches use `RefCell`, since a single session is driven by
/// one evaluating thread at a time) but `Send`, so it is built on the
/// spawning thread and moved into the thread that runs it.
pub struct Participant<T: PrimeField> {
    id: ParticipantId,
    spec: ProtocolSpec<T>,
    /// This party's own secret inputs, keyed by the `Secret` node they fill
    /// in — the out-of-band `value_dict` the reference keeps separate from
    /// the expression tree itself (spec §4.2).
    inputs: HashMap<NodeId, T>,
    /// Shares of every `Secret` node resolved so far, whether owned locally
    /// or received from a peer.
    shares: RefCell<HashMap<NodeId, T>>,
    /// Memoized evaluation result per node id, so a sub-expression shared
    /// by identity across the tree (spec §4.2's DAG aliasing) is evaluated,
    /// and any Beaver exchange it triggers is run, exactly once.
    eval_cache: RefCell<HashMap<NodeId, T>>,
    /// `Op -> triplet` cache (spec §4.4's per-session state), keyed by the
    /// multiplication node's id.
    triplet_cache: RefCell<HashMap<NodeId, (T, T, T)>>,
    prg: RefCell<Prg>,
    bus: Arc<dyn MessageBus>,
    dealer: Arc<Dealer<T>>,
    state: RefCell<SessionState>,
    config: EngineConfig,
}

impl<T: PrimeField> Participant<T> {
    /// Builds a participant with the default [`EngineConfig`].
    pub fn new(
        id: ParticipantId,
        spec: ProtocolSpec<T>,
        inputs: HashMap<NodeId, T>,
        prg: Prg,
        bus: Arc<dyn MessageBus>,
        dealer: Arc<Dealer<T>>,
    ) -> Self {
        Self::with_config(id, spec, inputs, prg, bus, dealer, EngineConfig::default())
    }

    /// Builds a participant with an explicit [`EngineConfig`].
    pub fn with_config(
        id: ParticipantId,
        spec: ProtocolSpec<T>,
        inputs: HashMap<NodeId, T>,
        prg: Prg,
        bus: Arc<dyn MessageBus>,
        dealer: Arc<Dealer<T>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            id,
            spec,
            inputs,
            shares: RefCell::new(HashMap::new()),
            eval_cache: RefCell::new(HashMap::new()),
            triplet_cache: RefCell::new(HashMap::new()),
            prg: RefCell::new(prg),
            bus,
            dealer,
            state: RefCell::new(SessionState::Init),
            config,
        }
    }

    /// This party's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn is_aggregator(&self) -> bool {
        self.spec.aggregator_id() == Some(self.id.as_str())
    }

    /// Runs the session to completion: shares inputs, waits at the barrier,
    /// evaluates the expression, and reconstructs the final result.
    #[instrument(skip(self), fields(participant = %self.id))]
    pub fn run(&self) -> Result<T> {
        self.dealer.register(&self.id)?;

        *self.state.borrow_mut() = SessionState::Sharing;
        self.send_secret_shares()?;

        *self.state.borrow_mut() = SessionState::Barrier;
        self.wait_for_barrier()?;

        *self.state.borrow_mut() = SessionState::Evaluating;
        let final_share = self.evaluate_root()?;

        *self.state.borrow_mut() = SessionState::Finalizing;
        let result = self.finalize(final_share)?;

        *self.state.borrow_mut() = SessionState::Done;
        info!(result = result.value(), "session complete");
        Ok(result)
    }

    /// Shares each owned secret among every participant (spec §4.4.2),
    /// keeping this party's own share locally, then publishes a ready
    /// marker so peers know this party has finished sharing.
    fn send_secret_shares(&self) -> Result<()> {
        let n = self.spec.len();
        for (&node_id, &value) in &self.inputs {
            let pieces = crate::field::share(value, n, &mut *self.prg.borrow_mut())?;
            for (index, peer_id) in self.spec.participant_ids.iter().enumerate() {
                if peer_id == &self.id {
                    self.shares.borrow_mut().insert(node_id, pieces[index]);
                } else {
                    self.bus.send_private(
                        &self.id,
                        peer_id,
                        &secret_label(node_id),
                        pieces[index].to_be_bytes(),
                    )?;
                }
            }
        }
        self.bus
            .publish(&self.id, &ready_label(&self.id), b"ready".to_vec())
    }

    /// Blocks until every other participant has published its ready
    /// marker. Indefinite blocking here (no participant dropped out in the
    /// honest-but-curious model this crate targets) is expected, not a bug
    /// — see spec §1's non-goals.
    fn wait_for_barrier(&self) -> Result<()> {
        for peer in &self.spec.participant_ids {
            if peer != &self.id {
                self.bus.read_public(peer, &ready_label(peer))?;
            }
        }
        Ok(())
    }

    /// Evaluates the whole expression, handling the degenerate case of a
    /// bare `Scalar` root (no enclosing operator to apply the
    /// aggregator-only convention for us).
    fn evaluate_root(&self) -> Result<T> {
        if let Some(v) = self.spec.expr.as_scalar() {
            return Ok(if self.is_aggregator() { v } else { T::zero() });
        }
        self.eval(&self.spec.expr)
    }

    fn finalize(&self, final_share: T) -> Result<T> {
        self.bus
            .publish(&self.id, &final_label(&self.id), final_share.to_be_bytes())?;

        let mut shares = vec![final_share];
        for peer in &self.spec.participant_ids {
            if peer != &self.id {
                let bytes = self.bus.read_public(peer, &final_label(peer))?;
                shares.push(T::from_be_bytes(&bytes));
            }
        }
        Ok(reconstruct(&shares))
    }

    /// Evaluates `expr` to this party's share of its cleartext value,
    /// memoizing by node identity (spec §4.4.3).
    fn eval(&self, expr: &Expression<T>) -> Result<T> {
        if let Some(cached) = self.eval_cache.borrow().get(&expr.id()) {
            return Ok(*cached);
        }
        let result = self.eval_uncached(expr)?;
        self.eval_cache.borrow_mut().insert(expr.id(), result);
        Ok(result)
    }

    fn eval_uncached(&self, expr: &Expression<T>) -> Result<T> {
        if expr.is_secret() {
            return self.retrieve_share(expr);
        }
        if let Some(v) = expr.as_scalar() {
            // Full value at every party; callers (the Add/Sub/Mult branches
            // below) decide whether and where it actually contributes.
            return Ok(v);
        }

        let (left, right) = expr
            .operands()
            .ok_or_else(|| {
                SmcError::TypeMismatch(format!(
                    "node has no operands: {} (#{:08x})",
                    expr.kind_label(),
                    expr.id()
                ))
            })?;
        let x_hat = self.eval(&left)?;
        let y_hat = self.eval(&right)?;
        let scalar_kind = expr
            .scalar_operand()
            .expect("operator nodes always classify");

        if expr.is_mult() {
            return self.eval_mult(expr.id(), scalar_kind, x_hat, y_hat);
        }

        let is_sub = expr.is_sub();
        Ok(self.eval_add_sub(is_sub, scalar_kind, x_hat, y_hat))
    }

    /// `AddOp`/`SubOp` evaluation (spec §4.4.3). A public scalar operand
    /// contributes its full value only at the aggregator; non-aggregators
    /// substitute zero for that operand and combine with the real operand
    /// using the same `+`/`-` the node carries. This is the one place this
    /// engine departs from a literal reading of the reference: for
    /// `SubOp` with a scalar minuend, zero-substitution yields `-ŷ` at
    /// non-aggregators, not `ŷ` — the only choice under which shares
    /// actually reconstruct to `x - y` (see DESIGN.md).
    fn eval_add_sub(&self, is_sub: bool, scalar_kind: ScalarOperand, x_hat: T, y_hat: T) -> T {
        let combine = |a: T, b: T| if is_sub { a.sub(&b) } else { a.add(&b) };
        match scalar_kind {
            ScalarOperand::None => combine(x_hat, y_hat),
            ScalarOperand::Both => {
                if self.is_aggregator() {
                    combine(x_hat, y_hat)
                } else {
                    T::zero()
                }
            }
            ScalarOperand::Left => {
                if self.is_aggregator() {
                    combine(x_hat, y_hat)
                } else {
                    combine(T::zero(), y_hat)
                }
            }
            ScalarOperand::Right => {
                if self.is_aggregator() {
                    combine(x_hat, y_hat)
                } else {
                    combine(x_hat, T::zero())
                }
            }
        }
    }

    /// `MultOp` evaluation (spec §4.4.3). A single scalar operand is a
    /// local operation (every party multiplies its own share by the full
    /// public constant); two secret operands run the Beaver sub-protocol;
    /// two scalar operands collapse to a plain public value, which must
    /// still enter share-space at the aggregator only, exactly like a bare
    /// `Scalar` leaf would.
    fn eval_mult(
        &self,
        op_id: NodeId,
        scalar_kind: ScalarOperand,
        x_hat: T,
        y_hat: T,
    ) -> Result<T> {
        match scalar_kind {
            ScalarOperand::None => self.beaver_multiply(op_id, x_hat, y_hat),
            ScalarOperand::Left | ScalarOperand::Right => Ok(x_hat.mul(&y_hat)),
            ScalarOperand::Both => Ok(if self.is_aggregator() {
                x_hat.mul(&y_hat)
            } else {
                T::zero()
            }),
        }
    }

    /// The Beaver triplet sub-protocol (spec §4.3, §4.4.3): masks this
    /// party's shares of the two secret operands against its triplet
    /// shares, exchanges the masks publicly, then combines.
    ///
    /// `zᵢ = cᵢ + x̂ᵢ·e + ŷᵢ·d`, with the aggregator additionally
    /// subtracting `d·e` exactly once so the sum over all parties
    /// reconstructs to `x·y` and not `x·y + d·e`.
    #[instrument(skip(self, x_hat, y_hat), fields(op_id = format!("{op_id:#010x}")))]
    fn beaver_multiply(&self, op_id: NodeId, x_hat: T, y_hat: T) -> Result<T> {
        let (a_i, b_i, c_i) = self.triplet_for(op_id)?;

        let d_i = x_hat.sub(&a_i);
        let e_i = y_hat.sub(&b_i);
        self.bus
            .publish(&self.id, &beaver_d_label(op_id), d_i.to_be_bytes())?;
        self.bus
            .publish(&self.id, &beaver_e_label(op_id), e_i.to_be_bytes())?;

        let mut d_sum = d_i;
        let mut e_sum = e_i;
        for peer in &self.spec.participant_ids {
            if peer != &self.id {
                let d_j = T::from_be_bytes(&self.bus.read_public(peer, &beaver_d_label(op_id))?);
                let e_j = T::from_be_bytes(&self.bus.read_public(peer, &beaver_e_label(op_id))?);
                d_sum = d_sum.add(&d_j);
                e_sum = e_sum.add(&e_j);
            }
        }

        let mut z = c_i.add(&x_hat.mul(&e_sum)).add(&y_hat.mul(&d_sum));
        if self.is_aggregator() {
            z = z.sub(&d_sum.mul(&e_sum));
        }
        Ok(z)
    }

    fn triplet_for(&self, op_id: NodeId) -> Result<(T, T, T)> {
        if let Some(t) = self.triplet_cache.borrow().get(&op_id) {
            return Ok(*t);
        }
        let t = self.dealer.retrieve(&self.id, op_id)?;
        self.triplet_cache.borrow_mut().insert(op_id, t);
        Ok(t)
    }

    /// Resolves a `Secret` node to this party's share of it: locally
    /// if owned, or from the bus otherwise, bounded by
    /// [`EngineConfig::secret_timeout`] so a genuinely unbound secret
    /// surfaces as [`SmcError::UnboundSecret`] rather than hanging forever
    /// — the bus contract itself has no timeout (spec §6), so this is an
    /// engine-level addition atop it.
    fn retrieve_share(&self, secret_expr: &Expression<T>) -> Result<T> {
        let id = secret_expr.id();
        if let Some(v) = self.shares.borrow().get(&id) {
            return Ok(*v);
        }

        let label = secret_label(id);
        debug!(node = format!("{id:#010x}"), "awaiting secret share");
        let bytes = self.blocking_read_private(&label, id)?;
        let share = T::from_be_bytes(&bytes);
        self.shares.borrow_mut().insert(id, share);
        Ok(share)
    }

    fn blocking_read_private(&self, label: &str, node_id: NodeId) -> Result<Vec<u8>> {
        let bus = Arc::clone(&self.bus);
        let to = self.id.clone();
        let label = label.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(bus.read_private(&to, &label));
        });
        rx.recv_timeout(self.config.secret_timeout)
            .map_err(|_| SmcError::UnboundSecret(node_id))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::field::Fp;
    use std::sync::Arc as StdArc;

    fn parties(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn run_all<F>(ids: &[&str], build_inputs: F, expr: Expression<Fp>) -> u64
    where
        F: Fn(&str) -> HashMap<NodeId, Fp>,
    {
        let spec = ProtocolSpec::new(expr, parties(ids));
        let bus: StdArc<dyn MessageBus> = LocalBus::new();
        let dealer = StdArc::new(Dealer::<Fp>::new(Prg::new(Some(vec![42]))));

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let participant = Participant::new(
                    id.to_string(),
                    spec.clone(),
                    build_inputs(id),
                    Prg::new(Some(id.as_bytes().to_vec())),
                    StdArc::clone(&bus),
                    StdArc::clone(&dealer),
                );
                thread::spawn(move || participant.run().unwrap().value())
            })
            .collect();

        let results: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for w in results.windows(2) {
            assert_eq!(w[0], w[1], "parties disagree on the result");
        }
        results[0]
    }

    #[test]
    fn addition_of_two_secrets() {
        let a = Expression::<Fp>::secret();
        let b = Expression::<Fp>::secret();
        let expr = Expression::add(a.clone(), b.clone());

        let a_id = a.id();
        let b_id = b.id();
        let result = run_all(
            &["alice", "bob"],
            |id| {
                let mut m = HashMap::new();
                if id == "alice" {
                    m.insert(a_id, Fp::new(10));
                } else {
                    m.insert(b_id, Fp::new(32));
                }
                m
            },
            expr,
        );
        assert_eq!(result, 42);
    }

    #[test]
    fn multiplication_of_two_secrets_via_beaver() {
        let a = Expression::<Fp>::secret();
        let b = Expression::<Fp>::secret();
        let expr = Expression::mult(a.clone(), b.clone());

        let a_id = a.id();
        let b_id = b.id();
        let result = run_all(
            &["alice", "bob", "carol"],
            |id| {
                let mut m = HashMap::new();
                match id {
                    "alice" => {
                        m.insert(a_id, Fp::new(6));
                    }
                    "bob" => {
                        m.insert(b_id, Fp::new(7));
                    }
                    _ => {}
                }
                m
            },
            expr,
        );
        assert_eq!(result, 42);
    }

    #[test]
    fn scalar_multiplied_secret_needs_no_beaver_triplet() {
        let a = Expression::<Fp>::secret();
        let k = Expression::<Fp>::scalar(Fp::new(10));
        let expr = Expression::mult(a.clone(), k);

        let a_id = a.id();
        let result = run_all(
            &["alice", "bob"],
            |id| {
                let mut m = HashMap::new();
                if id == "alice" {
                    m.insert(a_id, Fp::new(4));
                }
                m
            },
            expr,
        );
        assert_eq!(result, 40);
    }

    #[test]
    fn subtraction_with_a_scalar_minuend() {
        let a = Expression::<Fp>::secret();
        let k = Expression::<Fp>::scalar(Fp::new(100));
        let expr = Expression::sub(k, a.clone());

        let a_id = a.id();
        let result = run_all(
            &["alice", "bob"],
            |id| {
                let mut m = HashMap::new();
                if id == "alice" {
                    m.insert(a_id, Fp::new(37));
                }
                m
            },
            expr,
        );
        assert_eq!(result, 63);
    }

    #[test]
    fn two_scalars_multiplied_contribute_only_at_the_aggregator() {
        let k1 = Expression::<Fp>::scalar(Fp::new(6));
        let k2 = Expression::<Fp>::scalar(Fp::new(7));
        let expr = Expression::mult(k1, k2);
        let result = run_all(&["alice", "bob"], |_| HashMap::new(), expr);
        assert_eq!(result, 42);
    }

    #[test]
    fn unbound_secret_times_out_as_an_error() {
        let a = Expression::<Fp>::secret();
        let b = Expression::<Fp>::secret();
        let expr = Expression::add(a, b);

        let spec = ProtocolSpec::new(expr, parties(&["alice", "bob"]));
        let bus: StdArc<dyn MessageBus> = LocalBus::new();
        let dealer = StdArc::new(Dealer::<Fp>::new(Prg::new(Some(vec![1]))));
        let participant = Participant::with_config(
            "alice".into(),
            spec,
            HashMap::new(),
            Prg::new(Some(b"alice".to_vec())),
            bus,
            dealer,
            EngineConfig {
                secret_timeout: Duration::from_millis(50),
            },
        );
        // No one ever shares the two secrets, so alice's own read of the
        // first one times out before the barrier is even reachable.
        let err = participant.send_secret_shares().and_then(|_| {
            participant.retrieve_share(&Expression::<Fp>::secret())
        });
        assert!(matches!(err, Err(SmcError::UnboundSecret(_))));
    }
}
