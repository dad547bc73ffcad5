//! The trusted dealer (C3): mints and distributes Beaver triplets keyed by
//! multiplication-node identity.
//!
//! This generalizes `ttp.py`'s `TrustedParamGenerator`/`BeaverTriplet` and
//! the teacher crate's `generate_triple`/`simulate_random_dist` free
//! functions into a single thread-safe component one dealer process can
//! serve to every participant thread, with a per-op-id mint-once discipline
//! enforced by a single mutex (spec §5).

use crate::error::{Result, SmcError};
use crate::expression::NodeId;
use crate::field::{share, PrimeField};
use crate::prg::Prg;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

struct Triplet<T: PrimeField> {
    a_shares: Vec<T>,
    b_shares: Vec<T>,
    c_shares: Vec<T>,
}

struct State<T: PrimeField> {
    participants: Vec<String>,
    triplets: HashMap<NodeId, Triplet<T>>,
    prg: Prg,
}

/// A trusted dealer: a single process trusted to generate and distribute
/// Beaver triplets, never revealing `a`, `b`, `c` in cleartext — only
/// per-party shares ever leave it (spec §4.3).
pub struct Dealer<T: PrimeField> {
    state: Mutex<State<T>>,
}

impl<T: PrimeField> Dealer<T> {
    /// Creates a dealer with its own pseudo-random generator.
    pub fn new(prg: Prg) -> Self {
        Self {
            state: Mutex::new(State {
                participants: Vec::new(),
                triplets: HashMap::new(),
                prg,
            }),
        }
    }

    /// Registers a participant, assigning it the next free index.
    ///
    /// Idempotent-adjacent: re-registering an already-known id is
    /// tolerated but keeps the original index (spec §4.3, §6).
    pub fn register(&self, participant_id: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SmcError::DealerFailure("dealer mutex poisoned".into()))?;
        if !state.participants.iter().any(|p| p == participant_id) {
            state.participants.push(participant_id.to_string());
        }
        Ok(())
    }

    fn index_of(state: &State<T>, participant_id: &str) -> Result<usize> {
        state
            .participants
            .iter()
            .position(|p| p == participant_id)
            .ok_or_else(|| {
                SmcError::DealerFailure(format!("unregistered participant {participant_id}"))
            })
    }

    /// Retrieves `(a_i, b_i, c_i)` for `participant_id` and multiplication
    /// node `op_id`, minting the triplet on first request (spec §4.3).
    ///
    /// Repeated retrieval for the same `op_id` by any participant returns
    /// shares of the same underlying `(a, b, c)`; different `op_id`s are
    /// always independent.
    pub fn retrieve(&self, participant_id: &str, op_id: NodeId) -> Result<(T, T, T)> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SmcError::DealerFailure("dealer mutex poisoned".into()))?;
        let index = Self::index_of(&state, participant_id)?;
        let n = state.participants.len();

        if !state.triplets.contains_key(&op_id) {
            debug!(op_id, n, "minting beaver triplet");
            let triplet = mint_triplet::<T>(n, &mut state.prg)?;
            state.triplets.insert(op_id, triplet);
        }

        let triplet = &state.triplets[&op_id];
        Ok((
            triplet.a_shares[index],
            triplet.b_shares[index],
            triplet.c_shares[index],
        ))
    }
}

/// Samples `a, b` uniformly from `[0, floor(sqrt(q)))` so that `a * b < q`
/// as integers — essential so that `c = a * b` holds with no modular wrap
/// on the cleartext product (spec §4.3) — computes `c = a * b`, and shares
/// all three among `n` parties.
fn mint_triplet<T: PrimeField>(n: usize, prg: &mut Prg) -> Result<Triplet<T>> {
    let bound = isqrt(T::MODULUS);
    let raw_a = T::random(prg).value() % bound;
    let raw_b = T::random(prg).value() % bound;
    let a = T::new(raw_a);
    let b = T::new(raw_b);
    let c = T::new(((raw_a as u128) * (raw_b as u128)) as u64);

    Ok(Triplet {
        a_shares: share(a, n, prg)?,
        b_shares: share(b, n, prg)?,
        c_shares: share(c, n, prg)?,
    })
}

fn isqrt(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut x = (n as f64).sqrt() as u64 + 1;
    while x * x > n {
        x -= 1;
    }
    x.max(1)
}
