//! `smcompiler` is a small library for compiling and running secure
//! multi-party computations over additively secret-shared values, using
//! Beaver triplets for multiplication. It can be seen as a generalization of
//! [smol-mpc], restructured around a reusable expression compiler, a proper
//! message-bus abstraction, and real per-party threads instead of one
//! process stepping through every party's memory by hand.
//!
//! Parties agree on an arithmetic [`Expression`](crate::expression::Expression)
//! tree built from [`Scalar`](crate::expression::Expression::scalar) and
//! [`Secret`](crate::expression::Expression::secret) leaves combined with
//! `+`, `-`, and `*`. Each party then runs a [`Participant`](crate::participant::Participant)
//! that shares its own secret inputs, waits for the others to do the same,
//! walks the shared expression to a share of the result, and reconstructs
//! the cleartext answer — without ever seeing another party's inputs in the
//! clear.
//!
//! Multiplication of two secret-shared values uses the Beaver triplet
//! technique: a [`Dealer`](crate::dealer::Dealer) hands each party a share
//! of a triple `(a, b, c)` with `c = a * b`, which the parties consume to
//! mask and reveal only a blinded version of their operands. The dealer is
//! trusted not to collude — this library targets the honest-but-curious
//! model, not malicious security (see [`error`] for what can still go
//! wrong).
//!
//! # Examples
//!
//! ## Secure addition
//!
//! Two parties, Alice and Bob, want to add their private values without
//! revealing them to each other.
//!
//! ```rust
//! use smcompiler::dealer::Dealer;
//! use smcompiler::bus::{LocalBus, MessageBus};
//! use smcompiler::expression::Expression;
//! use smcompiler::field::Fp;
//! use smcompiler::participant::Participant;
//! use smcompiler::prg::Prg;
//! use smcompiler::protocol::ProtocolSpec;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let a = Expression::<Fp>::secret();
//! let b = Expression::<Fp>::secret();
//! let sum = Expression::add(a.clone(), b.clone());
//!
//! let spec = ProtocolSpec::new(sum, vec!["alice".into(), "bob".into()]);
//! let bus: Arc<dyn MessageBus> = LocalBus::new();
//! let dealer = Arc::new(Dealer::<Fp>::new(Prg::new(None)));
//!
//! let mut alice_inputs = HashMap::new();
//! alice_inputs.insert(a.id(), Fp::new(4));
//! let alice = Participant::new(
//!     "alice".into(), spec.clone(), alice_inputs,
//!     Prg::new(Some(b"alice".to_vec())), Arc::clone(&bus), Arc::clone(&dealer),
//! );
//!
//! let mut bob_inputs = HashMap::new();
//! bob_inputs.insert(b.id(), Fp::new(2));
//! let bob = Participant::new(
//!     "bob".into(), spec, bob_inputs,
//!     Prg::new(Some(b"bob".to_vec())), bus, dealer,
//! );
//!
//! let alice_handle = thread::spawn(move || alice.run().unwrap());
//! let bob_handle = thread::spawn(move || bob.run().unwrap());
//!
//! assert_eq!(alice_handle.join().unwrap().value(), 6);
//! assert_eq!(bob_handle.join().unwrap().value(), 6);
//! ```
//!
//! ## Secure multiplication
//!
//! The same shape works for multiplication; the `Participant`s transparently
//! run the Beaver sub-protocol against the shared `Dealer` whenever an
//! operator's both operands are secret-shared.
//!
//! ```rust
//! use smcompiler::dealer::Dealer;
//! use smcompiler::bus::{LocalBus, MessageBus};
//! use smcompiler::expression::Expression;
//! use smcompiler::field::Fp;
//! use smcompiler::participant::Participant;
//! use smcompiler::prg::Prg;
//! use smcompiler::protocol::ProtocolSpec;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let a = Expression::<Fp>::secret();
//! let b = Expression::<Fp>::secret();
//! let product = Expression::mult(a.clone(), b.clone());
//!
//! let spec = ProtocolSpec::new(product, vec!["alice".into(), "bob".into()]);
//! let bus: Arc<dyn MessageBus> = LocalBus::new();
//! let dealer = Arc::new(Dealer::<Fp>::new(Prg::new(Some(vec![1, 2]))));
//!
//! let mut alice_inputs = HashMap::new();
//! alice_inputs.insert(a.id(), Fp::new(4));
//! let alice = Participant::new(
//!     "alice".into(), spec.clone(), alice_inputs,
//!     Prg::new(Some(b"alice".to_vec())), Arc::clone(&bus), Arc::clone(&dealer),
//! );
//!
//! let mut bob_inputs = HashMap::new();
//! bob_inputs.insert(b.id(), Fp::new(2));
//! let bob = Participant::new(
//!     "bob".into(), spec, bob_inputs,
//!     Prg::new(Some(b"bob".to_vec())), bus, dealer,
//! );
//!
//! let alice_handle = thread::spawn(move || alice.run().unwrap());
//! let bob_handle = thread::spawn(move || bob.run().unwrap());
//!
//! assert_eq!(alice_handle.join().unwrap().value(), 8);
//! assert_eq!(bob_handle.join().unwrap().value(), 8);
//! ```
//!
//! # Disclaimer
//!
//! This targets the honest-but-curious security model with a trusted
//! dealer: no party is assumed to deviate from the protocol, and the
//! dealer is assumed not to collude with any party. It is not hardened
//! against malicious participants, and the message bus contract (see
//! [`bus`]) intentionally says nothing about authentication or transport
//! security — that is left to whatever concrete bus a deployment plugs in.
//!
//! [smol-mpc]: https://github.com/hashcloak/smol-mpc

pub mod bus;
pub mod dealer;
pub mod error;
pub mod expression;
pub mod field;
pub mod participant;
pub mod prg;
pub mod protocol;
