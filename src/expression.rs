//! Immutable arithmetic expression trees: the language participants agree
//! on and jointly evaluate.
//!
//! Node identity is assigned at construction (a random 32-bit token, as the
//! Python reference does with `gen_id` in `expression.py`) and is stable
//! for the lifetime of the node; equality and hashing are by identity, not
//! by structural value, so two independently constructed `Scalar(3)` nodes
//! are distinct (spec §4.2). Dispatch is closed over a fixed set of five
//! node kinds rather than open to extension, per spec §9's "re-architect as
//! a tagged variant" design note — there is no dynamic dispatch here.

use crate::field::PrimeField;
use std::hash::{Hash, Hasher};
use std::ops;
use std::sync::Arc;

/// Stable 32-bit identity of an expression node. The single namespace used
/// both to route secret shares (spec §4.2 I4) and to key Beaver triplets
/// (I3).
pub type NodeId = u32;

fn gen_id() -> NodeId {
    rand::random()
}

/// Classifies which operands of a binary operator are public scalars, used
/// to pick the right evaluation branch (spec §4.2, §4.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOperand {
    /// Neither operand is a `Scalar`.
    None,
    /// Only the left operand is a `Scalar`.
    Left,
    /// Only the right operand is a `Scalar`.
    Right,
    /// Both operands are `Scalar`s.
    Both,
}

enum Kind<T: PrimeField> {
    Scalar(T),
    Secret,
    Add(Expression<T>, Expression<T>),
    Sub(Expression<T>, Expression<T>),
    Mult(Expression<T>, Expression<T>),
}

struct Node<T: PrimeField> {
    id: NodeId,
    kind: Kind<T>,
}

/// A node in an immutable, acyclic expression DAG over a prime field `T`
/// (spec §3).
///
/// Cheap to clone (an `Arc` bump) so the same sub-expression can be reused
/// by identity within a larger tree, and so the whole tree can be shared
/// bit-identically (I2) across every participant — including across the
/// thread boundary each participant's session runs on (spec §5).
pub struct Expression<T: PrimeField>(Arc<Node<T>>);

impl<T: PrimeField> Clone for Expression<T> {
    fn clone(&self) -> Self {
        Expression(Arc::clone(&self.0))
    }
}

impl<T: PrimeField> PartialEq for Expression<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl<T: PrimeField> Eq for Expression<T> {}

impl<T: PrimeField> Hash for Expression<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl<T: PrimeField> Expression<T> {
    /// Builds a public scalar term.
    pub fn scalar(value: T) -> Self {
        Expression(Arc::new(Node {
            id: gen_id(),
            kind: Kind::Scalar(value),
        }))
    }

    /// Builds an unbound secret term. The cleartext value is never carried
    /// on the node itself — only the owning participant's local input map
    /// knows it (spec §4.2, §4.4.2); this is also how the reference
    /// `value_dict: Dict[Secret, int]` pattern in
    /// `original_source/smcompiler/test_custom_application.py` associates
    /// values with `Secret()` nodes out of band.
    pub fn secret() -> Self {
        Expression(Arc::new(Node {
            id: gen_id(),
            kind: Kind::Secret,
        }))
    }

    /// Builds an addition of two sub-expressions.
    pub fn add(a: Expression<T>, b: Expression<T>) -> Self {
        Expression(Arc::new(Node {
            id: gen_id(),
            kind: Kind::Add(a, b),
        }))
    }

    /// Builds a subtraction of two sub-expressions.
    pub fn sub(a: Expression<T>, b: Expression<T>) -> Self {
        Expression(Arc::new(Node {
            id: gen_id(),
            kind: Kind::Sub(a, b),
        }))
    }

    /// Builds a multiplication of two sub-expressions.
    pub fn mult(a: Expression<T>, b: Expression<T>) -> Self {
        Expression(Arc::new(Node {
            id: gen_id(),
            kind: Kind::Mult(a, b),
        }))
    }

    /// This node's stable identity.
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// `true` for `Secret` nodes.
    pub fn is_secret(&self) -> bool {
        matches!(self.0.kind, Kind::Secret)
    }

    /// The carried value, for `Scalar` nodes.
    pub fn as_scalar(&self) -> Option<T> {
        match &self.0.kind {
            Kind::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The two sub-expressions, for `Add`/`Sub`/`Mult` nodes.
    pub fn operands(&self) -> Option<(Expression<T>, Expression<T>)> {
        match &self.0.kind {
            Kind::Add(a, b) | Kind::Sub(a, b) | Kind::Mult(a, b) => Some((a.clone(), b.clone())),
            _ => None,
        }
    }

    /// Classifies this node's operands per [`ScalarOperand`]. Returns
    /// `None` for leaf nodes (`Scalar`/`Secret`), which have no operands.
    pub fn scalar_operand(&self) -> Option<ScalarOperand> {
        let (a, b) = self.operands()?;
        Some(match (a.as_scalar().is_some(), b.as_scalar().is_some()) {
            (false, false) => ScalarOperand::None,
            (true, false) => ScalarOperand::Left,
            (false, true) => ScalarOperand::Right,
            (true, true) => ScalarOperand::Both,
        })
    }

    /// `true` for `Add`/`Sub`/`Mult` nodes.
    pub fn is_op(&self) -> bool {
        self.operands().is_some()
    }

    /// `true` for `Mult` nodes specifically — these are the ones that key
    /// Beaver triplets (I3).
    pub fn is_mult(&self) -> bool {
        matches!(self.0.kind, Kind::Mult(_, _))
    }

    /// `true` for `Add` nodes.
    pub fn is_add(&self) -> bool {
        matches!(self.0.kind, Kind::Add(_, _))
    }

    /// `true` for `Sub` nodes.
    pub fn is_sub(&self) -> bool {
        matches!(self.0.kind, Kind::Sub(_, _))
    }

    pub(crate) fn kind_label(&self) -> &'static str {
        match self.0.kind {
            Kind::Scalar(_) => "Scalar",
            Kind::Secret => "Secret",
            Kind::Add(..) => "AddOp",
            Kind::Sub(..) => "SubOp",
            Kind::Mult(..) => "MultOp",
        }
    }
}

impl<T: PrimeField> ops::Add for Expression<T> {
    type Output = Expression<T>;
    fn add(self, rhs: Expression<T>) -> Expression<T> {
        Expression::add(self, rhs)
    }
}

impl<T: PrimeField> ops::Sub for Expression<T> {
    type Output = Expression<T>;
    fn sub(self, rhs: Expression<T>) -> Expression<T> {
        Expression::sub(self, rhs)
    }
}

impl<T: PrimeField> ops::Mul for Expression<T> {
    type Output = Expression<T>;
    fn mul(self, rhs: Expression<T>) -> Expression<T> {
        Expression::mult(self, rhs)
    }
}

impl<T: PrimeField> std::fmt::Debug for Expression<T> {
    /// A debugging aid only — not part of the wire protocol (spec §4.2).
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0.kind {
            Kind::Scalar(v) => write!(f, "Scalar({:?})", v),
            Kind::Secret => write!(f, "Secret(#{:08x})", self.0.id),
            Kind::Add(a, b) => write!(f, "({:?} + {:?})", a, b),
            Kind::Sub(a, b) => write!(f, "({:?} - {:?})", a, b),
            Kind::Mult(a, b) => write!(f, "{:?} * {:?}", a, b),
        }
    }
}
