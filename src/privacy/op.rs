use std::{fmt, ops::BitOr};

/// Mutation operation kinds, combinable as a set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Op(u8);

impl Op {
    pub const CREATE: Op = Op(1);
    pub const UPDATE: Op = Op(1 << 1);
    pub const UPDATE_ONE: Op = Op(1 << 2);
    pub const DELETE: Op = Op(1 << 3);
    pub const DELETE_ONE: Op = Op(1 << 4);

    const NAMES: [(Op, &'static str); 5] = [
        (Op::CREATE, "OpCreate"),
        (Op::UPDATE, "OpUpdate"),
        (Op::UPDATE_ONE, "OpUpdateOne"),
        (Op::DELETE, "OpDelete"),
        (Op::DELETE_ONE, "OpDeleteOne"),
    ];

    /// Whether this operation shares a kind with `other`.
    pub fn is(self, other: Op) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Op {
    type Output = Op;

    fn bitor(self, rhs: Op) -> Op {
        Op(self.0 | rhs.0)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Op::NAMES
            .iter()
            .filter(|(op, _)| self.is(*op))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            return write!(f, "Op({})", self.0);
        }
        f.write_str(&names.join("|"))
    }
}
