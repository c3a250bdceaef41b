//! Single-comparator version constraints.
//!
//! A constraint is `<op><major>[.<minor>[.<patch>]]` with `op` one of
//! `>=`, `<=`, `>`, `<`, `=` (default `=`). Missing components are zero.
//! There is no range or caret syntax.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
  Ge,
  Le,
  Gt,
  Lt,
  Eq,
}

/// Whether `version` satisfies `constraint`. An absent constraint always does.
///
/// A version or constraint that cannot be parsed does not satisfy.
pub fn satisfies_version(version: &str, constraint: Option<&str>) -> bool {
  let Some(constraint) = constraint.map(str::trim).filter(|c| !c.is_empty() && *c != "*") else {
    return true;
  };

  let (op, wanted) = split_op(constraint);
  let (Some(actual), Some(wanted)) = (parse_triple(version), parse_triple(wanted)) else {
    return false;
  };

  let ordering = actual.cmp(&wanted);
  match op {
    Op::Ge => ordering != Ordering::Less,
    Op::Le => ordering != Ordering::Greater,
    Op::Gt => ordering == Ordering::Greater,
    Op::Lt => ordering == Ordering::Less,
    Op::Eq => ordering == Ordering::Equal,
  }
}

fn split_op(constraint: &str) -> (Op, &str) {
  const OPS: [(&str, Op); 6] = [
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("==", Op::Eq),
    (">", Op::Gt),
    ("<", Op::Lt),
    ("=", Op::Eq),
  ];

  for (prefix, op) in OPS {
    if let Some(rest) = constraint.strip_prefix(prefix) {
      return (op, rest.trim());
    }
  }
  (Op::Eq, constraint)
}

/// Parse `[v]major[.minor[.patch]][-pre][+build]` into a zero-padded triple.
fn parse_triple(version: &str) -> Option<(u64, u64, u64)> {
  let version = version.trim();
  let version = version.strip_prefix('v').unwrap_or(version);
  let core = version.split(['-', '+']).next().unwrap_or(version);
  if core.is_empty() {
    return None;
  }

  let mut parts = [0u64; 3];
  for (i, part) in core.split('.').enumerate() {
    if i >= 3 {
      break;
    }
    parts[i] = part.parse().ok()?;
  }
  Some((parts[0], parts[1], parts[2]))
}
