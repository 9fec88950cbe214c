//! Measure-arithmetic helpers: parallel recursion over two identically shaped
//! structures that terminates at year-series leaves.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{PrepError, PrepResult};
use crate::series::{Value, YearSeries};

/// Structures that can be combined leaf by leaf with another of the same shape.
pub trait Combine: Sized {
    /// Combines matching leaves of `self` and `other` with `f`.
    ///
    /// # Errors
    ///
    /// Returns `StructureMismatch` if the two structures differ in shape.
    fn zip_values(
        &self,
        other: &Self,
        f: &dyn Fn(&Value, &Value) -> PrepResult<Value>,
    ) -> PrepResult<Self>;

    /// Applies `f` to every leaf value.
    fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> Self;

    /// Leaf-wise sum.
    fn add_keyvals(&self, other: &Self) -> PrepResult<Self> {
        self.zip_values(other, &|a, b| a.add(b))
    }

    /// Leaf-wise difference.
    fn sub_keyvals(&self, other: &Self) -> PrepResult<Self> {
        self.zip_values(other, &|a, b| a.sub(b))
    }

    fn scale_keyvals(&self, factor: f64) -> Self {
        self.map_values(&|v| v.scale(factor))
    }
}

impl Combine for YearSeries {
    fn zip_values(
        &self,
        other: &Self,
        f: &dyn Fn(&Value, &Value) -> PrepResult<Value>,
    ) -> PrepResult<Self> {
        self.zip_with(other, f)
    }

    fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> Self {
        self.map(f)
    }
}

/// Adds two identically shaped structures leaf by leaf.
///
/// # Errors
///
/// Returns `StructureMismatch` if the key sets differ anywhere in the tree.
pub fn add_keyvals<T: Combine>(a: &T, b: &T) -> PrepResult<T> {
    a.add_keyvals(b)
}

/// Dynamically shaped tree whose leaves are year series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Branch(BTreeMap<String, Node>),
    Leaf(YearSeries),
}

impl Default for Node {
    fn default() -> Self {
        Node::Branch(BTreeMap::new())
    }
}

impl Node {
    /// Adds `series` at `path`, creating intermediate branches as needed.
    ///
    /// # Errors
    ///
    /// Returns `StructureMismatch` if the path runs through a leaf or ends on
    /// a branch, or if the series years differ from the existing leaf.
    pub fn accumulate(&mut self, path: &[&str], series: &YearSeries) -> PrepResult<()> {
        let Some((head, rest)) = path.split_first() else {
            return match self {
                Node::Leaf(existing) => {
                    *existing = existing.add_keyvals(series)?;
                    Ok(())
                }
                Node::Branch(children) if children.is_empty() => {
                    *self = Node::Leaf(series.clone());
                    Ok(())
                }
                Node::Branch(_) => Err(PrepError::StructureMismatch(
                    "path ends on a branch".to_string(),
                )),
            };
        };
        match self {
            Node::Branch(children) => children
                .entry((*head).to_string())
                .or_default()
                .accumulate(rest, series),
            Node::Leaf(_) => Err(PrepError::StructureMismatch(format!(
                "path runs through a leaf at \"{head}\""
            ))),
        }
    }

    pub fn get(&self, path: &[&str]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => match self {
                Node::Branch(children) => children.get(*head)?.get(rest),
                Node::Leaf(_) => None,
            },
        }
    }

    pub fn leaf(&self) -> Option<&YearSeries> {
        match self {
            Node::Leaf(s) => Some(s),
            Node::Branch(_) => None,
        }
    }

    /// Every leaf with its path, in key order.
    pub fn leaves(&self) -> Vec<(Vec<String>, &YearSeries)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a YearSeries)>) {
        match self {
            Node::Leaf(s) => out.push((prefix.clone(), s)),
            Node::Branch(children) => {
                for (k, child) in children {
                    prefix.push(k.clone());
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
        }
    }
}

impl Combine for Node {
    fn zip_values(
        &self,
        other: &Self,
        f: &dyn Fn(&Value, &Value) -> PrepResult<Value>,
    ) -> PrepResult<Self> {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => a.zip_values(b, f).map(Node::Leaf),
            (Node::Branch(a), Node::Branch(b)) => {
                if !a.keys().eq(b.keys()) {
                    return Err(PrepError::StructureMismatch(format!(
                        "branch keys {:?} vs {:?}",
                        a.keys().collect::<Vec<_>>(),
                        b.keys().collect::<Vec<_>>()
                    )));
                }
                a.iter()
                    .zip(b.values())
                    .map(|((k, x), y)| Ok((k.clone(), x.zip_values(y, f)?)))
                    .collect::<PrepResult<BTreeMap<_, _>>>()
                    .map(Node::Branch)
            }
            _ => Err(PrepError::StructureMismatch(
                "leaf paired with branch".to_string(),
            )),
        }
    }

    fn map_values(&self, f: &dyn Fn(&Value) -> Value) -> Self {
        match self {
            Node::Leaf(s) => Node::Leaf(s.map_values(f)),
            Node::Branch(children) => Node::Branch(
                children
                    .iter()
                    .map(|(k, c)| (k.clone(), c.map_values(f)))
                    .collect(),
            ),
        }
    }
}

/// Divides every leaf of `num` by `den` year by year; zero denominators give zero.
///
/// # Errors
///
/// Returns `StructureMismatch` if a leaf's years differ from `den`'s.
pub fn div_keyvals(num: &Node, den: &YearSeries) -> PrepResult<Node> {
    match num {
        Node::Leaf(s) => s.zip_with(den, |a, b| a.div_or_zero(b)).map(Node::Leaf),
        Node::Branch(children) => children
            .iter()
            .map(|(k, c)| Ok((k.clone(), div_keyvals(c, den)?)))
            .collect::<PrepResult<BTreeMap<_, _>>>()
            .map(Node::Branch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEARS: [u32; 2] = [2009, 2010];

    fn tree(a: f64, b: f64) -> Node {
        let mut n = Node::default();
        n.accumulate(&["AIA_CZ1", "heating"], &YearSeries::constant(&YEARS, a)).unwrap();
        n.accumulate(&["AIA_CZ1", "cooling"], &YearSeries::constant(&YEARS, b)).unwrap();
        n
    }

    #[test]
    fn add_keyvals_sums_leaves() {
        let sum = add_keyvals(&tree(1.0, 2.0), &tree(3.0, 4.0));
        assert_eq!(sum.unwrap(), tree(4.0, 6.0));
    }

    #[test]
    fn add_keyvals_rejects_mismatched_keys() {
        let mut other = tree(1.0, 2.0);
        other
            .accumulate(&["AIA_CZ2", "heating"], &YearSeries::constant(&YEARS, 1.0)).unwrap();
        let r = add_keyvals(&tree(1.0, 2.0), &other);
        assert!(matches!(r, Err(PrepError::StructureMismatch(_))));
    }

    #[test]
    fn accumulate_adds_into_existing_leaf() {
        let mut n = tree(1.0, 2.0);
        n.accumulate(&["AIA_CZ1", "heating"], &YearSeries::constant(&YEARS, 5.0)).unwrap();
        let leaf = n.get(&["AIA_CZ1", "heating"]).and_then(Node::leaf);
        assert_eq!(leaf, Some(&YearSeries::constant(&YEARS, 6.0)));
    }

    #[test]
    fn accumulate_through_leaf_errors() {
        let mut n = tree(1.0, 2.0);
        let r = n.accumulate(
            &["AIA_CZ1", "heating", "deeper"],
            &YearSeries::constant(&YEARS, 1.0),
        );
        assert!(r.is_err());
    }

    #[test]
    fn div_keyvals_normalizes() {
        let norm = YearSeries::constant(&YEARS, 4.0);
        let fracs = div_keyvals(&tree(1.0, 3.0), &norm);
        assert_eq!(fracs.unwrap(), tree(0.25, 0.75));
    }

    #[test]
    fn leaves_are_listed_in_key_order() {
        let t = tree(1.0, 2.0);
        let paths: Vec<Vec<String>> = t.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(
            paths,
            vec![
                vec!["AIA_CZ1".to_string(), "cooling".to_string()],
                vec!["AIA_CZ1".to_string(), "heating".to_string()],
            ]
        );
    }
}
