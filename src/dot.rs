//! Diagram to DOT (Graphviz) conversion.
//!
//! The generated graph follows these conventions:
//! - **Leaves** are boxes at the bottom (sink rank), labelled `value: type`
//! - **Variable nodes** are circles labelled with the variable name, one rank per variable
//! - **Edges**:
//!   - Solid lines represent high (then) edges
//!   - Dashed lines represent low (else) edges
//!   - A `dot` arrowhead marks a complemented edge
//! - **Roots** are rectangles at the top (source rank)
//!
//! Output is meant for inspection only.
//!
//! ```
//! use symdd::context::Context;
//! use symdd::options::DdOptions;
//!
//! let ctx = Context::new(DdOptions::default()).unwrap();
//! let x = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//! let y = ctx.variable(ctx.new_dd_variable().unwrap()).unwrap();
//! let f = ctx.and(x, y).unwrap();
//!
//! let dot = ctx.to_dot(&[f]).unwrap();
//! assert!(dot.starts_with("digraph {"));
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::backend::NodeId;
use crate::context::Context;
use crate::dd::Dd;
use crate::error::Result;

/// Visual settings of the DOT output.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for variable nodes (default: "circle")
    pub node_shape: &'static str,
    /// Shape for leaves (default: "box")
    pub leaf_shape: &'static str,
    /// Shape for root nodes (default: "rect")
    pub root_shape: &'static str,
    /// Style for high (then) edges (default: "solid")
    pub high_edge_style: &'static str,
    /// Style for low (else) edges (default: "dashed")
    pub low_edge_style: &'static str,
    /// Arrowhead of complemented edges (default: "dot")
    pub complement_arrowhead: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            leaf_shape: "box",
            root_shape: "rect",
            high_edge_style: "solid",
            low_edge_style: "dashed",
            complement_arrowhead: "dot",
        }
    }
}

impl Context {
    /// Render the diagrams rooted at `roots` in DOT format.
    pub fn to_dot(&self, roots: &[Dd]) -> Result<String> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    pub fn to_dot_with_config(&self, roots: &[Dd], config: &DotConfig) -> Result<String> {
        self.check_all(roots)?;

        // Collect the regular nodes reachable from the roots
        let mut nodes = BTreeSet::<(u8, NodeId)>::new();
        let mut stack: Vec<(u8, NodeId)> = roots
            .iter()
            .map(|dd| (dd.slot, self.backend(dd.slot).walker_regular(dd.id)))
            .collect();
        while let Some((slot, id)) = stack.pop() {
            if !nodes.insert((slot, id)) {
                continue;
            }
            let b = self.backend(slot);
            if !b.is_leaf(id) {
                stack.push((slot, b.walker_regular(b.walker_low(id))));
                stack.push((slot, b.walker_regular(b.walker_high(id))));
            }
        }

        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;

        // Leaves
        writeln!(dot, "{{ rank=sink")?;
        for &(slot, id) in nodes.iter().filter(|(s, i)| self.backend(*s).is_leaf(*i)) {
            let value = self.backend(slot).value(id)?;
            writeln!(
                dot,
                "n{}_{} [shape={}, label=\"{}: {}\"];",
                slot,
                id,
                config.leaf_shape,
                value,
                value.type_()
            )?;
        }
        writeln!(dot, "}}")?;

        // Variable nodes, grouped by variable for ranking
        let mut levels = BTreeMap::<u32, Vec<(u8, NodeId)>>::new();
        for &(slot, id) in nodes.iter() {
            let b = self.backend(slot);
            if !b.is_leaf(id) {
                levels.entry(b.variable(id)).or_default().push((slot, id));
            }
        }
        for (&var, level) in levels.iter() {
            writeln!(dot, "{{ rank=same")?;
            for &(slot, id) in level {
                writeln!(
                    dot,
                    "n{}_{} [shape={}, label=\"{}\"];",
                    slot,
                    id,
                    config.node_shape,
                    self.variable_name(var)
                )?;
            }
            writeln!(dot, "}}")?;
        }

        // Edges
        for &(slot, id) in nodes.iter() {
            let b = self.backend(slot);
            if b.is_leaf(id) {
                continue;
            }
            for (child, style) in [
                (b.walker_high(id), config.high_edge_style),
                (b.walker_low(id), config.low_edge_style),
            ] {
                write!(
                    dot,
                    "n{}_{} -> n{}_{} [style={}",
                    slot,
                    id,
                    slot,
                    b.walker_regular(child),
                    style
                )?;
                if b.is_complement(child) {
                    write!(dot, ", arrowhead={}", config.complement_arrowhead)?;
                }
                writeln!(dot, "];")?;
            }
        }

        // Roots
        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;
        for (i, root) in roots.iter().enumerate() {
            let b = self.backend(root.slot);
            write!(dot, "r{} -> n{}_{}", i, root.slot, b.walker_regular(root.id))?;
            if b.is_complement(root.id) {
                write!(dot, " [arrowhead={}]", config.complement_arrowhead)?;
            }
            writeln!(dot, ";")?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::operator::Operator;
    use crate::options::DdOptions;

    fn context() -> Result<Context> {
        Context::new(DdOptions::default().with_leak_check(true).with_storage_bits(10))
    }

    #[test]
    fn test_to_dot_basic() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let y = ctx.variable(ctx.new_dd_variable()?)?;
        ctx.set_variable_name(1, "ready");
        let f = ctx.apply(Operator::And, &[x, y])?;

        let dot = ctx.to_dot(&[f])?;
        assert!(dot.starts_with("digraph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("label=\"x0\""));
        assert!(dot.contains("label=\"ready\""));
        assert!(dot.contains("label=\"true: bool\""));
        assert!(dot.contains("style=dashed, arrowhead=dot"));

        ctx.release(f)?;
        ctx.close()
    }

    #[test]
    fn test_to_dot_mixed_backends() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let f = ctx.to_mt(x, 3, 4)?;
        let not_x = ctx.apply(Operator::Not, &[x])?;

        let dot = ctx.to_dot(&[f, not_x])?;
        assert!(dot.contains("label=\"3: int\""));
        assert!(dot.contains("r1 -> n0_"));
        assert!(dot.contains("[arrowhead=dot]"));

        ctx.release_all(&[f, not_x])?;
        ctx.close()
    }

    #[test]
    fn test_to_dot_with_config() -> Result<()> {
        let ctx = context()?;
        let x = ctx.variable(ctx.new_dd_variable()?)?;
        let config = DotConfig {
            leaf_shape: "square",
            ..DotConfig::default()
        };
        let dot = ctx.to_dot_with_config(&[x], &config)?;
        assert!(dot.contains("shape=square"));
        ctx.close()
    }
}
