use std::fmt::Write;

use crate::graph::Graph;

/// Mermaid-safe identifier. Reversible, so distinct node ids never share a
/// rendered id: `_` doubles and anything else outside `[A-Za-z0-9]`
/// becomes `_<hex code point>_`.
fn mermaid_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => out.push(c),
            '_' => out.push_str("__"),
            c => {
                let _ = write!(out, "_{:x}_", c as u32);
            }
        }
    }
    out
}

impl Graph {
    /// Render as a Mermaid flowchart. Conditional edges are dotted.
    pub fn draw_mermaid(&self) -> String {
        let mut out = String::from("graph TD;\n");

        for node in self.nodes.values() {
            let _ = writeln!(
                out,
                "\t{}[\"{}\"];",
                mermaid_id(&node.id),
                node.label().replace('"', "'")
            );
        }

        for edge in &self.edges {
            let source = mermaid_id(&edge.source);
            let target = mermaid_id(&edge.target);
            let label = edge.data.as_ref().and_then(|d| d.as_str());
            let _ = match (edge.conditional, label) {
                (false, None) => writeln!(out, "\t{source} --> {target};"),
                (true, None) => writeln!(out, "\t{source} -.-> {target};"),
                (false, Some(label)) => writeln!(out, "\t{source} -- {label} --> {target};"),
                (true, Some(label)) => writeln!(out, "\t{source} -. {label} .-> {target};"),
            };
        }
        out
    }
}
