//! Human-readable listing of a function's blocks, for diagnostics and
//! test output.

use std::fmt::Write;

use crate::{Func, Section};

pub fn show_func(func: &Func) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn {} {{", func);
    for (bid, block) in func.blocks.iter_enumerated() {
        let mut header = format!("  {bid}");
        if block.section == Section::Fault {
            header.push_str(" (fault)");
        }
        if let Some(n) = block.exn_node {
            let _ = write!(header, " [{n}]");
        }
        let _ = writeln!(out, "{header}:");
        for instr in &block.instrs {
            let _ = writeln!(out, "    {:?}", instr.bc);
        }
        if let Some(ft) = block.fallthrough {
            let ns = if block.fallthrough_ns { " (ns)" } else { "" };
            let _ = writeln!(out, "    => {ft}{ns}");
        }
    }
    out.push_str("}");
    out
}
