//! Bytecode emission core.
//!
//! Consumes an optimized IR [`Unit`](vox_ir_data::Unit) and an analysis
//! [`Index`](vox_analysis::Index), and produces a filled
//! [`UnitEmitter`](vox_unit::UnitEmitter): a stream of opcodes with patched
//! branch offsets, an exception-handler table, an FPI table, and per-function
//! and per-class metadata.
//!
//! The pipeline per function: lay blocks out ([`order`]), serialize each
//! instruction while tracking stack and FPI depth and recording forward-jump
//! fixups ([`bc`]), then flatten the exception tree over the finished layout
//! ([`eh`]). The unit driver ([`driver`]) runs that pipeline for the
//! pseudomain, every class method, every top-level function, and finally the
//! type aliases.
//!
//! Emission performs no optimization and no IR validation; malformed input
//! aborts with diagnostic context.

mod bc;
mod driver;
mod eh;
mod order;


pub use driver::emit_unit;
