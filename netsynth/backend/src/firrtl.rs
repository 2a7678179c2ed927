//! FIRRTL backend for the netsynth toolkit.
//!
//! Transforms a [`Design`](netsynth_ir::Design) into a formatted string that
//! represents a valid FIRRTL circuit. Each module wire is declared as a
//! plain `UInt`; signedness is applied at use sites with `asSInt`/`asUInt`,
//! and the width-changing FIRRTL shift semantics are reconciled by
//! truncating widened results back to the declared width.
use std::collections::{HashMap, HashSet};
use std::io;

use itertools::Itertools;
use netsynth_ir::{Bit, Cell, Const, Design, Module, PortRole, SigBit, SigChunk, SigSpec};
use netsynth_utils::{Error, Id, OutputFile, SynthResult};

use crate::traits::Backend;

/// FIRRTL rejects dynamic left shifts whose amount is this many bits or
/// wider; wider amounts are clamped to the largest 19-bit value.
const FIRRTL_MAX_DSH_WIDTH_ERROR: u64 = 20;

/// Implements the FIRRTL backend. The backend expects a fully elaborated
/// netlist whose priority muxes have been rewritten into binary mux trees.
#[derive(Default)]
pub struct FirrtlBackend;

impl Backend for FirrtlBackend {
    fn name(&self) -> &'static str {
        "firrtl"
    }

    fn validate(design: &Design) -> SynthResult<()> {
        for module in design.modules() {
            for wire in module.wires() {
                if wire.width == 0 {
                    return Err(Error::malformed_structure(format!(
                        "wire {} in module {} has width 0",
                        wire.name, module.name
                    )));
                }
                if wire.port == PortRole::Inout {
                    return Err(Error::unsupported(format!(
                        "port {} on module {} is marked as both input and output",
                        wire.name, module.name
                    )));
                }
            }
            for cell in module.cells() {
                validate_cell(module, cell)?;
            }
            for conn in &module.connections {
                validate_sig(module, &conn.lhs)?;
                validate_sig(module, &conn.rhs)?;
            }
        }
        Ok(())
    }

    fn emit(design: &Design, file: &mut OutputFile) -> SynthResult<()> {
        let f = &mut file.get_write();
        emit_design(design, f)
    }
}

/// Every signal chunk must slice an existing wire within bounds.
fn validate_sig(module: &Module, sig: &SigSpec) -> SynthResult<()> {
    for chunk in sig.chunks() {
        if let SigChunk::Slice { wire, offset, width } = chunk {
            let decl = module
                .wire(*wire)
                .ok_or_else(|| Error::undefined(*wire, "wire"))?;
            if offset + width > decl.width {
                return Err(Error::malformed_structure(format!(
                    "slice [{}, {}) out of range for wire {} of width {}",
                    offset,
                    offset + width,
                    wire,
                    decl.width
                )));
            }
        }
    }
    Ok(())
}

/// Connected signals must match the widths the cell parameters claim.
fn validate_cell(module: &Module, cell: &Cell) -> SynthResult<()> {
    for sig in cell.connections.values() {
        validate_sig(module, sig)?;
    }
    for (param, port) in [("A_WIDTH", "A"), ("B_WIDTH", "B"), ("Y_WIDTH", "Y")] {
        if let (Some(width), Some(sig)) =
            (cell.param(param).and_then(Const::as_u64), cell.port(port))
        {
            if sig.width() != width {
                return Err(Error::malformed_structure(format!(
                    "cell {} connects {} bits to port {} but declares {}={}",
                    cell.name,
                    sig.width(),
                    port,
                    param,
                    width
                )));
            }
        }
    }
    Ok(())
}

/// Emit the whole design to `f`. The identifier table lives exactly as long
/// as one call, so repeated runs are deterministic and independent.
pub(crate) fn emit_design<F: io::Write>(design: &Design, f: &mut F) -> SynthResult<()> {
    let top = design
        .top_module()
        .ok_or_else(|| Error::misc("no modules in design"))?;

    let mut names = NameTable::default();
    // Pre-seed module and port names so identifiers referenced across
    // modules stabilize before any cell-local name can shadow them.
    for module in design.modules() {
        names.sanitize(module.name);
        for wire in module.wires() {
            if wire.port.is_port() {
                names.sanitize(wire.name);
            }
        }
    }

    writeln!(f, "circuit {}:", names.sanitize(top.name))?;
    for module in design.modules() {
        ModuleEmitter::new(design, module, &mut names).emit(f)?;
    }
    Ok(())
}

/// Allocator for FIRRTL-legal identifiers. Source names are sanitized once
/// and cached for the remainder of the run; anonymous results draw from a
/// monotonic `_N` counter. Both share one used-name set so collisions
/// resolve the same way on every run.
#[derive(Default)]
struct NameTable {
    cache: HashMap<Id, String>,
    used: HashSet<String>,
    counter: u64,
}

impl NameTable {
    fn sanitize(&mut self, id: Id) -> String {
        if let Some(name) = self.cache.get(&id) {
            return name.clone();
        }
        let spelling = id.as_ref();
        let spelling = spelling.strip_prefix('\\').unwrap_or(spelling);
        let mut candidate = String::with_capacity(spelling.len());
        for (i, c) in spelling.chars().enumerate() {
            if (c.is_ascii_alphanumeric() && !(i == 0 && c.is_ascii_digit())) || c == '_' {
                candidate.push(c);
            } else {
                candidate.push('_');
            }
        }
        if candidate.is_empty() {
            candidate.push('_');
        }
        while self.used.contains(&candidate) {
            candidate.push('_');
        }
        self.used.insert(candidate.clone());
        self.cache.insert(id, candidate.clone());
        candidate
    }

    fn fresh(&mut self) -> String {
        loop {
            let name = format!("_{}", self.counter);
            self.counter += 1;
            if self.used.insert(name.clone()) {
                return name;
            }
        }
    }
}

/// Per-module emission state: the four declaration/assignment buffers and
/// the reverse wire map that stitches cell outputs back onto module wires.
struct ModuleEmitter<'a> {
    design: &'a Design,
    module: &'a Module,
    names: &'a mut NameTable,
    /// (wire, bit) -> (emitted id, bit within that id).
    reverse_map: HashMap<(Id, u64), (String, u64)>,
    port_decls: Vec<String>,
    wire_decls: Vec<String>,
    cell_exprs: Vec<String>,
    wire_exprs: Vec<String>,
    invalid_id: Option<String>,
}

impl<'a> ModuleEmitter<'a> {
    fn new(design: &'a Design, module: &'a Module, names: &'a mut NameTable) -> Self {
        ModuleEmitter {
            design,
            module,
            names,
            reverse_map: HashMap::new(),
            port_decls: Vec::new(),
            wire_decls: Vec::new(),
            cell_exprs: Vec::new(),
            wire_exprs: Vec::new(),
            invalid_id: None,
        }
    }

    fn emit<F: io::Write>(mut self, f: &mut F) -> SynthResult<()> {
        let module = self.module;
        let module_id = self.names.sanitize(module.name);

        for wire in module.wires() {
            if wire.attributes.has("init") {
                log::warn!(
                    "initial value on wire {}.{} is not supported; ignoring",
                    module.name,
                    wire.name
                );
            }
            let name = self.names.sanitize(wire.name);
            match wire.port {
                PortRole::Inout => {
                    return Err(Error::unsupported(format!(
                        "port {} on module {} is marked as both input and output",
                        wire.name, module.name
                    )));
                }
                PortRole::Input => self
                    .port_decls
                    .push(format!("input {}: UInt<{}>", name, wire.width)),
                PortRole::Output => self
                    .port_decls
                    .push(format!("output {}: UInt<{}>", name, wire.width)),
                PortRole::None => self
                    .wire_decls
                    .push(format!("wire {}: UInt<{}>", name, wire.width)),
            }
        }

        for cell in module.cells() {
            self.process_cell(cell)?;
        }

        // Module-level connections drive their left-hand side through a
        // fresh intermediate wire, like any other cell result.
        for conn in &module.connections {
            let y_id = self.names.fresh();
            self.wire_decls
                .push(format!("wire {}: UInt<{}>", y_id, conn.lhs.width()));
            let expr = self.make_expr(&conn.rhs);
            self.cell_exprs.push(format!("{} <= {}", y_id, expr));
            self.register_reverse_map(&y_id, &conn.lhs);
        }

        self.reconstruct_wire_drivers();

        writeln!(f, "  module {}:", module_id)?;
        for line in &self.port_decls {
            writeln!(f, "    {}", line)?;
        }
        writeln!(f)?;
        for line in &self.wire_decls {
            writeln!(f, "    {}", line)?;
        }
        writeln!(f)?;
        for line in &self.cell_exprs {
            writeln!(f, "    {}", line)?;
        }
        writeln!(f)?;
        for line in &self.wire_exprs {
            writeln!(f, "    {}", line)?;
        }
        writeln!(f)?;
        Ok(())
    }

    /// Render a signal as a FIRRTL expression of the same width, unsigned.
    /// Chunks are LSB first, so each newly rendered (higher-order) chunk
    /// lands on the left of the accumulated `cat`.
    fn make_expr(&mut self, sig: &SigSpec) -> String {
        let mut expr = String::new();
        for chunk in sig.chunks() {
            let new_expr = match chunk {
                SigChunk::Const(value) => {
                    format!("UInt<{}>(\"h{}\")", value.width(), value.as_hex())
                }
                SigChunk::Slice { wire, offset, width } => {
                    let name = self.names.sanitize(*wire);
                    let full = self.module.wire(*wire).map_or(0, |w| w.width);
                    if *offset == 0 && *width == full {
                        name
                    } else {
                        format!("bits({}, {}, {})", name, offset + width - 1, offset)
                    }
                }
            };
            expr = if expr.is_empty() {
                new_expr
            } else {
                format!("cat({}, {})", new_expr, expr)
            };
        }
        expr
    }

    /// Record `id` as the driver of every wire bit in `sig`.
    fn register_reverse_map(&mut self, id: &str, sig: &SigSpec) {
        for (i, bit) in sig.bits().enumerate() {
            if let SigBit::Wire(wire, offset) = bit {
                self.reverse_map
                    .insert((wire, offset), (id.to_string(), i as u64));
            }
        }
    }

    fn process_cell(&mut self, cell: &Cell) -> SynthResult<()> {
        if !cell.is_builtin() {
            return self.process_instance(cell);
        }
        match cell.ty.as_ref() {
            "$not" | "$neg" | "$logic_not" | "$reduce_and" | "$reduce_or" | "$reduce_xor"
            | "$reduce_xnor" | "$reduce_bool" => self.process_unary(cell),
            "$add" | "$sub" | "$mul" | "$div" | "$mod" | "$and" | "$or" | "$xor" | "$eq"
            | "$eqx" | "$ne" | "$nex" | "$gt" | "$ge" | "$lt" | "$le" | "$shl" | "$sshl"
            | "$shr" | "$sshr" | "$logic_and" | "$logic_or" => self.process_binary(cell),
            "$mux" => self.process_mux(cell),
            "$dff" => self.process_dff(cell),
            "$mem" => self.process_mem(cell),
            "$shift" | "$shiftx" => self.process_window_shift(cell),
            // Legacy per-port memory cells; the merged $mem form supersedes
            // them upstream.
            "$memrd" | "$memwr" => Ok(()),
            _ => {
                log::warn!(
                    "cell {} has unsupported type {}; skipping",
                    cell.name,
                    cell.ty
                );
                Ok(())
            }
        }
    }

    fn process_unary(&mut self, cell: &Cell) -> SynthResult<()> {
        let ty = cell.ty.as_ref();
        let y_width = param_u64(cell, "Y_WIDTH")?;
        let a_width = param_u64(cell, "A_WIDTH")?;
        let a_signed = param_bool(cell, "A_SIGNED")?;

        let y_id = self.names.sanitize(cell.name);
        self.wire_decls
            .push(format!("wire {}: UInt<{}>", y_id, y_width));

        let mut a_expr = self.make_expr(cell_port(cell, "A")?);
        if a_signed {
            a_expr = format!("asSInt({})", a_expr);
        }
        // Single-bit boolean producers must not be padded to their result
        // width.
        if !(matches!(ty, "$logic_not" | "$reduce_bool") && y_width == 1) {
            a_expr = format!("pad({}, {})", a_expr, y_width);
        }

        let mut always_uint = false;
        let expr = match ty {
            "$not" => format!("not({})", a_expr),
            "$neg" => format!("neg({})", a_expr),
            "$logic_not" => {
                always_uint = true;
                format!("eq({}, UInt(0))", a_expr)
            }
            "$reduce_and" => {
                always_uint = true;
                format!("andr({})", a_expr)
            }
            "$reduce_or" => {
                always_uint = true;
                format!("orr({})", a_expr)
            }
            "$reduce_xor" => {
                always_uint = true;
                format!("xorr({})", a_expr)
            }
            "$reduce_xnor" => {
                always_uint = true;
                format!("not(xorr({}))", a_expr)
            }
            "$reduce_bool" => {
                always_uint = true;
                let zero = if a_signed {
                    format!("SInt<{}>(0)", a_width)
                } else {
                    format!("UInt<{}>(0)", a_width)
                };
                format!("neq({}, {})", a_expr, zero)
            }
            _ => unreachable!("unary dispatch covers {}", ty),
        };
        // "neg" produces an SInt regardless of the input signedness.
        let expr = if (a_signed && !always_uint) || ty == "$neg" {
            format!("asUInt({})", expr)
        } else {
            expr
        };

        self.cell_exprs.push(format!("{} <= {}", y_id, expr));
        self.register_reverse_map(&y_id, cell_port(cell, "Y")?);
        Ok(())
    }

    fn process_binary(&mut self, cell: &Cell) -> SynthResult<()> {
        let ty = cell.ty.as_ref();
        let y_width = param_u64(cell, "Y_WIDTH")?;
        let a_width = param_u64(cell, "A_WIDTH")?;
        let b_width = param_u64(cell, "B_WIDTH")?;
        let a_signed = param_bool(cell, "A_SIGNED")?;
        let b_signed = param_bool(cell, "B_SIGNED")?;
        let is_shift = matches!(ty, "$shl" | "$sshl" | "$shr" | "$sshr");

        let y_id = self.names.sanitize(cell.name);
        self.wire_decls
            .push(format!("wire {}: UInt<{}>", y_id, y_width));

        let b_sig = cell_port(cell, "B")?;
        let mut a_expr = self.make_expr(cell_port(cell, "A")?);
        let mut b_expr = self.make_expr(b_sig);

        if a_signed {
            a_expr = format!("asSInt({})", a_expr);
            // Logical right shift reads its input as a plain bit vector.
            if ty == "$shr" {
                a_expr = format!("asUInt({})", a_expr);
            }
        }
        if b_signed && !is_shift {
            b_expr = format!("asSInt({})", b_expr);
        }
        if a_width < y_width {
            a_expr = format!("pad({}, {})", a_expr, y_width);
        }
        let mut b_padded_width = b_width;
        if b_width < y_width && !is_shift {
            b_expr = format!("pad({}, {})", b_expr, y_width);
            b_padded_width = y_width;
        }

        let mut always_uint = false;
        let mut extract_y_bits = false;
        let primop = match ty {
            "$add" => "add",
            "$sub" => "sub",
            "$mul" => "mul",
            "$div" => "div",
            "$mod" => "rem",
            "$and" => {
                always_uint = true;
                "and"
            }
            "$or" => {
                always_uint = true;
                "or"
            }
            "$xor" => {
                always_uint = true;
                "xor"
            }
            "$eq" | "$eqx" => {
                always_uint = true;
                "eq"
            }
            "$ne" | "$nex" => {
                always_uint = true;
                "neq"
            }
            "$gt" => {
                always_uint = true;
                "gt"
            }
            "$ge" => {
                always_uint = true;
                "geq"
            }
            "$lt" => {
                always_uint = true;
                "lt"
            }
            "$le" => {
                always_uint = true;
                "leq"
            }
            "$logic_and" | "$logic_or" => {
                always_uint = true;
                a_expr = format!("neq({}, UInt(0))", a_expr);
                b_expr = format!("neq({}, UInt(0))", b_expr);
                if ty == "$logic_and" { "and" } else { "or" }
            }
            "$shl" | "$sshl" => {
                // FIRRTL widens left shifts by the shift amount; the result
                // is truncated back to the declared width below.
                extract_y_bits = true;
                if let Some(amount) = b_sig.as_const().and_then(|c| c.as_u64()) {
                    b_expr = amount.to_string();
                    "shl"
                } else {
                    b_expr = gen_dshl(&b_expr, b_padded_width);
                    "dshl"
                }
            }
            "$shr" | "$sshr" => {
                if let Some(amount) = b_sig.as_const().and_then(|c| c.as_u64()) {
                    b_expr = amount.to_string();
                    "shr"
                } else {
                    "dshr"
                }
            }
            _ => unreachable!("binary dispatch covers {}", ty),
        };

        if !b_signed && !is_shift {
            b_expr = format!("asUInt({})", b_expr);
        }

        let mut expr = format!("{}({}, {})", primop, a_expr, b_expr);
        if extract_y_bits {
            expr = format!("bits({}, {}, 0)", expr, y_width - 1);
        }
        // FIRRTL's sub always yields a signed result.
        if (a_signed && !always_uint) || ty == "$sub" {
            expr = format!("asUInt({})", expr);
        }

        self.cell_exprs.push(format!("{} <= {}", y_id, expr));
        self.register_reverse_map(&y_id, cell_port(cell, "Y")?);
        Ok(())
    }

    fn process_mux(&mut self, cell: &Cell) -> SynthResult<()> {
        let width = param_u64(cell, "WIDTH")?;
        let y_id = self.names.sanitize(cell.name);
        self.wire_decls
            .push(format!("wire {}: UInt<{}>", y_id, width));

        let a_expr = self.make_expr(cell_port(cell, "A")?);
        let b_expr = self.make_expr(cell_port(cell, "B")?);
        let s_expr = self.make_expr(cell_port(cell, "S")?);
        // FIRRTL muxes take (cond, then, else); B is the selected arm.
        self.cell_exprs
            .push(format!("{} <= mux({}, {}, {})", y_id, s_expr, b_expr, a_expr));
        self.register_reverse_map(&y_id, cell_port(cell, "Y")?);
        Ok(())
    }

    fn process_dff(&mut self, cell: &Cell) -> SynthResult<()> {
        let width = param_u64(cell, "WIDTH")?;
        if !param_bool(cell, "CLK_POLARITY")? {
            return Err(Error::unsupported(format!(
                "cell {} has a negative-edge clock",
                cell.name
            )));
        }
        let clk_expr = self.make_expr(cell_port(cell, "CLK")?);
        let y_id = self.names.sanitize(cell.name);
        self.wire_decls.push(format!(
            "reg  {}: UInt<{}>, asClock({})",
            y_id, width, clk_expr
        ));

        let d_expr = self.make_expr(cell_port(cell, "D")?);
        self.cell_exprs.push(format!("{} <= {}", y_id, d_expr));
        self.register_reverse_map(&y_id, cell_port(cell, "Q")?);
        Ok(())
    }

    fn process_mem(&mut self, cell: &Cell) -> SynthResult<()> {
        let width = param_u64(cell, "WIDTH")?;
        let abits = param_u64(cell, "ABITS")?;
        let size = param_u64(cell, "SIZE")?;
        let rd_ports = param_u64(cell, "RD_PORTS")?;
        let wr_ports = param_u64(cell, "WR_PORTS")?;

        if width == 0 || abits == 0 {
            return Err(Error::malformed_structure(format!(
                "memory {} has a zero WIDTH or ABITS",
                cell.name
            )));
        }
        if param_u64(cell, "OFFSET")? != 0 {
            return Err(Error::unsupported(format!(
                "memory {} has a non-zero offset",
                cell.name
            )));
        }
        if let Some(init) = cell.param("INIT") {
            if init.has_defined_bit() {
                return Err(Error::unsupported(format!(
                    "memory {} has an initial value",
                    cell.name
                )));
            }
        }

        let mem_id = self.names.sanitize(cell.name);
        let header = [
            format!("mem  {}:", mem_id),
            format!("  data-type => UInt<{}>", width),
            format!("  depth => {}", size),
        ];
        let ports = (0..rd_ports)
            .map(|i| format!("  reader => r{}", i))
            .chain((0..wr_ports).map(|i| format!("  writer => w{}", i)))
            .collect_vec();
        let footer = [
            "  read-latency => 0".to_string(),
            "  write-latency => 1".to_string(),
            "  read-under-write => undefined".to_string(),
        ];
        self.wire_decls
            .extend(header.into_iter().chain(ports).chain(footer));

        if rd_ports > 0 {
            let rd_clk_enable = param_const(cell, "RD_CLK_ENABLE")?;
            let rd_addr = cell_port(cell, "RD_ADDR")?;
            let rd_data = cell_port(cell, "RD_DATA")?;
            if rd_addr.width() != rd_ports * abits || rd_data.width() != rd_ports * width {
                return Err(Error::malformed_structure(format!(
                    "memory {} has inconsistent read port widths",
                    cell.name
                )));
            }
            for i in 0..rd_ports {
                // With a read latency of 0 the clock is never consulted.
                if rd_clk_enable.bit(i) != Bit::Zero {
                    return Err(Error::unsupported(format!(
                        "memory {} has a clocked read port",
                        cell.name
                    )));
                }
                let addr = self.make_expr(&rd_addr.extract(i * abits, abits));
                self.cell_exprs
                    .push(format!("{}.r{}.addr <= {}", mem_id, i, addr));
                self.cell_exprs
                    .push(format!("{}.r{}.en <= UInt<1>(1)", mem_id, i));
                self.cell_exprs
                    .push(format!("{}.r{}.clk <= asClock(UInt<1>(0))", mem_id, i));
                self.register_reverse_map(
                    &format!("{}.r{}.data", mem_id, i),
                    &rd_data.extract(i * width, width),
                );
            }
        }

        if wr_ports > 0 {
            let wr_clk_enable = param_const(cell, "WR_CLK_ENABLE")?;
            let wr_clk_polarity = param_const(cell, "WR_CLK_POLARITY")?;
            let wr_addr = cell_port(cell, "WR_ADDR")?;
            let wr_data = cell_port(cell, "WR_DATA")?;
            let wr_en = cell_port(cell, "WR_EN")?;
            let wr_clk = cell_port(cell, "WR_CLK")?;
            if wr_addr.width() != wr_ports * abits
                || wr_data.width() != wr_ports * width
                || wr_en.width() != wr_ports * width
                || wr_clk.width() != wr_ports
            {
                return Err(Error::malformed_structure(format!(
                    "memory {} has inconsistent write port widths",
                    cell.name
                )));
            }
            for i in 0..wr_ports {
                if wr_clk_enable.bit(i) != Bit::One {
                    return Err(Error::unsupported(format!(
                        "memory {} has an unclocked write port",
                        cell.name
                    )));
                }
                if wr_clk_polarity.bit(i) != Bit::One {
                    return Err(Error::unsupported(format!(
                        "memory {} has a negative-edge write clock",
                        cell.name
                    )));
                }
                // FIRRTL writers take a single enable; per-bit enables only
                // translate when every bit agrees.
                let en_sig = wr_en.extract(i * width, width);
                let first = en_sig.bits().next();
                if en_sig.bits().any(|b| Some(b) != first) {
                    return Err(Error::unsupported(format!(
                        "memory {} has a non-uniform write enable",
                        cell.name
                    )));
                }

                let addr = self.make_expr(&wr_addr.extract(i * abits, abits));
                self.cell_exprs
                    .push(format!("{}.w{}.addr <= {}", mem_id, i, addr));
                let data = self.make_expr(&wr_data.extract(i * width, width));
                self.cell_exprs
                    .push(format!("{}.w{}.data <= {}", mem_id, i, data));
                let en = self.make_expr(&en_sig.extract(0, 1));
                self.cell_exprs
                    .push(format!("{}.w{}.en <= {}", mem_id, i, en));
                self.cell_exprs
                    .push(format!("{}.w{}.mask <= UInt<1>(1)", mem_id, i));
                let clk = self.make_expr(&wr_clk.extract(i, 1));
                self.cell_exprs
                    .push(format!("{}.w{}.clk <= asClock({})", mem_id, i, clk));
            }
        }
        Ok(())
    }

    /// `$shift`/`$shiftx` extract a bit window from `A` at index `B`.
    fn process_window_shift(&mut self, cell: &Cell) -> SynthResult<()> {
        let ty = cell.ty.as_ref();
        let y_width = param_u64(cell, "Y_WIDTH")?;
        let b_width = param_u64(cell, "B_WIDTH")?;
        let b_signed = param_bool(cell, "B_SIGNED")?;

        let y_id = self.names.sanitize(cell.name);
        self.wire_decls
            .push(format!("wire {}: UInt<{}>", y_id, y_width));

        let a_expr = self.make_expr(cell_port(cell, "A")?);
        let b_expr = self.make_expr(cell_port(cell, "B")?);

        let expr = if !b_signed {
            format!("dshr({}, {})", a_expr, b_expr)
        } else if ty == "$shiftx" {
            // A negative index yields an undefined window.
            let sign = b_width - 1;
            format!(
                "dshr({}, validif(not(bits({}, {}, {})), {}))",
                a_expr, b_expr, sign, sign, b_expr
            )
        } else {
            // Negative amounts shift the window left by the magnitude.
            let b_neg = format!("asUInt(neg(asSInt({})))", b_expr);
            let left = format!(
                "bits(dshl({}, {}), {}, 0)",
                a_expr,
                gen_dshl(&b_neg, b_width + 1),
                y_width - 1
            );
            let is_neg = format!("lt(asSInt({}), asSInt(UInt<1>(0)))", b_expr);
            format!(
                "mux({}, {}, dshr({}, {}))",
                is_neg, left, a_expr, b_expr
            )
        };

        self.cell_exprs.push(format!("{} <= {}", y_id, expr));
        self.register_reverse_map(&y_id, cell_port(cell, "Y")?);
        Ok(())
    }

    fn process_instance(&mut self, cell: &Cell) -> SynthResult<()> {
        let design = self.design;
        let Some(callee) = design.module(cell.ty) else {
            log::warn!(
                "no module {} in design for instance {}; skipping",
                cell.ty,
                cell.name
            );
            return Ok(());
        };

        let instance_of: String = cell
            .ty
            .as_ref()
            .chars()
            .map(|c| if matches!(c, '\\' | '=' | '\'' | '$') { '_' } else { c })
            .collect();
        let cell_id = self.names.sanitize(cell.name);
        self.wire_exprs
            .push(format!("inst {} of {}", cell_id, instance_of));

        for (port, sig) in &cell.connections {
            if sig.width() == 0 {
                continue;
            }
            let port_id = self.names.sanitize(*port);
            let target = format!("{}.{}", cell_id, port_id);
            let role = callee.wire(*port).map(|w| w.port).unwrap_or(PortRole::None);
            match role {
                PortRole::Input | PortRole::None => {
                    if role == PortRole::None {
                        log::warn!(
                            "connection {}.{} has no direction in {}; treating as input",
                            cell.name,
                            port,
                            cell.ty
                        );
                    }
                    let expr = self.make_expr(sig);
                    self.wire_exprs.push(format!("{} <= {}", target, expr));
                }
                PortRole::Output | PortRole::Inout => {
                    if role == PortRole::Inout {
                        log::warn!(
                            "connection {}.{} is inout in {}; treating as output",
                            cell.name,
                            port,
                            cell.ty
                        );
                    }
                    self.register_reverse_map(&target, sig);
                }
            }
        }
        Ok(())
    }

    /// Reassemble a driving expression for every non-input wire from the
    /// reverse map, collapsing maximal runs of consecutive driver bits into
    /// single `bits(...)` terms. Undriven bits read from a shared 1-bit
    /// invalid placeholder; fully undriven wires are marked invalid.
    fn reconstruct_wire_drivers(&mut self) {
        let module = self.module;
        for wire in module.wires() {
            if wire.port.is_input() {
                continue;
            }
            let name = self.names.sanitize(wire.name);
            let driven =
                (0..wire.width).any(|i| self.reverse_map.contains_key(&(wire.name, i)));
            if !driven {
                self.wire_exprs.push(format!("{} is invalid", name));
                continue;
            }

            let mut expr = String::new();
            let mut cursor = 0;
            while cursor < wire.width {
                let new_expr = match self.reverse_map.get(&(wire.name, cursor)) {
                    Some((id, offset)) => {
                        let (id, offset) = (id.clone(), *offset);
                        let mut run = 1;
                        while cursor + run < wire.width {
                            match self.reverse_map.get(&(wire.name, cursor + run)) {
                                Some((next_id, next_offset))
                                    if *next_id == id && *next_offset == offset + run =>
                                {
                                    run += 1
                                }
                                _ => break,
                            }
                        }
                        cursor += run;
                        format!("bits({}, {}, {})", id, offset + run - 1, offset)
                    }
                    None => {
                        cursor += 1;
                        self.invalid_wire()
                    }
                };
                expr = if expr.is_empty() {
                    new_expr
                } else {
                    format!("cat({}, {})", new_expr, expr)
                };
            }
            self.wire_exprs.push(format!("{} <= {}", name, expr));
        }
    }

    /// Shared 1-bit placeholder for undriven bits, allocated on first use.
    fn invalid_wire(&mut self) -> String {
        if let Some(id) = &self.invalid_id {
            return id.clone();
        }
        let id = self.names.fresh();
        self.wire_decls.push(format!("wire {}: UInt<1>", id));
        self.wire_decls.push(format!("{} is invalid", id));
        self.invalid_id = Some(id.clone());
        id
    }
}

/// FIRRTL rejects `dshl` amounts of [`FIRRTL_MAX_DSH_WIDTH_ERROR`] bits or
/// more; clamp wider amounts to the largest representable shift.
fn gen_dshl(b_expr: &str, b_width: u64) -> String {
    if b_width < FIRRTL_MAX_DSH_WIDTH_ERROR {
        return b_expr.to_string();
    }
    let max_width = FIRRTL_MAX_DSH_WIDTH_ERROR - 1;
    let max_shift = format!("UInt<{}>({})", max_width, (1u64 << max_width) - 1);
    format!(
        "mux(gt({}, {}), {}, bits({}, {}, 0))",
        b_expr,
        max_shift,
        max_shift,
        b_expr,
        max_width - 1
    )
}

fn param_const<'a>(cell: &'a Cell, name: &str) -> SynthResult<&'a Const> {
    cell.param(name).ok_or_else(|| {
        Error::malformed_structure(format!(
            "cell {} is missing required parameter {}",
            cell.name, name
        ))
    })
}

fn param_u64(cell: &Cell, name: &str) -> SynthResult<u64> {
    param_const(cell, name)?.as_u64().ok_or_else(|| {
        Error::malformed_structure(format!(
            "parameter {} of cell {} is not a defined integer",
            name, cell.name
        ))
    })
}

fn param_bool(cell: &Cell, name: &str) -> SynthResult<bool> {
    Ok(param_const(cell, name)?.as_bool())
}

fn cell_port<'a>(cell: &'a Cell, name: &str) -> SynthResult<&'a SigSpec> {
    cell.port(name).ok_or_else(|| {
        Error::malformed_structure(format!(
            "cell {} is missing port {}",
            cell.name, name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsynth_ir::Wire;

    fn emit_to_string(design: &Design) -> SynthResult<String> {
        let mut buf = Vec::new();
        emit_design(design, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap())
    }

    fn single_module(module: Module) -> Design {
        let mut design = Design::new();
        let name = design.add_module(module);
        design.top = Some(name);
        design
    }

    fn input(m: &mut Module, name: &str, width: u64) -> SigSpec {
        let id = m.add_wire(Wire::new(name, width).with_port(PortRole::Input));
        SigSpec::slice(id, 0, width)
    }

    fn output(m: &mut Module, name: &str, width: u64) -> SigSpec {
        let id = m.add_wire(Wire::new(name, width).with_port(PortRole::Output));
        SigSpec::slice(id, 0, width)
    }

    fn internal(m: &mut Module, name: &str, width: u64) -> SigSpec {
        let id = m.add_wire(Wire::new(name, width));
        SigSpec::slice(id, 0, width)
    }

    fn u32_param(value: u64) -> Const {
        Const::from_u64(value, 32)
    }

    fn binary_widths(cell: Cell, a: u64, b: u64, y: u64) -> Cell {
        cell.with_param("A_WIDTH", u32_param(a))
            .with_param("B_WIDTH", u32_param(b))
            .with_param("Y_WIDTH", u32_param(y))
    }

    fn signedness(cell: Cell, a: bool, b: bool) -> Cell {
        cell.with_param("A_SIGNED", u32_param(a as u64))
            .with_param("B_SIGNED", u32_param(b as u64))
    }

    #[test]
    fn identity_connection_goes_through_a_fresh_wire() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let y = output(&mut m, "y", 4);
        m.connect(y, a);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("wire _0: UInt<4>"));
        assert!(out.contains("_0 <= a"));
        assert!(out.contains("y <= bits(_0, 3, 0)"));
    }

    #[test]
    fn signed_add_wraps_operands_and_result() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 8);
        let b = input(&mut m, "b", 8);
        let y = output(&mut m, "y", 8);
        let cell = signedness(
            binary_widths(Cell::new("add0", "$add"), 8, 8, 8),
            true,
            true,
        )
        .with_port("A", a)
        .with_port("B", b)
        .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("wire add0: UInt<8>"));
        assert!(out.contains("add0 <= asUInt(add(asSInt(a), asSInt(b)))"));
        assert!(out.contains("y <= bits(add0, 7, 0)"));
    }

    #[test]
    fn dynamic_left_shift_is_guarded_and_truncated() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let b = input(&mut m, "b", 32);
        let y = output(&mut m, "y", 8);
        let cell = signedness(
            binary_widths(Cell::new("shl0", "$shl"), 4, 32, 8),
            false,
            false,
        )
        .with_port("A", a)
        .with_port("B", b)
        .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains(
            "shl0 <= bits(dshl(pad(a, 8), \
             mux(gt(b, UInt<19>(524287)), UInt<19>(524287), bits(b, 18, 0))), 7, 0)"
        ));
    }

    #[test]
    fn constant_left_shift_uses_the_static_form() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let y = output(&mut m, "y", 8);
        let cell = signedness(
            binary_widths(Cell::new("shl0", "$shl"), 4, 32, 8),
            false,
            false,
        )
        .with_port("A", a)
        .with_port("B", SigSpec::constant(Const::from_u64(3, 32)))
        .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("shl0 <= bits(shl(pad(a, 8), 3), 7, 0)"));
    }

    #[test]
    fn mux_arguments_are_cond_then_else() {
        let mut m = Module::new("top");
        let x = input(&mut m, "x", 1);
        let y = input(&mut m, "y", 1);
        let s = input(&mut m, "s", 1);
        let w = output(&mut m, "w", 1);
        let cell = Cell::new("m0", "$mux")
            .with_param("WIDTH", u32_param(1))
            .with_port("A", x)
            .with_port("B", y)
            .with_port("S", s)
            .with_port("Y", w);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("m0 <= mux(s, y, x)"));
        assert!(!out.contains("mux(s, x, y)"));
    }

    fn mem_cell(rd_clk_enable: u64) -> Module {
        let mut m = Module::new("top");
        let raddr = input(&mut m, "raddr", 4);
        let q = output(&mut m, "q", 8);
        let waddr = input(&mut m, "waddr", 4);
        let d = input(&mut m, "d", 8);
        let we = input(&mut m, "we", 1);
        let wclk = input(&mut m, "wclk", 1);
        let mut wen = SigSpec::new();
        for _ in 0..8 {
            wen.append_sig(&we);
        }
        let cell = Cell::new("mem0", "$mem")
            .with_param("WIDTH", u32_param(8))
            .with_param("ABITS", u32_param(4))
            .with_param("SIZE", u32_param(16))
            .with_param("OFFSET", u32_param(0))
            .with_param("RD_PORTS", u32_param(1))
            .with_param("WR_PORTS", u32_param(1))
            .with_param("RD_CLK_ENABLE", Const::from_u64(rd_clk_enable, 1))
            .with_param("WR_CLK_ENABLE", Const::from_u64(1, 1))
            .with_param("WR_CLK_POLARITY", Const::from_u64(1, 1))
            .with_port("RD_ADDR", raddr)
            .with_port("RD_DATA", q)
            .with_port("WR_ADDR", waddr)
            .with_port("WR_DATA", d)
            .with_port("WR_EN", wen)
            .with_port("WR_CLK", wclk);
        m.add_cell(cell);
        m
    }

    #[test]
    fn memories_declare_ports_and_stitch_read_data() {
        let out = emit_to_string(&single_module(mem_cell(0))).unwrap();
        assert!(out.contains("mem  mem0:"));
        assert!(out.contains("data-type => UInt<8>"));
        assert!(out.contains("depth => 16"));
        assert!(out.contains("reader => r0"));
        assert!(out.contains("writer => w0"));
        assert!(out.contains("read-under-write => undefined"));
        assert!(out.contains("mem0.r0.addr <= raddr"));
        assert!(out.contains("mem0.r0.en <= UInt<1>(1)"));
        assert!(out.contains("mem0.r0.clk <= asClock(UInt<1>(0))"));
        assert!(out.contains("mem0.w0.addr <= waddr"));
        assert!(out.contains("mem0.w0.data <= d"));
        assert!(out.contains("mem0.w0.en <= we"));
        assert!(out.contains("mem0.w0.mask <= UInt<1>(1)"));
        assert!(out.contains("mem0.w0.clk <= asClock(wclk)"));
        assert!(out.contains("q <= bits(mem0.r0.data, 7, 0)"));
    }

    #[test]
    fn clocked_read_ports_are_rejected() {
        let err = emit_to_string(&single_module(mem_cell(1))).unwrap_err();
        assert!(err.message().contains("clocked read"));
    }

    #[test]
    fn missing_instance_module_is_skipped() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let cell = Cell::new("U0", "foo_mod").with_port("p", a);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(!out.contains("inst"));
        assert!(out.contains("module top:"));
    }

    #[test]
    fn instances_connect_by_callee_direction() {
        let mut design = Design::new();
        let mut sub = Module::new("sub");
        input(&mut sub, "p", 4);
        output(&mut sub, "q", 4);
        design.add_module(sub);

        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let z = output(&mut m, "z", 4);
        let cell = Cell::new("u0", "sub").with_port("p", a).with_port("q", z);
        m.add_cell(cell);
        let top = design.add_module(m);
        design.top = Some(top);

        let out = emit_to_string(&design).unwrap();
        assert!(out.contains("inst u0 of sub"));
        assert!(out.contains("u0.p <= a"));
        assert!(out.contains("z <= bits(u0.q, 3, 0)"));
    }

    #[test]
    fn registers_declare_a_clocked_reg() {
        let mut m = Module::new("top");
        let clk = input(&mut m, "clk", 1);
        let d = input(&mut m, "d", 8);
        let q = output(&mut m, "q", 8);
        let cell = Cell::new("r0", "$dff")
            .with_param("WIDTH", u32_param(8))
            .with_param("CLK_POLARITY", u32_param(1))
            .with_port("CLK", clk)
            .with_port("D", d)
            .with_port("Q", q);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("reg  r0: UInt<8>, asClock(clk)"));
        assert!(out.contains("r0 <= d"));
        assert!(out.contains("q <= bits(r0, 7, 0)"));
    }

    #[test]
    fn negative_edge_registers_are_rejected() {
        let mut m = Module::new("top");
        let clk = input(&mut m, "clk", 1);
        let d = input(&mut m, "d", 8);
        let q = output(&mut m, "q", 8);
        let cell = Cell::new("r0", "$dff")
            .with_param("WIDTH", u32_param(8))
            .with_param("CLK_POLARITY", u32_param(0))
            .with_port("CLK", clk)
            .with_port("D", d)
            .with_port("Q", q);
        m.add_cell(cell);
        let err = emit_to_string(&single_module(m)).unwrap_err();
        assert!(err.message().contains("negative-edge"));
    }

    #[test]
    fn unary_bool_producers_are_not_padded() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let y = output(&mut m, "y", 1);
        let cell = Cell::new("rb0", "$reduce_bool")
            .with_param("A_WIDTH", u32_param(4))
            .with_param("Y_WIDTH", u32_param(1))
            .with_param("A_SIGNED", u32_param(1))
            .with_port("A", a)
            .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("rb0 <= neq(asSInt(a), SInt<4>(0))"));
    }

    #[test]
    fn negation_is_padded_and_restored_to_unsigned() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let y = output(&mut m, "y", 8);
        let cell = Cell::new("n0", "$neg")
            .with_param("A_WIDTH", u32_param(4))
            .with_param("Y_WIDTH", u32_param(8))
            .with_param("A_SIGNED", u32_param(0))
            .with_port("A", a)
            .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("n0 <= asUInt(neg(pad(a, 8)))"));
    }

    #[test]
    fn logic_ops_coerce_operands_to_booleans() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 3);
        let b = input(&mut m, "b", 2);
        let y = output(&mut m, "y", 1);
        let cell = signedness(
            binary_widths(Cell::new("la0", "$logic_and"), 3, 2, 1),
            false,
            false,
        )
        .with_port("A", a)
        .with_port("B", b)
        .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("la0 <= and(neq(a, UInt(0)), asUInt(neq(b, UInt(0))))"));
    }

    #[test]
    fn shiftx_guards_negative_indices() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 8);
        let b = input(&mut m, "b", 5);
        let y = output(&mut m, "y", 8);
        let cell = Cell::new("sx0", "$shiftx")
            .with_param("A_WIDTH", u32_param(8))
            .with_param("B_WIDTH", u32_param(5))
            .with_param("Y_WIDTH", u32_param(8))
            .with_param("B_SIGNED", u32_param(1))
            .with_port("A", a)
            .with_port("B", b)
            .with_port("Y", y);
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("sx0 <= dshr(a, validif(not(bits(b, 4, 4)), b))"));
    }

    #[test]
    fn literal_chunks_render_as_hex() {
        let mut m = Module::new("top");
        let c = internal(&mut m, "c", 8);
        m.connect(c, SigSpec::constant(Const::from_u64(0xa5, 8)));
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("_0 <= UInt<8>(\"ha5\")"));
        assert!(out.contains("c <= bits(_0, 7, 0)"));
    }

    #[test]
    fn concatenations_put_high_chunks_on_the_left() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let c = internal(&mut m, "c", 6);
        let mut rhs = a;
        rhs.append_sig(&SigSpec::constant(Const::from_u64(0b10, 2)));
        m.connect(c, rhs);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("_0 <= cat(UInt<2>(\"h2\"), a)"));
    }

    #[test]
    fn partially_driven_wires_fill_with_the_invalid_placeholder() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 2);
        let w = m.add_wire(Wire::new("w", 4));
        let cell = Cell::new("n0", "$not")
            .with_param("A_WIDTH", u32_param(2))
            .with_param("Y_WIDTH", u32_param(2))
            .with_param("A_SIGNED", u32_param(0))
            .with_port("A", a)
            .with_port("Y", SigSpec::slice(w, 0, 2));
        m.add_cell(cell);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("wire _0: UInt<1>"));
        assert!(out.contains("_0 is invalid"));
        assert!(out.contains("w <= cat(_0, cat(_0, bits(n0, 1, 0)))"));
    }

    #[test]
    fn undriven_wires_are_marked_invalid() {
        let mut m = Module::new("top");
        internal(&mut m, "u", 2);
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(out.contains("u is invalid"));
        // No placeholder is allocated when nothing needs filling.
        assert!(!out.contains("wire _0"));
    }

    #[test]
    fn emission_is_idempotent() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 8);
        let b = input(&mut m, "b", 8);
        let y = output(&mut m, "y", 8);
        let cell = signedness(
            binary_widths(Cell::new("add0", "$add"), 8, 8, 8),
            true,
            true,
        )
        .with_port("A", a)
        .with_port("B", b)
        .with_port("Y", y);
        m.add_cell(cell);
        let design = single_module(m);
        let first = emit_to_string(&design).unwrap();
        let second = emit_to_string(&design).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_cells_are_skipped_with_a_warning() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        m.add_cell(Cell::new("x0", "$frobnicate").with_port("A", a));
        let out = emit_to_string(&single_module(m)).unwrap();
        assert!(!out.contains("x0"));
    }

    #[test]
    fn validate_rejects_width_parameter_mismatches() {
        let mut m = Module::new("top");
        let a = input(&mut m, "a", 4);
        let b = input(&mut m, "b", 8);
        let y = output(&mut m, "y", 8);
        let cell = signedness(
            binary_widths(Cell::new("add0", "$add"), 8, 8, 8),
            false,
            false,
        )
        .with_port("A", a)
        .with_port("B", b)
        .with_port("Y", y);
        m.add_cell(cell);
        let design = single_module(m);
        assert!(FirrtlBackend::validate(&design).is_err());
    }

    #[test]
    fn validate_rejects_inout_module_ports() {
        let mut m = Module::new("top");
        m.add_wire(Wire::new("io", 1).with_port(PortRole::Inout));
        let design = single_module(m);
        assert!(FirrtlBackend::validate(&design).is_err());
    }

    fn is_legal_identifier(s: &str) -> bool {
        !s.is_empty()
            && !s.starts_with(|c: char| c.is_ascii_digit())
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn sanitized_names_are_legal_and_stable() {
        let mut names = NameTable::default();
        assert_eq!(names.sanitize("\\foo$bar".into()), "foo_bar");
        assert_eq!(names.sanitize("\\foo$bar".into()), "foo_bar");
        assert_eq!(names.sanitize("9lives".into()), "_lives");
        for raw in ["\\a b", "1x", "", "a$b$", "mixed-chars!"] {
            assert!(is_legal_identifier(&names.sanitize(raw.into())));
        }
    }

    #[test]
    fn colliding_names_grow_underscores() {
        let mut names = NameTable::default();
        assert_eq!(names.sanitize("a!".into()), "a_");
        assert_eq!(names.sanitize("a?".into()), "a__");
        assert_eq!(names.sanitize("a_".into()), "a___");
    }

    #[test]
    fn fresh_ids_skip_reserved_names() {
        let mut names = NameTable::default();
        names.sanitize("_1".into());
        assert_eq!(names.fresh(), "_0");
        assert_eq!(names.fresh(), "_2");
    }
}
