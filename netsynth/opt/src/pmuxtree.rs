//! Rewrite priority multiplexers into balanced trees of two-input muxes.
//!
//! A `$pmux` cell selects one of `S_WIDTH` stacked `WIDTH`-wide slices of its
//! `B` input, falling back to `A` when no select bit is set. Backends only
//! understand two-input `$mux` cells, so every `$pmux` is rewritten into a
//! balanced binary tree: each interior node muxes between its halves on
//! "some select bit of the upper half is set" (a `$reduce_or` over the
//! half's select bits), giving higher select bits priority.
use netsynth_ir::{Cell, Const, Design, Module, SigSpec, Wire};
use netsynth_utils::{Error, NameGenerator, SynthResult};

pub fn pmuxtree(design: &mut Design) -> SynthResult<()> {
    let mut rewritten = 0;
    for module in design.modules_mut() {
        rewritten += run_on_module(module)?;
    }
    if rewritten > 0 {
        log::info!("pmuxtree: rewrote {} $pmux cells", rewritten);
    }
    Ok(())
}

fn run_on_module(module: &mut Module) -> SynthResult<usize> {
    let pmuxes: Vec<_> = module
        .cells()
        .filter(|c| c.ty == "$pmux")
        .map(|c| c.name)
        .collect();
    if pmuxes.is_empty() {
        return Ok(0);
    }

    let mut namegen =
        NameGenerator::with_prev_defined_names(module.defined_names().collect());
    for name in &pmuxes {
        let cell = module.remove_cell(*name).unwrap();
        rewrite_pmux(module, &mut namegen, &cell)?;
    }
    Ok(pmuxes.len())
}

fn rewrite_pmux(
    module: &mut Module,
    namegen: &mut NameGenerator,
    cell: &Cell,
) -> SynthResult<()> {
    let width = required_param(cell, "WIDTH")?;
    let s_width = required_param(cell, "S_WIDTH")?;
    let a = required_port(cell, "A")?.clone();
    let b = required_port(cell, "B")?.clone();
    let s = required_port(cell, "S")?.clone();
    let y = required_port(cell, "Y")?.clone();

    if s.width() != s_width || b.width() != s_width * width || y.width() != width {
        return Err(Error::malformed_structure(format!(
            "cell {} has port widths inconsistent with WIDTH={} S_WIDTH={}",
            cell.name, width, s_width
        )));
    }
    if s_width == 0 {
        module.connect(y, a);
        return Ok(());
    }

    let (value, any) = mux_tree(module, namegen, &b, &s, width);
    // Fall back to A when no select line is active.
    let root = Cell::new(namegen.gen_name("pmux"), "$mux")
        .with_param("WIDTH", Const::from_u64(width, 32))
        .with_port("A", a)
        .with_port("B", value)
        .with_port("S", any)
        .with_port("Y", y);
    module.add_cell(root);
    Ok(())
}

/// Build the tree for `data` (stacked `width`-wide slices) selected by
/// `sel`. Returns the selected value and a 1-bit "any select bit set"
/// signal for this subtree.
fn mux_tree(
    module: &mut Module,
    namegen: &mut NameGenerator,
    data: &SigSpec,
    sel: &SigSpec,
    width: u64,
) -> (SigSpec, SigSpec) {
    let s_width = sel.width();
    if s_width == 1 {
        return (data.clone(), sel.clone());
    }
    let lo_size = s_width / 2;
    let hi_size = s_width - lo_size;

    let (lo_value, lo_any) = mux_tree(
        module,
        namegen,
        &data.extract(0, lo_size * width),
        &sel.extract(0, lo_size),
        width,
    );
    let (hi_value, hi_any) = mux_tree(
        module,
        namegen,
        &data.extract(lo_size * width, hi_size * width),
        &sel.extract(lo_size, hi_size),
        width,
    );

    // Higher select bits take priority over lower ones.
    let value = add_mux(module, namegen, &lo_value, &hi_value, &hi_any, width);
    let mut both = lo_any.clone();
    both.append_sig(&hi_any);
    let any = add_reduce_or(module, namegen, &both);
    (value, any)
}

fn add_mux(
    module: &mut Module,
    namegen: &mut NameGenerator,
    a: &SigSpec,
    b: &SigSpec,
    s: &SigSpec,
    width: u64,
) -> SigSpec {
    let y = fresh_wire(module, namegen, width);
    let cell = Cell::new(namegen.gen_name("mux"), "$mux")
        .with_param("WIDTH", Const::from_u64(width, 32))
        .with_port("A", a.clone())
        .with_port("B", b.clone())
        .with_port("S", s.clone())
        .with_port("Y", y.clone());
    module.add_cell(cell);
    y
}

fn add_reduce_or(
    module: &mut Module,
    namegen: &mut NameGenerator,
    a: &SigSpec,
) -> SigSpec {
    let y = fresh_wire(module, namegen, 1);
    let cell = Cell::new(namegen.gen_name("or"), "$reduce_or")
        .with_param("A_SIGNED", Const::from_u64(0, 32))
        .with_param("A_WIDTH", Const::from_u64(a.width(), 32))
        .with_param("Y_WIDTH", Const::from_u64(1, 32))
        .with_port("A", a.clone())
        .with_port("Y", y.clone());
    module.add_cell(cell);
    y
}

fn fresh_wire(module: &mut Module, namegen: &mut NameGenerator, width: u64) -> SigSpec {
    let name = namegen.gen_name("pmux");
    let wire = Wire::new(name, width);
    let sig = SigSpec::from_wire(&wire);
    module.add_wire(wire);
    sig
}

fn required_param(cell: &Cell, name: &str) -> SynthResult<u64> {
    cell.param(name).and_then(Const::as_u64).ok_or_else(|| {
        Error::malformed_structure(format!(
            "cell {} is missing required parameter {}",
            cell.name, name
        ))
    })
}

fn required_port<'a>(cell: &'a Cell, name: &str) -> SynthResult<&'a SigSpec> {
    cell.port(name).ok_or_else(|| {
        Error::malformed_structure(format!(
            "cell {} is missing port {}",
            cell.name, name
        ))
    })
}
