//! JSON netlist reader.
//!
//! The interchange schema mirrors the in-memory design: modules own wires,
//! cells, and connections. A signal is a list of chunks; a chunk is a bare
//! string (a whole wire), a `[wire, offset, width]` array (a slice), or a
//! `{"const": "01xz"}` object (an MSB-first literal). Parameter and
//! attribute values are integers or MSB-first bit strings.
use std::io;
use std::path::Path;

use linked_hash_map::LinkedHashMap;
use serde::Deserialize;

use netsynth_ir::{
    Attributes, Cell, Const, Design, Module, PortRole, SigChunk, SigSpec, Wire,
};
use netsynth_utils::{Error, Id, SynthResult};

#[derive(Deserialize)]
struct RawDesign {
    #[serde(default)]
    top: Option<String>,
    modules: LinkedHashMap<String, RawModule>,
}

#[derive(Deserialize)]
struct RawModule {
    #[serde(default)]
    attributes: LinkedHashMap<String, RawValue>,
    #[serde(default)]
    wires: LinkedHashMap<String, RawWire>,
    #[serde(default)]
    cells: LinkedHashMap<String, RawCell>,
    #[serde(default)]
    connections: Vec<(RawSig, RawSig)>,
}

#[derive(Deserialize)]
struct RawWire {
    width: u64,
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    attributes: LinkedHashMap<String, RawValue>,
}

#[derive(Deserialize)]
struct RawCell {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    parameters: LinkedHashMap<String, RawValue>,
    #[serde(default)]
    connections: LinkedHashMap<String, RawSig>,
}

type RawSig = Vec<RawChunk>;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChunk {
    Slice(String, u64, u64),
    Const {
        #[serde(rename = "const")]
        value: String,
    },
    Wire(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Int(u64),
    Bits(String),
}

impl RawValue {
    fn to_const(&self) -> SynthResult<Const> {
        match self {
            // Integer parameters carry the conventional 32-bit width.
            RawValue::Int(value) => Ok(Const::from_u64(*value, 32)),
            RawValue::Bits(s) => Const::from_str_msb(s),
        }
    }
}

/// Read a design from a JSON netlist file.
pub fn parse_file(path: &Path) -> SynthResult<Design> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::invalid_file(format!("cannot open `{}`: {}", path.display(), e)))?;
    parse_design(io::BufReader::new(file))
}

/// Read a design from a JSON netlist stream.
pub fn parse_design(reader: impl io::Read) -> SynthResult<Design> {
    let raw: RawDesign = serde_json::from_reader(reader)?;
    let mut design = Design::new();
    for (name, raw_module) in &raw.modules {
        let module = build_module(name, raw_module)?;
        design.add_module(module);
    }
    if let Some(top) = &raw.top {
        let top = Id::from(top.as_str());
        if design.module(top).is_none() {
            return Err(Error::undefined(top, "top module"));
        }
        design.top = Some(top);
    }
    Ok(design)
}

fn build_module(name: &str, raw: &RawModule) -> SynthResult<Module> {
    let mut module = Module::new(name);
    module.attributes = build_attributes(&raw.attributes)?;

    for (wire_name, raw_wire) in &raw.wires {
        if raw_wire.width == 0 {
            return Err(Error::malformed_structure(format!(
                "wire `{}` in module `{}` has width 0",
                wire_name, name
            )));
        }
        let mut wire = Wire::new(wire_name.as_str(), raw_wire.width)
            .with_port(parse_port_role(raw_wire.port.as_deref())?);
        wire.attributes = build_attributes(&raw_wire.attributes)?;
        module.add_wire(wire);
    }

    for (cell_name, raw_cell) in &raw.cells {
        let mut cell = Cell::new(cell_name.as_str(), raw_cell.ty.as_str());
        for (param, value) in &raw_cell.parameters {
            cell.parameters.insert(param.as_str().into(), value.to_const()?);
        }
        for (port, sig) in &raw_cell.connections {
            let sig = resolve_sig(&module, sig)?;
            cell.connections.insert(port.as_str().into(), sig);
        }
        module.add_cell(cell);
    }

    for (lhs, rhs) in &raw.connections {
        let lhs = resolve_sig(&module, lhs)?;
        let rhs = resolve_sig(&module, rhs)?;
        module.connect(lhs, rhs);
    }

    Ok(module)
}

fn build_attributes(raw: &LinkedHashMap<String, RawValue>) -> SynthResult<Attributes> {
    let mut attributes = Attributes::default();
    for (name, value) in raw {
        attributes.insert(name.as_str(), value.to_const()?);
    }
    Ok(attributes)
}

fn parse_port_role(role: Option<&str>) -> SynthResult<PortRole> {
    match role {
        None => Ok(PortRole::None),
        Some("input") => Ok(PortRole::Input),
        Some("output") => Ok(PortRole::Output),
        Some("inout") => Ok(PortRole::Inout),
        Some(other) => Err(Error::parse_error(format!(
            "invalid port direction `{}`",
            other
        ))),
    }
}

fn resolve_sig(module: &Module, raw: &RawSig) -> SynthResult<SigSpec> {
    let mut sig = SigSpec::new();
    for chunk in raw {
        match chunk {
            RawChunk::Wire(name) => {
                let wire = lookup_wire(module, name)?;
                sig.append_sig(&SigSpec::from_wire(wire));
            }
            RawChunk::Slice(name, offset, width) => {
                let wire = lookup_wire(module, name)?;
                if offset + width > wire.width {
                    return Err(Error::malformed_structure(format!(
                        "slice [{}, {}) out of range for wire `{}` of width {}",
                        offset,
                        offset + width,
                        name,
                        wire.width
                    )));
                }
                sig.append(SigChunk::Slice {
                    wire: wire.name,
                    offset: *offset,
                    width: *width,
                });
            }
            RawChunk::Const { value } => {
                sig.append(SigChunk::Const(Const::from_str_msb(value)?));
            }
        }
    }
    Ok(sig)
}

fn lookup_wire<'a>(module: &'a Module, name: &str) -> SynthResult<&'a Wire> {
    module
        .wire(name)
        .ok_or_else(|| Error::undefined(name.into(), "wire"))
}
