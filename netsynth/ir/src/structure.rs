//! Representation for structure (wires, cells, and connections) in a design.
use crate::{Attributes, Const, SigSpec};
use linked_hash_map::LinkedHashMap;
use netsynth_utils::Id;

/// The port role of a wire within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortRole {
    /// An internal wire.
    #[default]
    None,
    Input,
    Output,
    /// Marked as both input and output. Representable so that backends can
    /// reject it.
    Inout,
}

impl PortRole {
    pub fn is_port(self) -> bool {
        !matches!(self, PortRole::None)
    }

    pub fn is_input(self) -> bool {
        matches!(self, PortRole::Input)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PortRole::Output)
    }
}

/// A named bit-vector within a module.
#[derive(Debug, Clone)]
pub struct Wire {
    pub name: Id,
    /// Bit width, at least 1.
    pub width: u64,
    pub port: PortRole,
    pub attributes: Attributes,
}

impl Wire {
    pub fn new(name: impl Into<Id>, width: u64) -> Self {
        Wire {
            name: name.into(),
            width,
            port: PortRole::None,
            attributes: Attributes::default(),
        }
    }

    pub fn with_port(mut self, port: PortRole) -> Self {
        self.port = port;
        self
    }
}

/// A cell: a primitive operator (type tag starting with `$`) or an instance
/// of another module in the design.
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: Id,
    pub ty: Id,
    pub parameters: LinkedHashMap<Id, Const>,
    pub connections: LinkedHashMap<Id, SigSpec>,
}

impl Cell {
    pub fn new(name: impl Into<Id>, ty: impl Into<Id>) -> Self {
        Cell {
            name: name.into(),
            ty: ty.into(),
            parameters: LinkedHashMap::new(),
            connections: LinkedHashMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<Id>, value: Const) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_port(mut self, name: impl Into<Id>, sig: SigSpec) -> Self {
        self.connections.insert(name.into(), sig);
        self
    }

    pub fn param(&self, name: impl Into<Id>) -> Option<&Const> {
        self.parameters.get(&name.into())
    }

    pub fn port(&self, name: impl Into<Id>) -> Option<&SigSpec> {
        self.connections.get(&name.into())
    }

    /// True for `$`-prefixed type tags with fixed, built-in semantics.
    pub fn is_builtin(&self) -> bool {
        self.ty.as_ref().starts_with('$') && !self.ty.as_ref().starts_with("$paramod")
    }
}

/// A module-level point-to-point connection: `lhs` is driven by `rhs`.
#[derive(Debug, Clone)]
pub struct Connection {
    pub lhs: SigSpec,
    pub rhs: SigSpec,
}

/// A named module: wires, cells, and connections in insertion order.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Id,
    wires: LinkedHashMap<Id, Wire>,
    cells: LinkedHashMap<Id, Cell>,
    pub connections: Vec<Connection>,
    pub attributes: Attributes,
}

impl Module {
    pub fn new(name: impl Into<Id>) -> Self {
        Module {
            name: name.into(),
            wires: LinkedHashMap::new(),
            cells: LinkedHashMap::new(),
            connections: Vec::new(),
            attributes: Attributes::default(),
        }
    }

    pub fn add_wire(&mut self, wire: Wire) -> Id {
        let name = wire.name;
        self.wires.insert(name, wire);
        name
    }

    pub fn add_cell(&mut self, cell: Cell) -> Id {
        let name = cell.name;
        self.cells.insert(name, cell);
        name
    }

    pub fn remove_cell(&mut self, name: impl Into<Id>) -> Option<Cell> {
        self.cells.remove(&name.into())
    }

    pub fn connect(&mut self, lhs: SigSpec, rhs: SigSpec) {
        self.connections.push(Connection { lhs, rhs });
    }

    pub fn wire(&self, name: impl Into<Id>) -> Option<&Wire> {
        self.wires.get(&name.into())
    }

    pub fn cell(&self, name: impl Into<Id>) -> Option<&Cell> {
        self.cells.get(&name.into())
    }

    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Names of all wires and cells, for seeding fresh-name generators.
    pub fn defined_names(&self) -> impl Iterator<Item = Id> + '_ {
        self.wires.keys().chain(self.cells.keys()).copied()
    }
}
