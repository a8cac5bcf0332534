//! Modelo de tipos, campos y subrutinas.
//!
//! Todos estos ítems son inmutables una vez construidos. Las
//! subrutinas compiladas se reemplazan en la tabla de tipos
//! ([`crate::table::TypeTable`]) por copias con cuerpo.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use crate::{
    arch::{Line, Register, Symbol},
    cfg::ControlFlowGraph,
    ir,
};

/// Índice de un tipo declarado dentro de la tabla.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

/// Campo `index` del tipo `ty`, en orden de declaración.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId {
    pub ty: TypeId,
    pub index: u32,
}

/// Subrutina `index` del tipo `ty`, en orden de declaración.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubroutineId {
    pub ty: TypeId,
    pub index: u32,
}

/// Tipos predefinidos.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Object,
    Value,
    Void,
    Byte,
    Bool,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::Object,
        Primitive::Value,
        Primitive::Void,
        Primitive::Byte,
        Primitive::Bool,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Object => "object",
            Primitive::Value => "value",
            Primitive::Void => "void",
            Primitive::Byte => "byte",
            Primitive::Bool => "bool",
        }
    }

    pub fn size(self) -> usize {
        match self {
            Primitive::Byte | Primitive::Bool => 1,
            Primitive::Object | Primitive::Value | Primitive::Void => 0,
        }
    }

    /// Tipo base implícito.
    pub fn base(self) -> Option<Primitive> {
        match self {
            Primitive::Object => None,
            Primitive::Value => Some(Primitive::Object),
            _ => Some(Primitive::Value),
        }
    }
}

/// Disposición de campos de instancia de un tipo compuesto.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub name: Rc<str>,

    /// Tamaño de los campos propios, sin contar la base.
    pub own_size: usize,

    /// Campos de instancia, heredados primero.
    pub fields: Vec<FieldLayout>,
}

impl Layout {
    pub fn size(&self) -> usize {
        self.fields
            .iter()
            .map(|field| field.offset + field.ty.size())
            .max()
            .unwrap_or(0)
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|field| &*field.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    pub name: Rc<str>,
    pub ty: ValueType,
    pub offset: usize,
}

/// Valor conocido durante compilación.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileTimeConstant {
    pub value: Vec<u8>,
    pub ty: ValueType,
}

/// Tipo de un valor, tal como ocupa memoria o la pila.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType {
    Primitive(Primitive),
    Struct(Rc<Layout>),
    Pointer {
        target: Rc<ValueType>,

        /// Apunta a página cero, por lo cual mide un solo byte.
        fast_page: bool,
    },
    Constant(Rc<CompileTimeConstant>),
}

impl ValueType {
    pub fn byte() -> Self {
        ValueType::Primitive(Primitive::Byte)
    }

    pub fn bool() -> Self {
        ValueType::Primitive(Primitive::Bool)
    }

    pub fn void() -> Self {
        ValueType::Primitive(Primitive::Void)
    }

    pub fn pointer_to(target: ValueType, fast_page: bool) -> Self {
        ValueType::Pointer {
            target: Rc::new(target),
            fast_page,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ValueType::Primitive(primitive) => primitive.name().to_owned(),
            ValueType::Struct(layout) => layout.name.to_string(),
            ValueType::Pointer { target, fast_page } => {
                let prefix = if *fast_page { "{zp}" } else { "" };
                format!("{}{}*", prefix, target.name())
            }

            ValueType::Constant(constant) => format!("const {}", constant.ty.name()),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ValueType::Primitive(primitive) => primitive.size(),
            ValueType::Struct(layout) => layout.size(),
            ValueType::Pointer { fast_page: true, .. } => 1,
            ValueType::Pointer { fast_page: false, .. } => 2,
            ValueType::Constant(constant) => constant.ty.size(),
        }
    }

    /// Campos de instancia, vacío para todo lo que no es compuesto.
    pub fn fields(&self) -> &[FieldLayout] {
        match self {
            ValueType::Struct(layout) => &layout.fields,
            ValueType::Constant(constant) => constant.ty.fields(),
            _ => &[],
        }
    }

    pub fn is_void(&self) -> bool {
        self.size() == 0
    }
}

impl Display for ValueType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.name())
    }
}

/// Campo declarado, estático o de instancia.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub name: Rc<str>,
    pub ty: ValueType,
    pub is_static: bool,

    /// Desplazamiento dentro de la instancia, `None` si es estático.
    pub offset: Option<usize>,
}

/// Un tipo declarado y sus miembros.
#[derive(Clone, Debug)]
pub struct DeclaredType {
    pub id: TypeId,
    pub name: Rc<str>,
    pub base: Option<TypeId>,
    pub fields: Vec<Field>,
    pub subroutines: Vec<Rc<Subroutine>>,

    /// Forma en que aparecen los valores de este tipo.
    pub value: ValueType,
}

impl DeclaredType {
    pub fn size(&self) -> usize {
        self.value.size()
    }

    pub fn own_size(&self) -> usize {
        match &self.value {
            ValueType::Struct(layout) => layout.own_size,
            other => other.size(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| &*field.name == name)
    }

    pub fn subroutine(&self, name: &str) -> Option<&Rc<Subroutine>> {
        self.subroutines.iter().find(|sub| &*sub.name == name)
    }
}

/// Evaluador invocado en tiempo de compilación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Evaluator {
    /// Reinterpreta una constante de un byte con el tipo de retorno.
    Convert,

    /// Emite una tabla de bytes en ROM y produce un puntero a ella.
    Data,
}

/// Tratamiento especial de una subrutina durante generación de código.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    StoreToSymbol { symbol: Symbol, strobe: bool },
    LoadFromSymbol { symbol: Symbol },
    LoadToRegister { register: Register },
    AlwaysInline,
    UseProvidedImplementation { implementation: Rc<str> },
    IgnoreImplementation,
    CompileTimeExecuted { evaluator: Evaluator },
}

impl Intrinsic {
    pub fn name(&self) -> &'static str {
        match self {
            Intrinsic::StoreToSymbol { .. } => "store_to_symbol",
            Intrinsic::LoadFromSymbol { .. } => "load_from_symbol",
            Intrinsic::LoadToRegister { .. } => "load_to_register",
            Intrinsic::AlwaysInline => "always_inline",
            Intrinsic::UseProvidedImplementation { .. } => "use_provided_implementation",
            Intrinsic::IgnoreImplementation => "ignore_implementation",
            Intrinsic::CompileTimeExecuted { .. } => "compile_time_executed",
        }
    }

    /// La llamada se reemplaza en el sitio de invocación y la subrutina
    /// nunca se compila por sí misma.
    pub fn replaces_call_site(&self) -> bool {
        matches!(
            self,
            Intrinsic::StoreToSymbol { .. }
                | Intrinsic::LoadFromSymbol { .. }
                | Intrinsic::LoadToRegister { .. }
                | Intrinsic::CompileTimeExecuted { .. }
        )
    }
}

/// Cuerpo compilado de una subrutina.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledBody {
    pub code: Rc<[Line]>,

    /// Tablas en ROM, se disponen luego del código.
    pub data: Rc<[Line]>,
}

#[derive(Clone, Debug)]
pub struct Subroutine {
    pub id: SubroutineId,
    pub name: Rc<str>,

    /// `Tipo::Nombre`.
    pub full_name: Rc<str>,

    pub parameters: Vec<ValueType>,
    pub locals: Vec<ValueType>,
    pub returns: ValueType,
    pub entry_point: bool,
    pub root: bool,
    pub intrinsic: Option<Intrinsic>,
    pub instructions: Rc<[ir::Instruction]>,
    pub cfg: Rc<ControlFlowGraph>,
    pub body: Option<CompiledBody>,
}

impl Subroutine {
    /// Etiqueta de ensamblador de la subrutina.
    pub fn label(&self) -> Symbol {
        mangle(&self.full_name).into()
    }

    pub fn with_body(&self, body: CompiledBody) -> Subroutine {
        Subroutine {
            body: Some(body),
            ..self.clone()
        }
    }

    pub fn is(&self, intrinsic: fn(&Intrinsic) -> bool) -> bool {
        self.intrinsic.as_ref().map_or(false, intrinsic)
    }
}

impl Display for Subroutine {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.full_name)
    }
}

/// Convierte un nombre calificado en un identificador de ensamblador.
///
/// Todo caracter fuera de `[A-Za-z0-9_]` se reemplaza por `_`.
pub fn mangle(name: &str) -> String {
    let mut mangled = String::with_capacity(name.len());
    let mut last_was_separator = false;

    for c in name.chars() {
        match c {
            ':' if last_was_separator => continue,
            ':' => {
                mangled.push('_');
                last_was_separator = true;
                continue;
            }

            c if c.is_ascii_alphanumeric() || c == '_' => mangled.push(c),
            _ => mangled.push('_'),
        }

        last_was_separator = false;
    }

    mangled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangled_names_are_assembler_identifiers() {
        assert_eq!(mangle("Game::Main"), "Game_Main");
        assert_eq!(mangle("Atari.Vcs::Tia.Wsync"), "Atari_Vcs_Tia_Wsync");
        assert_eq!(mangle("List<byte>::Get"), "List_byte__Get");
    }

    #[test]
    fn pointer_size_depends_on_page() {
        let fast = ValueType::pointer_to(ValueType::byte(), true);
        let slow = ValueType::pointer_to(ValueType::byte(), false);

        assert_eq!(fast.size(), 1);
        assert_eq!(slow.size(), 2);
        assert_eq!(fast.name(), "{zp}byte*");
        assert_eq!(slow.name(), "byte*");
    }

    #[test]
    fn struct_size_covers_inherited_fields() {
        let layout = Layout {
            name: "Derived".into(),
            own_size: 1,
            fields: vec![
                FieldLayout {
                    name: "a".into(),
                    ty: ValueType::byte(),
                    offset: 0,
                },
                FieldLayout {
                    name: "b".into(),
                    ty: ValueType::pointer_to(ValueType::byte(), false),
                    offset: 1,
                },
            ],
        };

        let ty = ValueType::Struct(Rc::new(layout));
        assert_eq!(ty.size(), 3);
        assert_eq!(ty.fields().len(), 2);
        assert!(!ty.is_void());
        assert!(ValueType::void().is_void());
    }
}
