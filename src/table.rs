//! Tabla persistente de tipos.
//!
//! Cada modificación produce una nueva tabla y deja intacta a la
//! anterior. Las entradas se comparten por medio de `Rc`, por lo
//! cual una copia solo duplica los índices que cambian.

use std::{collections::HashMap, ops::Index, rc::Rc};

use crate::types::{DeclaredType, Field, FieldId, Subroutine, SubroutineId, TypeId};
use thiserror::Error;

/// Error de consistencia al modificar la tabla.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Type `{0}` is already present")]
    Duplicate(String),

    #[error("Type `{name}` was added out of order (expected id {expected})")]
    OutOfOrder { name: String, expected: u32 },

    #[error("Type `{0}` was not previously added")]
    MissingType(String),

    #[error("Subroutine `{0}` is not a member of its declaring type")]
    MissingSubroutine(String),
}

#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    types: Rc<Vec<Rc<DeclaredType>>>,
    names: Rc<HashMap<Rc<str>, TypeId>>,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable::default()
    }

    /// Identificador que recibirá el siguiente tipo agregado.
    pub fn next_id(&self) -> TypeId {
        TypeId(self.types.len() as u32)
    }

    /// Agrega un tipo nuevo.
    pub fn with_type(&self, ty: DeclaredType) -> Result<TypeTable, TableError> {
        if self.names.contains_key(&ty.name) {
            return Err(TableError::Duplicate(ty.name.to_string()));
        } else if ty.id != self.next_id() {
            return Err(TableError::OutOfOrder {
                name: ty.name.to_string(),
                expected: self.next_id().0,
            });
        }

        let mut names = HashMap::clone(&self.names);
        names.insert(ty.name.clone(), ty.id);

        let mut types = Vec::clone(&self.types);
        types.push(Rc::new(ty));

        Ok(TypeTable {
            types: Rc::new(types),
            names: Rc::new(names),
        })
    }

    /// Sustituye un tipo existente con el mismo identificador y nombre.
    pub fn with_replaced_type(&self, ty: DeclaredType) -> Result<TypeTable, TableError> {
        let present = self
            .types
            .get(ty.id.0 as usize)
            .map_or(false, |old| old.name == ty.name);

        if !present {
            return Err(TableError::MissingType(ty.name.to_string()));
        }

        let slot = ty.id.0 as usize;
        let mut types = Vec::clone(&self.types);
        types[slot] = Rc::new(ty);

        Ok(TypeTable {
            types: Rc::new(types),
            names: Rc::clone(&self.names),
        })
    }

    /// Sustituye una subrutina dentro de su tipo declarante.
    pub fn with_replaced_subroutine(&self, subroutine: Subroutine) -> Result<TypeTable, TableError> {
        let SubroutineId { ty, index } = subroutine.id;
        let missing = || TableError::MissingSubroutine(subroutine.full_name.to_string());

        let declaring = self.types.get(ty.0 as usize).ok_or_else(missing)?;
        let present = declaring
            .subroutines
            .get(index as usize)
            .map_or(false, |old| old.name == subroutine.name);

        if !present {
            return Err(missing());
        }

        let mut declaring = DeclaredType::clone(declaring);
        declaring.subroutines[index as usize] = Rc::new(subroutine);

        self.with_replaced_type(declaring)
    }

    pub fn lookup(&self, name: &str) -> Option<&Rc<DeclaredType>> {
        self.names.get(name).map(|id| &self.types[id.0 as usize])
    }

    pub fn get(&self, id: TypeId) -> Option<&Rc<DeclaredType>> {
        self.types.get(id.0 as usize)
    }

    pub fn subroutine(&self, id: SubroutineId) -> Option<&Rc<Subroutine>> {
        self.get(id.ty)?.subroutines.get(id.index as usize)
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.get(id.ty)?.fields.get(id.index as usize)
    }

    /// Tipos en orden de inserción.
    pub fn iter(&self) -> impl Iterator<Item = &Rc<DeclaredType>> {
        self.types.iter()
    }

    /// Todas las subrutinas, por tipo y luego en orden de declaración.
    pub fn subroutines(&self) -> impl Iterator<Item = &Rc<Subroutine>> {
        self.types.iter().flat_map(|ty| ty.subroutines.iter())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Index<TypeId> for TypeTable {
    type Output = DeclaredType;

    fn index(&self, id: TypeId) -> &DeclaredType {
        &self.types[id.0 as usize]
    }
}

impl Index<SubroutineId> for TypeTable {
    type Output = Subroutine;

    fn index(&self, id: SubroutineId) -> &Subroutine {
        &self.types[id.ty.0 as usize].subroutines[id.index as usize]
    }
}

impl Index<FieldId> for TypeTable {
    type Output = Field;

    fn index(&self, id: FieldId) -> &Field {
        &self.types[id.ty.0 as usize].fields[id.index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cfg::ControlFlowGraph,
        types::{CompiledBody, Primitive, ValueType},
    };

    fn declared(id: u32, name: &str, subroutines: &[&str]) -> DeclaredType {
        let id = TypeId(id);
        let subroutines = subroutines
            .iter()
            .enumerate()
            .map(|(index, sub)| {
                Rc::new(Subroutine {
                    id: SubroutineId {
                        ty: id,
                        index: index as u32,
                    },
                    name: (*sub).into(),
                    full_name: format!("{}::{}", name, sub).into(),
                    parameters: vec![],
                    locals: vec![],
                    returns: ValueType::void(),
                    entry_point: false,
                    root: false,
                    intrinsic: None,
                    instructions: Rc::new([]),
                    cfg: Rc::new(ControlFlowGraph::build(&[])),
                    body: None,
                })
            })
            .collect();

        DeclaredType {
            id,
            name: name.into(),
            base: None,
            fields: vec![],
            subroutines,
            value: ValueType::Primitive(Primitive::Object),
        }
    }

    #[test]
    fn additions_leave_the_original_untouched() {
        let empty = TypeTable::new();
        let one = empty.with_type(declared(0, "Game", &["Main"])).unwrap();

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.lookup("Game").map(|ty| ty.id), Some(TypeId(0)));
        assert!(empty.lookup("Game").is_none());
    }

    #[test]
    fn duplicate_or_out_of_order_types_are_rejected() {
        let table = TypeTable::new().with_type(declared(0, "Game", &[])).unwrap();

        assert_eq!(
            table.with_type(declared(1, "Game", &[])).unwrap_err(),
            TableError::Duplicate("Game".into())
        );

        assert!(matches!(
            table.with_type(declared(5, "Other", &[])),
            Err(TableError::OutOfOrder { expected: 1, .. })
        ));
    }

    #[test]
    fn replacing_a_subroutine_is_persistent() {
        let before = TypeTable::new().with_type(declared(0, "Game", &["Main", "Tick"])).unwrap();
        let id = SubroutineId {
            ty: TypeId(0),
            index: 1,
        };

        let compiled = before[id].with_body(CompiledBody::default());
        let after = before.with_replaced_subroutine(compiled).unwrap();

        assert!(before[id].body.is_none());
        assert!(after[id].body.is_some());
        assert_eq!(after.subroutines().count(), 2);
    }

    #[test]
    fn replaced_types_keep_their_slot() {
        let before = TypeTable::new()
            .with_type(declared(0, "Game", &["Main"]))
            .and_then(|table| table.with_type(declared(1, "Sound", &[])))
            .unwrap();

        let after = before.with_replaced_type(declared(0, "Game", &["Main", "Tick"])).unwrap();

        assert_eq!(before[TypeId(0)].subroutines.len(), 1);
        assert_eq!(after[TypeId(0)].subroutines.len(), 2);
        assert_eq!(after.lookup("Sound").map(|ty| ty.id), Some(TypeId(1)));
    }

    #[test]
    fn replacing_missing_entries_fails() {
        let table = TypeTable::new().with_type(declared(0, "Game", &["Main"])).unwrap();

        let stranger = declared(0, "Stranger", &[]);
        assert_eq!(
            table.with_replaced_type(stranger).unwrap_err(),
            TableError::MissingType("Stranger".into())
        );

        let mut orphan = Subroutine::clone(&declared(0, "Game", &["Main", "Orphan"]).subroutines[1]);
        orphan.body = Some(CompiledBody::default());
        assert!(matches!(
            table.with_replaced_subroutine(orphan),
            Err(TableError::MissingSubroutine(_))
        ));
    }
}
