//! Ingesta del modelo del front end.
//!
//! Aquí se resuelven todos los nombres del modelo de entrada contra
//! la tabla de tipos: tipos de campos, parámetros y locales, operandos
//! de instrucciones e intrínsecos. La resolución de tipos es perezosa
//! y recursiva, de modo que el orden de declaración no importa. El
//! primer error encontrado detiene la ingesta.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use tracing::debug;

use crate::{
    cfg::ControlFlowGraph,
    error::CompileError,
    frontend::{
        EvaluatorDecl, InstructionDecl, IntrinsicDecl, MemberRef, Module, OperandDecl, SubroutineDecl,
        TypeDecl,
    },
    ir::{Instruction, Opcode, Operand},
    layout,
    table::TypeTable,
    types::{
        DeclaredType, Evaluator, Field, FieldId, Intrinsic, Primitive, Subroutine, SubroutineId,
        TypeId, ValueType,
    },
};

type MemberTable<'m> = HashMap<(TypeId, &'m str), u32>;

/// Resultado de la ingesta.
#[derive(Clone, Debug)]
pub struct Ingested {
    pub types: TypeTable,
    pub entry: SubroutineId,
}

/// Resuelve un módulo de entrada en una tabla de tipos.
pub fn ingest(module: &Module) -> Result<Ingested, CompileError> {
    Ingest::new(module)?.run()
}

#[derive(Copy, Clone)]
enum Origin<'m> {
    Builtin(Primitive),
    Declared(&'m TypeDecl),
}

struct Ingest<'m> {
    origins: Vec<Origin<'m>>,
    ids: HashMap<&'m str, TypeId>,
    resolved: Vec<Option<ValueType>>,
    in_progress: HashSet<TypeId>,
    fields: MemberTable<'m>,
    subroutines: MemberTable<'m>,
}

impl<'m> Ingest<'m> {
    fn new(module: &'m Module) -> Result<Self, CompileError> {
        let mut origins: Vec<Origin<'m>> = Primitive::ALL.iter().copied().map(Origin::Builtin).collect();
        origins.extend(module.types.iter().map(Origin::Declared));

        let mut ids = HashMap::new();
        let mut fields = HashMap::new();
        let mut subroutines = HashMap::new();

        for (index, origin) in origins.iter().copied().enumerate() {
            let id = TypeId(index as u32);
            let name = match origin {
                Origin::Builtin(primitive) => primitive.name(),
                Origin::Declared(decl) => decl.name.as_str(),
            };

            if ids.insert(name, id).is_some() {
                return Err(CompileError::DuplicateType(name.to_owned()));
            }

            let Origin::Declared(decl) = origin else {
                continue;
            };

            index_members(id, decl, decl.fields.iter().map(|field| field.name.as_str()), &mut fields)?;
            index_members(id, decl, decl.subroutines.iter().map(|sub| sub.name.as_str()), &mut subroutines)?;
        }

        Ok(Ingest {
            resolved: vec![None; origins.len()],
            origins,
            ids,
            in_progress: HashSet::new(),
            fields,
            subroutines,
        })
    }

    fn run(mut self) -> Result<Ingested, CompileError> {
        for index in 0..self.origins.len() {
            self.resolve(TypeId(index as u32))?;
        }

        let mut types = TypeTable::new();
        for index in 0..self.origins.len() {
            let declared = self.declare(TypeId(index as u32))?;
            types = types.with_type(declared)?;
        }

        let entries: Vec<&Rc<Subroutine>> = types.subroutines().filter(|sub| sub.entry_point).collect();
        let entry = match entries.as_slice() {
            [] => return Err(CompileError::NoEntryPoint),
            [entry] => entry.id,
            _ => {
                let names = entries.iter().map(|sub| sub.full_name.to_string()).collect();
                return Err(CompileError::MultipleEntryPoints(names));
            }
        };

        debug!("Ingested {} types", types.len());
        Ok(Ingested { types, entry })
    }

    fn name(&self, id: TypeId) -> &'m str {
        match self.origins[id.0 as usize] {
            Origin::Builtin(primitive) => primitive.name(),
            Origin::Declared(decl) => &decl.name,
        }
    }

    fn lookup(&self, name: &str) -> Result<TypeId, CompileError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnresolvedType(name.to_owned()))
    }

    /// Tipo base; `object` cuando un tipo declarado no indica uno.
    fn base_of(&self, id: TypeId) -> Result<Option<TypeId>, CompileError> {
        match self.origins[id.0 as usize] {
            Origin::Builtin(primitive) => Ok(primitive.base().map(|base| self.ids[base.name()])),
            Origin::Declared(decl) => {
                let base = decl.base.as_deref().unwrap_or(Primitive::Object.name());
                self.lookup(base).map(Some)
            }
        }
    }

    /// Resuelve la forma de los valores de un tipo, junto con su disposición.
    fn resolve(&mut self, id: TypeId) -> Result<ValueType, CompileError> {
        if let Some(resolved) = &self.resolved[id.0 as usize] {
            return Ok(resolved.clone());
        } else if !self.in_progress.insert(id) {
            return Err(CompileError::RecursiveLayout(self.name(id).to_owned()));
        }

        let value = match self.origins[id.0 as usize] {
            Origin::Builtin(primitive) => ValueType::Primitive(primitive),
            Origin::Declared(decl) => {
                let base = match self.base_of(id)? {
                    Some(base) => self.resolve(base)?,
                    None => ValueType::Primitive(Primitive::Object),
                };

                let base = match &base {
                    ValueType::Struct(layout) => Some(Rc::clone(layout)),
                    _ => None,
                };

                let mut fields = Vec::new();
                for field in decl.fields.iter().filter(|field| !field.is_static) {
                    fields.push((field.name.as_str(), self.value_type(&field.ty)?));
                }

                let layout = layout::lay_out(&decl.name, base.as_deref(), fields);
                ValueType::Struct(Rc::new(layout))
            }
        };

        self.in_progress.remove(&id);
        self.resolved[id.0 as usize] = Some(value.clone());

        Ok(value)
    }

    /// Resuelve una referencia textual a un tipo: `T`, `T*` o `{zp}T*`.
    fn value_type(&mut self, name: &str) -> Result<ValueType, CompileError> {
        let name = name.trim();
        match name.strip_suffix('*') {
            Some(target) => {
                let (fast_page, target) = match target.strip_prefix("{zp}") {
                    Some(target) => (true, target),
                    None => (false, target),
                };

                Ok(ValueType::pointer_to(self.value_type(target)?, fast_page))
            }

            None => {
                let id = self.lookup(name)?;
                self.resolve(id)
            }
        }
    }

    fn declare(&mut self, id: TypeId) -> Result<DeclaredType, CompileError> {
        let value = self.resolve(id)?;
        let base = self.base_of(id)?;
        let name: Rc<str> = self.name(id).into();

        let decl = match self.origins[id.0 as usize] {
            Origin::Builtin(_) => {
                return Ok(DeclaredType {
                    id,
                    name,
                    base,
                    fields: Vec::new(),
                    subroutines: Vec::new(),
                    value,
                })
            }

            Origin::Declared(decl) => decl,
        };

        if let Some(counts) = decl.symbols {
            let check = |what: &'static str, expected: usize, found: usize| {
                if expected == found {
                    Ok(())
                } else {
                    Err(CompileError::CountMismatch {
                        ty: decl.name.clone(),
                        what,
                        expected,
                        found,
                    })
                }
            };

            check("fields", counts.fields, decl.fields.len())?;
            check("subroutines", counts.subroutines, decl.subroutines.len())?;
        }

        let own_start = match &value {
            ValueType::Struct(layout) => layout.size() - layout.own_size,
            _ => 0,
        };

        let mut offset = own_start;
        let mut fields = Vec::with_capacity(decl.fields.len());

        for (index, field) in decl.fields.iter().enumerate() {
            let ty = self.value_type(&field.ty)?;
            let field_offset = (!field.is_static).then(|| offset);
            if !field.is_static {
                offset += ty.size();
            }

            fields.push(Field {
                id: FieldId {
                    ty: id,
                    index: index as u32,
                },
                name: field.name.as_str().into(),
                ty,
                is_static: field.is_static,
                offset: field_offset,
            });
        }

        let mut subroutines = Vec::with_capacity(decl.subroutines.len());
        for (index, sub) in decl.subroutines.iter().enumerate() {
            let sub_id = SubroutineId {
                ty: id,
                index: index as u32,
            };

            subroutines.push(Rc::new(self.subroutine(sub_id, &decl.name, sub)?));
        }

        Ok(DeclaredType {
            id,
            name,
            base,
            fields,
            subroutines,
            value,
        })
    }

    fn subroutine(&mut self, id: SubroutineId, ty: &str, decl: &'m SubroutineDecl) -> Result<Subroutine, CompileError> {
        let full_name = format!("{}::{}", ty, decl.name);

        let parameters = self.value_types(&decl.parameters)?;
        let locals = self.value_types(&decl.locals)?;
        let returns = self.value_type(&decl.returns)?;

        let len = decl.instructions.len();
        let mut instructions = Vec::with_capacity(len);
        for (index, instruction) in decl.instructions.iter().enumerate() {
            let resolved = self.instruction(&full_name, index, instruction, len, &parameters, &locals)?;
            instructions.push(resolved);
        }

        let intrinsic = match &decl.intrinsic {
            Some(intrinsic) => Some(intrinsic_of(&full_name, intrinsic, &parameters, &returns)?),
            None => None,
        };

        let cfg = ControlFlowGraph::build(&instructions);

        Ok(Subroutine {
            id,
            name: decl.name.as_str().into(),
            full_name: full_name.into(),
            parameters,
            locals,
            returns,
            entry_point: decl.entry_point,
            root: decl.root,
            intrinsic,
            instructions: instructions.into(),
            cfg: Rc::new(cfg),
            body: None,
        })
    }

    fn value_types(&mut self, names: &[String]) -> Result<Vec<ValueType>, CompileError> {
        names.iter().map(|name| self.value_type(name)).collect()
    }

    fn instruction(
        &mut self,
        subroutine: &str,
        index: usize,
        decl: &'m InstructionDecl,
        len: usize,
        parameters: &[ValueType],
        locals: &[ValueType],
    ) -> Result<Instruction, CompileError> {
        let bad_slot = |what, slot| CompileError::BadSlot {
            subroutine: subroutine.to_owned(),
            what,
            slot,
        };

        let opcode = Opcode::from_name(&decl.opcode);
        let operand = match &decl.operand {
            None => Operand::None,
            Some(OperandDecl::Constant(value)) => Operand::Constant(*value),
            Some(OperandDecl::Type(name)) => Operand::Type(self.value_type(name)?),
            Some(OperandDecl::Field(member)) => Operand::Field(self.field(member)?),
            Some(OperandDecl::Method(member)) => Operand::Method(self.method(member)?),

            Some(OperandDecl::Local(n)) if usize::from(*n) < locals.len() => Operand::Local(*n),
            Some(OperandDecl::Local(n)) => return Err(bad_slot("local", *n)),

            Some(OperandDecl::Argument(n)) if usize::from(*n) < parameters.len() => Operand::Argument(*n),
            Some(OperandDecl::Argument(n)) => return Err(bad_slot("parameter", *n)),

            Some(OperandDecl::Target(target)) if *target < len => Operand::Target(*target),
            Some(OperandDecl::Target(target)) => {
                return Err(CompileError::BadBranchTarget {
                    subroutine: subroutine.to_owned(),
                    index,
                    target: *target,
                })
            }
        };

        let expected = opcode.operand_kind();
        if !matches!(opcode, Opcode::Other(_)) && operand.kind() != expected {
            return Err(CompileError::BadOperand {
                subroutine: subroutine.to_owned(),
                index,
                opcode: opcode.to_string(),
                expected: expected.name(),
            });
        }

        if let Operand::Constant(value) = operand {
            if !(0..=0xff).contains(&value) {
                return Err(CompileError::ConstantOverflow {
                    subroutine: subroutine.to_owned(),
                    index,
                    value,
                });
            }
        }

        Ok(Instruction::new(opcode, operand))
    }

    /// Busca un campo en el tipo indicado y luego en sus tipos base.
    fn field(&self, member: &'m MemberRef) -> Result<FieldId, CompileError> {
        self.member(member, &self.fields)
            .map(|(ty, index)| FieldId { ty, index })
            .ok_or_else(|| CompileError::UnresolvedField {
                ty: member.ty.clone(),
                name: member.name.clone(),
            })
    }

    fn method(&self, member: &'m MemberRef) -> Result<SubroutineId, CompileError> {
        self.member(member, &self.subroutines)
            .map(|(ty, index)| SubroutineId { ty, index })
            .ok_or_else(|| CompileError::UnresolvedSubroutine {
                ty: member.ty.clone(),
                name: member.name.clone(),
            })
    }

    fn member(&self, member: &'m MemberRef, table: &MemberTable<'m>) -> Option<(TypeId, u32)> {
        let mut current = self.ids.get(member.ty.as_str()).copied();
        while let Some(ty) = current {
            if let Some(&index) = table.get(&(ty, member.name.as_str())) {
                return Some((ty, index));
            }

            current = self.base_of(ty).ok().flatten();
        }

        None
    }
}

/// Indexa los miembros de un tipo por nombre, rechazando duplicados.
fn index_members<'m, I>(id: TypeId, decl: &TypeDecl, names: I, table: &mut MemberTable<'m>) -> Result<(), CompileError>
where
    I: Iterator<Item = &'m str>,
{
    for (index, name) in names.enumerate() {
        if table.insert((id, name), index as u32).is_some() {
            return Err(CompileError::DuplicateMember {
                ty: decl.name.clone(),
                name: name.to_owned(),
            });
        }
    }

    Ok(())
}

/// Resuelve y valida un intrínseco.
fn intrinsic_of(
    subroutine: &str,
    decl: &IntrinsicDecl,
    parameters: &[ValueType],
    returns: &ValueType,
) -> Result<Intrinsic, CompileError> {
    let (intrinsic, arity) = match decl {
        IntrinsicDecl::StoreToSymbol { symbol, strobe } => {
            let intrinsic = Intrinsic::StoreToSymbol {
                symbol: symbol.as_str().into(),
                strobe: *strobe,
            };

            (intrinsic, Some(if *strobe { 0 } else { 1 }))
        }

        IntrinsicDecl::LoadFromSymbol { symbol } => {
            let symbol = symbol.as_str().into();
            (Intrinsic::LoadFromSymbol { symbol }, Some(0))
        }

        IntrinsicDecl::LoadToRegister { register } => {
            let register = register.parse().map_err(|_| CompileError::UnknownRegister {
                subroutine: subroutine.to_owned(),
                register: register.clone(),
            })?;

            (Intrinsic::LoadToRegister { register }, Some(1))
        }

        IntrinsicDecl::AlwaysInline => (Intrinsic::AlwaysInline, None),
        IntrinsicDecl::IgnoreImplementation => (Intrinsic::IgnoreImplementation, None),

        IntrinsicDecl::UseProvidedImplementation { implementation } => {
            let implementation = implementation.as_str().into();
            (Intrinsic::UseProvidedImplementation { implementation }, None)
        }

        IntrinsicDecl::CompileTimeExecuted(evaluator) => match evaluator {
            EvaluatorDecl::Convert => {
                let evaluator = Evaluator::Convert;
                (Intrinsic::CompileTimeExecuted { evaluator }, Some(1))
            }

            EvaluatorDecl::Data => {
                let evaluator = Evaluator::Data;
                (Intrinsic::CompileTimeExecuted { evaluator }, None)
            }
        },
    };

    if let Some(expected) = arity.filter(|&expected| expected != parameters.len()) {
        return Err(CompileError::IntrinsicArity {
            subroutine: subroutine.to_owned(),
            intrinsic: intrinsic.name(),
            expected,
            found: parameters.len(),
        });
    }

    // Estos intrínsecos transitan por el acumulador, un byte a la vez
    let moved = match &intrinsic {
        Intrinsic::StoreToSymbol { .. } | Intrinsic::LoadToRegister { .. } => parameters.first(),
        Intrinsic::LoadFromSymbol { .. } => Some(returns),
        _ => None,
    };

    match moved {
        Some(ty) if ty.size() != 1 => Err(CompileError::IntrinsicWidth {
            subroutine: subroutine.to_owned(),
            intrinsic: intrinsic.name(),
            ty: ty.to_string(),
        }),

        _ => Ok(intrinsic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module(value: serde_json::Value) -> Module {
        serde_json::from_value(value).unwrap()
    }

    fn entry() -> serde_json::Value {
        json!({
            "name": "Main",
            "entry": true,
            "instructions": [{ "opcode": "ret" }]
        })
    }

    #[test]
    fn layouts_resolve_in_any_order() {
        let input = module(json!({
            "types": [
                {
                    "name": "Game",
                    "fields": [
                        { "name": "Player", "type": "Sprite", "static": true },
                        { "name": "Score", "type": "byte" }
                    ],
                    "subroutines": [entry()]
                },
                {
                    "name": "Sprite",
                    "base": "Position",
                    "fields": [{ "name": "Graphics", "type": "byte*" }]
                },
                {
                    "name": "Position",
                    "fields": [
                        { "name": "X", "type": "byte" },
                        { "name": "Y", "type": "byte" }
                    ]
                }
            ]
        }));

        let Ingested { types, entry } = ingest(&input).unwrap();
        let sprite = types.lookup("Sprite").unwrap();

        assert_eq!(sprite.size(), 4);
        assert_eq!(sprite.own_size(), 2);
        assert_eq!(sprite.fields[0].offset, Some(2));
        assert_eq!(sprite.value.fields().len(), 3);

        let game = types.lookup("Game").unwrap();
        assert_eq!(game.size(), 1);
        assert_eq!(game.fields[0].offset, None);
        assert_eq!(game.fields[1].offset, Some(0));
        assert_eq!(&*types[entry].full_name, "Game::Main");
    }

    #[test]
    fn self_containing_types_are_rejected() {
        let input = module(json!({
            "types": [
                { "name": "Node", "fields": [{ "name": "Next", "type": "Node" }] },
                { "name": "Game", "subroutines": [entry()] }
            ]
        }));

        assert!(matches!(
            ingest(&input),
            Err(CompileError::RecursiveLayout(name)) if name == "Node"
        ));
    }

    #[test]
    fn pointer_syntax_selects_the_page() {
        let input = module(json!({
            "types": [{
                "name": "Game",
                "fields": [
                    { "name": "Fast", "type": "{zp}byte*", "static": true },
                    { "name": "Slow", "type": "byte*", "static": true }
                ],
                "subroutines": [entry()]
            }]
        }));

        let types = ingest(&input).unwrap().types;
        let game = types.lookup("Game").unwrap();
        assert_eq!(game.fields[0].ty.size(), 1);
        assert_eq!(game.fields[1].ty.size(), 2);
    }

    #[test]
    fn symbol_counts_must_agree() {
        let input = module(json!({
            "types": [{
                "name": "Game",
                "symbols": { "fields": 2, "subroutines": 1 },
                "fields": [{ "name": "Frame", "type": "byte", "static": true }],
                "subroutines": [entry()]
            }]
        }));

        assert!(matches!(
            ingest(&input),
            Err(CompileError::CountMismatch { what: "fields", expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn accumulator_intrinsics_move_single_bytes() {
        let wide_store = module(json!({
            "types": [{
                "name": "Tia",
                "subroutines": [
                    entry(),
                    {
                        "name": "SetPtr",
                        "parameters": ["byte*"],
                        "intrinsic": { "store_to_symbol": { "symbol": "PTR" } }
                    }
                ]
            }]
        }));

        assert!(matches!(
            ingest(&wide_store),
            Err(CompileError::IntrinsicWidth { intrinsic: "store_to_symbol", ty, .. }) if ty == "byte*"
        ));

        let wide_register = module(json!({
            "types": [{
                "name": "Cpu",
                "subroutines": [
                    entry(),
                    {
                        "name": "SetX",
                        "parameters": ["byte*"],
                        "intrinsic": { "load_to_register": { "register": "x" } }
                    }
                ]
            }]
        }));

        let error = ingest(&wide_register).map(|_| ()).unwrap_err();
        assert!(matches!(error, CompileError::IntrinsicWidth { intrinsic: "load_to_register", .. }));
        assert_eq!(error.kind(), crate::error::ErrorKind::Constraint);

        let void_load = module(json!({
            "types": [{
                "name": "Riot",
                "subroutines": [
                    entry(),
                    {
                        "name": "ReadSwcha",
                        "intrinsic": { "load_from_symbol": { "symbol": "SWCHA" } }
                    }
                ]
            }]
        }));

        assert!(matches!(
            ingest(&void_load),
            Err(CompileError::IntrinsicWidth { intrinsic: "load_from_symbol", ty, .. }) if ty == "void"
        ));
    }

    #[test]
    fn operands_and_intrinsics_are_checked() {
        let unknown_register = module(json!({
            "types": [{
                "name": "Cpu",
                "subroutines": [
                    entry(),
                    {
                        "name": "SetZ",
                        "parameters": ["byte"],
                        "intrinsic": { "load_to_register": { "register": "Z" } }
                    }
                ]
            }]
        }));

        assert!(matches!(
            ingest(&unknown_register),
            Err(CompileError::UnknownRegister { register, .. }) if register == "Z"
        ));

        let strobe_with_argument = module(json!({
            "types": [{
                "name": "Tia",
                "subroutines": [
                    entry(),
                    {
                        "name": "Wsync",
                        "parameters": ["byte"],
                        "intrinsic": { "store_to_symbol": { "symbol": "WSYNC", "strobe": true } }
                    }
                ]
            }]
        }));

        assert!(matches!(
            ingest(&strobe_with_argument),
            Err(CompileError::IntrinsicArity { expected: 0, found: 1, .. })
        ));

        let overflow = module(json!({
            "types": [{
                "name": "Game",
                "subroutines": [{
                    "name": "Main",
                    "entry": true,
                    "instructions": [
                        { "opcode": "ldc", "operand": { "constant": 256 } },
                        { "opcode": "ret" }
                    ]
                }]
            }]
        }));

        assert!(matches!(
            ingest(&overflow),
            Err(CompileError::ConstantOverflow { value: 256, index: 0, .. })
        ));

        let missing_operand = module(json!({
            "types": [{
                "name": "Game",
                "subroutines": [{
                    "name": "Main",
                    "entry": true,
                    "instructions": [{ "opcode": "br" }]
                }]
            }]
        }));

        assert!(matches!(
            ingest(&missing_operand),
            Err(CompileError::BadOperand { expected: "branch target", .. })
        ));
    }

    #[test]
    fn inherited_members_resolve_through_the_base() {
        let input = module(json!({
            "types": [
                {
                    "name": "Base",
                    "fields": [{ "name": "Counter", "type": "byte", "static": true }]
                },
                {
                    "name": "Game",
                    "base": "Base",
                    "subroutines": [{
                        "name": "Main",
                        "entry": true,
                        "instructions": [
                            { "opcode": "ldsfld", "operand": { "field": { "type": "Game", "name": "Counter" } } },
                            { "opcode": "pop" },
                            { "opcode": "ret" }
                        ]
                    }]
                }
            ]
        }));

        let Ingested { types, entry } = ingest(&input).unwrap();
        let base = types.lookup("Base").unwrap().id;

        assert_eq!(
            types[entry].instructions[0].operand,
            Operand::Field(FieldId { ty: base, index: 0 })
        );
    }

    #[test]
    fn exactly_one_entry_point_is_required() {
        let none = module(json!({ "types": [{ "name": "Game" }] }));
        assert!(matches!(ingest(&none), Err(CompileError::NoEntryPoint)));

        let two = module(json!({
            "types": [
                { "name": "A", "subroutines": [entry()] },
                { "name": "B", "subroutines": [entry()] }
            ]
        }));

        assert!(matches!(
            ingest(&two),
            Err(CompileError::MultipleEntryPoints(names)) if names == ["A::Main", "B::Main"]
        ));
    }
}
