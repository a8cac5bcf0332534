//! Modelo de entrada producido por el front end.
//!
//! Este es el contrato entre el front end (análisis sintáctico y
//! semántico del lenguaje de alto nivel) y este compilador. Todos
//! los nombres se mantienen como texto hasta [`crate::ingest`].

use std::io::Read;

use serde::Deserialize;

/// Una unidad de entrada, usualmente un archivo JSON.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

impl Module {
    pub fn from_reader<R: Read>(reader: R) -> serde_json::Result<Module> {
        serde_json::from_reader(reader)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Module> {
        serde_json::from_str(text)
    }

    /// Concatena módulos en el orden dado.
    pub fn merge<I: IntoIterator<Item = Module>>(modules: I) -> Module {
        let types = modules.into_iter().flat_map(|module| module.types).collect();
        Module { types }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TypeDecl {
    pub name: String,

    #[serde(default)]
    pub base: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDecl>,

    #[serde(default)]
    pub subroutines: Vec<SubroutineDecl>,

    /// Conteos de la tabla de símbolos del front end, para validación.
    #[serde(default)]
    pub symbols: Option<SymbolCounts>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
pub struct SymbolCounts {
    pub fields: usize,
    pub subroutines: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FieldDecl {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: String,

    #[serde(rename = "static", default)]
    pub is_static: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubroutineDecl {
    pub name: String,

    #[serde(default)]
    pub parameters: Vec<String>,

    #[serde(default)]
    pub locals: Vec<String>,

    #[serde(default = "void")]
    pub returns: String,

    #[serde(rename = "entry", default)]
    pub entry_point: bool,

    /// Punto de entrada del ciclo de vida, invocado por el runtime.
    #[serde(default)]
    pub root: bool,

    #[serde(default)]
    pub intrinsic: Option<IntrinsicDecl>,

    #[serde(default)]
    pub instructions: Vec<InstructionDecl>,
}

fn void() -> String {
    String::from("void")
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstructionDecl {
    pub opcode: String,

    #[serde(default)]
    pub operand: Option<OperandDecl>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OperandDecl {
    Constant(i64),
    Local(u16),
    Argument(u16),
    Target(usize),
    Field(MemberRef),
    Method(MemberRef),
    Type(String),
}

/// Referencia a un miembro de un tipo por nombre.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MemberRef {
    #[serde(rename = "type")]
    pub ty: String,

    pub name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicDecl {
    StoreToSymbol {
        symbol: String,

        #[serde(default)]
        strobe: bool,
    },

    LoadFromSymbol {
        symbol: String,
    },

    LoadToRegister {
        register: String,
    },

    AlwaysInline,

    UseProvidedImplementation {
        implementation: String,
    },

    IgnoreImplementation,

    CompileTimeExecuted(EvaluatorDecl),
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorDecl {
    Convert,
    Data,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_parse_with_defaults() {
        let module = Module::from_json(
            r#"{
                "types": [{
                    "name": "Game",
                    "fields": [{ "name": "Frame", "type": "byte", "static": true }],
                    "subroutines": [{
                        "name": "Main",
                        "entry": true,
                        "instructions": [
                            { "opcode": "ldc", "operand": { "constant": 5 } },
                            { "opcode": "call", "operand": { "method": { "type": "Tia", "name": "SetColubk" } } },
                            { "opcode": "ret" }
                        ]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let game = &module.types[0];
        assert!(game.base.is_none());
        assert!(game.fields[0].is_static);

        let main = &game.subroutines[0];
        assert!(main.entry_point);
        assert_eq!(main.returns, "void");
        assert_eq!(main.instructions[0].operand, Some(OperandDecl::Constant(5)));
        assert_eq!(
            main.instructions[1].operand,
            Some(OperandDecl::Method(MemberRef {
                ty: "Tia".into(),
                name: "SetColubk".into(),
            }))
        );
        assert_eq!(main.instructions[2].operand, None);
    }

    #[test]
    fn intrinsics_use_tagged_forms() {
        let parse = |json: &str| serde_json::from_str::<IntrinsicDecl>(json).unwrap();

        assert_eq!(parse(r#""always_inline""#), IntrinsicDecl::AlwaysInline);
        assert_eq!(
            parse(r#"{ "store_to_symbol": { "symbol": "WSYNC", "strobe": true } }"#),
            IntrinsicDecl::StoreToSymbol {
                symbol: "WSYNC".into(),
                strobe: true,
            }
        );
        assert_eq!(
            parse(r#"{ "compile_time_executed": "data" }"#),
            IntrinsicDecl::CompileTimeExecuted(EvaluatorDecl::Data)
        );
    }

    #[test]
    fn merging_keeps_file_order() {
        let first = Module::from_json(r#"{ "types": [{ "name": "A" }] }"#).unwrap();
        let second = Module::from_json(r#"{ "types": [{ "name": "B" }] }"#).unwrap();

        let merged = Module::merge(vec![first, second]);
        let names: Vec<_> = merged.types.iter().map(|ty| ty.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
    }
}
