//! The typed C AST handed to the pass by the external front end.
//!
//! The parser is an external collaborator; this module is the contract.
//! It is expected to deliver resolved types, byte offsets for record
//! fields, and CFG-ready statements: control flow is expressed with
//! `If`/`Goto`/`Label`, loops arrive pre-lowered to a label and a
//! backward goto. Short-circuit `&&`/`||` may still occur inside `if`
//! conditions; the normalization pass lowers them.
//!
//! Lvalues follow the host/offset shape: a base (a variable or a memory
//! dereference) plus a chain of field and index offsets. The
//! instrumentation visitor peels that chain to compute addresses.
//!
//! All types are serde-derived so a front end can deliver a translation
//! unit as JSON and receive the instrumented unit back the same way.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::StatementId;
use crate::runtime::RuntimeCall;

/// Pointer size of the modeled target (LP64).
pub const POINTER_SIZE: u64 = 8;

/// Resolved C types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CType {
    Void,
    Bool,
    /// Plain `char`, unsigned on the modeled target.
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    Enum(String),
    Pointer(Box<CType>),
    Array(Box<CType>, u64),
    Record(RecordType),
}

/// A struct or union with resolved layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordType {
    pub name: String,
    pub is_union: bool,
    /// Total size in bytes, as laid out by the front end.
    pub size: u64,
    pub fields: Vec<FieldDef>,
}

/// One record field with its resolved byte offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: CType,
    pub offset: u64,
}

impl CType {
    /// Byte size under the LP64 model. Void has size 0.
    pub fn size_of(&self) -> u64 {
        match self {
            CType::Void => 0,
            CType::Bool | CType::Char | CType::SChar | CType::UChar => 1,
            CType::Short | CType::UShort => 2,
            CType::Int | CType::UInt | CType::Float | CType::Enum(_) => 4,
            CType::Long
            | CType::ULong
            | CType::LongLong
            | CType::ULongLong
            | CType::Double => 8,
            CType::Pointer(_) => POINTER_SIZE,
            CType::Array(elem, len) => elem.size_of() * len,
            CType::Record(rec) => rec.size,
        }
    }

    /// Whether values of this type participate in symbolic tracking.
    /// Integral types (including pointers and enums) and aggregates do;
    /// floating point and void do not.
    pub fn is_symbolic(&self) -> bool {
        !matches!(self, CType::Void | CType::Float | CType::Double)
    }

    /// Whether this type is an aggregate (tracked as an opaque blob).
    pub fn is_aggregate(&self) -> bool {
        matches!(self, CType::Array(_, _) | CType::Record(_))
    }

    /// Whether this is a pointer or array-of-T decaying to a pointer.
    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_))
    }

    /// Whether values of this type compare with signed operators.
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            CType::SChar
                | CType::Short
                | CType::Int
                | CType::Long
                | CType::LongLong
                | CType::Enum(_)
        )
    }

    /// The pointee of a pointer, or the element of an array.
    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(inner) => Some(inner),
            CType::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Look up a field by name, for record types.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        match self {
            CType::Record(rec) => rec.fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}

/// A declared variable (local, parameter, or global).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: CType,
    pub is_global: bool,
    pub is_static: bool,
}

impl Variable {
    /// A function-scope variable.
    pub fn local(name: impl Into<String>, ty: CType) -> Self {
        Variable {
            name: name.into(),
            ty,
            is_global: false,
            is_static: false,
        }
    }

    /// A file-scope variable with external visibility.
    pub fn global(name: impl Into<String>, ty: CType) -> Self {
        Variable {
            name: name.into(),
            ty,
            is_global: true,
            is_static: false,
        }
    }
}

/// Source-level unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CUnaryOp {
    Neg,
    BitNot,
    LogicNot,
}

/// Source-level binary operators, after type resolution.
///
/// Pointer arithmetic arrives distinguished from integer arithmetic
/// (`PtrAdd`/`PtrSub`/`PtrDiff`), as a typed front end resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogicAnd,
    LogicOr,
    PtrAdd,
    PtrSub,
    PtrDiff,
}

impl CBinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            CBinaryOp::Lt
                | CBinaryOp::Gt
                | CBinaryOp::Le
                | CBinaryOp::Ge
                | CBinaryOp::Eq
                | CBinaryOp::Ne
        )
    }

    pub fn is_pointer_op(self) -> bool {
        matches!(self, CBinaryOp::PtrAdd | CBinaryOp::PtrSub | CBinaryOp::PtrDiff)
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, CBinaryOp::LogicAnd | CBinaryOp::LogicOr)
    }

    /// The complementary comparison, for predicate normalization.
    pub fn negate_comparison(self) -> Option<Self> {
        Some(match self {
            CBinaryOp::Lt => CBinaryOp::Ge,
            CBinaryOp::Ge => CBinaryOp::Lt,
            CBinaryOp::Gt => CBinaryOp::Le,
            CBinaryOp::Le => CBinaryOp::Gt,
            CBinaryOp::Eq => CBinaryOp::Ne,
            CBinaryOp::Ne => CBinaryOp::Eq,
            _ => return None,
        })
    }
}

/// Typed expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Integer literal of the given type.
    Const { ty: CType, value: i64 },
    /// `sizeof`/`alignof`, already evaluated by the front end.
    SizeOf { ty: CType, value: i64 },
    /// Read of an lvalue.
    Read(Lvalue),
    /// `&lv`.
    AddrOf(Lvalue),
    /// Array-to-pointer decay of an array lvalue.
    StartOf(Lvalue),
    Unary {
        op: CUnaryOp,
        ty: CType,
        arg: Box<Expr>,
    },
    Binary {
        op: CBinaryOp,
        ty: CType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        ty: CType,
        arg: Box<Expr>,
    },
}

impl Expr {
    /// Integer constant of type `int`.
    pub fn int(value: i64) -> Self {
        Expr::Const {
            ty: CType::Int,
            value,
        }
    }

    /// Read of a bare variable.
    pub fn var(v: Variable) -> Self {
        Expr::Read(Lvalue::var(v))
    }

    /// The resolved type of this expression.
    pub fn ty(&self) -> CType {
        match self {
            Expr::Const { ty, .. } | Expr::SizeOf { ty, .. } => ty.clone(),
            Expr::Read(lv) => lv.ty(),
            Expr::AddrOf(lv) => CType::Pointer(Box::new(lv.ty())),
            Expr::StartOf(lv) => match lv.ty() {
                CType::Array(elem, _) => CType::Pointer(elem),
                other => CType::Pointer(Box::new(other)),
            },
            Expr::Unary { ty, .. } | Expr::Binary { ty, .. } | Expr::Cast { ty, .. } => {
                ty.clone()
            }
        }
    }

    /// Whether this expression is a compile-time constant (a literal or
    /// a sizeof). Used to decide whether an indexed address is symbolic.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Const { .. } | Expr::SizeOf { .. })
    }
}

/// The base of an lvalue: a variable or a dereferenced pointer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LvalueHost {
    Var(Variable),
    Mem(Box<Expr>),
}

/// One step of an lvalue's offset chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Offset {
    Field {
        name: String,
        /// Byte offset within the record, resolved by the front end.
        byte_offset: u64,
        ty: CType,
    },
    Index {
        index: Box<Expr>,
        elem_ty: CType,
    },
}

/// An lvalue: host plus offset chain, outermost offset last. Chains
/// are almost always short; two inline slots cover the common cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lvalue {
    pub host: LvalueHost,
    pub offsets: SmallVec<[Offset; 2]>,
}

impl Lvalue {
    pub fn var(v: Variable) -> Self {
        Lvalue {
            host: LvalueHost::Var(v),
            offsets: SmallVec::new(),
        }
    }

    pub fn mem(addr: Expr) -> Self {
        Lvalue {
            host: LvalueHost::Mem(Box::new(addr)),
            offsets: SmallVec::new(),
        }
    }

    pub fn with_field(mut self, field: &FieldDef) -> Self {
        self.offsets.push(Offset::Field {
            name: field.name.clone(),
            byte_offset: field.offset,
            ty: field.ty.clone(),
        });
        self
    }

    pub fn with_index(mut self, index: Expr, elem_ty: CType) -> Self {
        self.offsets.push(Offset::Index {
            index: Box::new(index),
            elem_ty,
        });
        self
    }

    /// The resolved type of the whole lvalue.
    pub fn ty(&self) -> CType {
        let mut ty = match &self.host {
            LvalueHost::Var(v) => v.ty.clone(),
            LvalueHost::Mem(e) => e
                .ty()
                .pointee()
                .cloned()
                .unwrap_or(CType::Void),
        };
        for off in &self.offsets {
            ty = match off {
                Offset::Field { ty, .. } => ty.clone(),
                Offset::Index { elem_ty, .. } => elem_ty.clone(),
            };
        }
        ty
    }

    /// Whether the address of this lvalue depends on runtime values:
    /// a memory host, or any index that is not a constant.
    pub fn addr_is_symbolic(&self) -> bool {
        if matches!(self.host, LvalueHost::Mem(_)) {
            return true;
        }
        self.offsets.iter().any(|off| match off {
            Offset::Index { index, .. } => !index.is_constant(),
            Offset::Field { .. } => false,
        })
    }
}

/// A statement, with the CFG statement id slot filled in by the pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub sid: Option<StatementId>,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt { sid: None, kind }
    }

    pub fn skip() -> Self {
        Stmt::new(StmtKind::Skip)
    }
}

/// Statement forms the front end delivers, plus `Instr` which only the
/// instrumentation pass inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// No-op; inserted by normalization to give empty blocks a first
    /// statement.
    Skip,
    Assign {
        lv: Lvalue,
        rhs: Expr,
    },
    /// A direct call, optionally assigning the return value.
    Call {
        ret: Option<Lvalue>,
        callee: String,
        args: Vec<Expr>,
    },
    If {
        cond: Expr,
        then_blk: Vec<Stmt>,
        else_blk: Vec<Stmt>,
    },
    Goto(String),
    Label(String),
    Return(Option<Expr>),
    /// An emitted runtime call. Never present in front-end input.
    Instr(RuntimeCall),
}

/// A function definition delivered by the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub ret_ty: CType,
    pub params: Vec<Variable>,
    pub locals: Vec<Variable>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub is_variadic: bool,
    /// The source-level skip attribute: the function is not entered and
    /// calls to it are fully transparent to instrumentation.
    pub skip: bool,
}

impl FunctionDef {
    pub fn new(name: impl Into<String>, ret_ty: CType) -> Self {
        FunctionDef {
            name: name.into(),
            ret_ty,
            params: Vec::new(),
            locals: Vec::new(),
            body: Vec::new(),
            is_static: false,
            is_variadic: false,
            skip: false,
        }
    }
}

/// A declaration of an external function, carrying only what the pass
/// needs: the name and the skip attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub skip: bool,
}

/// A file-scope variable definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub var: Variable,
}

impl GlobalVar {
    /// Externally-visible globals with a concrete size are registered
    /// with the runtime by the synthesized initializer.
    pub fn is_registerable(&self) -> bool {
        !self.var.is_static && self.var.ty.size_of() > 0
    }
}

/// One translation unit, the unit of work for the pass driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDef>,
    pub decls: Vec<FunctionDecl>,
    pub globals: Vec<GlobalVar>,
}

impl TranslationUnit {
    /// Skip attributes of every function visible in this unit, keyed by
    /// name. Definitions shadow declarations.
    pub fn skip_map(&self) -> IndexMap<String, bool> {
        let mut map = IndexMap::new();
        for decl in &self.decls {
            map.insert(decl.name.clone(), decl.skip);
        }
        for def in &self.functions {
            map.insert(def.name.clone(), def.skip);
        }
        map
    }
}

// Compact C-like rendering, used by diagnostics and the golden tests.

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Void => write!(f, "void"),
            CType::Bool => write!(f, "_Bool"),
            CType::Char => write!(f, "char"),
            CType::SChar => write!(f, "signed char"),
            CType::UChar => write!(f, "unsigned char"),
            CType::Short => write!(f, "short"),
            CType::UShort => write!(f, "unsigned short"),
            CType::Int => write!(f, "int"),
            CType::UInt => write!(f, "unsigned int"),
            CType::Long => write!(f, "long"),
            CType::ULong => write!(f, "unsigned long"),
            CType::LongLong => write!(f, "long long"),
            CType::ULongLong => write!(f, "unsigned long long"),
            CType::Float => write!(f, "float"),
            CType::Double => write!(f, "double"),
            CType::Enum(name) => write!(f, "enum {name}"),
            CType::Pointer(inner) => write!(f, "{inner}*"),
            CType::Array(elem, len) => write!(f, "{elem}[{len}]"),
            CType::Record(rec) => {
                write!(f, "{} {}", if rec.is_union { "union" } else { "struct" }, rec.name)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const { value, .. } => write!(f, "{value}"),
            Expr::SizeOf { value, .. } => write!(f, "{value}"),
            Expr::Read(lv) => write!(f, "{lv}"),
            Expr::AddrOf(lv) => write!(f, "&{lv}"),
            Expr::StartOf(lv) => write!(f, "{lv}"),
            Expr::Unary { op, arg, .. } => {
                let sym = match op {
                    CUnaryOp::Neg => "-",
                    CUnaryOp::BitNot => "~",
                    CUnaryOp::LogicNot => "!",
                };
                write!(f, "{sym}({arg})")
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let sym = match op {
                    CBinaryOp::Add | CBinaryOp::PtrAdd => "+",
                    CBinaryOp::Sub | CBinaryOp::PtrSub | CBinaryOp::PtrDiff => "-",
                    CBinaryOp::Mul => "*",
                    CBinaryOp::Div => "/",
                    CBinaryOp::Rem => "%",
                    CBinaryOp::Shl => "<<",
                    CBinaryOp::Shr => ">>",
                    CBinaryOp::Lt => "<",
                    CBinaryOp::Gt => ">",
                    CBinaryOp::Le => "<=",
                    CBinaryOp::Ge => ">=",
                    CBinaryOp::Eq => "==",
                    CBinaryOp::Ne => "!=",
                    CBinaryOp::BitAnd => "&",
                    CBinaryOp::BitXor => "^",
                    CBinaryOp::BitOr => "|",
                    CBinaryOp::LogicAnd => "&&",
                    CBinaryOp::LogicOr => "||",
                };
                write!(f, "({lhs} {sym} {rhs})")
            }
            Expr::Cast { ty, arg } => write!(f, "({ty})({arg})"),
        }
    }
}

impl fmt::Display for Lvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            LvalueHost::Var(v) => write!(f, "{}", v.name)?,
            LvalueHost::Mem(e) => write!(f, "(*{e})")?,
        }
        for off in &self.offsets {
            match off {
                Offset::Field { name, .. } => write!(f, ".{name}")?,
                Offset::Index { index, .. } => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}
