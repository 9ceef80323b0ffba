//! Guest module assembler.
//!
//! Section emission order follows the binary format:
//! type → import → function → table → memory → global → export → element →
//! code → data. Table and element sections are emitted as raw sections.

use std::collections::HashMap;

use membrane_abi::{
    layout::{EXCEPTION_FLAG_OFFSET, EXCEPTION_VALUE_OFFSET},
    AbiType, Capability, EXPORT_ALLOC, EXPORT_FREE, EXPORT_MEMORY, EXPORT_TABLE, HOST_MODULE,
};
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection,
    Function, FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction, MemArg,
    MemorySection, MemoryType, Module, RawSection, TypeSection, ValType,
};

use crate::error::{GuestError, GuestResult};
use crate::layout::*;

const SECTION_TABLE: u8 = 4;
const SECTION_ELEMENT: u8 = 9;
const REFTYPE_FUNCREF: u8 = 0x70;
const OP_I32_CONST: u8 = 0x41;
const OP_END: u8 = 0x0b;

fn abi_val_type(ty: AbiType) -> ValType {
    match ty {
        AbiType::I32 => ValType::I32,
        AbiType::F64 => ValType::F64,
    }
}

fn mem_arg(offset: u32, align: u32) -> MemArg {
    MemArg {
        offset: offset as u64,
        align,
        memory_index: 0,
    }
}

fn write_leb_u32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Static data
// ══════════════════════════════════════════════════════════════════════════════

/// Interned string constants placed at [`DATA_START`].
#[derive(Default)]
struct StaticData {
    bytes: Vec<u8>,
    interned: HashMap<String, (u32, u32)>,
}

impl StaticData {
    fn intern(&mut self, s: &str) -> GuestResult<(u32, u32)> {
        if let Some(&loc) = self.interned.get(s) {
            return Ok(loc);
        }
        let available = HEAP_START - DATA_START - self.bytes.len() as u32;
        let needed = s.len() as u32;
        if needed > available {
            return Err(GuestError::DataOverflow { needed, available });
        }
        let loc = (DATA_START + self.bytes.len() as u32, needed);
        self.bytes.extend_from_slice(s.as_bytes());
        self.interned.insert(s.to_string(), loc);
        Ok(loc)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Function bodies
// ══════════════════════════════════════════════════════════════════════════════

/// Instruction emitter handed to [`GuestBuilder::function`].
///
/// Helpers return `&mut Self` so short sequences can be chained. Errors
/// (unknown import, data overflow) are recorded and reported by
/// [`GuestBuilder::function`].
pub struct FuncBody<'a> {
    func: Function,
    imports: &'a HashMap<String, u32>,
    data: &'a mut StaticData,
    builtin_base: u32,
    error: Option<GuestError>,
}

impl FuncBody<'_> {
    /// Emit a raw instruction.
    pub fn instr(&mut self, instruction: &Instruction<'_>) -> &mut Self {
        self.func.instruction(instruction);
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.instr(&Instruction::I32Const(value))
    }

    /// Push `value` converted to f64.
    pub fn f64_from_i32(&mut self, value: i32) -> &mut Self {
        self.i32(value).instr(&Instruction::F64ConvertI32S)
    }

    pub fn local_get(&mut self, index: u32) -> &mut Self {
        self.instr(&Instruction::LocalGet(index))
    }

    pub fn local_set(&mut self, index: u32) -> &mut Self {
        self.instr(&Instruction::LocalSet(index))
    }

    pub fn local_tee(&mut self, index: u32) -> &mut Self {
        self.instr(&Instruction::LocalTee(index))
    }

    /// Drop the value on top of the stack.
    pub fn discard(&mut self) -> &mut Self {
        self.instr(&Instruction::Drop)
    }

    /// Call a function by absolute index.
    pub fn call(&mut self, index: u32) -> &mut Self {
        self.instr(&Instruction::Call(index))
    }

    /// Call an imported host capability.
    pub fn call_import(&mut self, cap: &Capability) -> &mut Self {
        let name = cap.import_name();
        match self.imports.get(&name) {
            Some(&index) => self.call(index),
            None => {
                self.error.get_or_insert(GuestError::UnknownImport(name));
                self.instr(&Instruction::Unreachable)
            }
        }
    }

    /// Call the module's own `alloc`.
    pub fn call_alloc(&mut self) -> &mut Self {
        let index = self.builtin_base + BUILTIN_ALLOC;
        self.call(index)
    }

    /// Call the module's own `free`.
    pub fn call_free(&mut self) -> &mut Self {
        let index = self.builtin_base + BUILTIN_FREE;
        self.call(index)
    }

    /// Push the `ptr, len` pair of an interned string constant.
    pub fn str(&mut self, s: &str) -> &mut Self {
        match self.data.intern(s) {
            Ok((ptr, len)) => self.i32(ptr as i32).i32(len as i32),
            Err(e) => {
                self.error.get_or_insert(e);
                self.instr(&Instruction::Unreachable)
            }
        }
    }

    /// Push the exception slot pointer.
    pub fn exn(&mut self) -> &mut Self {
        self.i32(EXN_SLOT as i32)
    }

    /// Push the return area pointer.
    pub fn ret_area(&mut self) -> &mut Self {
        self.i32(RET_AREA as i32)
    }

    /// Push the i32 stored at a fixed address.
    pub fn load_i32(&mut self, addr: u32) -> &mut Self {
        self.i32(0).instr(&Instruction::I32Load(mem_arg(addr, 2)))
    }

    /// Store the value produced by `value` at a fixed address.
    pub fn store_i32(&mut self, addr: u32, value: impl FnOnce(&mut Self)) -> &mut Self {
        self.i32(0);
        value(self);
        self.instr(&Instruction::I32Store(mem_arg(addr, 2)))
    }

    /// Add `delta` to the i32 stored at a fixed address.
    pub fn increment_i32(&mut self, addr: u32, delta: i32) -> &mut Self {
        self.store_i32(addr, |f| {
            f.load_i32(addr).i32(delta).instr(&Instruction::I32Add);
        })
    }

    /// Push the exception flag of the module's exception slot.
    pub fn exception_flag(&mut self) -> &mut Self {
        self.load_i32(EXN_SLOT + EXCEPTION_FLAG_OFFSET)
    }

    /// Push the thrown-value handle of the module's exception slot.
    pub fn exception_value(&mut self) -> &mut Self {
        self.load_i32(EXN_SLOT + EXCEPTION_VALUE_OFFSET)
    }

    /// Trap if the last throwing call reported an exception.
    pub fn trap_on_exception(&mut self) -> &mut Self {
        self.exception_flag()
            .instr(&Instruction::If(BlockType::Empty))
            .instr(&Instruction::Unreachable)
            .instr(&Instruction::End)
    }

    /// `if (cond on stack) { then }`
    pub fn if_then(&mut self, then: impl FnOnce(&mut Self)) -> &mut Self {
        self.instr(&Instruction::If(BlockType::Empty));
        then(self);
        self.instr(&Instruction::End)
    }

    /// `if (cond on stack) { then } else { otherwise }`
    pub fn if_else(
        &mut self,
        then: impl FnOnce(&mut Self),
        otherwise: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.instr(&Instruction::If(BlockType::Empty));
        then(self);
        self.instr(&Instruction::Else);
        otherwise(self);
        self.instr(&Instruction::End)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Builder
// ══════════════════════════════════════════════════════════════════════════════

struct Import {
    module: String,
    name: String,
    ty: u32,
}

struct DefinedFunc {
    ty: u32,
    body: Function,
}

/// Assembles a guest module.
///
/// Imports come first; the first [`GuestBuilder::function`] call seals the
/// import list and emits the built-in allocator functions, so absolute
/// function indices never shift once handed out.
#[derive(Default)]
pub struct GuestBuilder {
    types: Vec<(Vec<ValType>, Vec<ValType>)>,
    imports: Vec<Import>,
    import_index: HashMap<String, u32>,
    functions: Vec<DefinedFunc>,
    exports: Vec<(String, u32)>,
    data: StaticData,
    table: Vec<u32>,
    sealed: bool,
}

impl GuestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn type_index(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        if let Some(pos) = self
            .types
            .iter()
            .position(|(p, r)| p.as_slice() == params && r.as_slice() == results)
        {
            return pos as u32;
        }
        self.types.push((params.to_vec(), results.to_vec()));
        (self.types.len() - 1) as u32
    }

    /// Import a host capability; importing twice returns the same index.
    pub fn import(&mut self, cap: &Capability) -> GuestResult<u32> {
        let params: Vec<ValType> = cap.params.iter().copied().map(abi_val_type).collect();
        let results: Vec<ValType> = cap.result.into_iter().map(abi_val_type).collect();
        self.import_raw(HOST_MODULE, &cap.import_name(), &params, &results)
    }

    pub fn import_all(&mut self, caps: &[Capability]) -> GuestResult<()> {
        for cap in caps {
            self.import(cap)?;
        }
        Ok(())
    }

    /// Import an arbitrary function. Returns the function index.
    pub fn import_raw(
        &mut self,
        module: &str,
        name: &str,
        params: &[ValType],
        results: &[ValType],
    ) -> GuestResult<u32> {
        let key = format!("{module}::{name}");
        if module == HOST_MODULE {
            if let Some(&index) = self.import_index.get(name) {
                return Ok(index);
            }
        }
        if self.sealed {
            return Err(GuestError::ImportAfterFunction(key));
        }
        let ty = self.type_index(params, results);
        let index = self.imports.len() as u32;
        self.imports.push(Import {
            module: module.to_string(),
            name: name.to_string(),
            ty,
        });
        if module == HOST_MODULE {
            self.import_index.insert(name.to_string(), index);
        }
        Ok(index)
    }

    fn builtin_base(&self) -> u32 {
        self.imports.len() as u32
    }

    /// Absolute index of the built-in `alloc`.
    pub fn alloc_index(&self) -> u32 {
        self.builtin_base() + BUILTIN_ALLOC
    }

    /// Absolute index of the built-in `free`.
    pub fn free_index(&self) -> u32 {
        self.builtin_base() + BUILTIN_FREE
    }

    fn seal(&mut self) {
        if self.sealed {
            return;
        }
        self.sealed = true;
        let base = self.builtin_base();

        let ty = self.type_index(&[ValType::I32], &[ValType::I32]);
        self.functions.push(DefinedFunc {
            ty,
            body: emit_alloc(),
        });
        self.exports.push((EXPORT_ALLOC.to_string(), base + BUILTIN_ALLOC));

        let ty = self.type_index(&[ValType::I32, ValType::I32], &[]);
        self.functions.push(DefinedFunc {
            ty,
            body: emit_free(),
        });
        self.exports.push((EXPORT_FREE.to_string(), base + BUILTIN_FREE));

        let ty = self.type_index(&[], &[ValType::I32]);
        let mut freed = Function::new(Vec::new());
        freed.instruction(&Instruction::GlobalGet(GLOBAL_FREED));
        freed.instruction(&Instruction::End);
        self.functions.push(DefinedFunc { ty, body: freed });
        self.exports
            .push(("freed_bytes".to_string(), base + BUILTIN_FREED_BYTES));
    }

    /// Define a function and optionally export it. Returns its absolute index.
    ///
    /// `locals` are declared after the parameters, so the first local has
    /// index `params.len()`.
    pub fn function<F>(
        &mut self,
        export: Option<&str>,
        params: &[ValType],
        results: &[ValType],
        locals: &[ValType],
        body: F,
    ) -> GuestResult<u32>
    where
        F: FnOnce(&mut FuncBody<'_>),
    {
        self.seal();
        let ty = self.type_index(params, results);
        let mut emitter = FuncBody {
            func: Function::new(locals.iter().map(|t| (1, *t)).collect::<Vec<_>>()),
            imports: &self.import_index,
            data: &mut self.data,
            builtin_base: self.imports.len() as u32,
            error: None,
        };
        body(&mut emitter);
        emitter.func.instruction(&Instruction::End);
        if let Some(err) = emitter.error {
            return Err(err);
        }
        let func = emitter.func;

        let index = self.imports.len() as u32 + self.functions.len() as u32;
        self.functions.push(DefinedFunc { ty, body: func });
        if let Some(name) = export {
            self.exports.push((name.to_string(), index));
        }
        Ok(index)
    }

    /// Place a function in the exported table. Returns its table index.
    pub fn table_slot(&mut self, function: u32) -> GuestResult<u32> {
        let total = self.imports.len() as u32 + self.functions.len() as u32;
        if function >= total {
            return Err(GuestError::UnknownFunction(function));
        }
        self.table.push(function);
        Ok((self.table.len() - 1) as u32)
    }

    /// Intern a string constant; returns `(ptr, len)`.
    pub fn string(&mut self, s: &str) -> GuestResult<(u32, u32)> {
        self.data.intern(s)
    }

    /// Assemble and validate the module.
    pub fn finish(mut self) -> GuestResult<Vec<u8>> {
        self.seal();
        let mut module = Module::new();

        let mut types = TypeSection::new();
        for (params, results) in &self.types {
            types.ty().function(params.clone(), results.clone());
        }
        module.section(&types);

        let mut imports = ImportSection::new();
        for import in &self.imports {
            imports.import(&import.module, &import.name, EntityType::Function(import.ty));
        }
        module.section(&imports);

        let mut funcs = FunctionSection::new();
        for func in &self.functions {
            funcs.function(func.ty);
        }
        module.section(&funcs);

        let table_bytes = self.emit_table();
        module.section(&RawSection {
            id: SECTION_TABLE,
            data: &table_bytes,
        });

        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        module.section(&memory);

        let mut globals = GlobalSection::new();
        // GLOBAL_HEAP_PTR
        globals.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(HEAP_START as i32),
        );
        // GLOBAL_FREED
        globals.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(0),
        );
        module.section(&globals);

        let mut exports = ExportSection::new();
        exports.export(EXPORT_MEMORY, ExportKind::Memory, 0);
        exports.export(EXPORT_TABLE, ExportKind::Table, 0);
        for (name, index) in &self.exports {
            exports.export(name, ExportKind::Func, *index);
        }
        module.section(&exports);

        if !self.table.is_empty() {
            let element_bytes = self.emit_elements();
            module.section(&RawSection {
                id: SECTION_ELEMENT,
                data: &element_bytes,
            });
        }

        let mut code = CodeSection::new();
        for func in &self.functions {
            code.function(&func.body);
        }
        module.section(&code);

        if !self.data.bytes.is_empty() {
            let mut data = DataSection::new();
            data.active(
                0,
                &ConstExpr::i32_const(DATA_START as i32),
                self.data.bytes.clone(),
            );
            module.section(&data);
        }

        let wasm_bytes = module.finish();
        wasmparser::validate(&wasm_bytes)
            .map_err(|e| GuestError::ValidationFailed(format!("{e}")))?;
        Ok(wasm_bytes)
    }

    /// One funcref table sized to the element list, no maximum.
    fn emit_table(&self) -> Vec<u8> {
        let mut bytes = vec![1, REFTYPE_FUNCREF, 0x00];
        write_leb_u32(&mut bytes, self.table.len() as u32);
        bytes
    }

    /// One active element segment at offset 0 of table 0.
    fn emit_elements(&self) -> Vec<u8> {
        let mut bytes = vec![1, 0x00, OP_I32_CONST, 0x00, OP_END];
        write_leb_u32(&mut bytes, self.table.len() as u32);
        for &func in &self.table {
            write_leb_u32(&mut bytes, func);
        }
        bytes
    }
}

/// `alloc(size) -> ptr`: align the bump pointer to 8, grow memory if the
/// allocation does not fit, trap if growth fails.
fn emit_alloc() -> Function {
    // locals: 0 = size (param), 1 = ptr, 2 = end
    let mut f = Function::new(vec![(2, ValType::I32)]);
    f.instruction(&Instruction::GlobalGet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::I32Const(7));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(-8));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::LocalSet(1));

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(2));

    // if end > memory.size * PAGE → grow by ceil((end - current) / PAGE)
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Shl);
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Shl);
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I32Const(0xffff));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32ShrU);
    f.instruction(&Instruction::MemoryGrow(0));
    f.instruction(&Instruction::I32Const(-1));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::GlobalSet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `free(ptr, size)`: bump allocators never reuse memory; count the bytes.
fn emit_free() -> Function {
    let mut f = Function::new(Vec::new());
    f.instruction(&Instruction::GlobalGet(GLOBAL_FREED));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_FREED));
    f.instruction(&Instruction::End);
    f
}
