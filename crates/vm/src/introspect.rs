//! Structured dumps of programs and live interpreter state for tooling.
//!
//! Field names in these trees are informational, not a stable format.

use serde_json::{json, Value as Json};
use tessera_common::{value_to_json, Program, StaticFrame, TypeTable, Value};

use crate::machine::Interpreter;
use crate::stack::FrameRecord;

/// Render `program`: its types, the global frame and every function.
pub fn dump_program(program: &Program) -> Json {
    let types = &program.types;
    let type_table: Vec<Json> = types
        .iter()
        .map(|(id, _)| json!({ "id": id.0, "name": types.name(id) }))
        .collect();
    let functions: Vec<Json> = program
        .functions
        .iter()
        .enumerate()
        .map(|(index, def)| {
            json!({
                "id": index,
                "name": def.name,
                "signature": types.name(def.signature),
                "kind": def.body.kind(),
                "frame": def.frame().map(|frame| dump_frame(types, frame)),
            })
        })
        .collect();
    json!({
        "types": type_table,
        "globals": dump_frame(types, &program.globals),
        "functions": functions,
    })
}

/// Render one static frame with its symbols and disassembly.
pub fn dump_frame(types: &TypeTable, frame: &StaticFrame) -> Json {
    let symbols: Vec<Json> = frame
        .symbols()
        .iter()
        .zip(frame.encodings())
        .enumerate()
        .map(|(register, (symbol, encoding))| {
            json!({
                "register": register,
                "name": symbol.name,
                "type": types.name(symbol.ty),
                "encoding": encoding.name(),
                "argument": register < frame.arg_count(),
                "constant": symbol.constant.as_ref().map(|c| value_to_json(types, c)),
            })
        })
        .collect();
    let code: Vec<String> = frame
        .instructions()
        .iter()
        .enumerate()
        .map(|(pc, instr)| format!("{pc:4}  {instr}"))
        .collect();
    json!({
        "fingerprint": format!("{:012x}", frame.fingerprint()),
        "arg_count": frame.arg_count(),
        "symbols": symbols,
        "code": code,
    })
}

fn dump_value(types: &TypeTable, value: &Value) -> Json {
    json!({
        "type": types.name(value.ty()),
        "value": value_to_json(types, value),
        "refcount": value.ref_count(),
    })
}

impl Interpreter<'_> {
    /// Render the live stack: every active frame with its registers, then
    /// any temporaries above the innermost frame.
    pub fn dump_stack(&self) -> Json {
        let types = self.types();
        let values = self.stack.values();

        let mut records: Vec<FrameRecord<'_>> = Vec::new();
        let linkage = self.stack.linkage().iter().copied();
        for record in linkage.chain(std::iter::once(self.stack.current())) {
            if records.last().is_some_and(|last| last.same_as(&record)) {
                continue;
            }
            records.push(record);
        }

        let mut frames = Vec::with_capacity(records.len());
        let mut top = 0;
        for record in &records {
            let end = (record.base + record.frame.register_count()).min(values.len());
            let registers: Vec<Json> = (record.base..end)
                .map(|slot| {
                    let register = slot - record.base;
                    let mut entry = dump_value(types, &values[slot]);
                    entry["register"] = json!(register);
                    entry["name"] = json!(record
                        .frame
                        .symbol(register)
                        .map(|s| s.name.as_str()));
                    entry
                })
                .collect();
            frames.push(json!({
                "base": record.base,
                "fingerprint": format!("{:012x}", record.frame.fingerprint()),
                "registers": registers,
            }));
            top = top.max(end);
        }

        let temporaries: Vec<Json> = values[top..]
            .iter()
            .map(|value| dump_value(types, value))
            .collect();
        json!({
            "depth": self.call_depth(),
            "capacity": self.stack.capacity(),
            "frames": frames,
            "temporaries": temporaries,
        })
    }
}
