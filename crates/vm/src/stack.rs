//! The value stack and frame linkage.
//!
//! Values live in one flat, fixed-capacity array. The current frame is a
//! base offset plus its static frame; register `r` is slot `base + r`.
//! Saved linkage (caller base and frame) lives on a separate stack of
//! [`FrameRecord`]s, never among the values.

use tessera_common::{StaticFrame, Value};

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy)]
pub struct FrameRecord<'p> {
    pub base: usize,
    pub frame: &'p StaticFrame,
}

impl FrameRecord<'_> {
    pub fn same_as(&self, other: &FrameRecord<'_>) -> bool {
        self.base == other.base && std::ptr::eq(self.frame, other.frame)
    }
}

/// Restore point taken before running code that may fail.
#[derive(Debug, Clone, Copy)]
pub struct StackMark<'p> {
    len: usize,
    linkage: usize,
    current: FrameRecord<'p>,
}

/// State needed to tear down a frame opened by [`ValueStack::open_frame`].
#[derive(Debug, Clone, Copy)]
pub struct OpenFrame {
    keep: usize,
    linkage: usize,
}

pub struct ValueStack<'p> {
    values: Vec<Value>,
    capacity: usize,
    current: FrameRecord<'p>,
    linkage: Vec<FrameRecord<'p>>,
}

impl<'p> ValueStack<'p> {
    /// Empty stack whose current frame is `globals` at base 0.
    pub fn new(capacity: usize, globals: &'p StaticFrame) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            current: FrameRecord {
                base: 0,
                frame: globals,
            },
            linkage: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> FrameRecord<'p> {
        self.current
    }

    pub fn frame(&self) -> &'p StaticFrame {
        self.current.frame
    }

    pub fn linkage(&self) -> &[FrameRecord<'p>] {
        &self.linkage
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.values.len() >= self.capacity {
            return Err(RuntimeError::StackOverflow {
                capacity: self.capacity,
            });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Value {
        match self.values.pop() {
            Some(value) => value,
            None => defect!("pop from empty value stack"),
        }
    }

    /// The topmost `n` values, oldest first.
    pub fn top(&self, n: usize) -> &[Value] {
        match self.values.len().checked_sub(n) {
            Some(start) => &self.values[start..],
            None => defect!("{n} stack arguments requested, {} present", self.values.len()),
        }
    }

    fn slot(&self, register: i16) -> usize {
        let frame = self.current.frame;
        match usize::try_from(register) {
            Ok(r) if r < frame.register_count() && self.current.base + r < self.values.len() => {
                self.current.base + r
            }
            _ => defect!(
                "register r{register} outside frame of {} registers",
                frame.register_count()
            ),
        }
    }

    pub fn reg(&self, register: i16) -> &Value {
        &self.values[self.slot(register)]
    }

    /// Overwrite a register, releasing its previous value.
    pub fn set(&mut self, register: i16, value: Value) {
        let slot = self.slot(register);
        if cfg!(debug_assertions) {
            let expected = self.current.frame.encoding(slot - self.current.base);
            if expected != Some(value.encoding()) {
                defect!(
                    "write of {} value to {:?} register r{register}",
                    value.encoding().name(),
                    expected
                );
            }
        }
        self.values[slot] = value;
    }

    /// Global register `index`. Globals are the registers of the frame at
    /// the bottom of the stack.
    pub fn global(&self, index: i16, globals: &StaticFrame) -> &Value {
        &self.values[Self::global_slot(index, globals)]
    }

    pub fn set_global(&mut self, index: i16, globals: &StaticFrame, value: Value) {
        let slot = Self::global_slot(index, globals);
        self.values[slot] = value;
    }

    fn global_slot(index: i16, globals: &StaticFrame) -> usize {
        match usize::try_from(index) {
            Ok(i) if i < globals.register_count() => i,
            _ => defect!("global #{index} outside {} globals", globals.register_count()),
        }
    }

    /// PUSH_FRAME_PTR: save the current frame as pending caller linkage.
    pub fn push_linkage(&mut self) {
        self.linkage.push(self.current);
    }

    /// POP_FRAME_PTR: restore and discard the saved linkage.
    pub fn pop_linkage(&mut self) {
        match self.linkage.pop() {
            Some(record) => self.current = record,
            None => defect!("POP_FRAME_PTR without saved linkage"),
        }
    }

    /// Enter `frame` with its `arg_count` arguments already on top of the
    /// stack. The caller must have saved its linkage first.
    pub fn open_frame(&mut self, frame: &'p StaticFrame) -> OpenFrame {
        match self.linkage.last() {
            Some(saved) if saved.same_as(&self.current) => {}
            _ => defect!("CALL without pending PUSH_FRAME_PTR"),
        }
        let base = match self.values.len().checked_sub(frame.arg_count()) {
            Some(base) => base,
            None => defect!("frame expects {} arguments on the stack", frame.arg_count()),
        };
        self.current = FrameRecord { base, frame };
        OpenFrame {
            keep: base + frame.arg_count(),
            linkage: self.linkage.len(),
        }
    }

    /// Leave a frame on any exit path: drop locals and temporaries, keep
    /// the argument cells for the caller to pop, restore the caller.
    pub fn close_frame(&mut self, open: OpenFrame) {
        self.values.truncate(open.keep);
        self.linkage.truncate(open.linkage);
        match self.linkage.last() {
            Some(saved) => self.current = *saved,
            None => defect!("frame closed without caller linkage"),
        }
    }

    pub fn mark(&self) -> StackMark<'p> {
        StackMark {
            len: self.values.len(),
            linkage: self.linkage.len(),
            current: self.current,
        }
    }

    pub fn rewind(&mut self, mark: StackMark<'p>) {
        self.values.truncate(mark.len);
        self.linkage.truncate(mark.linkage);
        self.current = mark.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Instruction, Opcode, Symbol, TypeId, TypeTable};

    fn frame(types: &TypeTable, symbols: Vec<Symbol>, args: usize) -> StaticFrame {
        StaticFrame::new(types, vec![Instruction::bare(Opcode::Stop)], symbols, args).unwrap()
    }

    #[test]
    fn push_respects_capacity() {
        let types = TypeTable::new();
        let globals = frame(&types, vec![], 0);
        let mut stack = ValueStack::new(2, &globals);
        stack.push(Value::int(1)).unwrap();
        stack.push(Value::int(2)).unwrap();
        assert_eq!(
            stack.push(Value::int(3)),
            Err(RuntimeError::StackOverflow { capacity: 2 })
        );
    }

    #[test]
    fn frames_address_registers_from_base() {
        let types = TypeTable::new();
        let globals = frame(&types, vec![Symbol::new("g", TypeId::INT)], 0);
        let callee = frame(
            &types,
            vec![Symbol::new("x", TypeId::INT), Symbol::new("y", TypeId::INT)],
            1,
        );
        let mut stack = ValueStack::new(16, &globals);
        stack.push(Value::int(7)).unwrap();
        stack.push_linkage();
        stack.push(Value::int(40)).unwrap();

        let open = stack.open_frame(&callee);
        stack.push(Value::int(0)).unwrap();
        assert_eq!(stack.reg(0), &Value::int(40));
        stack.set(1, Value::int(2));
        assert_eq!(stack.reg(1), &Value::int(2));

        stack.close_frame(open);
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.current().base, 0);
        assert_eq!(stack.reg(0), &Value::int(7));
        stack.pop();
        stack.pop_linkage();
        assert!(stack.linkage().is_empty());
    }

    #[test]
    fn rewind_restores_everything() {
        let types = TypeTable::new();
        let globals = frame(&types, vec![], 0);
        let mut stack = ValueStack::new(16, &globals);
        let mark = stack.mark();
        stack.push_linkage();
        let held = Value::string("temp");
        stack.push(held.clone()).unwrap();
        assert_eq!(held.ref_count(), Some(2));
        stack.rewind(mark);
        assert!(stack.is_empty());
        assert!(stack.linkage().is_empty());
        assert_eq!(held.ref_count(), Some(1));
    }

    #[test]
    #[should_panic(expected = "VM defect")]
    fn call_without_linkage_is_a_defect() {
        let types = TypeTable::new();
        let globals = frame(&types, vec![], 0);
        let callee = frame(&types, vec![], 0);
        let mut stack = ValueStack::new(4, &globals);
        stack.open_frame(&callee);
    }

    #[test]
    #[should_panic(expected = "VM defect")]
    fn register_outside_frame_is_a_defect() {
        let types = TypeTable::new();
        let globals = frame(&types, vec![Symbol::new("g", TypeId::INT)], 0);
        let mut stack = ValueStack::new(4, &globals);
        stack.push(Value::int(1)).unwrap();
        stack.reg(1);
    }
}
