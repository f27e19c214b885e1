//! Interpreter state, construction and the call path.

use tessera_common::{FunctionId, Program, StaticFrame, TypeTable, Value};
use tracing::{debug, trace};

use crate::config::InterpreterConfig;
use crate::convention;
use crate::error::RuntimeError;
use crate::host::{HostRegistry, MessageHandler};
use crate::link::{link, Callable};
use crate::stack::ValueStack;

/// The Tessera virtual machine.
///
/// Owns the value stack for one program. Single-threaded: heap blocks are
/// counted with [`std::rc::Rc`].
pub struct Interpreter<'p> {
    pub(crate) program: &'p Program,
    /// Linked call targets, indexed by `FunctionId`.
    pub(crate) functions: Vec<Option<Callable<'p>>>,
    pub(crate) stack: ValueStack<'p>,
    pub(crate) config: InterpreterConfig,
    /// Nested bytecode calls currently running.
    pub(crate) depth: usize,
    message_handler: Option<Box<dyn MessageHandler>>,
    print_output: Vec<String>,
}

impl<'p> Interpreter<'p> {
    /// Link `program`, lay down the global frame and run its initializer
    /// to STOP.
    pub fn new(
        program: &'p Program,
        registry: &HostRegistry,
        config: InterpreterConfig,
    ) -> Result<Self, RuntimeError> {
        let functions = link(program, registry);
        let stack = ValueStack::new(config.stack_capacity, &program.globals);
        let mut interpreter = Self {
            program,
            functions,
            stack,
            config,
            depth: 0,
            message_handler: None,
            print_output: Vec::new(),
        };
        debug!(
            stack_capacity = interpreter.config.stack_capacity,
            globals = program.globals.register_count(),
            "interpreter created"
        );
        interpreter.init_globals().inspect_err(|error| {
            debug!(%error, "global initialization failed");
        })?;
        Ok(interpreter)
    }

    fn init_globals(&mut self) -> Result<(), RuntimeError> {
        let program = self.program;
        let globals = &program.globals;
        if globals.arg_count() != 0 {
            defect!("global frame declares {} arguments", globals.arg_count());
        }
        self.prologue(globals)?;
        self.run_frame()?;
        if self.stack.len() != globals.register_count() {
            defect!(
                "global initializer left {} values on the stack",
                self.stack.len() - globals.register_count()
            );
        }
        debug!("global frame initialized");
        Ok(())
    }

    /// Lay down the non-argument registers of `frame`: constants as
    /// literals, everything else as its type's default value.
    pub(crate) fn prologue(&mut self, frame: &StaticFrame) -> Result<(), RuntimeError> {
        for symbol in &frame.symbols()[frame.arg_count()..] {
            let value = match &symbol.constant {
                Some(constant) => constant.clone(),
                None => Value::default_of(&self.program.types, symbol.ty),
            };
            self.stack.push(value)?;
        }
        Ok(())
    }

    /// Call `function` with `args` and return its result.
    ///
    /// On error the stack is rewound to where it was before the call.
    pub fn call_function(&mut self, function: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let program = self.program;
        let id = function
            .as_function()
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: format!("<value of type {}>", program.types.name(function.ty())),
            })?;
        let (name, signature) = match (program.function(id), program.signature(id)) {
            (Some(def), Some(signature)) => (def.name.as_str(), signature),
            _ => {
                return Err(RuntimeError::UnknownFunction {
                    name: format!("#{}", id.0),
                })
            }
        };
        convention::check_args(name, signature, args)?;

        let mark = self.stack.mark();
        self.stack.push_linkage();
        let result = convention::push_args(&mut self.stack, signature, args)
            .and_then(|()| self.invoke(id));
        self.stack.rewind(mark);
        if let Err(error) = &result {
            debug!(function = name, %error, "call failed");
        }
        result
    }

    /// Call the function named `name`.
    pub fn call_by_name(&mut self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let id = self
            .program
            .function_id(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?;
        let signature = self.program.functions[id.index()].signature;
        self.call_function(&Value::function(signature, id), args)
    }

    /// Run function `id` with its argument cells on top of the stack.
    ///
    /// The single path for CALL and the embedding API. Host functions get
    /// the unpacked arguments; bytecode functions get a new frame.
    pub(crate) fn invoke(&mut self, id: FunctionId) -> Result<Value, RuntimeError> {
        let program = self.program;
        let Some(def) = program.function(id) else {
            return Err(RuntimeError::UnknownFunction {
                name: format!("#{}", id.0),
            });
        };
        match self.functions.get(id.index()).copied().flatten() {
            None => Err(RuntimeError::UnlinkedFunction {
                name: def.name.clone(),
            }),
            Some(Callable::Host { function, .. }) => {
                let Some(signature) = program.signature(id) else {
                    defect!("function '{}' has no function signature", def.name);
                };
                let cells = convention::arg_cells(signature);
                let args = convention::unpack_args(signature, self.stack.top(cells));
                trace!(function = %def.name, args = args.len(), "host call");
                let result = function(self, &args)?;
                if result.ty() != signature.ret {
                    return Err(RuntimeError::host(
                        def.name.as_str(),
                        format!(
                            "returned {}, declared {}",
                            program.types.name(result.ty()),
                            program.types.name(signature.ret)
                        ),
                    ));
                }
                Ok(result)
            }
            Some(Callable::Frame(frame)) => self.call_frame(&def.name, frame),
        }
    }

    fn call_frame(&mut self, name: &str, frame: &'p StaticFrame) -> Result<Value, RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }
        let open = self.stack.open_frame(frame);
        self.depth += 1;
        trace!(function = name, depth = self.depth, "enter frame");
        let result = self.prologue(frame).and_then(|()| self.run_frame());
        self.depth -= 1;
        self.stack.close_frame(open);
        trace!(function = name, depth = self.depth, ok = result.is_ok(), "leave frame");
        result
    }

    /// Value of the global called `name`.
    pub fn global(&self, name: &str) -> Option<&Value> {
        let index = self.program.global_index(name)?;
        self.stack.values().get(index)
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn types(&self) -> &'p TypeTable {
        &self.program.types
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Number of live values on the stack.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Nested bytecode calls currently running.
    pub fn call_depth(&self) -> usize {
        self.depth
    }

    pub fn set_message_handler(&mut self, handler: Box<dyn MessageHandler>) {
        self.message_handler = Some(handler);
    }

    /// Hand `message` to the installed message handler.
    pub fn send(&mut self, destination: &str, message: &Value) -> Result<(), RuntimeError> {
        let json = tessera_common::value_to_json(&self.program.types, message);
        match self.message_handler.as_mut() {
            Some(handler) => handler
                .on_send(destination, json)
                .map_err(|message| RuntimeError::host("send", message)),
            None => Err(RuntimeError::host("send", "no message handler installed")),
        }
    }

    /// Append a line to the print buffer.
    pub fn print(&mut self, line: impl Into<String>) {
        let line = line.into();
        trace!(%line, "print");
        self.print_output.push(line);
    }

    pub fn print_output(&self) -> &[String] {
        &self.print_output
    }

    pub fn take_print_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.print_output)
    }
}
