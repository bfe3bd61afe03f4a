/// Where a trap happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub function: String,
    pub pc: usize,
}

/// A fatal execution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    /// Innermost function and instruction, once known.
    pub location: Option<Location>,
    /// Function names from the trapping frame outwards.
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(at) => write!(
                f,
                "Runtime error in function {} instruction {}:\n{}",
                at.function, at.pc, self.message
            )?,
            None => write!(f, "Runtime error:\n{}", self.message)?,
        }

        if self.call_stack.len() > 1 {
            write!(f, "\n  call stack:")?;
            for (i, frame) in self.call_stack.iter().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(msg: &str) -> Self {
        RuntimeError {
            message: msg.to_string(),
            location: None,
            call_stack: Vec::new(),
        }
    }

    /// Record the trapping instruction. The innermost location wins.
    pub fn at(mut self, function: &str, pc: usize) -> Self {
        if self.location.is_none() {
            self.location = Some(Location {
                function: function.to_string(),
                pc,
            });
        }
        self
    }

    /// Append a frame while unwinding.
    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("operand stack underflow")
}

pub fn stack_overflow(limit: usize) -> RuntimeError {
    RuntimeError::new(&format!("operand stack overflow ({} words)", limit))
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn modulo_by_zero() -> RuntimeError {
    RuntimeError::new("modulo by zero")
}

pub fn ran_past_end() -> RuntimeError {
    RuntimeError::new("ran past end of function; missing ret?")
}

pub fn no_such_function(index: usize) -> RuntimeError {
    RuntimeError::new(&format!("call to undefined function {}", index))
}

pub fn call_depth_exceeded(limit: usize) -> RuntimeError {
    RuntimeError::new(&format!(
        "call depth limit exceeded ({}) - possible infinite recursion",
        limit
    ))
}

pub fn locals_overflow(needed: usize, free: usize) -> RuntimeError {
    RuntimeError::new(&format!(
        "locals region overflow: frame needs {} words, {} free",
        needed, free
    ))
}

pub fn out_of_arena(index: i64) -> RuntimeError {
    RuntimeError::new(&format!("memory access at {} is outside the arena", index))
}

pub fn store_into_constant(index: usize) -> RuntimeError {
    RuntimeError::new(&format!("store into constant segment at {}", index))
}

pub fn unresolved_jump() -> RuntimeError {
    RuntimeError::new("jump target was never resolved")
}

pub fn io_error(err: std::io::Error) -> RuntimeError {
    RuntimeError::new(&format!("i/o error: {}", err))
}
