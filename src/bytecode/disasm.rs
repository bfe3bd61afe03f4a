use crate::bytecode::ir::{Function, Instruction, Operand, Program};

const RULE: &str = "════════════════════════════════════════\n";

/// Human-readable dump of a loaded program.
pub fn render(program: &Program) -> String {
    let mut out = String::new();
    out.push_str("=== PROGRAM ===\n");
    out.push_str(&format!("constants: {}\n", program.constants.len()));
    for (i, word) in program.constants.iter().enumerate() {
        out.push_str(&format!("  C{:<4} 0x{:08x}\n", i, word));
    }
    out.push_str(&format!("globals:   {}\n", program.globals.len()));
    out.push_str(&format!("functions: {}\n", program.functions.len()));
    out.push('\n');

    for (index, function) in program.functions.iter().enumerate() {
        out.push_str(&render_function(index, function, Program::is_builtin(index)));
        out.push('\n');
    }
    out
}

fn render_function(index: usize, function: &Function, builtin: bool) -> String {
    let mut out = String::new();
    out.push_str(RULE);
    out.push_str(&format!(" {} {}", index, function.name));
    if builtin {
        out.push_str(" (builtin)");
    }
    out.push('\n');
    out.push_str(&format!(
        " params {}  return {}  locals {}  {} instructions\n",
        function.param_slots,
        function.return_slots,
        function.local_slots,
        function.code.len()
    ));
    out.push_str(RULE);
    out.push_str(&disassemble_to_string(&function.code));
    out
}

/// One line per instruction; jump targets are marked.
pub fn disassemble_to_string(code: &[Instruction]) -> String {
    let mut output = String::new();
    let targets = collect_jump_targets(code);

    for (pc, instr) in code.iter().enumerate() {
        let marker = if targets.contains(&pc) { "► " } else { "  " };
        output.push_str(&format!("{:04} {}{:<8}", pc, marker, instr.op.mnemonic()));
        match instr.operand {
            Operand::None => {}
            Operand::Target(to) => {
                let arrow = if to <= pc { '↑' } else { '↓' };
                output.push_str(&format!(" {:04} {}", to, arrow));
            }
            operand => {
                output.push_str(&format!(" {}", operand));
            }
        }
        output.push('\n');
    }
    output
}

fn collect_jump_targets(code: &[Instruction]) -> Vec<usize> {
    let mut targets = Vec::new();
    for instr in code {
        if let Operand::Target(to) = instr.operand
            && !targets.contains(&to)
        {
            targets.push(to);
        }
    }
    targets
}
