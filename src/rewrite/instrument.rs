//! Cost instrumentation.
//!
//! Inserts a meter at method entry, before backward branches, before
//! allocations and before throws. Branch targets and exception ranges are
//! relocated so that a jump to an instruction also runs its meter. A meter
//! already sitting in front of its instruction is not inserted again.

use crate::classfile::{ClassDescriptor, Code, Instruction};

/// Returns the number of meters inserted.
pub(super) fn apply(class: &mut ClassDescriptor) -> usize {
    class
        .methods
        .iter_mut()
        .filter_map(|m| m.code.as_mut())
        .map(instrument_code)
        .sum()
}

fn meter_for(position: usize, insn: &Instruction) -> Option<Instruction> {
    match insn {
        Instruction::If { target, .. } | Instruction::Goto(target) if *target as usize <= position => {
            Some(Instruction::MeterJump)
        }
        Instruction::New(_) | Instruction::MakeClosure { .. } => Some(Instruction::MeterAllocation),
        Instruction::Throw => Some(Instruction::MeterThrow),
        _ => None,
    }
}

fn instrument_code(code: &mut Code) -> usize {
    let old = std::mem::take(&mut code.instructions);
    let mut out = Vec::with_capacity(old.len() + 1);
    // relocation[i] = new index of whatever a branch to old index i should reach
    let mut relocation = vec![0u32; old.len() + 1];
    let mut inserted = 0;

    if old.first() != Some(&Instruction::MeterInvocation) {
        out.push(Instruction::MeterInvocation);
        inserted += 1;
    }

    for (position, insn) in old.iter().enumerate() {
        relocation[position] = out.len() as u32;
        if let Some(meter) = meter_for(position, insn) {
            let preceded = position > 0 && old[position - 1] == meter;
            if !preceded {
                out.push(meter);
                inserted += 1;
            }
        }
        out.push(insn.clone());
    }
    relocation[old.len()] = out.len() as u32;

    if inserted == 0 {
        code.instructions = old;
        return 0;
    }

    let end = out.len() as u32;
    let relocate = |index: u32| relocation.get(index as usize).copied().unwrap_or(end);
    for insn in out.iter_mut() {
        match insn {
            Instruction::If { target, .. } | Instruction::Goto(target) => {
                *target = relocate(*target);
            }
            _ => {}
        }
    }
    for handler in code.handlers.iter_mut() {
        handler.start = relocate(handler.start);
        handler.end = relocate(handler.end);
        handler.handler = relocate(handler.handler);
    }
    code.instructions = out;
    inserted
}
