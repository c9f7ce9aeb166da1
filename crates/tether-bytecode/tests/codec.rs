//! Instruction codec properties
//!
//! Every eight-byte word either fails to decode or decodes to an instruction
//! whose canonical encoding is a fixed point of decode/encode.

use proptest::prelude::*;
use tether_bytecode::{
    BytecodeError, ExceptionId, INSTRUCTION_SIZE, Instruction, Opcode, Program, ProgramParts, Reg,
    SignalTable,
};

// ============================================================================
// Codec
// ============================================================================

proptest! {
    #[test]
    fn decode_is_total_and_canonical(word in any::<[u8; 8]>()) {
        match Instruction::decode(&word) {
            Ok(instr) => {
                let canonical = instr.encode();
                prop_assert_eq!(canonical[0], word[0]);
                let again = Instruction::decode(&canonical).unwrap();
                prop_assert_eq!(again.encode(), canonical);
            }
            Err(BytecodeError::InvalidOpcode(op)) => {
                prop_assert_eq!(op, word[0]);
                prop_assert!(Opcode::from_byte(op).is_none());
            }
            Err(BytecodeError::InvalidRegister { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn real_immediates_keep_their_bits(value in any::<f32>(), reg in 0u8..32) {
        let bytes = Instruction::Real { reg: Reg(reg), value }.encode();
        match Instruction::decode(&bytes).unwrap() {
            Instruction::Real { reg: r, value: v } => {
                prop_assert_eq!(r, Reg(reg));
                prop_assert_eq!(v.to_bits(), value.to_bits());
            }
            other => prop_assert!(false, "decoded {other:?}"),
        }
    }
}

#[test]
fn test_instruction_size() {
    assert_eq!(INSTRUCTION_SIZE, 8);
    assert_eq!(Instruction::Done.encode().len(), INSTRUCTION_SIZE);
}

// ============================================================================
// Program blob
// ============================================================================

#[test]
fn test_jump_table_layout_survives_reload() {
    // Two bindings: jump table of two skips, then each body.
    let instructions = vec![
        Instruction::Skip {
            reg: None,
            count: 1,
        },
        Instruction::Skip {
            reg: None,
            count: 2,
        },
        Instruction::Int {
            reg: Reg(0),
            value: -7,
        },
        Instruction::Done,
        Instruction::Bool {
            reg: Reg(0),
            value: true,
        },
        Instruction::Done,
    ];
    let program = Program::assemble(ProgramParts {
        bindings: 2,
        signal_table: SignalTable::build(0, &[Vec::<u16>::new(), Vec::new()]),
        exceptions: vec![(1u64 << 32) | 2; 3],
        instructions: instructions.clone(),
        ..ProgramParts::default()
    })
    .unwrap();

    let reloaded = Program::from_bytes(&program.to_bytes()).unwrap();
    let decoded: Vec<Instruction> = reloaded.prepare().unwrap().to_vec();
    assert_eq!(decoded, instructions);
    assert_eq!(reloaded.exception_location(ExceptionId(2)), Some((1, 2)));
    assert_eq!(reloaded.exception_location(ExceptionId(3)), None);
}

#[test]
fn test_exception_table_limit() {
    let result = Program::assemble(ProgramParts {
        exceptions: vec![0; 256],
        ..ProgramParts::default()
    });
    assert!(matches!(result, Err(BytecodeError::LimitExceeded(_))));
}
