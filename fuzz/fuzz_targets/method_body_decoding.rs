#![no_main]
use libfuzzer_sys::fuzz_target;
use script_sandbox::module::validation::{InstructionReader, Operand};

fuzz_target!(|data: &[u8]| {
    // Arbitrary method bodies must decode or fail with a structured error, never panic

    let mut offset = 0usize;
    for item in InstructionReader::new(data) {
        match item {
            Ok(instruction) => {
                // Offsets only move forward and stay inside the body
                assert!(instruction.offset >= offset);
                assert!(instruction.offset < data.len());
                offset = instruction.offset;

                if let Operand::Switch(targets) = &instruction.operand {
                    assert!(targets.iter().all(|&t| t < data.len()));
                }
                if let Operand::Branch(target) = instruction.operand {
                    assert!(target < data.len());
                }
            }
            Err(_) => break,
        }
    }
});
