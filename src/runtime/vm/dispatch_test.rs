use crate::bytecode::op_code::{BinOp, OpCode};
use crate::runtime::error::RuntimeError;
use crate::runtime::value::Value;

use super::test_support::Program;
use super::VM;

#[test]
fn test_constant_arithmetic() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    let c2 = p.constant(Value::Int(2));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpConstant, &[c2]);
    p.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(3));
    assert!(vm.is_stack_empty());
}

#[test]
fn test_jump_falsy_takes_else_branch() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    let c2 = p.constant(Value::Int(2));

    p.op(OpCode::OpFalse, &[]);
    let jump_falsy = p.op(OpCode::OpJumpFalsy, &[0xffff]);
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpSetGlobal, &[0]);
    let jump_end = p.op(OpCode::OpJump, &[0xffff]);
    let else_pos = p.main.pos();
    p.op(OpCode::OpConstant, &[c2]);
    p.op(OpCode::OpSetGlobal, &[0]);
    let end_pos = p.main.pos();
    p.main.patch_u16(jump_falsy, else_pos);
    p.main.patch_u16(jump_end, end_pos);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(2));
}

#[test]
fn test_and_jump_keeps_falsy_operand() {
    // false && <never evaluated> leaves false as the expression value
    let mut p = Program::new();
    p.op(OpCode::OpFalse, &[]);
    let and_jump = p.op(OpCode::OpAndJump, &[0xffff]);
    p.op(OpCode::OpTrue, &[]);
    let end_pos = p.main.pos();
    p.main.patch_u16(and_jump, end_pos);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Bool(false));
}

#[test]
fn test_and_jump_discards_truthy_operand() {
    let mut p = Program::new();
    let c5 = p.constant(Value::Int(5));
    p.op(OpCode::OpTrue, &[]);
    let and_jump = p.op(OpCode::OpAndJump, &[0xffff]);
    p.op(OpCode::OpConstant, &[c5]);
    let end_pos = p.main.pos();
    p.main.patch_u16(and_jump, end_pos);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(5));
}

#[test]
fn test_or_jump() {
    let mut p = Program::new();
    let c7 = p.constant(Value::Int(7));
    p.op(OpCode::OpFalse, &[]);
    let or_jump = p.op(OpCode::OpOrJump, &[0xffff]);
    p.op(OpCode::OpConstant, &[c7]);
    let end_pos = p.main.pos();
    p.main.patch_u16(or_jump, end_pos);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(7));
}

#[test]
fn test_unary_operators() {
    let mut p = Program::new();
    let c5 = p.constant(Value::Int(5));
    p.op(OpCode::OpConstant, &[c5]);
    p.op(OpCode::OpMinus, &[]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpConstant, &[c5]);
    p.op(OpCode::OpLNot, &[]);
    p.op(OpCode::OpSetGlobal, &[1]);
    p.op(OpCode::OpConstant, &[c5]);
    p.op(OpCode::OpBComplement, &[]);
    p.op(OpCode::OpSetGlobal, &[2]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(-5));
    assert_eq!(vm.global(1).unwrap(), Value::Bool(false));
    assert_eq!(vm.global(2).unwrap(), Value::Int(!5));
}

#[test]
fn test_equal_crosses_numeric_types() {
    let mut p = Program::new();
    let ci = p.constant(Value::Int(1));
    let cf = p.constant(Value::Float(1.0));
    p.op(OpCode::OpConstant, &[ci]);
    p.op(OpCode::OpConstant, &[cf]);
    p.op(OpCode::OpEqual, &[]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Bool(true));
}

#[test]
fn test_array_literal_splices_spread() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    let c2 = p.constant(Value::Int(2));
    let c3 = p.constant(Value::Int(3));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpConstant, &[c2]);
    p.op(OpCode::OpConstant, &[c3]);
    p.op(OpCode::OpArray, &[2]);
    p.op(OpCode::OpSpread, &[]);
    p.op(OpCode::OpArray, &[2]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    match vm.global(0).unwrap() {
        Value::Array(items) => {
            assert_eq!(
                *items.read(),
                vec![Value::Int(1), Value::Int(2), Value::Int(3)]
            );
        }
        other => panic!("expected array, got {}", other.type_name()),
    }
}

#[test]
fn test_spread_of_non_array_fails() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpSpread, &[]);

    let traceback = p.run_err();
    assert!(matches!(traceback.error, RuntimeError::NotSpreadable(_)));
}

#[test]
fn test_map_literal_and_index() {
    let mut p = Program::new();
    let key = p.constant(Value::String("a".into()));
    let c1 = p.constant(Value::Int(1));
    p.op(OpCode::OpConstant, &[key]);
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpMap, &[2]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpConstant, &[key]);
    p.op(OpCode::OpIndex, &[]);
    p.op(OpCode::OpSetGlobal, &[1]);

    let vm = p.run();
    assert_eq!(vm.global(1).unwrap(), Value::Int(1));
}

#[test]
fn test_error_op_wraps_value() {
    let mut p = Program::new();
    let msg = p.constant(Value::String("boom".into()));
    p.op(OpCode::OpConstant, &[msg]);
    p.op(OpCode::OpError, &[]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    match vm.global(0).unwrap() {
        Value::Error(inner) => assert_eq!(*inner, Value::String("boom".into())),
        other => panic!("expected error, got {}", other.type_name()),
    }
}

#[test]
fn test_immutable_op_freezes_containers() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpArray, &[1]);
    p.op(OpCode::OpImmutable, &[]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert!(matches!(
        vm.global(0).unwrap(),
        Value::ImmutableArray(_)
    ));
}

#[test]
fn test_slice_with_null_bounds() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    let c2 = p.constant(Value::Int(2));
    let c3 = p.constant(Value::Int(3));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpConstant, &[c2]);
    p.op(OpCode::OpConstant, &[c3]);
    p.op(OpCode::OpArray, &[3]);
    p.op(OpCode::OpNull, &[]);
    p.op(OpCode::OpConstant, &[c2]);
    p.op(OpCode::OpSliceIndex, &[]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    match vm.global(0).unwrap() {
        Value::Array(items) => {
            assert_eq!(*items.read(), vec![Value::Int(1), Value::Int(2)]);
        }
        other => panic!("expected array, got {}", other.type_name()),
    }
}

#[test]
fn test_locals_in_main_frame() {
    let mut p = Program::new();
    p.num_locals = 1;
    let c5 = p.constant(Value::Int(5));
    let c3 = p.constant(Value::Int(3));
    p.op(OpCode::OpConstant, &[c5]);
    p.op(OpCode::OpDefineLocal, &[0]);
    p.op(OpCode::OpGetLocal, &[0]);
    p.op(OpCode::OpConstant, &[c3]);
    p.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
    p.op(OpCode::OpSetGlobal, &[0]);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(8));
}

#[test]
fn test_iterator_loop_sums_array() {
    let mut p = Program::new();
    p.num_locals = 1;
    let c0 = p.constant(Value::Int(0));
    let c10 = p.constant(Value::Int(10));
    let c20 = p.constant(Value::Int(20));

    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpConstant, &[c10]);
    p.op(OpCode::OpConstant, &[c20]);
    p.op(OpCode::OpArray, &[2]);
    p.op(OpCode::OpIteratorInit, &[]);
    p.op(OpCode::OpDefineLocal, &[0]);

    let loop_pos = p.main.pos();
    p.op(OpCode::OpGetLocal, &[0]);
    p.op(OpCode::OpIteratorNext, &[]);
    let exit = p.op(OpCode::OpJumpFalsy, &[0xffff]);
    p.op(OpCode::OpGetLocal, &[0]);
    p.op(OpCode::OpIteratorValue, &[]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpJump, &[loop_pos]);
    let end_pos = p.main.pos();
    p.main.patch_u16(exit, end_pos);

    let vm = p.run();
    assert_eq!(vm.global(0).unwrap(), Value::Int(30));
}

#[test]
fn test_closure_cell_roundtrip() {
    // n := 0; inc := fn() { n = n + 1; return n }
    let mut p = Program::new();
    p.num_locals = 1;
    let c0 = p.constant(Value::Int(0));
    let c1 = p.constant(Value::Int(1));

    let inc = {
        use super::test_support::Asm;
        let mut f = Asm::new();
        f.op(OpCode::OpGetFree, &[0]);
        f.op(OpCode::OpConstant, &[c1]);
        f.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
        f.op(OpCode::OpSetFree, &[0]);
        f.op(OpCode::OpGetFree, &[0]);
        f.op(OpCode::OpReturn, &[1]);
        p.function(0, 0, false, f.code)
    };

    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpDefineLocal, &[0]);
    p.op(OpCode::OpGetLocalPtr, &[0]);
    p.op(OpCode::OpClosure, &[inc, 1]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpCall, &[0]);
    p.op(OpCode::OpPop, &[]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpCall, &[0]);
    p.op(OpCode::OpSetGlobal, &[1]);
    // the main frame's local observes the closure's writes through the cell
    p.op(OpCode::OpGetLocal, &[0]);
    p.op(OpCode::OpSetGlobal, &[2]);

    let vm = p.run();
    assert_eq!(vm.global(1).unwrap(), Value::Int(2));
    assert_eq!(vm.global(2).unwrap(), Value::Int(2));
}

#[test]
fn test_set_local_writes_through_cell() {
    // a closure capturing a local sees later SetLocal writes to that slot
    let mut p = Program::new();
    p.num_locals = 1;
    let c0 = p.constant(Value::Int(0));
    let c9 = p.constant(Value::Int(9));

    let getter = {
        use super::test_support::Asm;
        let mut f = Asm::new();
        f.op(OpCode::OpGetFree, &[0]);
        f.op(OpCode::OpReturn, &[1]);
        p.function(0, 0, false, f.code)
    };

    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpDefineLocal, &[0]);
    p.op(OpCode::OpGetLocalPtr, &[0]);
    p.op(OpCode::OpClosure, &[getter, 1]);
    p.op(OpCode::OpSetGlobal, &[0]);
    p.op(OpCode::OpConstant, &[c9]);
    p.op(OpCode::OpSetLocal, &[0]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpCall, &[0]);
    p.op(OpCode::OpSetGlobal, &[1]);

    let vm = p.run();
    assert_eq!(vm.global(1).unwrap(), Value::Int(9));
}

#[test]
fn test_set_sel_global_chain() {
    // g[0]["k"] = 5 through a selector chain
    let mut p = Program::new();
    let c5 = p.constant(Value::Int(5));
    let c0 = p.constant(Value::Int(0));
    let key = p.constant(Value::String("k".into()));

    p.op(OpCode::OpMap, &[0]);
    p.op(OpCode::OpArray, &[1]);
    p.op(OpCode::OpSetGlobal, &[0]);
    // value, then selectors innermost-first
    p.op(OpCode::OpConstant, &[c5]);
    p.op(OpCode::OpConstant, &[key]);
    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpSetSelGlobal, &[0, 2]);
    p.op(OpCode::OpGetGlobal, &[0]);
    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpIndex, &[]);
    p.op(OpCode::OpConstant, &[key]);
    p.op(OpCode::OpIndex, &[]);
    p.op(OpCode::OpSetGlobal, &[1]);

    let vm = p.run();
    assert_eq!(vm.global(1).unwrap(), Value::Int(5));
}

#[test]
fn test_allocation_budget_trips() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    for _ in 0..3 {
        p.op(OpCode::OpConstant, &[c1]);
        p.op(OpCode::OpConstant, &[c1]);
        p.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
        p.op(OpCode::OpPop, &[]);
    }

    let mut vm = VM::new(p.build(), None, 2);
    let traceback = vm.run().unwrap_err();
    assert_eq!(traceback.error, RuntimeError::ObjectAllocLimit);
}

#[test]
fn test_allocation_budget_unlimited_with_negative_one() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    for _ in 0..64 {
        p.op(OpCode::OpConstant, &[c1]);
        p.op(OpCode::OpConstant, &[c1]);
        p.op(OpCode::OpBinaryOp, &[BinOp::Add as usize]);
        p.op(OpCode::OpPop, &[]);
    }

    let mut vm = VM::new(p.build(), None, -1);
    assert!(vm.run().is_ok());
}

#[test]
fn test_stack_overflow_on_runaway_pushes() {
    let mut p = Program::new();
    for _ in 0..super::STACK_SIZE + 1 {
        p.op(OpCode::OpTrue, &[]);
    }

    let traceback = p.run_err();
    assert_eq!(traceback.error, RuntimeError::StackOverflow);
}

#[test]
fn test_division_by_zero_has_traceback() {
    let mut p = Program::new();
    let c1 = p.constant(Value::Int(1));
    let c0 = p.constant(Value::Int(0));
    p.op(OpCode::OpConstant, &[c1]);
    p.op(OpCode::OpConstant, &[c0]);
    p.op(OpCode::OpBinaryOp, &[BinOp::Div as usize]);

    let traceback = p.run_err();
    assert_eq!(traceback.error, RuntimeError::DivisionByZero);
    assert!(traceback.to_string().starts_with("Runtime Error: division by zero"));
}
