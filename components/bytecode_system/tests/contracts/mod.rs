//! Contract tests for bytecode_system
//! Verifies every opcode group the interpreter consumes is present.

use bytecode_system::{
    EnvironmentCoordinate, GeneratorResumeKind, NameLocation, Opcode, ThrowMsgKind,
};

#[test]
fn test_contract_binding_kind_opcodes() {
    let ec = EnvironmentCoordinate::new(0, 0);
    let ops = [
        Opcode::GetArg(0),
        Opcode::SetArg(0),
        Opcode::GetLocal(0),
        Opcode::SetLocal(0),
        Opcode::InitLexical(0),
        Opcode::CheckLexical(0),
        Opcode::ThrowSetConst(0),
        Opcode::GetAliasedVar(ec),
        Opcode::SetAliasedVar(ec),
        Opcode::InitAliasedLexical(ec),
        Opcode::CheckAliasedLexical(ec),
        Opcode::ThrowSetAliasedConst(ec),
        Opcode::GetName(0),
        Opcode::GetBoundName(0),
        Opcode::BindName(0),
        Opcode::SetName(0),
        Opcode::StrictSetName(0),
        Opcode::DelName(0),
        Opcode::GetGName(0),
        Opcode::BindGName(0),
        Opcode::SetGName(0),
        Opcode::StrictSetGName(0),
        Opcode::InitGLexical(0),
        Opcode::GetIntrinsic(0),
        Opcode::SetIntrinsic(0),
        Opcode::GetImport(0),
        Opcode::Callee,
        Opcode::ThrowSetCallee,
        Opcode::ImplicitThis(0),
        Opcode::GImplicitThis(0),
    ];
    assert_eq!(ops.len(), 30);
}

#[test]
fn test_contract_name_location_covers_every_kind() {
    let kinds = [
        NameLocation::ArgumentSlot(0),
        NameLocation::FrameSlot(0),
        NameLocation::EnvironmentCoordinate(EnvironmentCoordinate::new(0, 0)),
        NameLocation::Dynamic,
        NameLocation::Global,
        NameLocation::Intrinsic,
        NameLocation::Import,
        NameLocation::NamedLambdaCallee,
    ];
    for kind in kinds {
        // Every kind has a read path.
        let _ = kind.get_op(0);
    }
    assert_eq!(NameLocation::Import.set_op(0, true), None);
}

#[test]
fn test_contract_exception_and_generator_opcodes() {
    let ops = [
        Opcode::Try,
        Opcode::TryDestructuring,
        Opcode::Exception,
        Opcode::Throw,
        Opcode::ThrowMsg(ThrowMsgKind::AssignToConst),
        Opcode::Gosub(0),
        Opcode::Retsub,
        Opcode::Finally,
        Opcode::Generator,
        Opcode::InitialYield,
        Opcode::Yield,
        Opcode::Await,
        Opcode::AfterYield,
        Opcode::ResumeKind(GeneratorResumeKind::Return),
        Opcode::CheckResumeKind,
        Opcode::Resume,
        Opcode::FinalYieldRval,
        Opcode::IsGenClosing,
    ];
    assert!(ops.iter().filter(|op| op.is_suspension()).count() == 3);
}
